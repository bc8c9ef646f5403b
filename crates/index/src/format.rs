//! Index blob encoding.
//!
//! An index blob is a JSON document listing content records. Pack blobs are
//! the plain concatenation of the content bytes they hold.

use crate::error::{IndexError, IndexResult};
use bytes::Bytes;
use packrat_core::{BlobId, ContentInfo};
use serde::{Deserialize, Serialize};

/// Current index blob format version.
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// Decoded contents of one index blob.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexBlob {
    pub version: u32,
    pub entries: Vec<ContentInfo>,
}

impl IndexBlob {
    pub fn new(entries: Vec<ContentInfo>) -> Self {
        Self {
            version: INDEX_FORMAT_VERSION,
            entries,
        }
    }

    pub fn encode(&self) -> IndexResult<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    pub fn decode(blob_id: &BlobId, data: &[u8]) -> IndexResult<Self> {
        let blob: IndexBlob =
            serde_json::from_slice(data).map_err(|e| IndexError::InvalidIndexBlob {
                blob_id: blob_id.to_string(),
                reason: e.to_string(),
            })?;
        if blob.version != INDEX_FORMAT_VERSION {
            return Err(IndexError::InvalidIndexBlob {
                blob_id: blob_id.to_string(),
                reason: format!("unsupported version {}", blob.version),
            });
        }
        Ok(blob)
    }
}

/// Whether `candidate` should replace `existing` for the same content id.
///
/// Newer timestamps win; on a tie a live record beats a deleted one.
pub fn supersedes(candidate: &ContentInfo, existing: &ContentInfo) -> bool {
    match candidate.timestamp.cmp(&existing.timestamp) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => !candidate.deleted && existing.deleted,
    }
}
