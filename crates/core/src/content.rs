//! Content identifiers and content index records.

use crate::blob::BlobId;
use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Identifier of a logical content record.
///
/// A content id is the hex SHA-256 of the content bytes, optionally preceded
/// by a single prefix letter in `g..=z` used to group contents by kind.
/// Ids order lexicographically, which is what id ranges are defined over.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentId(String);

impl ContentId {
    /// Compute the id of the given content bytes.
    pub fn for_data(prefix: Option<char>, data: &[u8]) -> crate::Result<Self> {
        let hash = ContentHash::compute(data).to_hex();
        match prefix {
            Some(p) => Self::parse(&format!("{p}{hash}")),
            None => Ok(Self(hash)),
        }
    }

    /// Parse and validate a content id.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let hash = match s.len() {
            64 => s,
            65 => {
                let prefix = s.as_bytes()[0];
                if !(b'g'..=b'z').contains(&prefix) {
                    return Err(crate::Error::InvalidContentId(format!(
                        "invalid prefix {:?} in content id: {s}",
                        prefix as char
                    )));
                }
                &s[1..]
            }
            n => {
                return Err(crate::Error::InvalidContentId(format!(
                    "expected 64 or 65 characters, got {n}: {s}"
                )));
            }
        };
        if !hash.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            return Err(crate::Error::InvalidContentId(format!(
                "content id is not lowercase hex: {s}"
            )));
        }
        Ok(Self(s.to_string()))
    }

    /// Get the optional prefix letter.
    pub fn prefix(&self) -> Option<char> {
        (self.0.len() == 65).then(|| self.0.as_bytes()[0] as char)
    }

    /// Get the content hash part of the id.
    pub fn hash(&self) -> crate::Result<ContentHash> {
        ContentHash::from_hex(&self.0[self.0.len() - 64..])
    }

    /// Check that the given bytes hash to this id.
    pub fn verify(&self, data: &[u8]) -> crate::Result<()> {
        let expected = self.hash()?;
        let actual = ContentHash::compute(data);
        if expected != actual {
            return Err(crate::Error::HashMismatch {
                expected: expected.to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(())
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ContentId {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<ContentId> for String {
    fn from(value: ContentId) -> Self {
        value.0
    }
}

impl std::str::FromStr for ContentId {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({})", self.0)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A content index record: where a content's bytes live.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentInfo {
    /// The content id.
    pub content_id: ContentId,
    /// The pack blob currently holding the content bytes.
    pub pack_blob_id: BlobId,
    /// Byte offset of the content within the pack blob.
    pub pack_offset: u64,
    /// Number of bytes the content occupies in the pack blob.
    pub packed_length: u64,
    /// Soft-delete marker.
    #[serde(default)]
    pub deleted: bool,
    /// When this record was written. Newer records supersede older ones.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl ContentInfo {
    /// End of the content's byte range in its pack blob.
    ///
    /// Returns `None` when `pack_offset + packed_length` overflows.
    pub fn end_offset(&self) -> Option<u64> {
        self.pack_offset.checked_add(self.packed_length)
    }

    /// Check whether the record's range fits in a blob of the given length.
    pub fn fits_within(&self, blob_length: u64) -> bool {
        self.end_offset().is_some_and(|end| end <= blob_length)
    }
}
