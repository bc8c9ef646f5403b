//! Blob identifiers and metadata.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use time::OffsetDateTime;

/// Identifier of a physical blob in the blob store.
///
/// Blob ids are non-empty and limited to `[0-9a-z._-]`, so they are always
/// safe to use as a single path component. The first character names the
/// blob class (see the `*_BLOB_PREFIX` constants).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlobId(String);

impl BlobId {
    /// Parse and validate a blob id.
    pub fn parse(s: &str) -> crate::Result<Self> {
        if s.is_empty() {
            return Err(crate::Error::InvalidBlobId("empty blob id".to_string()));
        }
        if s.starts_with('.') {
            return Err(crate::Error::InvalidBlobId(format!(
                "blob id may not start with '.': {s}"
            )));
        }
        if let Some(bad) = s
            .chars()
            .find(|c| !(c.is_ascii_digit() || c.is_ascii_lowercase() || matches!(c, '.' | '_' | '-')))
        {
            return Err(crate::Error::InvalidBlobId(format!(
                "invalid character {bad:?} in blob id: {s}"
            )));
        }
        Ok(Self(s.to_string()))
    }

    /// Generate a fresh blob id with the given class prefix.
    pub fn generate(prefix: &str, unique: &str) -> crate::Result<Self> {
        Self::parse(&format!("{prefix}{unique}"))
    }

    /// Get the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether this id starts with the given prefix.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl TryFrom<String> for BlobId {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<BlobId> for String {
    fn from(value: BlobId) -> Self {
        value.0
    }
}

impl Borrow<str> for BlobId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlobId({})", self.0)
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata about a stored blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMetadata {
    /// The blob id.
    pub blob_id: BlobId,
    /// Total blob size in bytes. Authoritative for bounds checks.
    pub length: u64,
    /// Last modification time (if the backend reports one).
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
}

impl BlobMetadata {
    /// Create metadata without a timestamp.
    pub fn new(blob_id: BlobId, length: u64) -> Self {
        Self {
            blob_id,
            length,
            timestamp: None,
        }
    }
}
