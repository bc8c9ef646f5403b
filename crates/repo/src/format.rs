//! The repository format blob.

use crate::error::{RepoError, RepoResult};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

/// Contents of the format blob that marks an initialized repository.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FormatBlob {
    /// Unique id of this repository.
    pub unique_id: Uuid,
    /// Hex salt mixed into the password hash.
    pub password_salt: String,
    /// Hex SHA-256 of salt and password.
    pub password_hash: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl FormatBlob {
    /// Create a format blob for a new repository.
    pub fn new(password: &str) -> Self {
        let password_salt = Uuid::new_v4().simple().to_string();
        Self {
            unique_id: Uuid::new_v4(),
            password_hash: hash_password(&password_salt, password),
            password_salt,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Check a password against the stored hash.
    pub fn verify_password(&self, password: &str) -> RepoResult<()> {
        if hash_password(&self.password_salt, password) != self.password_hash {
            return Err(RepoError::InvalidPassword);
        }
        Ok(())
    }

    pub fn encode(&self) -> RepoResult<Bytes> {
        Ok(Bytes::from(serde_json::to_vec_pretty(self)?))
    }

    pub fn decode(data: &[u8]) -> RepoResult<Self> {
        serde_json::from_slice(data).map_err(|e| RepoError::InvalidFormat(e.to_string()))
    }
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_roundtrip() {
        let format = FormatBlob::new("hunter2");
        format.verify_password("hunter2").unwrap();
        assert!(matches!(
            format.verify_password("wrong"),
            Err(RepoError::InvalidPassword)
        ));

        let decoded = FormatBlob::decode(&format.encode().unwrap()).unwrap();
        assert_eq!(decoded.unique_id, format.unique_id);
        decoded.verify_password("hunter2").unwrap();
    }

    #[test]
    fn test_same_password_different_salt() {
        let a = FormatBlob::new("same");
        let b = FormatBlob::new("same");
        assert_ne!(a.password_hash, b.password_hash);
    }

    #[test]
    fn test_decode_garbage_is_invalid_format() {
        assert!(matches!(
            FormatBlob::decode(b"{"),
            Err(RepoError::InvalidFormat(_))
        ));
    }
}
