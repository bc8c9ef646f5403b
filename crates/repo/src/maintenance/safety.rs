//! Maintenance safety levels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::Duration;

/// How aggressive destructive cleanup may be.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyLevel {
    /// No safety margins. Only safe when no other client touches the repository.
    None,
    /// Keep recently deleted records and recently written packs.
    #[default]
    Full,
}

/// Age thresholds derived from a safety level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SafetyParams {
    /// Soft-deleted records younger than this are kept.
    pub drop_deleted_age: Duration,
    /// Unreferenced pack blobs younger than this are kept.
    pub min_pack_age: Duration,
}

impl SafetyLevel {
    pub fn params(self) -> SafetyParams {
        match self {
            SafetyLevel::None => SafetyParams {
                drop_deleted_age: Duration::ZERO,
                min_pack_age: Duration::ZERO,
            },
            SafetyLevel::Full => SafetyParams {
                drop_deleted_age: Duration::hours(24),
                min_pack_age: Duration::hours(1),
            },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SafetyLevel::None => "none",
            SafetyLevel::Full => "full",
        }
    }
}

impl FromStr for SafetyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(SafetyLevel::None),
            "full" => Ok(SafetyLevel::Full),
            other => Err(format!("unknown safety level {other:?} (expected \"none\" or \"full\")")),
        }
    }
}

impl fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_safety_levels() {
        assert_eq!("none".parse::<SafetyLevel>().unwrap(), SafetyLevel::None);
        assert_eq!("full".parse::<SafetyLevel>().unwrap(), SafetyLevel::Full);
        assert!("FULL".parse::<SafetyLevel>().is_err());
        assert_eq!(SafetyLevel::default(), SafetyLevel::Full);
    }

    #[test]
    fn test_none_has_no_margins() {
        let params = SafetyLevel::None.params();
        assert_eq!(params.drop_deleted_age, Duration::ZERO);
        assert_eq!(params.min_pack_age, Duration::ZERO);
        assert!(SafetyLevel::Full.params().min_pack_age > Duration::ZERO);
    }
}
