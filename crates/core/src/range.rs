//! Lexicographic content id ranges.

use crate::content::ContentId;
use serde::{Deserialize, Serialize};

/// A half-open lexicographic interval `[start, end)` of content ids.
///
/// Missing bounds are unbounded.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRange {
    /// Inclusive lower bound.
    pub start: Option<String>,
    /// Exclusive upper bound.
    pub end: Option<String>,
}

impl IdRange {
    /// The range covering every content id.
    pub fn all() -> Self {
        Self::default()
    }

    /// Range of ids in `[start, end)`.
    pub fn between(start: impl Into<String>, end: impl Into<String>) -> crate::Result<Self> {
        let (start, end) = (start.into(), end.into());
        if start > end {
            return Err(crate::Error::InvalidRange(format!(
                "start {start:?} is after end {end:?}"
            )));
        }
        Ok(Self {
            start: Some(start),
            end: Some(end),
        })
    }

    /// Range of every id starting with `prefix`.
    pub fn prefixed(prefix: &str) -> Self {
        if prefix.is_empty() {
            return Self::all();
        }
        Self {
            start: Some(prefix.to_string()),
            end: prefix_successor(prefix),
        }
    }

    /// Check whether the id falls in this range.
    pub fn contains(&self, id: &ContentId) -> bool {
        let id = id.as_str();
        if let Some(start) = &self.start
            && id < start.as_str()
        {
            return false;
        }
        if let Some(end) = &self.end
            && id >= end.as_str()
        {
            return false;
        }
        true
    }

    /// Whether this range is unbounded on both sides.
    pub fn is_all(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Smallest string greater than every string with the given prefix.
///
/// Returns `None` when no such bound exists (prefix made of `char::MAX`).
fn prefix_successor(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        // Step over the surrogate gap, which holds no chars.
        let next = match last {
            '\u{D7FF}' => Some('\u{E000}'),
            _ => char::from_u32(last as u32 + 1),
        };
        if let Some(next) = next {
            chars.push(next);
            return Some(chars.into_iter().collect());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(prefix: &str) -> ContentId {
        ContentId::parse(&format!("{prefix}{}", "0".repeat(64))).unwrap()
    }

    #[test]
    fn test_all_contains_everything() {
        let range = IdRange::all();
        assert!(range.is_all());
        assert!(range.contains(&id("k")));
        assert!(range.contains(&ContentId::parse(&"f".repeat(64)).unwrap()));
    }

    #[test]
    fn test_prefixed_range() {
        let range = IdRange::prefixed("k");
        assert!(range.contains(&id("k")));
        assert!(!range.contains(&id("m")));
        assert!(!range.contains(&ContentId::parse(&"f".repeat(64)).unwrap()));
    }

    #[test]
    fn test_between_is_half_open() {
        let low = ContentId::parse(&"1".repeat(64)).unwrap();
        let high = ContentId::parse(&"2".repeat(64)).unwrap();
        let range = IdRange::between(low.as_str(), high.as_str()).unwrap();
        assert!(range.contains(&low));
        assert!(!range.contains(&high));
        assert!(IdRange::between("2", "1").is_err());
    }

    #[test]
    fn test_prefix_successor_steps_over_surrogates() {
        assert_eq!(prefix_successor("k").as_deref(), Some("l"));
        assert_eq!(prefix_successor("a\u{D7FF}").as_deref(), Some("a\u{E000}"));
        assert_eq!(prefix_successor("b\u{10FFFF}").as_deref(), Some("c"));
        assert_eq!(prefix_successor("\u{10FFFF}"), None);
    }
}
