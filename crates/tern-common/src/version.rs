use std::fmt;

use serde::{Deserialize, Serialize};

/// A migration version. Ordering of versions is application order.
pub type Version = i64;

/// An inclusive window of versions. A `None` bound is unbounded on that side,
/// so every `i64` (including 0 and negatives) stays usable as a real version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VersionRange {
    pub min: Option<Version>,
    pub max: Option<Version>,
}

impl VersionRange {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn up_to(max: Version) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    pub fn between(min: Version, max: Version) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    pub fn contains(&self, version: Version) -> bool {
        self.min.is_none_or(|min| version >= min) && self.max.is_none_or(|max| version <= max)
    }

    /// `min > max` can never match anything and is treated as a caller mistake.
    pub fn is_inverted(&self) -> bool {
        matches!((self.min, self.max), (Some(min), Some(max)) if min > max)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.min {
            Some(min) => write!(f, "[{min}, ")?,
            None => write!(f, "[start, ")?,
        }
        match self.max {
            Some(max) => write!(f, "{max}]"),
            None => write!(f, "end]"),
        }
    }
}
