//! Run order of sibling units.

use crate::error::SpecError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How siblings are ordered at each scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderingKind {
    /// Declaration order.
    Defined,
    /// Deterministic shuffle keyed by the run seed and the scope path.
    #[default]
    Random,
}

impl OrderingKind {
    /// Returns the order in which `len` siblings at `path` run for `seed`.
    ///
    /// A random order sorts siblings by a blake3 rank derived from the seed, the path and the
    /// sibling's index, so a seed maps to the same permutation on every platform and release.
    pub fn order(self, len: usize, seed: u64, path: &[String]) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..len).collect();
        if self == Self::Random && len > 1 {
            let key = discriminate(seed, "order", path);
            indices.sort_by_cached_key(|&index| {
                (discriminate(key, "rank", &[index.to_string()]), index)
            });
        }
        indices
    }

    /// Name used in configuration and environment values.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Defined => "defined",
            Self::Random => "random",
        }
    }
}

impl fmt::Display for OrderingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderingKind {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "defined" => Ok(Self::Defined),
            "random" => Ok(Self::Random),
            other => Err(SpecError::Config(format!(
                "unknown ordering {:?}, expected \"defined\" or \"random\"",
                other
            ))),
        }
    }
}

/// Derives a stable sub-seed for `domain` at `path` from the run seed.
pub fn discriminate(seed: u64, domain: &str, path: &[String]) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&seed.to_le_bytes());
    hasher.update(domain.as_bytes());
    for segment in path {
        hasher.update(&(segment.len() as u64).to_le_bytes());
        hasher.update(segment.as_bytes());
    }
    let hash = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(head)
}
