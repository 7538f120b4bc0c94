use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

const ID_CHARS: &[u8] = b"0123456789abcdef";
const ID_LEN: usize = 16;

/// Stable beacon identity — a hex-encoded 64-bit random id, assigned once at
/// creation and never changed. Used for queue deduplication and for matching
/// flush results back to queue entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BeaconId(String);

impl BeaconId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let raw: String = (0..ID_LEN)
            .map(|_| ID_CHARS[rng.random_range(0..ID_CHARS.len())] as char)
            .collect();
        Self(raw)
    }

    /// Wrap an existing id string (test fixtures, persisted state).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BeaconId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
