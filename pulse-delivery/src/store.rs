//! File-backed beacon store — whole-snapshot JSON writes.

use std::fs;
use std::path::PathBuf;

use pulse_core::beacon::BeaconRecord;
use pulse_core::errors::{AgentResult, DeliveryError};
use pulse_core::traits::IBeaconStore;

/// Persists the queue snapshot as a single JSON file in the host-provided
/// cache directory. Writes are whole-file; callers treat every failure as
/// non-fatal (in-memory state stays authoritative).
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Conventional file name inside a cache directory.
    pub fn in_cache_dir(cache_dir: impl Into<PathBuf>) -> Self {
        let mut path = cache_dir.into();
        path.push(".pulse_beacon_queue.json");
        Self { path }
    }

    fn file_err(err: impl std::fmt::Display) -> pulse_core::AgentError {
        DeliveryError::FileHandling {
            reason: err.to_string(),
        }
        .into()
    }
}

impl IBeaconStore for FileStore {
    fn load(&self) -> AgentResult<Vec<BeaconRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = fs::read(&self.path).map_err(Self::file_err)?;
        serde_json::from_slice(&data).map_err(Self::file_err)
    }

    fn save(&self, records: &[BeaconRecord]) -> AgentResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(Self::file_err)?;
        }
        let data = serde_json::to_vec(records).map_err(Self::file_err)?;
        fs::write(&self.path, data).map_err(Self::file_err)
    }
}
