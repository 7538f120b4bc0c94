//! Timestamp-named diagnostic file store. One payload per file; the decimal
//! millisecond name gives natural temporal ordering and the bounded name
//! probing avoids collisions when several payloads arrive in one batch.

use std::fs;
use std::path::{Path, PathBuf};

use dashmap::DashSet;

use pulse_core::constants::{
    DIAGNOSTIC_MIN_FILE_AGE_MS, DIAGNOSTIC_NAME_PROBES, DIAGNOSTIC_NAME_STEP_MS,
};
use pulse_core::errors::DiagnosticError;
use pulse_core::now_millis;

use crate::payload::{crash_time_within_range, DiagnosticPayload};

pub struct DiagnosticStore {
    dir: PathBuf,
}

impl DiagnosticStore {
    /// Store rooted at `<cache_dir>/diagnostics`.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: cache_dir.into().join("diagnostics"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn has_files(&self) -> bool {
        fs::read_dir(&self.dir)
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
    }

    /// Persist a batch of payloads under consecutive timestamp names.
    pub fn save_all(&self, payloads: &[DiagnosticPayload]) -> Result<Vec<PathBuf>, DiagnosticError> {
        self.save_all_from(payloads, now_millis())
    }

    /// Like [`DiagnosticStore::save_all`] with an explicit starting name.
    pub fn save_all_from(
        &self,
        payloads: &[DiagnosticPayload],
        mut name_ms: i64,
    ) -> Result<Vec<PathBuf>, DiagnosticError> {
        fs::create_dir_all(&self.dir)?;
        let mut written = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let mut free = None;
            for _ in 0..DIAGNOSTIC_NAME_PROBES {
                let candidate = self.dir.join(name_ms.to_string());
                if candidate.exists() {
                    name_ms += DIAGNOSTIC_NAME_STEP_MS;
                } else {
                    free = Some(candidate);
                    break;
                }
            }
            match free {
                Some(path) => {
                    let data = serde_json::to_vec(payload).map_err(|err| {
                        DiagnosticError::FileHandling {
                            reason: err.to_string(),
                        }
                    })?;
                    fs::write(&path, data)?;
                    tracing::debug!("diagnostics: payload saved to {}", path.display());
                    written.push(path);
                }
                None => {
                    tracing::warn!("diagnostics: no free file name near {name_ms}, payload dropped");
                }
            }
            name_ms += DIAGNOSTIC_NAME_STEP_MS;
        }
        Ok(written)
    }

    pub fn load(&self, path: &Path) -> Result<DiagnosticPayload, DiagnosticError> {
        let data = fs::read(path)?;
        serde_json::from_slice(&data).map_err(|err| DiagnosticError::MalformedPayload {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
    }

    pub fn delete(&self, path: &Path) {
        if let Err(err) = fs::remove_file(path) {
            tracing::warn!("diagnostics: deleting {} failed: {err}", path.display());
        }
    }

    /// Pick the oldest unprocessed file and mark it processed. Names that do
    /// not parse or fall outside the crash-relevance window are deleted on
    /// sight. The newest file is skipped while it may still be written.
    pub fn pick_next(&self, processed: &DashSet<String>, now_ms: i64) -> Option<PathBuf> {
        let entries = fs::read_dir(&self.dir).ok()?;
        let mut valid: Vec<(i64, String)> = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            match name.parse::<i64>() {
                Ok(ts) if crash_time_within_range(ts, now_ms) => {
                    if !processed.contains(&name) {
                        valid.push((ts, name));
                    }
                }
                _ => {
                    tracing::info!("diagnostics: removing invalid or stale file {name}");
                    self.delete(&self.dir.join(&name));
                }
            }
        }
        valid.sort_unstable();
        let (ts, name) = valid.first()?;
        if valid.len() == 1 && now_ms - ts < DIAGNOSTIC_MIN_FILE_AGE_MS {
            tracing::debug!("diagnostics: {name} might still be written, skipping this round");
            return None;
        }
        processed.insert(name.clone());
        Some(self.dir.join(name))
    }
}
