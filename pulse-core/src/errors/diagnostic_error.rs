use std::path::PathBuf;

/// Diagnostic pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum DiagnosticError {
    #[error("file handling failed: {reason}")]
    FileHandling { reason: String },

    #[error("malformed diagnostic payload at {path}: {reason}")]
    MalformedPayload { path: PathBuf, reason: String },

    #[error("diagnostic timestamp {timestamp_ms} outside the relevance window")]
    StalePayload { timestamp_ms: i64 },
}

impl From<std::io::Error> for DiagnosticError {
    fn from(err: std::io::Error) -> Self {
        Self::FileHandling {
            reason: err.to_string(),
        }
    }
}
