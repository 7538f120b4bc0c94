/// Beacon delivery errors, from pre-flight validation through HTTP status
/// classification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("no internet connection available")]
    Offline,

    #[error("no WiFi available while reporting is restricted to WiFi")]
    NoWifiAvailable,

    #[error("battery too low for flushing")]
    LowBattery,

    #[error("missing agent key")]
    MissingAgentKey,

    #[error("HTTP client error, code: {0}")]
    HttpClientError(u16),

    #[error("HTTP server error, code: {0}")]
    HttpServerError(u16),

    #[error("invalid response")]
    InvalidResponse,

    #[error("transport failed: {reason}")]
    Transport { reason: String },

    #[error("serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("file handling failed: {reason}")]
    FileHandling { reason: String },

    #[error("multiple errors: {0:?}")]
    Multiple(Vec<DeliveryError>),
}

impl DeliveryError {
    /// Collapse an error list: empty is a bug, one error passes through,
    /// several wrap into `Multiple`.
    pub fn from_errors(mut errors: Vec<DeliveryError>) -> Self {
        if errors.len() == 1 {
            errors.remove(0)
        } else {
            Self::Multiple(errors)
        }
    }

    /// Connectivity/power gating errors: no network call was attempted and
    /// the beacons stay queued for an externally triggered retry.
    pub fn is_gating(&self) -> bool {
        matches!(self, Self::Offline | Self::NoWifiAvailable | Self::LowBattery)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_error_passes_through() {
        let err = DeliveryError::from_errors(vec![DeliveryError::Offline]);
        assert_eq!(err, DeliveryError::Offline);
    }

    #[test]
    fn several_errors_wrap() {
        let err = DeliveryError::from_errors(vec![
            DeliveryError::HttpServerError(503),
            DeliveryError::InvalidResponse,
        ]);
        assert!(matches!(err, DeliveryError::Multiple(ref inner) if inner.len() == 2));
    }
}
