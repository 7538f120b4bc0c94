/// A fully built outbound request, opaque to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl TransportRequest {
    pub fn post(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            method: "POST".into(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Transport-level failure (timeout, connection lost, OS error). HTTP status
/// classification happens above this layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct TransportError {
    pub reason: String,
    /// The OS reported no connectivity at all.
    pub not_connected: bool,
}

impl TransportError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            not_connected: false,
        }
    }
}

/// Synchronous HTTP submission. Runs on the flusher's worker thread, never on
/// a producer thread.
pub trait ITransport: Send + Sync {
    /// Submit the request and return the numeric HTTP status.
    fn send(&self, request: &TransportRequest) -> Result<u16, TransportError>;
}
