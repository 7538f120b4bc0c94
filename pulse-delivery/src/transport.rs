//! Default HTTP transport over a blocking reqwest client.

use std::time::Duration;

use pulse_core::traits::{ITransport, TransportError, TransportRequest};

/// Blocking reqwest-based transport. Retry and backoff live in the flusher;
/// this layer only performs one submission and reports the status code.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::new(e.to_string()))?;
        Ok(Self { client })
    }
}

impl ITransport for HttpTransport {
    fn send(&self, request: &TransportRequest) -> Result<u16, TransportError> {
        let method: reqwest::Method = request
            .method
            .parse()
            .map_err(|_| TransportError::new(format!("invalid method {}", request.method)))?;
        let mut req = self
            .client
            .request(method, &request.url)
            .body(request.body.clone());
        for (name, value) in &request.headers {
            req = req.header(name, value);
        }
        match req.send() {
            Ok(response) => Ok(response.status().as_u16()),
            Err(err) => Err(TransportError {
                not_connected: err.is_connect(),
                reason: err.to_string(),
            }),
        }
    }
}
