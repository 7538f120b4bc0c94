//! HTTP capture marker. Started when an outgoing request begins and
//! completed exactly once; completion consumes the marker, so a finished
//! request cannot be reported twice.

use pulse_core::beacon::{BeaconKind, BeaconRecord, HttpRequestData, HttpSize};
use pulse_core::now_millis;

/// Timing and metadata collected around one monitored HTTP request.
#[derive(Debug)]
pub struct HttpMarker {
    method: String,
    url: String,
    started_ms: i64,
    backend_tracing_id: Option<String>,
    response_size: Option<HttpSize>,
}

impl HttpMarker {
    /// Marks the request start; duration is measured from this call.
    pub fn start(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            started_ms: now_millis(),
            backend_tracing_id: None,
            response_size: None,
        }
    }

    pub fn set_backend_tracing_id(&mut self, id: impl Into<String>) {
        self.backend_tracing_id = Some(id.into());
    }

    pub fn set_response_size(&mut self, size: HttpSize) {
        self.response_size = Some(size);
    }

    pub fn duration_ms(&self) -> i64 {
        (now_millis() - self.started_ms).max(0)
    }

    /// Complete with a received response.
    pub fn finish(self, response_code: i32) -> BeaconRecord {
        self.into_record(response_code, None)
    }

    /// Complete with a transport-level failure (no response received).
    pub fn finish_with_error(self, error_message: impl Into<String>) -> BeaconRecord {
        self.into_record(-1, Some(error_message.into()))
    }

    /// Complete a request the caller abandoned before a response arrived.
    pub fn cancel(self) -> BeaconRecord {
        self.into_record(-1, Some("canceled".into()))
    }

    fn into_record(self, response_code: i32, error_message: Option<String>) -> BeaconRecord {
        let duration_ms = self.duration_ms();
        let path = url_path(&self.url);
        BeaconRecord::with_timestamp(
            self.started_ms,
            BeaconKind::HttpRequest(HttpRequestData {
                method: self.method,
                url: self.url,
                path,
                response_code,
                duration_ms,
                response_size: self.response_size,
                backend_tracing_id: self.backend_tracing_id,
                error_message,
            }),
        )
    }
}

/// Path component of a url, without scheme, authority, query, or fragment.
fn url_path(url: &str) -> Option<String> {
    let after_scheme = match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => url,
    };
    let path_start = after_scheme.find('/')?;
    let path = &after_scheme[path_start..];
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = &path[..end];
    if path.is_empty() || path == "/" {
        None
    } else {
        Some(path.to_owned())
    }
}
