use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of beacon categories. The rate limiter and the wire serializer
/// match exhaustively so a new category cannot be added without the compiler
/// pointing at every boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BeaconCategory {
    SessionStart,
    HttpRequest,
    Crash,
    Custom,
    ViewChange,
    Performance,
}

impl BeaconCategory {
    /// Session lifecycle and crash beacons must never be dropped.
    pub fn is_rate_limit_exempt(self) -> bool {
        matches!(self, Self::SessionStart | Self::Crash)
    }
}

impl fmt::Display for BeaconCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SessionStart => "session-start",
            Self::HttpRequest => "http-request",
            Self::Crash => "crash",
            Self::Custom => "custom",
            Self::ViewChange => "view-change",
            Self::Performance => "performance",
        };
        f.write_str(name)
    }
}

/// Category-specific payload of a beacon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BeaconKind {
    SessionStart {
        session_id: Uuid,
    },
    HttpRequest(HttpRequestData),
    ViewChange {
        view: String,
    },
    Custom(CustomEventData),
    Crash(CrashData),
    Performance(PerfMetric),
}

impl BeaconKind {
    pub fn category(&self) -> BeaconCategory {
        match self {
            Self::SessionStart { .. } => BeaconCategory::SessionStart,
            Self::HttpRequest(_) => BeaconCategory::HttpRequest,
            Self::ViewChange { .. } => BeaconCategory::ViewChange,
            Self::Custom(_) => BeaconCategory::Custom,
            Self::Crash(_) => BeaconCategory::Crash,
            Self::Performance(_) => BeaconCategory::Performance,
        }
    }
}

/// One completed (or failed/canceled) HTTP call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequestData {
    pub method: String,
    pub url: String,
    /// Path component of the url, when non-empty.
    pub path: Option<String>,
    /// Negative when no response was received (transport failure, cancel).
    pub response_code: i32,
    pub duration_ms: i64,
    pub response_size: Option<HttpSize>,
    pub backend_tracing_id: Option<String>,
    pub error_message: Option<String>,
}

/// Transferred byte counts of an HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HttpSize {
    pub header_bytes: Option<i64>,
    pub body_bytes: Option<i64>,
    pub decoded_body_bytes: Option<i64>,
}

/// A user-defined event with optional duration and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomEventData {
    pub name: String,
    pub duration_ms: Option<i64>,
    pub backend_tracing_id: Option<String>,
    pub error_message: Option<String>,
    pub meta: BTreeMap<String, String>,
}

/// Diagnostic class recorded by the platform for a crash-like event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrashType {
    Crash,
    Hang,
    Cpu,
    Disk,
    App,
}

impl fmt::Display for CrashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Crash => "crash",
            Self::Hang => "hang",
            Self::Cpu => "cpu",
            Self::Disk => "disk",
            Self::App => "app",
        };
        f.write_str(name)
    }
}

/// Outcome of the diagnostic symbolication pipeline for one payload file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashData {
    /// Connects all crashes delivered within the same platform payload batch.
    pub group_id: Uuid,
    pub crash_type: CrashType,
    pub payload_version: String,
    pub symbolicated: bool,
    /// Serialized stack-trace document (compact JSON), or empty when the
    /// payload carried no call stack.
    pub stack_trace: String,
    pub meta: BTreeMap<String, String>,
}

/// Performance/alert measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PerfMetric {
    AppLaunch {
        phase: LaunchPhase,
        duration_ms: i64,
    },
    LowMemory {
        used_bytes: Option<u64>,
        available_bytes: Option<u64>,
    },
    AppNotResponding {
        duration_ms: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchPhase {
    Cold,
    Warm,
    Hot,
}
