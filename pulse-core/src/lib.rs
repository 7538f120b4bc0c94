//! # pulse-core
//!
//! Foundation crate for the Pulse mobile APM agent.
//! Defines the beacon data model, errors, configuration, constants, and the
//! collaborator traits (transport, persistence, network/power signals).
//! Every other crate in the workspace depends on this.

pub mod beacon;
pub mod config;
pub mod constants;
pub mod errors;
pub mod logging;
pub mod traits;

// Re-export the most commonly used types at the crate root.
pub use beacon::{BeaconCategory, BeaconId, BeaconKind, BeaconRecord, CrashType};
pub use config::AgentConfig;
pub use errors::{AgentError, AgentResult, DeliveryError, DiagnosticError};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
