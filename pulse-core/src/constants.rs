/// Pulse agent version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Upper bound on the retry backoff delay (10 minutes).
pub const MAX_RETRY_DELAY_MS: i64 = 60 * 10 * 1000;

/// Maximum jitter added to each retry delay.
pub const RETRY_JITTER_MS: i64 = 1000;

/// Default for the watchdog window: a flush in flight longer than this is
/// treated as stuck and superseded.
pub const MAX_FLUSH_DURATION_MS: i64 = 100_000;

/// Crash diagnostics older than this are no longer worth reporting (90 days).
pub const CRASH_RELEVANCE_WINDOW_MS: i64 = 90 * 24 * 60 * 60 * 1000;

/// Queued beacons older than this are purged opportunistically (7 days).
pub const QUEUE_MAX_RECORD_AGE_MS: i64 = 7 * 24 * 60 * 60 * 1000;

/// Tolerated clock skew; records timestamped further in the future are
/// treated as corrupt and purged.
pub const QUEUE_MAX_FUTURE_SKEW_MS: i64 = 60 * 60 * 1000;

/// A diagnostic file younger than this may still be written; don't read it
/// unless other files exist behind it.
pub const DIAGNOSTIC_MIN_FILE_AGE_MS: i64 = 2000;

/// Step used to advance a timestamp-derived diagnostic file name on collision.
pub const DIAGNOSTIC_NAME_STEP_MS: i64 = 5;

/// Bounded number of probes when searching for a free diagnostic file name.
pub const DIAGNOSTIC_NAME_PROBES: usize = 20;

/// Pause between symbolication rounds so late-arriving files are picked up.
pub const SYMBOLICATION_ROUND_PAUSE_MS: u64 = 5000;

/// URLs longer than this are truncated before they enter a beacon.
pub const MAX_URL_LENGTH: usize = 4096;

/// Wire version stamped into crash beacon payloads.
pub const CRASH_PAYLOAD_VERSION: &str = "0.96";
