//! Agent configuration surface — consumed by the delivery core, owned by the
//! embedding application.

use serde::{Deserialize, Serialize};

use crate::constants::MAX_FLUSH_DURATION_MS;

/// One sliding-window admission tier for the rate limiter. A beacon counts
/// against every configured tier simultaneously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitTier {
    pub window_ms: i64,
    pub max_items: usize,
}

/// Conditions under which reporting is suspended or delayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SuspendCondition {
    /// Delay flushing (low-battery debounce) while the battery is low.
    LowBattery,
    /// Refuse to flush over a cellular connection; wait for WiFi.
    CellularConnection,
}

/// Delivery engine configuration with the documented defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Collector endpoint receiving beacon batches.
    pub reporting_url: String,
    /// Authentication key; validated pre-flight before any network call.
    pub key: String,
    /// Debounce between a submit and the flush it triggers.
    pub send_debounce_ms: u64,
    /// Debounce used instead while the battery is not safe for networking.
    pub low_battery_debounce_ms: u64,
    /// Retries per flush attempt after the initial send.
    pub max_retries: u32,
    /// Batch size cap per HTTP request.
    pub max_beacons_per_request: usize,
    /// Queue capacity; inserts beyond it are dropped (drop-new policy).
    pub max_queue_size: usize,
    /// Beacons submitted within this window after startup land in the
    /// pre-queue and are drained into the main queue when it elapses.
    pub pre_queue_usage_ms: u64,
    pub rate_limits: Vec<RateLimitTier>,
    /// Gzip request bodies; failures degrade to uncompressed transmission.
    pub gzip_report: bool,
    pub suspend_reporting: Vec<SuspendCondition>,
    /// How many failed flushes a beacon survives before it is dropped.
    /// `None` drops failed beacons after a single retry-exhausted flush.
    pub max_beacon_resend_tries: Option<u32>,
    /// Watchdog: an in-flight flush older than this is canceled and
    /// superseded by the next one.
    pub max_flush_duration_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            reporting_url: String::new(),
            key: String::new(),
            send_debounce_ms: 2000,
            low_battery_debounce_ms: 10_000,
            max_retries: 3,
            max_beacons_per_request: 100,
            max_queue_size: 1000,
            pre_queue_usage_ms: 2000,
            rate_limits: vec![
                RateLimitTier {
                    window_ms: 10_000,
                    max_items: 20,
                },
                RateLimitTier {
                    window_ms: 300_000,
                    max_items: 500,
                },
            ],
            gzip_report: true,
            suspend_reporting: Vec::new(),
            max_beacon_resend_tries: None,
            max_flush_duration_ms: MAX_FLUSH_DURATION_MS as u64,
        }
    }
}

impl AgentConfig {
    /// A config with endpoint and key set, defaults for everything else.
    pub fn new(reporting_url: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            reporting_url: reporting_url.into(),
            key: key.into(),
            ..Self::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.key.is_empty() && !self.reporting_url.is_empty()
    }

    pub fn suspends_on(&self, condition: SuspendCondition) -> bool {
        self.suspend_reporting.contains(&condition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AgentConfig::default();
        assert_eq!(config.send_debounce_ms, 2000);
        assert_eq!(config.low_battery_debounce_ms, 10_000);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_beacons_per_request, 100);
        assert_eq!(config.max_queue_size, 1000);
        assert_eq!(config.rate_limits.len(), 2);
        assert!(config.gzip_report);
        assert_eq!(config.max_flush_duration_ms, 100_000);
        assert!(!config.is_valid());
    }

    #[test]
    fn config_with_key_and_url_is_valid() {
        let config = AgentConfig::new("https://collector.example.com/mobile", "KEY");
        assert!(config.is_valid());
        assert!(!config.suspends_on(SuspendCondition::LowBattery));
    }
}
