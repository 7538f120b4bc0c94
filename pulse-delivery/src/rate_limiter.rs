//! Sliding-window admission control per beacon category.

use pulse_core::beacon::BeaconCategory;
use pulse_core::config::RateLimitTier;

/// One admission tier: at most `max_items` admits within the trailing
/// `duration_ms` window. Expired timestamps are purged lazily on each check;
/// there is no background sweep.
#[derive(Debug)]
struct Window {
    duration_ms: i64,
    max_items: usize,
    admits: Vec<i64>,
}

impl Window {
    fn purge(&mut self, now_ms: i64) {
        let cutoff = now_ms - self.duration_ms;
        self.admits.retain(|&t| t > cutoff);
    }

    fn has_room(&self) -> bool {
        self.admits.len() < self.max_items
    }
}

/// Admission control over all configured tiers. A beacon is admitted only if
/// every tier has room, and an admit counts against all tiers simultaneously.
/// Owned and mutated solely by the reporter's serialized context.
#[derive(Debug)]
pub struct RateLimiter {
    tiers: Vec<Window>,
}

impl RateLimiter {
    pub fn new(tiers: &[RateLimitTier]) -> Self {
        Self {
            tiers: tiers
                .iter()
                .map(|t| Window {
                    duration_ms: t.window_ms,
                    max_items: t.max_items,
                    admits: Vec::new(),
                })
                .collect(),
        }
    }

    /// Check and record admission at `now_ms`. Session lifecycle and crash
    /// beacons are exempt: always admitted, never counted.
    pub fn can_submit(&mut self, category: BeaconCategory, now_ms: i64) -> bool {
        if category.is_rate_limit_exempt() {
            return true;
        }
        for tier in &mut self.tiers {
            tier.purge(now_ms);
        }
        if self.tiers.iter().all(Window::has_room) {
            for tier in &mut self.tiers {
                tier.admits.push(now_ms);
            }
            true
        } else {
            false
        }
    }
}
