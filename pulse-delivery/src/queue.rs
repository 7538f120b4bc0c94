//! Bounded, deduplicating, crash-durable holding area for pending beacons.

use std::collections::HashSet;
use std::sync::Arc;

use pulse_core::beacon::{BeaconId, BeaconRecord};
use pulse_core::constants::{QUEUE_MAX_FUTURE_SKEW_MS, QUEUE_MAX_RECORD_AGE_MS};
use pulse_core::traits::IBeaconStore;

/// In-memory queue of pending beacons, keyed by identity, with best-effort
/// persistence behind it. Mutated only from the reporter's serialized context.
///
/// Capacity policy: drop-new-on-full. Already-queued data is preserved and no
/// CPU is spent evicting; the incoming record is discarded.
pub struct BeaconQueue {
    max_items: usize,
    items: Vec<BeaconRecord>,
    ids: HashSet<BeaconId>,
    store: Arc<dyn IBeaconStore>,
}

impl BeaconQueue {
    /// Restore whatever the store holds (bounded by `max_items`); persistence
    /// failures leave an empty queue and are logged, never propagated.
    pub fn new(max_items: usize, store: Arc<dyn IBeaconStore>) -> Self {
        let mut items = match store.load() {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!("queue: restoring persisted beacons failed: {err}");
                Vec::new()
            }
        };
        items.truncate(max_items);
        let mut ids = HashSet::with_capacity(items.len());
        items.retain(|r| ids.insert(r.id.clone()));
        Self {
            max_items,
            items,
            ids,
            store,
        }
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.max_items
    }

    /// Read-only view for the flusher.
    pub fn items(&self) -> &[BeaconRecord] {
        &self.items
    }

    /// Owned snapshot handed to a flush attempt.
    pub fn snapshot(&self) -> Vec<BeaconRecord> {
        self.items.clone()
    }

    /// Insert unless already present by identity (first insertion wins) or
    /// the queue is full. Returns whether the record was accepted.
    pub fn add(&mut self, record: BeaconRecord) -> bool {
        if self.ids.contains(&record.id) {
            return true;
        }
        if self.is_full() {
            tracing::warn!("queue: full ({} items), beacon dropped", self.max_items);
            return false;
        }
        self.ids.insert(record.id.clone());
        self.items.push(record);
        self.persist();
        true
    }

    pub fn add_all(&mut self, records: Vec<BeaconRecord>) -> usize {
        let mut accepted = 0;
        let mut changed = false;
        for record in records {
            if self.ids.contains(&record.id) {
                accepted += 1;
                continue;
            }
            if self.is_full() {
                tracing::warn!("queue: full ({} items), beacon dropped", self.max_items);
                continue;
            }
            self.ids.insert(record.id.clone());
            self.items.push(record);
            accepted += 1;
            changed = true;
        }
        if changed {
            self.persist();
        }
        accepted
    }

    /// Remove entries matching the given identities (after a successful send
    /// or on retry-budget exhaustion).
    pub fn remove_matching(&mut self, ids: &[BeaconId]) {
        if ids.is_empty() {
            return;
        }
        let before = self.items.len();
        self.items.retain(|r| !ids.contains(&r.id));
        for id in ids {
            self.ids.remove(id);
        }
        if self.items.len() != before {
            self.persist();
        }
    }

    /// Drop records outside the sane age window: older than the retention
    /// bound, or timestamped implausibly far in the future (clock skew).
    /// Run opportunistically (app foreground), not on a timer.
    pub fn purge_old(&mut self, now_ms: i64) -> usize {
        let oldest = now_ms - QUEUE_MAX_RECORD_AGE_MS;
        let newest = now_ms + QUEUE_MAX_FUTURE_SKEW_MS;
        let before = self.items.len();
        self.items
            .retain(|r| r.timestamp_ms >= oldest && r.timestamp_ms <= newest);
        let purged = before - self.items.len();
        if purged > 0 {
            self.ids = self.items.iter().map(|r| r.id.clone()).collect();
            tracing::info!("queue: purged {purged} out-of-window beacons");
            self.persist();
        }
        purged
    }

    fn persist(&self) {
        if let Err(err) = self.store.save(&self.items) {
            tracing::warn!("queue: persisting {} beacons failed: {err}", self.items.len());
        }
    }
}
