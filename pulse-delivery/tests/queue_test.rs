use std::sync::Arc;

use proptest::prelude::*;

use pulse_core::beacon::{BeaconKind, BeaconRecord, CustomEventData};
use pulse_core::now_millis;
use pulse_core::traits::NoopStore;
use pulse_delivery::{BeaconQueue, FileStore};

fn custom_beacon(name: &str) -> BeaconRecord {
    BeaconRecord::new(BeaconKind::Custom(CustomEventData {
        name: name.to_string(),
        duration_ms: None,
        backend_tracing_id: None,
        error_message: None,
        meta: Default::default(),
    }))
}

#[test]
fn capacity_drops_incoming_and_keeps_existing() {
    let mut queue = BeaconQueue::new(3, Arc::new(NoopStore));
    let first = custom_beacon("a");
    let first_id = first.id.clone();
    assert!(queue.add(first));
    assert!(queue.add(custom_beacon("b")));
    assert!(queue.add(custom_beacon("c")));

    assert!(!queue.add(custom_beacon("overflow")));
    assert_eq!(queue.len(), 3);
    assert!(queue.items().iter().any(|r| r.id == first_id));
}

#[test]
fn duplicate_identity_is_accepted_but_not_stored_twice() {
    let mut queue = BeaconQueue::new(10, Arc::new(NoopStore));
    let record = custom_beacon("dup");
    assert!(queue.add(record.clone()));
    assert!(queue.add(record));
    assert_eq!(queue.len(), 1);
}

#[test]
fn remove_matching_only_touches_named_identities() {
    let mut queue = BeaconQueue::new(10, Arc::new(NoopStore));
    let keep = custom_beacon("keep");
    let gone = custom_beacon("gone");
    let keep_id = keep.id.clone();
    let gone_id = gone.id.clone();
    queue.add(keep);
    queue.add(gone);

    queue.remove_matching(&[gone_id]);
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.items()[0].id, keep_id);
}

#[test]
fn purge_drops_stale_and_future_skewed_records() {
    let mut queue = BeaconQueue::new(10, Arc::new(NoopStore));
    let now = now_millis();
    let mut ancient = custom_beacon("ancient");
    ancient.timestamp_ms = now - 100 * 24 * 3600 * 1000;
    let mut future = custom_beacon("future");
    future.timestamp_ms = now + 48 * 3600 * 1000;
    let fresh = custom_beacon("fresh");
    let fresh_id = fresh.id.clone();
    queue.add(ancient);
    queue.add(future);
    queue.add(fresh);

    assert_eq!(queue.purge_old(now), 2);
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.items()[0].id, fresh_id);
}

#[test]
fn restore_from_store_survives_process_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");

    let submitted_id = {
        let store = Arc::new(FileStore::new(&path));
        let mut queue = BeaconQueue::new(10, store);
        let record = custom_beacon("persisted");
        let id = record.id.clone();
        queue.add(record);
        id
    };

    let restored = BeaconQueue::new(10, Arc::new(FileStore::new(&path)));
    assert_eq!(restored.len(), 1);
    assert_eq!(restored.items()[0].id, submitted_id);
}

#[test]
fn restore_truncates_to_capacity_and_deduplicates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");
    let store = Arc::new(FileStore::new(&path));

    let mut records: Vec<BeaconRecord> = (0..6).map(|i| custom_beacon(&format!("r{i}"))).collect();
    records.push(records[0].clone());
    use pulse_core::traits::IBeaconStore;
    store.save(&records).unwrap();

    let queue = BeaconQueue::new(4, store);
    assert_eq!(queue.len(), 4);
}

#[test]
fn corrupt_store_restores_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.json");
    std::fs::write(&path, b"not json at all").unwrap();

    let queue = BeaconQueue::new(10, Arc::new(FileStore::new(&path)));
    assert!(queue.is_empty());
}

proptest! {
    #[test]
    fn queue_never_exceeds_capacity(capacity in 1usize..32, submissions in 1usize..128) {
        let mut queue = BeaconQueue::new(capacity, Arc::new(NoopStore));
        for i in 0..submissions {
            queue.add(custom_beacon(&format!("beacon-{i}")));
            prop_assert!(queue.len() <= capacity);
        }
    }
}
