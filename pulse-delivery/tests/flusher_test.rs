use std::collections::VecDeque;
use std::io::Read;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pulse_core::beacon::{BeaconKind, BeaconRecord, CustomEventData};
use pulse_core::config::AgentConfig;
use pulse_core::errors::DeliveryError;
use pulse_core::traits::{ITransport, TransportError, TransportRequest};
use pulse_delivery::{BeaconFlusher, WireSerializer};

/// Transport that replays a scripted sequence of responses and records every
/// request it saw. Once the script runs out it answers 200.
struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<u16, TransportError>>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    fn new(script: Vec<Result<u16, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(script.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ITransport for ScriptedTransport {
    fn send(&self, request: &TransportRequest) -> Result<u16, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(200))
    }
}

fn config() -> AgentConfig {
    AgentConfig::new("https://collector.example.com/mobile", "agent-key-1")
}

fn flusher(config: &AgentConfig, transport: Arc<ScriptedTransport>) -> BeaconFlusher {
    BeaconFlusher::new(
        config,
        transport,
        Arc::new(WireSerializer),
        Arc::new(AtomicBool::new(false)),
    )
    .with_backoff(|_| Duration::ZERO)
}

fn custom_beacon(name: &str) -> BeaconRecord {
    BeaconRecord::new(BeaconKind::Custom(CustomEventData {
        name: name.to_string(),
        duration_ms: None,
        backend_tracing_id: None,
        error_message: None,
        meta: Default::default(),
    }))
}

fn has_header(request: &TransportRequest, name: &str, value: &str) -> bool {
    request
        .headers
        .iter()
        .any(|(n, v)| n.eq_ignore_ascii_case(name) && v == value)
}

#[test]
fn successful_flush_reports_every_identity_sent() {
    let transport = ScriptedTransport::new(vec![]);
    let records: Vec<_> = (0..3).map(|i| custom_beacon(&format!("b{i}"))).collect();
    let ids: Vec<_> = records.iter().map(|r| r.id.clone()).collect();

    let outcome = flusher(&config(), Arc::clone(&transport))
        .run(records)
        .unwrap();

    assert!(outcome.all_sent());
    assert_eq!(outcome.sent, ids);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(transport.request_count(), 1);
}

#[test]
fn retry_exhaustion_yields_one_error_per_attempt() {
    let mut cfg = config();
    cfg.max_retries = 2;
    let transport = ScriptedTransport::new(vec![Ok(500); 10]);
    let record = custom_beacon("stubborn");
    let id = record.id.clone();

    let outcome = flusher(&cfg, Arc::clone(&transport)).run(vec![record]).unwrap();

    // initial attempt plus two retries
    assert_eq!(outcome.attempts, 3);
    assert_eq!(transport.request_count(), 3);
    assert_eq!(outcome.errors.len(), 3);
    assert!(outcome.all_failed());
    assert_eq!(outcome.failed, vec![id]);
    assert!(matches!(
        outcome.errors[0],
        DeliveryError::HttpServerError(500)
    ));
}

#[test]
fn retry_resends_only_the_failed_batch() {
    let mut cfg = config();
    cfg.max_beacons_per_request = 1;
    cfg.max_retries = 3;
    // first batch succeeds, second fails once then succeeds
    let transport = ScriptedTransport::new(vec![Ok(200), Ok(503), Ok(200)]);
    let first = custom_beacon("first");
    let second = custom_beacon("second");
    let ids = vec![first.id.clone(), second.id.clone()];

    let outcome = flusher(&cfg, Arc::clone(&transport))
        .run(vec![first, second])
        .unwrap();

    assert_eq!(transport.request_count(), 3);
    assert_eq!(outcome.attempts, 2);
    assert!(outcome.failed.is_empty());
    let mut sent = outcome.sent.clone();
    sent.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    let mut expected = ids;
    expected.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    assert_eq!(sent, expected);
    // one error from the failed round is still reported
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.partially_sent());
}

#[test]
fn partial_outcome_when_one_batch_never_recovers() {
    let mut cfg = config();
    cfg.max_beacons_per_request = 1;
    cfg.max_retries = 1;
    let transport = ScriptedTransport::new(vec![Ok(200), Ok(500), Ok(500)]);
    let first = custom_beacon("first");
    let second = custom_beacon("second");
    let second_id = second.id.clone();

    let outcome = flusher(&cfg, Arc::clone(&transport))
        .run(vec![first, second])
        .unwrap();

    assert!(outcome.partially_sent());
    assert_eq!(outcome.sent.len(), 1);
    assert_eq!(outcome.failed, vec![second_id]);
    assert_eq!(outcome.attempts, 2);
}

#[test]
fn status_codes_classify_into_client_server_and_invalid() {
    for (code, expect_client, expect_server) in
        [(404u16, true, false), (503, false, true), (302, false, false)]
    {
        let transport = ScriptedTransport::new(vec![Ok(code); 10]);
        let mut cfg = config();
        cfg.max_retries = 0;
        let outcome = flusher(&cfg, transport).run(vec![custom_beacon("x")]).unwrap();
        match &outcome.errors[0] {
            DeliveryError::HttpClientError(c) => {
                assert!(expect_client, "unexpected client error for {code}");
                assert_eq!(*c, code);
            }
            DeliveryError::HttpServerError(c) => {
                assert!(expect_server, "unexpected server error for {code}");
                assert_eq!(*c, code);
            }
            DeliveryError::InvalidResponse => {
                assert!(!expect_client && !expect_server, "unexpected invalid for {code}");
            }
            other => panic!("unexpected error for {code}: {other:?}"),
        }
    }
}

#[test]
fn transport_connection_failure_maps_to_offline() {
    let mut cfg = config();
    cfg.max_retries = 0;
    let transport = ScriptedTransport::new(vec![Err(TransportError {
        reason: "connect timed out".into(),
        not_connected: true,
    })]);

    let outcome = flusher(&cfg, transport).run(vec![custom_beacon("x")]).unwrap();
    assert!(matches!(outcome.errors[0], DeliveryError::Offline));
}

#[test]
fn missing_key_fails_before_any_network_call() {
    let mut cfg = config();
    cfg.key = String::new();
    let transport = ScriptedTransport::new(vec![]);

    let outcome = flusher(&cfg, Arc::clone(&transport))
        .run(vec![custom_beacon("x")])
        .unwrap();

    assert_eq!(transport.request_count(), 0);
    assert_eq!(outcome.attempts, 0);
    assert!(matches!(outcome.errors[0], DeliveryError::MissingAgentKey));
}

#[test]
fn gzip_body_carries_content_encoding_and_decompresses() {
    let transport = ScriptedTransport::new(vec![]);
    flusher(&config(), Arc::clone(&transport))
        .run(vec![custom_beacon("zipped")])
        .unwrap();

    let request = transport.requests().remove(0);
    assert!(has_header(&request, "Content-Encoding", "gzip"));
    assert!(has_header(&request, "Content-Type", "text/plain"));

    let mut decoder = flate2::read::GzDecoder::new(request.body.as_slice());
    let mut text = String::new();
    decoder.read_to_string(&mut text).unwrap();
    assert!(text.contains("cen\tzipped"));
}

#[test]
fn gzip_disabled_sends_plain_body() {
    let mut cfg = config();
    cfg.gzip_report = false;
    let transport = ScriptedTransport::new(vec![]);
    flusher(&cfg, Arc::clone(&transport))
        .run(vec![custom_beacon("plain")])
        .unwrap();

    let request = transport.requests().remove(0);
    assert!(!request
        .headers
        .iter()
        .any(|(n, _)| n.eq_ignore_ascii_case("Content-Encoding")));
    let text = String::from_utf8(request.body).unwrap();
    assert!(text.contains("cen\tplain"));
}

#[test]
fn preset_cancel_aborts_without_an_outcome() {
    let transport = ScriptedTransport::new(vec![]);
    let cancel = Arc::new(AtomicBool::new(true));
    let flusher = BeaconFlusher::new(
        &config(),
        Arc::clone(&transport) as Arc<dyn ITransport>,
        Arc::new(WireSerializer),
        cancel,
    );

    assert!(flusher.run(vec![custom_beacon("x")]).is_none());
    assert_eq!(transport.request_count(), 0);
}
