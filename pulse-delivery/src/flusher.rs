//! Batch sender — splits a queue snapshot into request-sized batches and
//! drives the HTTP submission with retry, exponential backoff, and gzip.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use rand::Rng;

use pulse_core::beacon::{BeaconId, BeaconRecord};
use pulse_core::config::AgentConfig;
use pulse_core::constants::{MAX_RETRY_DELAY_MS, RETRY_JITTER_MS};
use pulse_core::errors::DeliveryError;
use pulse_core::traits::{IBeaconSerializer, ITransport, TransportRequest};

/// Aggregate result of one flush attempt across all batches.
///
/// `attempts == 0` means no network call happened (gating or pre-flight
/// failure); the queue is retained without penalty. With `attempts >= 1`,
/// `failed` lists the identities whose batch never went through, to be
/// charged against their resend budget.
#[derive(Debug, Default)]
pub struct FlushOutcome {
    pub sent: Vec<BeaconId>,
    pub failed: Vec<BeaconId>,
    pub errors: Vec<DeliveryError>,
    /// Send rounds performed (initial + retries).
    pub attempts: u32,
}

impl FlushOutcome {
    /// A gating or pre-flight failure — no network call was made.
    pub fn rejected(error: DeliveryError) -> Self {
        Self {
            errors: vec![error],
            ..Self::default()
        }
    }

    pub fn all_sent(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn all_failed(&self) -> bool {
        self.sent.is_empty() && !self.errors.is_empty()
    }

    pub fn partially_sent(&self) -> bool {
        !self.sent.is_empty() && !self.errors.is_empty()
    }

    /// Collapsed error for completion observers.
    pub fn error(&self) -> Option<DeliveryError> {
        if self.errors.is_empty() {
            None
        } else {
            Some(DeliveryError::from_errors(self.errors.clone()))
        }
    }
}

/// Pluggable retry-delay policy (tests shorten it).
pub type BackoffFn = Box<dyn Fn(u32) -> Duration + Send + Sync>;

/// Delay before retry step `n`: `min(max, 2^(n+1) s)` plus up to 1s jitter.
pub fn retry_delay(step: u32) -> Duration {
    let base_ms = 2i64
        .checked_pow(step.saturating_add(1))
        .and_then(|s| s.checked_mul(1000))
        .unwrap_or(MAX_RETRY_DELAY_MS)
        .min(MAX_RETRY_DELAY_MS);
    let jitter = rand::rng().random_range(0..=RETRY_JITTER_MS);
    Duration::from_millis((base_ms + jitter) as u64)
}

/// Executes one flush attempt. Constructed per attempt by the reporter and
/// run on a background worker thread; cancelable between batches and during
/// backoff pauses via the shared flag.
pub struct BeaconFlusher {
    key: String,
    reporting_url: String,
    max_beacons_per_request: usize,
    max_retries: u32,
    gzip_report: bool,
    transport: Arc<dyn ITransport>,
    serializer: Arc<dyn IBeaconSerializer>,
    cancel: Arc<AtomicBool>,
    backoff: BackoffFn,
}

impl BeaconFlusher {
    pub fn new(
        config: &AgentConfig,
        transport: Arc<dyn ITransport>,
        serializer: Arc<dyn IBeaconSerializer>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            key: config.key.clone(),
            reporting_url: config.reporting_url.clone(),
            max_beacons_per_request: config.max_beacons_per_request.max(1),
            max_retries: config.max_retries,
            gzip_report: config.gzip_report,
            transport,
            serializer,
            cancel,
            backoff: Box::new(retry_delay),
        }
    }

    /// Replace the backoff policy.
    pub fn with_backoff(mut self, backoff: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
        self.backoff = Box::new(backoff);
        self
    }

    /// Run the attempt to completion. Returns `None` when canceled — the
    /// caller must not reconcile the queue in that case (batch outcomes are
    /// unknown).
    pub fn run(&self, items: Vec<BeaconRecord>) -> Option<FlushOutcome> {
        if self.key.is_empty() {
            tracing::warn!("flusher: agent key missing, refusing to send");
            return Some(FlushOutcome::rejected(DeliveryError::MissingAgentKey));
        }

        let mut pending: Vec<Vec<BeaconRecord>> = items
            .chunks(self.max_beacons_per_request)
            .map(<[BeaconRecord]>::to_vec)
            .collect();
        let mut sent: Vec<BeaconId> = Vec::new();
        let mut errors: Vec<DeliveryError> = Vec::new();
        let mut retry_step: u32 = 0;
        let mut attempts: u32 = 0;

        loop {
            if self.canceled() {
                return None;
            }
            let mut still_failed: Vec<Vec<BeaconRecord>> = Vec::new();
            for batch in &pending {
                if self.canceled() {
                    return None;
                }
                match self.send_batch(batch) {
                    Ok(()) => sent.extend(batch.iter().map(|r| r.id.clone())),
                    Err(err) => {
                        tracing::warn!(
                            "flusher: batch of {} failed at retry step {retry_step}: {err}",
                            batch.len()
                        );
                        errors.push(err);
                        still_failed.push(batch.clone());
                    }
                }
            }
            attempts += 1;
            if still_failed.is_empty() {
                pending.clear();
                break;
            }
            pending = still_failed;
            if retry_step >= self.max_retries {
                break;
            }
            retry_step += 1;
            let delay = (self.backoff)(retry_step);
            tracing::debug!(
                "flusher: retry step {retry_step}/{} after {delay:?}",
                self.max_retries
            );
            if !self.pause(delay) {
                return None;
            }
        }

        let failed: Vec<BeaconId> = pending
            .iter()
            .flat_map(|batch| batch.iter().map(|r| r.id.clone()))
            .collect();
        Some(FlushOutcome {
            sent,
            failed,
            errors,
            attempts,
        })
    }

    fn send_batch(&self, batch: &[BeaconRecord]) -> Result<(), DeliveryError> {
        let body = self
            .serializer
            .serialize(batch)
            .map_err(|err| DeliveryError::Serialization {
                reason: err.to_string(),
            })?;
        let request = self.build_request(body);
        match self.transport.send(&request) {
            Ok(code) => match code {
                200..=299 => Ok(()),
                400..=499 => Err(DeliveryError::HttpClientError(code)),
                500..=599 => Err(DeliveryError::HttpServerError(code)),
                _ => Err(DeliveryError::InvalidResponse),
            },
            Err(err) if err.not_connected => Err(DeliveryError::Offline),
            Err(err) => Err(DeliveryError::Transport { reason: err.reason }),
        }
    }

    /// Compression failures degrade to uncompressed transmission.
    fn build_request(&self, body: Vec<u8>) -> TransportRequest {
        let mut request = TransportRequest::post(&self.reporting_url, Vec::new())
            .header("Content-Type", self.serializer.content_type());
        let payload = if self.gzip_report {
            match gzip(&body) {
                Ok(compressed) => {
                    request = request.header("Content-Encoding", "gzip");
                    compressed
                }
                Err(err) => {
                    tracing::warn!("flusher: gzip failed, sending uncompressed: {err}");
                    body
                }
            }
        } else {
            body
        };
        request = request.header("Content-Length", payload.len().to_string());
        request.body = payload;
        request
    }

    fn canceled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Sleep in short slices so cancellation interrupts a long backoff.
    /// Returns false when canceled.
    fn pause(&self, total: Duration) -> bool {
        let slice = Duration::from_millis(50);
        let mut remaining = total;
        while !remaining.is_zero() {
            if self.canceled() {
                return false;
            }
            let step = remaining.min(slice);
            std::thread::sleep(step);
            remaining -= step;
        }
        !self.canceled()
    }
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    encoder.finish()
}
