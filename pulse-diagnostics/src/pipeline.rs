//! Symbolication pipeline: a single guarded background operation that
//! drains the diagnostic file store, turning each payload into a crash
//! beacon. A file is deleted only after its beacon was accepted into the
//! delivery queue, so an interrupted run loses nothing.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dashmap::DashSet;

use pulse_core::beacon::{BeaconKind, BeaconRecord, CrashData};
use pulse_core::constants::{CRASH_PAYLOAD_VERSION, SYMBOLICATION_ROUND_PAUSE_MS};
use pulse_core::errors::DiagnosticError;
use pulse_core::now_millis;
use pulse_delivery::reporter::{Admission, Reporter};

use crate::payload::{BinaryIdentity, DiagnosticPayload};
use crate::store::DiagnosticStore;
use crate::symbolicate::{format_stack_trace, SymbolResolver};

pub struct SymbolicationPipeline {
    inner: Arc<Inner>,
}

struct Inner {
    store: DiagnosticStore,
    reporter: Arc<Reporter>,
    identity: BinaryIdentity,
    resolver: Option<Arc<dyn SymbolResolver>>,
    /// File names handed out in this process, to prevent double-processing.
    processed: DashSet<String>,
    /// One operation at a time; a trigger while set is a no-op.
    running: AtomicBool,
    cancel: AtomicBool,
    round_pause: Duration,
}

impl SymbolicationPipeline {
    /// `resolver` is `None` on hosts without a symbol source; payloads then
    /// always get format-only treatment.
    pub fn new(
        store: DiagnosticStore,
        reporter: Arc<Reporter>,
        identity: BinaryIdentity,
        resolver: Option<Arc<dyn SymbolResolver>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                reporter,
                identity,
                resolver,
                processed: DashSet::new(),
                running: AtomicBool::new(false),
                cancel: AtomicBool::new(false),
                round_pause: Duration::from_millis(SYMBOLICATION_ROUND_PAUSE_MS),
            }),
        }
    }

    /// Shorten the pause between rounds (tests).
    pub fn with_round_pause(mut self, pause: Duration) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.round_pause = pause;
        }
        self
    }

    pub fn store(&self) -> &DiagnosticStore {
        &self.inner.store
    }

    /// Persist freshly delivered payloads and kick off processing. Payloads
    /// outside the crash-relevance window are dropped up front.
    pub fn ingest(&self, payloads: Vec<DiagnosticPayload>) -> Result<(), DiagnosticError> {
        let now = now_millis();
        let relevant: Vec<DiagnosticPayload> = payloads
            .into_iter()
            .filter(|p| {
                let keep = p.is_within_relevance_window(now);
                if !keep {
                    tracing::info!(
                        "diagnostics: crash at {} outside the relevance window, discarded",
                        p.crash_time_ms
                    );
                }
                keep
            })
            .collect();
        if !relevant.is_empty() {
            self.inner.store.save_all(&relevant)?;
        }
        self.trigger();
        Ok(())
    }

    /// Start a processing operation unless one is already active; the active
    /// one will pick up new files on its next loop iteration.
    pub fn trigger(&self) {
        if !self.inner.store.has_files() {
            return;
        }
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("diagnostics: operation already active, trigger ignored");
            return;
        }
        self.inner.cancel.store(false, Ordering::Release);
        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name("pulse-symbolication".into())
            .spawn(move || {
                run(&inner);
                inner.running.store(false, Ordering::Release);
            });
        if spawned.is_err() {
            tracing::error!("diagnostics: operation thread failed to start");
            self.inner.running.store(false, Ordering::Release);
        }
    }

    /// Stop the active operation at the next loop boundary. Files stay on
    /// disk and are retried on the next trigger.
    pub fn cancel(&self) {
        self.inner.cancel.store(true, Ordering::Release);
    }
}

fn run(inner: &Arc<Inner>) {
    let mut round = 0u32;
    let mut empty_rounds = 0u32;
    loop {
        if round > 0 && !inner.pause() {
            return;
        }
        round += 1;
        if inner.canceled() {
            return;
        }
        match inner.store.pick_next(&inner.processed, now_millis()) {
            Some(path) => {
                empty_rounds = 0;
                inner.process(&path);
            }
            None => {
                // one extra round catches a file that was too new to read
                empty_rounds += 1;
                if empty_rounds > 1 || !inner.store.has_files() {
                    return;
                }
            }
        }
    }
}

impl Inner {
    fn canceled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Inter-round sleep, interruptible by cancel. Returns false on cancel.
    fn pause(&self) -> bool {
        let slice = Duration::from_millis(50);
        let mut remaining = self.round_pause;
        while !remaining.is_zero() {
            if self.canceled() {
                return false;
            }
            let step = remaining.min(slice);
            thread::sleep(step);
            remaining -= step;
        }
        !self.canceled()
    }

    fn process(self: &Arc<Self>, path: &Path) {
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => return,
        };
        let payload = match self.store.load(path) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!("diagnostics: {err}, file removed");
                self.store.delete(path);
                self.processed.remove(&name);
                return;
            }
        };

        let symbolicating = self.resolver.is_some() && payload.can_symbolicate(&self.identity);
        tracing::debug!(
            "diagnostics: {} payload {}",
            if symbolicating { "symbolicating" } else { "formatting" },
            path.display()
        );
        let resolver = if symbolicating {
            self.resolver.as_deref()
        } else {
            None
        };
        let stack_trace = match format_stack_trace(&payload, resolver).map(|t| t.to_json()) {
            Some(Ok(json)) => json,
            Some(Err(err)) => {
                tracing::warn!("diagnostics: stack trace for {name} failed to serialize: {err}");
                String::new()
            }
            None => String::new(),
        };
        let symbolicated = symbolicating && !stack_trace.is_empty();
        let record = crash_record(&payload, stack_trace, symbolicated);

        let inner = Arc::clone(self);
        let file = path.to_path_buf();
        self.reporter.submit_with(record, move |admission| {
            if admission == Admission::Queued {
                inner.store.delete(&file);
                // the name can only recur through a fresh timestamped file
                inner.processed.remove(&name);
                tracing::debug!("diagnostics: beacon for {} queued, file removed", file.display());
            } else {
                // name stays claimed: the retained file is not picked again
                // until the next launch, so a full queue cannot cause a
                // resubmit loop
                tracing::warn!(
                    "diagnostics: beacon for {} rejected ({admission:?}), file retained",
                    file.display()
                );
            }
        });
    }
}

fn crash_record(payload: &DiagnosticPayload, stack_trace: String, symbolicated: bool) -> BeaconRecord {
    let mut record = BeaconRecord::with_timestamp(
        payload.crash_time_ms,
        BeaconKind::Crash(CrashData {
            group_id: payload.crash_group_id,
            crash_type: payload.crash_type,
            payload_version: payload
                .payload_version
                .clone()
                .unwrap_or_else(|| CRASH_PAYLOAD_VERSION.to_string()),
            symbolicated,
            stack_trace,
            meta: payload.session_meta(),
        }),
    );
    if let Some(view) = &payload.crash_session.view_name {
        record = record.with_view(view);
    }
    record
}
