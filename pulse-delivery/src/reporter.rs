//! Reporter — the serialized owner of the queue, rate limiter, and flush
//! scheduler. All mutation happens on one worker thread fed by a command
//! channel; flush attempts run on short-lived background threads and report
//! back through the same channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use pulse_core::beacon::BeaconId;
use pulse_core::beacon::BeaconRecord;
use pulse_core::config::{AgentConfig, SuspendCondition};
use pulse_core::errors::DeliveryError;
use pulse_core::now_millis;
use pulse_core::traits::{
    ConnectionType, IBeaconSerializer, IBeaconStore, INetworkInfo, IPowerInfo, ITransport,
};

use crate::flusher::{BeaconFlusher, FlushOutcome};
use crate::queue::BeaconQueue;
use crate::rate_limiter::RateLimiter;

/// What happened to a submitted beacon at admission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Queued,
    RateLimited,
    QueueFull,
}

pub type SubmitCallback = Box<dyn FnOnce(Admission) + Send>;
pub type FlushObserver = Box<dyn Fn(&FlushOutcome) + Send>;

type BackoffOverride = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

enum Command {
    Submit {
        record: BeaconRecord,
        callback: Option<SubmitCallback>,
    },
    SetView(Option<String>),
    ScheduleFlush,
    BackgroundFlush,
    NetworkChanged,
    FlushFinished(u64, Option<FlushOutcome>),
    PurgeOld,
    Shutdown,
}

/// Everything the worker needs from the host: config plus the platform
/// collaborators behind trait objects.
pub struct ReporterContext {
    pub config: AgentConfig,
    pub transport: Arc<dyn ITransport>,
    pub serializer: Arc<dyn IBeaconSerializer>,
    pub store: Arc<dyn IBeaconStore>,
    pub network: Arc<dyn INetworkInfo>,
    pub power: Arc<dyn IPowerInfo>,
}

/// Handle to the reporter worker thread. Cloneable command surface; dropping
/// the last handle-owning value shuts the worker down and cancels any
/// in-flight flush.
pub struct Reporter {
    commands: Sender<Command>,
    observers: Arc<Mutex<Vec<FlushObserver>>>,
    worker: Option<JoinHandle<()>>,
}

impl Reporter {
    pub fn new(context: ReporterContext) -> Self {
        Self::spawn(context, None)
    }

    /// Like [`Reporter::new`] but with a custom retry-delay policy, so tests
    /// exercising retries do not wait out real backoff.
    pub fn with_backoff(
        context: ReporterContext,
        backoff: impl Fn(u32) -> Duration + Send + Sync + 'static,
    ) -> Self {
        Self::spawn(context, Some(Arc::new(backoff)))
    }

    fn spawn(context: ReporterContext, backoff: Option<BackoffOverride>) -> Self {
        let (commands, inbox) = mpsc::channel();
        let observers: Arc<Mutex<Vec<FlushObserver>>> = Arc::new(Mutex::new(Vec::new()));
        let loopback = commands.clone();
        let worker_observers = Arc::clone(&observers);
        let worker = thread::Builder::new()
            .name("pulse-reporter".into())
            .spawn(move || {
                Worker::new(context, inbox, loopback, worker_observers, backoff).run();
            })
            .ok();
        if worker.is_none() {
            tracing::error!("reporter: worker thread failed to start, beacons will be dropped");
        }
        Self {
            commands,
            observers,
            worker,
        }
    }

    /// Submit a beacon for delivery. Admission (rate limiting, capacity,
    /// dedup) happens asynchronously on the worker.
    pub fn submit(&self, record: BeaconRecord) {
        self.send(Command::Submit {
            record,
            callback: None,
        });
    }

    /// Submit with an admission callback, invoked once from the worker.
    pub fn submit_with(&self, record: BeaconRecord, callback: impl FnOnce(Admission) + Send + 'static) {
        self.send(Command::Submit {
            record,
            callback: Some(Box::new(callback)),
        });
    }

    /// Update the view name used to resolve deferred-view beacons.
    pub fn set_view(&self, view: Option<String>) {
        self.send(Command::SetView(view));
    }

    /// Ask for a flush; debouncing and gating are applied by the worker.
    pub fn schedule_flush(&self) {
        self.send(Command::ScheduleFlush);
    }

    /// Best-effort immediate flush with no debounce, for the moment the app
    /// moves to the background and a pending debounce would outlive the
    /// process. Connectivity and battery gating still apply.
    pub fn run_background_flush(&self) {
        self.send(Command::BackgroundFlush);
    }

    /// Notify that connectivity changed (the host updates its
    /// [`INetworkInfo`] first, then calls this).
    pub fn network_changed(&self) {
        self.send(Command::NetworkChanged);
    }

    /// Drop queued records outside the sane age window.
    pub fn purge_old_records(&self) {
        self.send(Command::PurgeOld);
    }

    /// Register an observer invoked after every completed flush attempt and
    /// on gated (offline / no-wifi) rejections.
    pub fn on_flush(&self, observer: impl Fn(&FlushOutcome) + Send + 'static) {
        if let Ok(mut observers) = self.observers.lock() {
            observers.push(Box::new(observer));
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::warn!("reporter: worker is gone, command dropped");
        }
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// An in-flight flush attempt. Identified by an epoch so a late completion
/// from a watchdog-canceled attempt cannot reconcile into a newer one.
struct Flight {
    epoch: u64,
    started: Instant,
    cancel: Arc<AtomicBool>,
}

struct Worker {
    config: AgentConfig,
    queue: BeaconQueue,
    limiter: RateLimiter,
    transport: Arc<dyn ITransport>,
    serializer: Arc<dyn IBeaconSerializer>,
    network: Arc<dyn INetworkInfo>,
    power: Arc<dyn IPowerInfo>,
    inbox: Receiver<Command>,
    loopback: Sender<Command>,
    observers: Arc<Mutex<Vec<FlushObserver>>>,
    backoff: Option<BackoffOverride>,
    view_name: Option<String>,
    /// Buffer for beacons arriving inside the startup grace window.
    pre_queue: Vec<(BeaconRecord, Option<SubmitCallback>)>,
    pre_queue_until: Instant,
    /// Charged failed-flush counts per retained beacon.
    resend_counts: HashMap<BeaconId, u32>,
    /// Armed debounce deadline; earliest-wins, never pushed back by later
    /// submits.
    armed: Option<Instant>,
    flight: Option<Flight>,
    next_epoch: u64,
}

impl Worker {
    fn new(
        context: ReporterContext,
        inbox: Receiver<Command>,
        loopback: Sender<Command>,
        observers: Arc<Mutex<Vec<FlushObserver>>>,
        backoff: Option<BackoffOverride>,
    ) -> Self {
        let ReporterContext {
            config,
            transport,
            serializer,
            store,
            network,
            power,
        } = context;
        let queue = BeaconQueue::new(config.max_queue_size, store);
        let limiter = RateLimiter::new(&config.rate_limits);
        let pre_queue_until = Instant::now() + Duration::from_millis(config.pre_queue_usage_ms);
        Self {
            config,
            queue,
            limiter,
            transport,
            serializer,
            network,
            power,
            inbox,
            loopback,
            observers,
            backoff,
            view_name: None,
            pre_queue: Vec::new(),
            pre_queue_until,
            resend_counts: HashMap::new(),
            armed: None,
            flight: None,
            next_epoch: 0,
        }
    }

    fn run(&mut self) {
        if !self.queue.is_empty() {
            tracing::info!("reporter: restored {} persisted beacons", self.queue.len());
            self.schedule_flush();
        }
        loop {
            let command = match self.next_deadline() {
                Some(deadline) => {
                    let timeout = deadline.saturating_duration_since(Instant::now());
                    match self.inbox.recv_timeout(timeout) {
                        Ok(command) => Some(command),
                        Err(RecvTimeoutError::Timeout) => None,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match self.inbox.recv() {
                    Ok(command) => Some(command),
                    Err(_) => break,
                },
            };
            if let Some(command) = command {
                if !self.handle(command) {
                    break;
                }
            }
            self.fire_deadlines();
        }
        if let Some(flight) = self.flight.take() {
            flight.cancel.store(true, Ordering::Release);
        }
    }

    /// Returns `false` on shutdown.
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Submit { record, callback } => {
                if Instant::now() < self.pre_queue_until {
                    self.pre_queue.push((record, callback));
                } else {
                    let admission = self.admit(record, callback);
                    if admission == Admission::Queued {
                        self.schedule_flush();
                    }
                }
            }
            Command::SetView(view) => self.view_name = view,
            Command::ScheduleFlush => self.schedule_flush(),
            Command::BackgroundFlush => self.schedule_flush_in(Duration::ZERO),
            Command::NetworkChanged => {
                let connection = self.network.connection_type();
                tracing::debug!("reporter: connection changed to {connection}");
                if connection != ConnectionType::None && !self.queue.is_empty() {
                    self.schedule_flush();
                }
            }
            Command::FlushFinished(epoch, outcome) => self.finish_flight(epoch, outcome),
            Command::PurgeOld => {
                self.queue.purge_old(now_millis());
            }
            Command::Shutdown => return false,
        }
        true
    }

    /// Run admission control and enqueue. Invokes the callback exactly once.
    fn admit(&mut self, mut record: BeaconRecord, callback: Option<SubmitCallback>) -> Admission {
        // unset and deferred views both pick up the currently visible one
        record.resolve_view(self.view_name.as_deref());
        let category = record.category();
        let admission = if !self.limiter.can_submit(category, now_millis()) {
            tracing::debug!("reporter: rate limit exceeded, {category:?} beacon discarded");
            Admission::RateLimited
        } else if self.queue.add(record) {
            Admission::Queued
        } else {
            Admission::QueueFull
        };
        if let Some(callback) = callback {
            callback(admission);
        }
        admission
    }

    /// Gate and arm the debounce timer. Called on submit, on explicit flush
    /// requests, and when connectivity returns.
    fn schedule_flush(&mut self) {
        let delay = self.flush_delay();
        self.schedule_flush_in(delay);
    }

    fn schedule_flush_in(&mut self, delay: Duration) {
        if self.queue.is_empty() {
            return;
        }
        if let Some(flight) = &self.flight {
            if flight.started.elapsed()
                < Duration::from_millis(self.config.max_flush_duration_ms)
            {
                return;
            }
            tracing::warn!("reporter: flush exceeded the watchdog window, canceling it");
            flight.cancel.store(true, Ordering::Release);
            self.flight = None;
        }
        match self.network.connection_type() {
            ConnectionType::None => {
                tracing::debug!("reporter: offline, {} beacons retained", self.queue.len());
                self.notify(&FlushOutcome::rejected(DeliveryError::Offline));
                return;
            }
            ConnectionType::Cellular
                if self.config.suspends_on(SuspendCondition::CellularConnection) =>
            {
                tracing::debug!("reporter: cellular connection, reporting suspended");
                self.notify(&FlushOutcome::rejected(DeliveryError::NoWifiAvailable));
                return;
            }
            _ => {}
        }
        if self.config.suspends_on(SuspendCondition::LowBattery)
            && !self.power.battery_safe_for_networking()
        {
            tracing::debug!("reporter: battery low, reporting suspended");
            self.notify(&FlushOutcome::rejected(DeliveryError::LowBattery));
            return;
        }
        let deadline = Instant::now() + delay;
        self.armed = Some(match self.armed {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
    }

    /// Debounce for the next flush: the low-battery debounce while the
    /// battery is unsafe (the suspend flag separately gates flushing
    /// entirely), shortened as the queue fills (half at 50% occupancy,
    /// immediate at 80%).
    fn flush_delay(&self) -> Duration {
        let base = if self.power.battery_safe_for_networking() {
            self.config.send_debounce_ms
        } else {
            self.config.low_battery_debounce_ms
        };
        let occupancy = self.queue.len() as f64 / self.queue.max_items().max(1) as f64;
        let delay_ms = if occupancy >= 0.8 {
            0
        } else if occupancy >= 0.5 {
            base / 2
        } else {
            base
        };
        Duration::from_millis(delay_ms)
    }

    fn next_deadline(&self) -> Option<Instant> {
        let mut deadline = self.armed;
        if !self.pre_queue.is_empty() {
            deadline = Some(match deadline {
                Some(existing) => existing.min(self.pre_queue_until),
                None => self.pre_queue_until,
            });
        }
        deadline
    }

    fn fire_deadlines(&mut self) {
        let now = Instant::now();
        if !self.pre_queue.is_empty() && now >= self.pre_queue_until {
            self.drain_pre_queue();
        }
        if self.armed.is_some_and(|deadline| now >= deadline) {
            self.start_flight();
        }
    }

    fn drain_pre_queue(&mut self) {
        let buffered = std::mem::take(&mut self.pre_queue);
        tracing::debug!("reporter: draining {} pre-queued beacons", buffered.len());
        let mut any_queued = false;
        for (record, callback) in buffered {
            any_queued |= self.admit(record, callback) == Admission::Queued;
        }
        if any_queued {
            self.schedule_flush();
        }
    }

    /// Hand the current queue snapshot to a flusher on its own thread.
    fn start_flight(&mut self) {
        self.armed = None;
        if self.flight.is_some() {
            return;
        }
        let items = self.queue.snapshot();
        if items.is_empty() {
            return;
        }
        let cancel = Arc::new(AtomicBool::new(false));
        let mut flusher = BeaconFlusher::new(
            &self.config,
            Arc::clone(&self.transport),
            Arc::clone(&self.serializer),
            Arc::clone(&cancel),
        );
        if let Some(backoff) = &self.backoff {
            let backoff = Arc::clone(backoff);
            flusher = flusher.with_backoff(move |step| backoff(step));
        }
        self.next_epoch += 1;
        let epoch = self.next_epoch;
        let loopback = self.loopback.clone();
        tracing::debug!("reporter: flushing {} beacons", items.len());
        let spawned = thread::Builder::new()
            .name("pulse-flusher".into())
            .spawn(move || {
                let outcome = flusher.run(items);
                let _ = loopback.send(Command::FlushFinished(epoch, outcome));
            });
        match spawned {
            Ok(_) => {
                self.flight = Some(Flight {
                    epoch,
                    started: Instant::now(),
                    cancel,
                });
            }
            Err(err) => tracing::error!("reporter: spawning the flusher failed: {err}"),
        }
    }

    /// Reconcile the queue with a completed flush attempt.
    fn finish_flight(&mut self, epoch: u64, outcome: Option<FlushOutcome>) {
        let current = self.flight.as_ref().is_some_and(|f| f.epoch == epoch);
        if !current {
            return; // late completion of a canceled attempt
        }
        self.flight = None;
        let Some(outcome) = outcome else {
            return;
        };
        if !outcome.sent.is_empty() {
            self.queue.remove_matching(&outcome.sent);
            for id in &outcome.sent {
                self.resend_counts.remove(id);
            }
        }
        if outcome.attempts >= 1 && !outcome.failed.is_empty() {
            self.charge_resend_budget(&outcome.failed);
        }
        tracing::info!(
            "reporter: flush finished, {} sent, {} failed, {} attempts",
            outcome.sent.len(),
            outcome.failed.len(),
            outcome.attempts
        );
        self.notify(&outcome);
        // a rejected attempt (attempts == 0) made no network call; re-arming
        // here would spin, so the retained queue waits for the next submit or
        // external signal
        if outcome.attempts >= 1 && !self.queue.is_empty() {
            self.schedule_flush();
        }
    }

    /// Each retained-after-failure beacon carries a count of the flushes it
    /// failed; beyond the configured budget it is dropped for good.
    fn charge_resend_budget(&mut self, failed: &[BeaconId]) {
        let budget = self.config.max_beacon_resend_tries.unwrap_or(0);
        let mut dropped = Vec::new();
        for id in failed {
            let count = self.resend_counts.entry(id.clone()).or_insert(0);
            *count += 1;
            if *count > budget {
                dropped.push(id.clone());
            }
        }
        if !dropped.is_empty() {
            tracing::warn!(
                "reporter: dropping {} beacons with an exhausted resend budget",
                dropped.len()
            );
            for id in &dropped {
                self.resend_counts.remove(id);
            }
            self.queue.remove_matching(&dropped);
        }
    }

    fn notify(&self, outcome: &FlushOutcome) {
        if let Ok(observers) = self.observers.lock() {
            for observer in observers.iter() {
                observer(outcome);
            }
        }
    }
}
