//! Beacon delivery engine: admission control (rate limiting, dedup,
//! capacity), a crash-durable queue, debounced flush scheduling, and batched
//! HTTP submission with retry and backoff.

pub mod flusher;
pub mod marker;
pub mod queue;
pub mod rate_limiter;
pub mod reporter;
pub mod store;
pub mod transport;
pub mod wire;

pub use flusher::{BeaconFlusher, FlushOutcome};
pub use marker::HttpMarker;
pub use queue::BeaconQueue;
pub use rate_limiter::RateLimiter;
pub use reporter::{Admission, Reporter, ReporterContext};
pub use store::FileStore;
pub use transport::HttpTransport;
pub use wire::WireSerializer;
