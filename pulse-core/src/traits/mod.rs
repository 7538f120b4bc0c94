//! Collaborator interfaces consumed by the delivery core. The platform
//! integration (or a test double) provides the implementations.

mod serializer;
mod signals;
mod store;
mod transport;

pub use serializer::IBeaconSerializer;
pub use signals::{ConnectionType, INetworkInfo, IPowerInfo, SharedSignals};
pub use store::{IBeaconStore, NoopStore};
pub use transport::{ITransport, TransportError, TransportRequest};
