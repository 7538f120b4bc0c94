use crate::beacon::BeaconRecord;
use crate::errors::AgentResult;

/// Wire encoding of a beacon batch. The delivery engine treats the output as
/// opaque bytes; the concrete format lives with the serializer implementation.
pub trait IBeaconSerializer: Send + Sync {
    fn serialize(&self, records: &[BeaconRecord]) -> AgentResult<Vec<u8>>;

    fn content_type(&self) -> &'static str {
        "text/plain"
    }
}
