use crate::beacon::{BeaconId, BeaconRecord};
use crate::errors::AgentResult;

/// Durable holding area backing the in-memory queue. Best-effort only: save
/// failures are logged by the caller, never propagated as fatal, and the
/// in-memory state stays authoritative for the current process lifetime.
pub trait IBeaconStore: Send + Sync {
    /// Restore previously persisted records (crash recovery aid).
    fn load(&self) -> AgentResult<Vec<BeaconRecord>>;

    /// Replace the persisted snapshot with the given records.
    fn save(&self, records: &[BeaconRecord]) -> AgentResult<()>;

    /// Append one record to the persisted snapshot.
    fn append_single(&self, record: &BeaconRecord) -> AgentResult<()> {
        let mut records = self.load()?;
        records.push(record.clone());
        self.save(&records)
    }

    /// Drop persisted records matching the given identities.
    fn remove_matching(&self, ids: &[BeaconId]) -> AgentResult<()> {
        let mut records = self.load()?;
        records.retain(|r| !ids.contains(&r.id));
        self.save(&records)
    }
}

/// Discards everything. For tests and for hosts that opt out of persistence.
#[derive(Debug, Default)]
pub struct NoopStore;

impl IBeaconStore for NoopStore {
    fn load(&self) -> AgentResult<Vec<BeaconRecord>> {
        Ok(Vec::new())
    }

    fn save(&self, _records: &[BeaconRecord]) -> AgentResult<()> {
        Ok(())
    }
}
