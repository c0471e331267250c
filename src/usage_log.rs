// Usage Log: start/stop intervals per machine, queryable by filter

use crate::error::Result;
use crate::filter::{Page, PageRequest, UsageFilter};
use crate::machine::{Machine, MachineKey};
use crate::store::UsageStore;
use crate::usage::{StopOutcome, UsageRecord};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct UsageLog {
    store: Arc<dyn UsageStore>,
}

impl UsageLog {
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        UsageLog { store }
    }

    /// Open a record for `machine`, started at its `last_started_at`.
    pub async fn record_start(&self, machine: &Machine) -> Result<UsageRecord> {
        let record = UsageRecord::open(machine, machine.last_started_at);
        self.append_open(&record).await?;
        Ok(record)
    }

    /// Store an already built open record. A stale open record of the same
    /// machine is closed at the new start time first. Appending the same
    /// record twice stores it once.
    pub async fn append_open(&self, record: &UsageRecord) -> Result<()> {
        if let Some(stale) = self.store.latest_open_usage(record.key()).await? {
            if stale.id != record.id {
                let stopped_at = record.started_at.max(stale.started_at);
                self.store.close_usage(stale.id, stopped_at).await?;
                info!(machine = %record.key(), record = %stale.id, "closed stale usage record");
            }
        }

        if self.store.append_usage(record).await? {
            debug!(machine = %record.key(), record = %record.id, "usage record opened");
        } else {
            debug!(record = %record.id, "usage record already stored");
        }
        Ok(())
    }

    /// Finalize the most recent open record of the machine.
    pub async fn record_stop(
        &self,
        key: MachineKey,
        stopped_at: DateTime<Utc>,
    ) -> Result<StopOutcome> {
        let open = match self.store.latest_open_usage(key).await? {
            Some(open) => open,
            None => {
                warn!(machine = %key, "stop without an open usage record");
                return Ok(StopOutcome::NoOpenRecord(key));
            }
        };

        // Clock skew between start and stop never produces a negative interval
        let stopped_at = stopped_at.max(open.started_at);

        match self.store.close_usage(open.id, stopped_at).await? {
            Some(record) => {
                debug!(machine = %key, record = %record.id, "usage record closed");
                Ok(StopOutcome::Finalized(record))
            }
            None => {
                warn!(machine = %key, record = %open.id, "usage record closed concurrently");
                Ok(StopOutcome::NoOpenRecord(key))
            }
        }
    }

    pub async fn find(&self, filter: &UsageFilter, page: PageRequest) -> Result<Page<UsageRecord>> {
        self.store.find_usage(filter, page).await
    }
}
