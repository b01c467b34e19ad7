//! Writing a run's outcome back onto its connection.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::connection::{SyncRecord, SyncStatus};
use crate::error::StoreError;
use crate::store::ConnectionStore;

/// Source of "now" for sync timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub struct StatusRecorder {
    connections: Arc<dyn ConnectionStore>,
    clock: Arc<dyn Clock>,
}

impl StatusRecorder {
    pub fn new(connections: Arc<dyn ConnectionStore>, clock: Arc<dyn Clock>) -> Self {
        StatusRecorder { connections, clock }
    }

    /// The record for a run that imported `imported` appointments and
    /// produced `errors`.
    pub fn record_for(&self, imported: u32, errors: &[String]) -> SyncRecord {
        let (status, error) = if errors.is_empty() {
            (SyncStatus::Success, None)
        } else {
            (SyncStatus::Error, Some(errors.join("; ")))
        };

        SyncRecord {
            synced_at: self.clock.now(),
            status,
            error,
            imported: u64::from(imported),
        }
    }

    /// Persist the outcome of a run on the connection.
    pub async fn record(
        &self,
        connection_id: &str,
        imported: u32,
        errors: &[String],
    ) -> Result<SyncRecord, StoreError> {
        let record = self.record_for(imported, errors);
        self.connections.record_sync(connection_id, &record).await?;

        info!(
            connection_id,
            status = %record.status,
            imported = record.imported,
            "recorded sync status"
        );
        Ok(record)
    }
}
