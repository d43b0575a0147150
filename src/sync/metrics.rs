//! Append-only history of completed sync operations, read by monitoring
//! and the client's diagnostics screen. Entries are never mutated or
//! deleted here; retention is an external policy.

use chrono::Utc;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::models::SyncMetrics;
use crate::store::StorageEngine;

#[derive(Clone)]
pub struct MetricsRecorder {
    engine: StorageEngine,
}

impl MetricsRecorder {
    pub fn new(engine: StorageEngine) -> Self {
        Self { engine }
    }

    pub fn record(
        &self,
        user_id: Uuid,
        sync_duration_ms: u64,
        records_count: usize,
        data_size: i64,
    ) -> SyncResult<SyncMetrics> {
        let entry = SyncMetrics {
            id: Uuid::new_v4(),
            user_id,
            sync_duration_ms,
            records_count,
            data_size,
            created_at: Utc::now(),
        };
        self.engine.put_metrics(&entry)?;
        Ok(entry)
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, user_id: Uuid, limit: usize) -> SyncResult<Vec<SyncMetrics>> {
        if limit == 0 {
            return Err(SyncError::InvalidArgument("limit must be > 0".into()));
        }
        let mut entries = self.engine.metrics_for_user(user_id)?;
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit);
        Ok(entries)
    }
}
