//! Per-user sync status rows.
//!
//! `SyncStatus` is the live connectivity row the mobile client reports and
//! reads back. `BackgroundSyncStatus` is the aggregate the background
//! scheduler consults; its queue counters are recomputed from the live
//! queue on every read so the row always reflects current health. Neither
//! runs a scheduler itself.

use chrono::Utc;
use uuid::Uuid;

use crate::error::SyncResult;
use crate::models::{BackgroundSyncStatus, QueueItemStatus, QueueItemType, SyncStatus};
use crate::store::StorageEngine;

#[derive(Clone)]
pub struct StatusTracker {
    engine: StorageEngine,
}

impl StatusTracker {
    pub fn new(engine: StorageEngine) -> Self {
        Self { engine }
    }

    /// Live status row; lazily created on first read.
    pub fn sync_status(&self, user_id: Uuid) -> SyncResult<SyncStatus> {
        if let Some(status) = self.engine.get_sync_status(user_id)? {
            return Ok(status);
        }
        let user = self.engine.require_user(user_id)?;
        let mut status = SyncStatus::initial(user_id, user.last_sync_at);
        status.is_online = !user.is_offline;
        self.engine.put_sync_status(&status)?;
        Ok(status)
    }

    pub fn update_sync_status(&self, mut status: SyncStatus) -> SyncResult<SyncStatus> {
        status.updated_at = Utc::now();
        self.engine.put_sync_status(&status)?;
        Ok(status)
    }

    /// Background status with queue counters refreshed from the queue.
    pub fn background_status(&self, user_id: Uuid) -> SyncResult<BackgroundSyncStatus> {
        let mut status = match self.engine.get_background_status(user_id)? {
            Some(existing) => existing,
            None => {
                let fresh = BackgroundSyncStatus::initial(user_id);
                self.engine.put_background_status(&fresh)?;
                fresh
            }
        };

        let items = self.engine.queue_items_for_user(user_id)?;
        status.pending_items = items
            .iter()
            .filter(|i| i.status == QueueItemStatus::Pending)
            .count();
        status.failed_items = items
            .iter()
            .filter(|i| i.status == QueueItemStatus::Failed)
            .count();
        status.conflict_items = items
            .iter()
            .filter(|i| i.item_type == QueueItemType::Conflict)
            .count();
        Ok(status)
    }

    pub fn update_background_status(
        &self,
        mut status: BackgroundSyncStatus,
    ) -> SyncResult<BackgroundSyncStatus> {
        status.updated_at = Utc::now();
        self.engine.put_background_status(&status)?;
        Ok(status)
    }
}
