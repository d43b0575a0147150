//! Durable, priority-ordered backlog of pending sync operations.
//!
//! Items transition Pending -> InProgress -> {Completed | Failed}; a failed
//! item can be requeued by the external scheduler until its retry budget is
//! spent. Completed items are garbage-collected after a retention window;
//! nothing else is ever deleted by cleanup.

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::models::{QueueItemStatus, QueueItemType, SyncQueueItem};
use crate::store::StorageEngine;

#[derive(Clone)]
pub struct SyncQueue {
    engine: StorageEngine,
}

impl SyncQueue {
    pub fn new(engine: StorageEngine) -> Self {
        Self { engine }
    }

    pub fn enqueue(&self, item: SyncQueueItem) -> SyncResult<SyncQueueItem> {
        self.engine.put_queue_item(&item)?;
        tracing::debug!(
            item_id = %item.id,
            user_id = %item.user_id,
            item_type = ?item.item_type,
            priority = item.priority,
            "queue item enqueued"
        );
        Ok(item)
    }

    pub fn get(&self, item_id: Uuid) -> SyncResult<SyncQueueItem> {
        self.engine
            .get_queue_item(item_id)?
            .ok_or_else(|| SyncError::QueueItemNotFound(item_id.to_string()))
    }

    /// Pending items, most urgent first. Equal priorities drain in arrival
    /// order for fairness.
    pub fn get_pending(&self, user_id: Uuid, limit: usize) -> SyncResult<Vec<SyncQueueItem>> {
        let mut items: Vec<_> = self
            .engine
            .queue_items_for_user(user_id)?
            .into_iter()
            .filter(|i| i.status == QueueItemStatus::Pending)
            .collect();
        items.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });
        items.truncate(limit);
        Ok(items)
    }

    pub fn get_conflicts(&self, user_id: Uuid, limit: usize) -> SyncResult<Vec<SyncQueueItem>> {
        let mut items: Vec<_> = self
            .engine
            .queue_items_for_user(user_id)?
            .into_iter()
            .filter(|i| i.item_type == QueueItemType::Conflict)
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        items.truncate(limit);
        Ok(items)
    }

    pub fn mark_in_progress(&self, item_id: Uuid) -> SyncResult<SyncQueueItem> {
        self.transition(item_id, |item| {
            if item.status != QueueItemStatus::Pending {
                return Err(SyncError::InvalidTransition(format!(
                    "{}: {:?} -> in_progress",
                    item.id, item.status
                )));
            }
            item.status = QueueItemStatus::InProgress;
            Ok(())
        })
    }

    pub fn mark_completed(&self, item_id: Uuid) -> SyncResult<SyncQueueItem> {
        self.transition(item_id, |item| {
            if item.is_terminal() {
                return Err(SyncError::InvalidTransition(format!(
                    "{}: {:?} -> completed",
                    item.id, item.status
                )));
            }
            item.status = QueueItemStatus::Completed;
            item.completed_at = Some(Utc::now());
            Ok(())
        })
    }

    pub fn mark_failed(&self, item_id: Uuid, error: &str) -> SyncResult<SyncQueueItem> {
        self.transition(item_id, |item| {
            if item.is_terminal() {
                return Err(SyncError::InvalidTransition(format!(
                    "{}: {:?} -> failed",
                    item.id, item.status
                )));
            }
            item.status = QueueItemStatus::Failed;
            item.last_error = Some(error.to_string());
            Ok(())
        })
    }

    /// Requeue a failed item, consuming one retry from its budget.
    pub fn retry(&self, item_id: Uuid) -> SyncResult<SyncQueueItem> {
        self.transition(item_id, |item| {
            if item.status != QueueItemStatus::Failed {
                return Err(SyncError::InvalidTransition(format!(
                    "{}: only failed items can be retried, was {:?}",
                    item.id, item.status
                )));
            }
            if item.retry_count >= item.max_retries {
                return Err(SyncError::InvalidTransition(format!(
                    "{}: retry budget exhausted ({}/{})",
                    item.id, item.retry_count, item.max_retries
                )));
            }
            item.status = QueueItemStatus::Pending;
            item.retry_count += 1;
            Ok(())
        })
    }

    /// Delete Completed items whose `completed_at` is older than the cutoff.
    /// Pending, in-progress and conflict items survive regardless of age.
    pub fn cleanup_completed(&self, older_than: Duration) -> SyncResult<usize> {
        let cutoff = Utc::now() - older_than;
        let mut removed = 0;
        for item in self.engine.all_queue_items()? {
            if item.status == QueueItemStatus::Completed
                && item.completed_at.is_some_and(|t| t < cutoff)
            {
                self.engine.delete_queue_item(item.id)?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(removed, "completed queue items pruned");
        }
        Ok(removed)
    }

    fn transition<F>(&self, item_id: Uuid, apply: F) -> SyncResult<SyncQueueItem>
    where
        F: FnOnce(&mut SyncQueueItem) -> SyncResult<()>,
    {
        let mut item = self.get(item_id)?;
        let _guard = self.engine.user_lock(item.user_id);
        let _held = _guard.lock();

        apply(&mut item)?;
        item.updated_at = Utc::now();
        self.engine.put_queue_item(&item)?;
        Ok(item)
    }
}
