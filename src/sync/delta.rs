//! Delta sync: everything a user's client is missing since its checkpoint,
//! returned as one atomic payload with size/record/duration metadata.

use chrono::Utc;

use crate::error::{SyncError, SyncResult};
use crate::models::{SyncData, SyncMetrics, SyncRequest, SyncResponse, SyncStatus};
use crate::store::StorageEngine;
use crate::sync::checkpoint::CheckpointManager;
use crate::sync::{estimate_payload_size, Deadline};

#[derive(Clone)]
pub struct DeltaSyncService {
    engine: StorageEngine,
}

impl DeltaSyncService {
    pub fn new(engine: StorageEngine) -> Self {
        Self { engine }
    }

    /// Compute the delta set for `req.user_id` since `req.last_sync_at`.
    ///
    /// The user object is always part of the payload; bookings and services
    /// are included only when their `last_sync_at` is strictly newer than
    /// the request's. Zero changes is a valid, well-formed empty response.
    /// On deadline expiry nothing is written, so the same request replayed
    /// produces the identical delta.
    pub fn sync(&self, req: &SyncRequest, deadline: Deadline) -> SyncResult<SyncResponse> {
        let started = std::time::Instant::now();

        let user = self.engine.require_user(req.user_id)?;
        if deadline.expired() {
            return Err(SyncError::Timeout("delta sync: user scan".into()));
        }

        let bookings: Vec<_> = self
            .engine
            .bookings_for_customer(req.user_id)?
            .into_iter()
            .filter(|b| b.last_sync_at > req.last_sync_at)
            .collect();
        if deadline.expired() {
            return Err(SyncError::Timeout("delta sync: booking scan".into()));
        }

        let services: Vec<_> = self
            .engine
            .services_for_provider(req.user_id)?
            .into_iter()
            .filter(|s| s.last_sync_at > req.last_sync_at)
            .collect();
        if deadline.expired() {
            return Err(SyncError::Timeout("delta sync: service scan".into()));
        }

        // Per-collection records plus one for the user object itself
        let records_count = bookings.len() + services.len() + 1;
        let data_size = estimate_payload_size(records_count);
        let now = Utc::now();
        let sync_duration_ms = started.elapsed().as_millis() as u64;

        self.record_success(req, records_count, data_size, sync_duration_ms)?;

        tracing::info!(
            user_id = %req.user_id,
            records = records_count,
            bookings = bookings.len(),
            services = services.len(),
            duration_ms = sync_duration_ms,
            "delta sync completed"
        );

        Ok(SyncResponse {
            data: SyncData {
                user: Some(user),
                bookings,
                services,
            },
            checkpoint: CheckpointManager::issue_token(now),
            last_sync_at: now,
            // Full-result semantics on this path; large sets go chunked
            has_more: false,
            compressed: req.compression,
            data_size,
            records_count,
            sync_duration_ms,
        })
    }

    fn record_success(
        &self,
        req: &SyncRequest,
        records_count: usize,
        data_size: i64,
        sync_duration_ms: u64,
    ) -> SyncResult<()> {
        let now = Utc::now();
        self.engine.put_metrics(&SyncMetrics {
            id: uuid::Uuid::new_v4(),
            user_id: req.user_id,
            sync_duration_ms,
            records_count,
            data_size,
            created_at: now,
        })?;

        let mut status = self
            .engine
            .get_sync_status(req.user_id)?
            .unwrap_or_else(|| SyncStatus::initial(req.user_id, now));
        status.last_sync_at = now;
        status.updated_at = now;
        self.engine.put_sync_status(&status)
    }
}
