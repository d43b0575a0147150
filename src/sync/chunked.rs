//! Chunked sync: the delta result set sliced into fixed-size, order-stable
//! pages so large backlogs survive flaky connections.
//!
//! Ordering is the chunk-boundary contract: user object first, then bookings
//! and services each sorted by `(created_at, id)`. For unchanged underlying
//! data, chunk N always holds the same entities, so a client can resume at
//! any index after a crash and concatenating every chunk reproduces the
//! unchunked delta exactly once per entity.

use chrono::{DateTime, Utc};

use crate::error::{SyncError, SyncResult};
use crate::models::{ChunkedSyncRequest, ChunkedSyncResponse, SyncEntity, SyncMetrics};
use crate::store::StorageEngine;
use crate::sync::checkpoint::CheckpointManager;
use crate::sync::estimate_payload_size;

#[derive(Clone)]
pub struct ChunkedSyncService {
    engine: StorageEngine,
}

impl ChunkedSyncService {
    pub fn new(engine: StorageEngine) -> Self {
        Self { engine }
    }

    pub fn sync(&self, req: &ChunkedSyncRequest) -> SyncResult<ChunkedSyncResponse> {
        let started = std::time::Instant::now();

        if req.chunk_size <= 0 {
            return Err(SyncError::InvalidArgument(format!(
                "chunk_size must be > 0, got {}",
                req.chunk_size
            )));
        }
        if req.chunk_index < 0 {
            return Err(SyncError::InvalidArgument(format!(
                "chunk_index must be >= 0, got {}",
                req.chunk_index
            )));
        }

        let since = req.since.unwrap_or(DateTime::<Utc>::MIN_UTC);
        let all = self.ordered_delta(req.user_id, since)?;

        let total = all.len() as i64;
        let total_chunks = if total == 0 {
            0
        } else {
            (total - 1) / req.chunk_size + 1
        };

        // A multiply that overflows can only come from an index far past the
        // end of the data, so it degrades to the same empty chunk an
        // in-range but too-large index produces.
        let start = req
            .chunk_index
            .checked_mul(req.chunk_size)
            .and_then(|s| usize::try_from(s).ok());
        let data: Vec<SyncEntity> = match start {
            Some(start) if start < all.len() => {
                let end = start.saturating_add(req.chunk_size as usize).min(all.len());
                all[start..end].to_vec()
            }
            _ => Vec::new(),
        };

        let has_more = req.chunk_index < total_chunks - 1;
        let next_chunk = if has_more {
            req.chunk_index + 1
        } else {
            req.chunk_index
        };

        let records_count = data.len();
        let data_size = estimate_payload_size(records_count);
        let now = Utc::now();

        self.engine.put_metrics(&SyncMetrics {
            id: uuid::Uuid::new_v4(),
            user_id: req.user_id,
            sync_duration_ms: started.elapsed().as_millis() as u64,
            records_count,
            data_size,
            created_at: now,
        })?;

        tracing::debug!(
            user_id = %req.user_id,
            chunk = req.chunk_index,
            of = total_chunks,
            records = records_count,
            "chunked sync page served"
        );

        Ok(ChunkedSyncResponse {
            data,
            has_more,
            next_chunk,
            // Deterministic: a crashed client resumes at next_chunk without
            // refetching earlier pages
            resume_token: resume_token(next_chunk),
            total_chunks,
            checkpoint: CheckpointManager::issue_token(now),
            compressed: false,
            data_size,
            records_count,
        })
    }

    /// The stable full ordering all chunk boundaries are cut from.
    fn ordered_delta(
        &self,
        user_id: uuid::Uuid,
        since: DateTime<Utc>,
    ) -> SyncResult<Vec<SyncEntity>> {
        let user = self.engine.require_user(user_id)?;

        let mut bookings: Vec<_> = self
            .engine
            .bookings_for_customer(user_id)?
            .into_iter()
            .filter(|b| b.last_sync_at > since)
            .collect();
        bookings.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));

        let mut services: Vec<_> = self
            .engine
            .services_for_provider(user_id)?
            .into_iter()
            .filter(|s| s.last_sync_at > since)
            .collect();
        services.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));

        let mut all = Vec::with_capacity(1 + bookings.len() + services.len());
        all.push(SyncEntity::User(user));
        all.extend(bookings.into_iter().map(SyncEntity::Booking));
        all.extend(services.into_iter().map(SyncEntity::Service));
        Ok(all)
    }
}

fn resume_token(next_chunk: i64) -> String {
    format!("resume_{}", next_chunk)
}
