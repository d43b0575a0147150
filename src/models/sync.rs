//! Sync protocol data shapes: checkpoints, requests/responses, status rows
//! and metrics. Field names match the mobile client's wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::SyncEntity;

/// Opaque per-user marker of the last acknowledged synchronization point.
/// One row per user, overwritten on each successful full sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub user_id: Uuid,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncRequest {
    pub user_id: Uuid,
    pub last_sync_at: DateTime<Utc>,
    #[serde(default)]
    pub compression: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub data: SyncData,
    pub checkpoint: String,
    pub last_sync_at: DateTime<Utc>,
    pub has_more: bool,
    pub compressed: bool,
    pub data_size: i64,
    pub records_count: usize,
    pub sync_duration_ms: u64,
}

/// The delta payload, grouped per collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncData {
    pub user: Option<crate::models::User>,
    pub bookings: Vec<crate::models::Booking>,
    pub services: Vec<crate::models::Service>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkedSyncRequest {
    pub user_id: Uuid,
    pub chunk_index: i64,
    pub chunk_size: i64,
    /// Delta filter; defaults to the epoch (full resync).
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkedSyncResponse {
    pub data: Vec<SyncEntity>,
    pub has_more: bool,
    pub next_chunk: i64,
    pub resume_token: String,
    pub total_chunks: i64,
    pub checkpoint: String,
    pub compressed: bool,
    pub data_size: i64,
    pub records_count: usize,
}

/// Live connectivity row, one per user, replaced on every update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub user_id: Uuid,
    pub is_online: bool,
    pub last_sync_at: DateTime<Utc>,
    pub pending_changes: usize,
    pub sync_in_progress: bool,
    pub connection_type: String,
    pub connection_speed: String,
    pub updated_at: DateTime<Utc>,
}

impl SyncStatus {
    pub fn initial(user_id: Uuid, last_sync_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            is_online: true,
            last_sync_at,
            pending_changes: 0,
            sync_in_progress: false,
            connection_type: "unknown".to_string(),
            connection_speed: "unknown".to_string(),
            updated_at: Utc::now(),
        }
    }
}

/// Aggregate queue-health row read by the background scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackgroundSyncStatus {
    pub user_id: Uuid,
    pub is_enabled: bool,
    pub last_sync_at: DateTime<Utc>,
    pub pending_items: usize,
    pub failed_items: usize,
    pub conflict_items: usize,
    pub auto_retry_enabled: bool,
    pub next_scheduled_run: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BackgroundSyncStatus {
    /// Defaults for a user seen for the first time: enabled, auto-retry on,
    /// next run five minutes out, zeroed counters.
    pub fn initial(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            is_enabled: true,
            last_sync_at: now,
            pending_items: 0,
            failed_items: 0,
            conflict_items: 0,
            auto_retry_enabled: true,
            next_scheduled_run: now + chrono::Duration::minutes(5),
            updated_at: now,
        }
    }
}

/// Append-only record of one completed sync operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMetrics {
    pub id: Uuid,
    pub user_id: Uuid,
    pub sync_duration_ms: u64,
    pub records_count: usize,
    pub data_size: i64,
    pub created_at: DateTime<Utc>,
}
