//! REST handlers for the sync surface.
//!
//! Authentication happens upstream; by the time a request lands here the
//! gateway has already resolved the bearer token and injected the caller's
//! id as the `X-User-Id` header. These handlers never see credentials.

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::request::Parts,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::models::{
    BackgroundSyncStatus, ChunkedSyncRequest, ChunkedSyncResponse, SyncMetrics, SyncQueueItem,
    SyncRequest, SyncResponse, SyncStatus,
};
use crate::store::StorageEngine;
use crate::sync::{
    CheckpointManager, ChunkedSyncService, ConflictRouter, Deadline, DeltaSyncService,
    EntityMutation, MetricsRecorder, MutationOutcome, StatusTracker, SyncQueue,
};

const DEFAULT_QUERY_LIMIT: usize = 50;

#[derive(Clone)]
pub struct AppState {
    pub engine: StorageEngine,
    pub checkpoints: CheckpointManager,
    pub delta: DeltaSyncService,
    pub chunked: ChunkedSyncService,
    pub queue: SyncQueue,
    pub conflicts: ConflictRouter,
    pub status: StatusTracker,
    pub metrics: MetricsRecorder,
    /// Default per-request time budget for sync scans.
    pub sync_budget: Duration,
}

impl AppState {
    pub fn new(engine: StorageEngine, sync_budget: Duration) -> Self {
        let queue = SyncQueue::new(engine.clone());
        Self {
            checkpoints: CheckpointManager::new(engine.clone()),
            delta: DeltaSyncService::new(engine.clone()),
            chunked: ChunkedSyncService::new(engine.clone()),
            conflicts: ConflictRouter::new(engine.clone(), queue.clone()),
            status: StatusTracker::new(engine.clone()),
            metrics: MetricsRecorder::new(engine.clone()),
            queue,
            engine,
            sync_budget,
        }
    }
}

/// Caller identity resolved by the upstream auth gateway.
#[derive(Debug, Clone, Copy)]
pub struct UserId(pub Uuid);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = SyncError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| SyncError::InvalidArgument("missing X-User-Id header".into()))?;
        let id = Uuid::parse_str(raw)
            .map_err(|_| SyncError::InvalidArgument("malformed X-User-Id header".into()))?;
        Ok(UserId(id))
    }
}

// ==================== Request/Response Types ====================

#[derive(Debug, Deserialize)]
pub struct UnsyncedParams {
    #[serde(deserialize_with = "deserialize_since")]
    pub since: DateTime<Utc>,
    #[serde(default)]
    pub compression: bool,
    /// Per-request override of the server's sync time budget.
    pub timeout_ms: Option<u64>,
}

/// Query-string form decoding turns `+` into a space, so an RFC3339 offset
/// like `2025-05-01T00:00:00+00:00` arrives here as `...T00:00:00 00:00`.
/// Restore the sign before parsing so unencoded timestamps stay valid.
fn parse_since(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let candidate;
    let text = if raw.contains(' ') {
        candidate = raw.replacen(' ', "+", 1);
        candidate.as_str()
    } else {
        raw
    };
    DateTime::parse_from_rfc3339(text).map(|dt| dt.with_timezone(&Utc))
}

fn deserialize_since<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_since(&raw).map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize)]
pub struct ChunkedSyncBody {
    pub chunk_index: i64,
    pub chunk_size: i64,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct SyncUploadRequest {
    /// Checkpoint token from the sync response the client is acknowledging.
    pub checkpoint: String,
    #[serde(default)]
    pub mutations: Vec<EntityMutation>,
}

#[derive(Debug, Serialize)]
pub struct SyncUploadResponse {
    pub results: Vec<MutationOutcome>,
    pub applied: usize,
    pub conflicts: usize,
    pub failed: usize,
    pub checkpoint: String,
    pub last_sync_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    #[serde(rename = "type")]
    pub item_type: crate::models::QueueItemType,
    #[serde(default)]
    pub priority: i32,
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
pub struct FailRequest {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct CleanupRequest {
    pub older_than_hours: i64,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub removed: usize,
}

// ==================== Sync Handlers ====================

pub async fn sync_down(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(params): Query<UnsyncedParams>,
) -> SyncResult<Json<SyncResponse>> {
    let budget = params
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(state.sync_budget);
    let response = state.delta.sync(
        &SyncRequest {
            user_id,
            last_sync_at: params.since,
            compression: params.compression,
        },
        Deadline::after(budget),
    )?;
    Ok(Json(response))
}

pub async fn sync_up(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(req): Json<SyncUploadRequest>,
) -> SyncResult<Json<SyncUploadResponse>> {
    state.engine.require_user(user_id)?;

    // Each mutation is applied on its own; a failure is reported in-band
    // next to the conflicts so the rest of the batch still lands and an
    // identical retry does not re-submit already-applied records.
    let mut results = Vec::with_capacity(req.mutations.len());
    for mutation in &req.mutations {
        let outcome = match state.conflicts.apply(user_id, mutation) {
            Ok(outcome) => outcome,
            Err(err) => MutationOutcome::Failed {
                entity_id: mutation.entity.entity_id(),
                error: err.to_string(),
            },
        };
        results.push(outcome);
    }
    let applied = results
        .iter()
        .filter(|r| matches!(r, MutationOutcome::Applied { .. }))
        .count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, MutationOutcome::Quarantined { .. }))
        .count();
    let failed = results.len() - applied - conflicts;

    // The client acknowledges receipt of its last delta here; only now does
    // its checkpoint move forward
    let checkpoint = state.checkpoints.advance(user_id, req.checkpoint)?;

    let mut status = state.status.sync_status(user_id)?;
    status.last_sync_at = Utc::now();
    status.is_online = true;
    let status = state.status.update_sync_status(status)?;

    tracing::info!(
        user_id = %user_id,
        applied,
        conflicts,
        failed,
        "client sync payload processed"
    );

    Ok(Json(SyncUploadResponse {
        results,
        applied,
        conflicts,
        failed,
        checkpoint: checkpoint.token,
        last_sync_at: status.last_sync_at,
    }))
}

pub async fn sync_down_chunked(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(body): Json<ChunkedSyncBody>,
) -> SyncResult<Json<ChunkedSyncResponse>> {
    let response = state.chunked.sync(&ChunkedSyncRequest {
        user_id,
        chunk_index: body.chunk_index,
        chunk_size: body.chunk_size,
        since: body.since,
    })?;
    Ok(Json(response))
}

// ==================== Status Handlers ====================

pub async fn get_sync_status(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> SyncResult<Json<SyncStatus>> {
    Ok(Json(state.status.sync_status(user_id)?))
}

pub async fn update_sync_status(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(mut status): Json<SyncStatus>,
) -> SyncResult<Json<SyncStatus>> {
    status.user_id = user_id;
    Ok(Json(state.status.update_sync_status(status)?))
}

pub async fn get_background_status(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> SyncResult<Json<BackgroundSyncStatus>> {
    Ok(Json(state.status.background_status(user_id)?))
}

pub async fn update_background_status(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(mut status): Json<BackgroundSyncStatus>,
) -> SyncResult<Json<BackgroundSyncStatus>> {
    status.user_id = user_id;
    Ok(Json(state.status.update_background_status(status)?))
}

// ==================== Metrics Handlers ====================

pub async fn get_recent_metrics(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(params): Query<LimitParams>,
) -> SyncResult<Json<Vec<SyncMetrics>>> {
    let limit = params.limit.unwrap_or(DEFAULT_QUERY_LIMIT);
    Ok(Json(state.metrics.recent(user_id, limit)?))
}

// ==================== Queue Handlers ====================

pub async fn enqueue_item(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(req): Json<EnqueueRequest>,
) -> SyncResult<Json<SyncQueueItem>> {
    let item = SyncQueueItem::new(user_id, req.item_type, req.priority, req.payload);
    Ok(Json(state.queue.enqueue(item)?))
}

pub async fn get_pending_items(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(params): Query<LimitParams>,
) -> SyncResult<Json<Vec<SyncQueueItem>>> {
    let limit = params.limit.unwrap_or(DEFAULT_QUERY_LIMIT);
    Ok(Json(state.queue.get_pending(user_id, limit)?))
}

pub async fn get_conflict_items(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(params): Query<LimitParams>,
) -> SyncResult<Json<Vec<SyncQueueItem>>> {
    let limit = params.limit.unwrap_or(DEFAULT_QUERY_LIMIT);
    Ok(Json(state.queue.get_conflicts(user_id, limit)?))
}

pub async fn complete_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> SyncResult<Json<SyncQueueItem>> {
    Ok(Json(state.queue.mark_completed(item_id)?))
}

pub async fn fail_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Json(req): Json<FailRequest>,
) -> SyncResult<Json<SyncQueueItem>> {
    Ok(Json(state.queue.mark_failed(item_id, &req.error)?))
}

pub async fn retry_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> SyncResult<Json<SyncQueueItem>> {
    Ok(Json(state.queue.retry(item_id)?))
}

pub async fn cleanup_completed(
    State(state): State<AppState>,
    Json(req): Json<CleanupRequest>,
) -> SyncResult<Json<CleanupResponse>> {
    if req.older_than_hours < 0 {
        return Err(SyncError::InvalidArgument(
            "older_than_hours must be >= 0".into(),
        ));
    }
    let removed = state
        .queue
        .cleanup_completed(chrono::Duration::hours(req.older_than_hours))?;
    Ok(Json(CleanupResponse { removed }))
}

// ==================== Health ====================

pub async fn health() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
