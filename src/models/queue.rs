//! Sync queue data shapes.
//!
//! Queue items are the durable backlog of client operations that could not
//! be applied immediately: offline-queued mutations and quarantined
//! conflicts. An external scheduler drains them; this crate only stores and
//! transitions them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemType {
    Create,
    Update,
    Delete,
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Both sides of a version mismatch, kept for later resolution.
///
/// Resolution policy lives above this crate; the queue only records what
/// the client sent and what the server held at detection time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictInfo {
    pub entity_id: Uuid,
    pub entity_kind: String,
    pub client_version: i64,
    pub server_version: i64,
    pub client_payload: JsonValue,
    pub server_payload: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueItem {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub item_type: QueueItemType,
    pub status: QueueItemStatus,
    /// Higher number = more urgent.
    pub priority: i32,
    pub payload: JsonValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictInfo>,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncQueueItem {
    /// Fresh pending item. Timestamps and id are assigned here; the queue
    /// persists it as-is.
    pub fn new(user_id: Uuid, item_type: QueueItemType, priority: i32, payload: JsonValue) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            item_type,
            status: QueueItemStatus::Pending,
            priority,
            payload,
            conflict: None,
            retry_count: 0,
            max_retries: RetryPolicy::default().max_retries,
            last_error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn with_conflict(mut self, conflict: ConflictInfo) -> Self {
        self.conflict = Some(conflict);
        self
    }

    /// Completed and Failed are terminal; only `retry` moves an item out of
    /// Failed, and nothing moves one out of Completed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            QueueItemStatus::Completed | QueueItemStatus::Failed
        )
    }
}

/// Exponential backoff policy consumed by the external queue scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    #[serde(with = "duration_ms")]
    pub base_delay: Duration,
    #[serde(with = "duration_ms")]
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `retry_count + 1`, capped at `max_delay`.
    /// Returns `None` once the retry budget is spent.
    pub fn next_delay(&self, retry_count: u32) -> Option<Duration> {
        if retry_count >= self.max_retries {
            return None;
        }
        let scaled = self.base_delay.as_secs_f64() * self.multiplier.powi(retry_count as i32);
        Some(Duration::from_secs_f64(
            scaled.min(self.max_delay.as_secs_f64()),
        ))
    }

    pub fn next_retry_at(&self, retry_count: u32) -> Option<DateTime<Utc>> {
        self.next_delay(retry_count)
            .map(|d| Utc::now() + chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::zero()))
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}
