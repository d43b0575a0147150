//! Offline-first synchronization core.
//!
//! - Delta sync: everything changed since a client's checkpoint, one payload
//! - Chunked sync: the same delta sliced into resumable, order-stable pages
//! - Sync queue + conflict router: durable backlog and version-mismatch
//!   quarantine
//! - Checkpoint, status and metrics bookkeeping around both paths

pub mod checkpoint;
pub mod chunked;
pub mod conflict;
pub mod delta;
pub mod metrics;
pub mod queue;
pub mod status;

pub use checkpoint::CheckpointManager;
pub use chunked::ChunkedSyncService;
pub use conflict::{ConflictRouter, EntityMutation, MutationKind, MutationOutcome};
pub use delta::DeltaSyncService;
pub use metrics::MetricsRecorder;
pub use queue::SyncQueue;
pub use status::StatusTracker;

use std::time::Instant;

/// Estimated wire cost of one synced record, in bytes.
///
/// Deliberately a heuristic rather than a serialized measurement: the value
/// only needs to be monotonic with the record count so clients and tests can
/// reason about payload growth. Swap this single function for real byte
/// accounting if the estimate ever matters.
const ESTIMATED_RECORD_BYTES: i64 = 1024;

pub fn estimate_payload_size(records_count: usize) -> i64 {
    records_count as i64 * ESTIMATED_RECORD_BYTES
}

/// Caller-supplied time budget for a sync operation.
///
/// Checked between storage scans; an expired deadline aborts the operation
/// before any checkpoint or metrics write, so the identical retry reproduces
/// the same delta.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    budget: std::time::Duration,
}

impl Deadline {
    pub fn after(budget: std::time::Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    /// Effectively unbounded; used by callers without a latency contract.
    pub fn none() -> Self {
        Self::after(std::time::Duration::from_secs(24 * 60 * 60))
    }

    pub fn expired(&self) -> bool {
        self.started.elapsed() >= self.budget
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}
