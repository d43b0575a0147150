//! Checkpoint manager.
//!
//! One checkpoint row per user, overwritten on each acknowledged sync. The
//! token is opaque to clients but decodable here: base64 over a small JSON
//! body carrying the sync timestamp and a random cursor nonce. Advancing to
//! a token whose timestamp is older than the stored one is a caller bug and
//! fails with `CheckpointRegression` instead of being accepted.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::models::Checkpoint;
use crate::store::StorageEngine;

/// Decoded body of an opaque checkpoint token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointToken {
    pub last_sync_at: DateTime<Utc>,
    pub cursor: String,
}

#[derive(Clone)]
pub struct CheckpointManager {
    engine: StorageEngine,
}

impl CheckpointManager {
    pub fn new(engine: StorageEngine) -> Self {
        Self { engine }
    }

    /// Mint a fresh opaque token marking `last_sync_at`.
    pub fn issue_token(last_sync_at: DateTime<Utc>) -> String {
        let mut nonce = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce);
        let token = CheckpointToken {
            last_sync_at,
            cursor: hex_lower(&nonce),
        };
        // CheckpointToken always serializes; both fields are plain data
        let json = serde_json::to_vec(&token).unwrap_or_default();
        BASE64.encode(json)
    }

    pub fn decode_token(token: &str) -> SyncResult<CheckpointToken> {
        let bytes = BASE64
            .decode(token)
            .map_err(|e| SyncError::InvalidToken(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| SyncError::InvalidToken(e.to_string()))
    }

    pub fn get(&self, user_id: Uuid) -> SyncResult<Checkpoint> {
        self.engine
            .get_checkpoint(user_id)?
            .ok_or_else(|| SyncError::CheckpointNotFound(user_id.to_string()))
    }

    /// Non-idempotent create: fails if the user already has a checkpoint.
    pub fn create(&self, user_id: Uuid, token: String) -> SyncResult<Checkpoint> {
        Self::decode_token(&token)?;
        let _guard = self.engine.user_lock(user_id);
        let _held = _guard.lock();

        if self.engine.get_checkpoint(user_id)?.is_some() {
            return Err(SyncError::CheckpointExists(user_id.to_string()));
        }
        let now = Utc::now();
        let checkpoint = Checkpoint {
            user_id,
            token,
            created_at: now,
            updated_at: now,
        };
        self.engine.put_checkpoint(&checkpoint)?;
        Ok(checkpoint)
    }

    /// Advance (or lazily create) the checkpoint. The new token must not
    /// mark an earlier point than the stored one.
    pub fn advance(&self, user_id: Uuid, token: String) -> SyncResult<Checkpoint> {
        let incoming = Self::decode_token(&token)?;
        let _guard = self.engine.user_lock(user_id);
        let _held = _guard.lock();

        let existing = self.engine.get_checkpoint(user_id)?;
        if let Some(ref current) = existing {
            let stored = Self::decode_token(&current.token)?;
            if incoming.last_sync_at < stored.last_sync_at {
                return Err(SyncError::CheckpointRegression(format!(
                    "user {}: {} < {}",
                    user_id, incoming.last_sync_at, stored.last_sync_at
                )));
            }
        }

        let now = Utc::now();
        let checkpoint = Checkpoint {
            user_id,
            token,
            created_at: existing.map(|c| c.created_at).unwrap_or(now),
            updated_at: now,
        };
        self.engine.put_checkpoint(&checkpoint)?;
        tracing::debug!(user_id = %user_id, "checkpoint advanced");
        Ok(checkpoint)
    }
}

fn hex_lower(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
