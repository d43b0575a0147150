//! Conflict router.
//!
//! Every client mutation carries the entity version the client last
//! observed. If it still matches the server's copy the mutation applies and
//! the version advances; if it diverged the store is left untouched and the
//! mutation is quarantined in the sync queue as a conflict item carrying
//! both sides. Detection and quarantine only; resolution policy belongs to
//! the layer above.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::models::{ConflictInfo, QueueItemType, SyncEntity, SyncQueueItem};
use crate::store::StorageEngine;
use crate::sync::queue::SyncQueue;

/// Conflict items jump the queue ahead of routine offline mutations.
const CONFLICT_PRIORITY: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

/// One client-submitted change to a single entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMutation {
    pub kind: MutationKind,
    /// Version the client last observed; 0 for creates.
    pub expected_version: i64,
    pub entity: SyncEntity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MutationOutcome {
    Applied {
        entity_id: Uuid,
        new_version: i64,
    },
    Quarantined {
        entity_id: Uuid,
        queue_item_id: Uuid,
        server_version: i64,
    },
    /// The mutation could not be processed at all (invalid shape, storage
    /// fault). Reported in-band so one bad record does not sink the batch.
    Failed {
        entity_id: Uuid,
        error: String,
    },
}

#[derive(Clone)]
pub struct ConflictRouter {
    engine: StorageEngine,
    queue: SyncQueue,
}

impl ConflictRouter {
    pub fn new(engine: StorageEngine, queue: SyncQueue) -> Self {
        Self { engine, queue }
    }

    /// Apply one mutation under the user's lock, or quarantine it.
    ///
    /// A quarantined mutation is a normal outcome, not an error: the HTTP
    /// layer reports it in-band with a 200.
    pub fn apply(&self, user_id: Uuid, mutation: &EntityMutation) -> SyncResult<MutationOutcome> {
        let lock = self.engine.user_lock(user_id);
        let _held = lock.lock();

        self.engine.require_user(user_id)?;

        let current = self.load_current(&mutation.entity)?;
        let server_version = current.as_ref().map(SyncEntity::version).unwrap_or(0);

        let matches = match mutation.kind {
            // A create expects the id to be unoccupied
            MutationKind::Create => current.is_none(),
            MutationKind::Update | MutationKind::Delete => {
                current.is_some() && server_version == mutation.expected_version
            }
        };

        if !matches {
            return self.quarantine(user_id, mutation, current, server_version);
        }

        let entity_id = mutation.entity.entity_id();
        let new_version = server_version + 1;
        match mutation.kind {
            MutationKind::Create | MutationKind::Update => {
                let mut entity = mutation.entity.clone();
                entity.stamp(new_version, Utc::now());
                self.persist(user_id, &entity)?;
            }
            MutationKind::Delete => {
                self.remove(&mutation.entity)?;
            }
        }

        tracing::debug!(
            user_id = %user_id,
            entity_id = %entity_id,
            kind = ?mutation.kind,
            new_version,
            "mutation applied"
        );

        Ok(MutationOutcome::Applied {
            entity_id,
            new_version,
        })
    }

    fn quarantine(
        &self,
        user_id: Uuid,
        mutation: &EntityMutation,
        current: Option<SyncEntity>,
        server_version: i64,
    ) -> SyncResult<MutationOutcome> {
        let entity_id = mutation.entity.entity_id();
        let client_payload = serde_json::to_value(&mutation.entity)?;
        let server_payload = match &current {
            Some(entity) => serde_json::to_value(entity)?,
            None => serde_json::Value::Null,
        };

        let item = SyncQueueItem::new(
            user_id,
            QueueItemType::Conflict,
            CONFLICT_PRIORITY,
            client_payload.clone(),
        )
        .with_conflict(ConflictInfo {
            entity_id,
            entity_kind: mutation.entity.kind_name().to_string(),
            client_version: mutation.expected_version,
            server_version,
            client_payload,
            server_payload,
        });
        let item = self.queue.enqueue(item)?;

        tracing::warn!(
            user_id = %user_id,
            entity_id = %entity_id,
            client_version = mutation.expected_version,
            server_version,
            queue_item_id = %item.id,
            "version conflict quarantined"
        );

        Ok(MutationOutcome::Quarantined {
            entity_id,
            queue_item_id: item.id,
            server_version,
        })
    }

    fn load_current(&self, entity: &SyncEntity) -> SyncResult<Option<SyncEntity>> {
        let id = entity.entity_id();
        Ok(match entity {
            SyncEntity::User(_) => self.engine.get_user(id)?.map(SyncEntity::User),
            SyncEntity::Booking(_) => self.engine.get_booking(id)?.map(SyncEntity::Booking),
            SyncEntity::Service(_) => self.engine.get_service(id)?.map(SyncEntity::Service),
            SyncEntity::WalletTransaction(_) => self
                .engine
                .get_wallet_tx(id)?
                .map(SyncEntity::WalletTransaction),
        })
    }

    fn persist(&self, user_id: Uuid, entity: &SyncEntity) -> SyncResult<()> {
        match entity {
            SyncEntity::User(user) => self.engine.put_user(user),
            SyncEntity::Booking(booking) => self.engine.put_booking(booking),
            SyncEntity::Service(service) => self.engine.put_service(service),
            SyncEntity::WalletTransaction(tx) => {
                // Balance and ledger entry advance together; a transaction
                // visible without its balance effect is a defect
                self.engine.put_wallet_tx(tx)?;
                let mut user = self.engine.require_user(user_id)?;
                let delta = match tx.kind {
                    crate::models::TransactionKind::Credit => tx.amount,
                    crate::models::TransactionKind::Debit => -tx.amount,
                };
                user.wallet.balance += delta;
                user.wallet.last_updated = Some(Utc::now());
                self.engine.put_user(&user)
            }
        }
    }

    fn remove(&self, entity: &SyncEntity) -> SyncResult<()> {
        let id = entity.entity_id();
        match entity {
            SyncEntity::User(_) => Err(SyncError::InvalidArgument(
                "user records cannot be deleted through sync".into(),
            )),
            SyncEntity::Booking(_) => self.engine.delete_booking(id),
            SyncEntity::Service(_) => self.engine.delete_service(id),
            SyncEntity::WalletTransaction(_) => self.engine.delete_wallet_tx(id),
        }
    }
}
