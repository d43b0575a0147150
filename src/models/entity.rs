//! Versioned marketplace entities.
//!
//! Every syncable entity carries a `version` counter, incremented on each
//! successful mutation, and a `last_sync_at` timestamp. The sync engine
//! treats these two fields as the sole source of truth for "changed since
//! checkpoint X" and "does the client's view conflict with the server's".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Customer,
    Provider,
    Admin,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub balance: f64,
    pub currency: String,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub role: UserRole,
    #[serde(default)]
    pub address: Address,
    #[serde(default)]
    pub wallet: Wallet,
    pub is_offline: bool,
    pub version: i64,
    pub last_sync_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub provider_id: Uuid,
    pub service_id: Uuid,
    pub status: BookingStatus,
    pub scheduled_date: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
    pub total_amount: f64,
    pub currency: String,
    pub version: i64,
    pub last_sync_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    pub currency: String,
    /// Duration in minutes.
    pub duration_minutes: u32,
    pub is_active: bool,
    pub version: i64,
    pub last_sync_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Credit,
    Debit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub amount: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reference: String,
    pub status: String,
    pub version: i64,
    pub last_sync_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Tagged union over every syncable entity kind.
///
/// Sync payloads are heterogeneous; carrying a discriminant lets chunk
/// ordering and size estimation exhaustively match instead of downcasting
/// dynamic values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncEntity {
    User(User),
    Booking(Booking),
    Service(Service),
    WalletTransaction(WalletTransaction),
}

impl SyncEntity {
    pub fn entity_id(&self) -> Uuid {
        match self {
            SyncEntity::User(u) => u.id,
            SyncEntity::Booking(b) => b.id,
            SyncEntity::Service(s) => s.id,
            SyncEntity::WalletTransaction(t) => t.id,
        }
    }

    pub fn version(&self) -> i64 {
        match self {
            SyncEntity::User(u) => u.version,
            SyncEntity::Booking(b) => b.version,
            SyncEntity::Service(s) => s.version,
            SyncEntity::WalletTransaction(t) => t.version,
        }
    }

    pub fn last_sync_at(&self) -> DateTime<Utc> {
        match self {
            SyncEntity::User(u) => u.last_sync_at,
            SyncEntity::Booking(b) => b.last_sync_at,
            SyncEntity::Service(s) => s.last_sync_at,
            SyncEntity::WalletTransaction(t) => t.last_sync_at,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            SyncEntity::User(u) => u.created_at,
            SyncEntity::Booking(b) => b.created_at,
            SyncEntity::Service(s) => s.created_at,
            SyncEntity::WalletTransaction(t) => t.created_at,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            SyncEntity::User(_) => "user",
            SyncEntity::Booking(_) => "booking",
            SyncEntity::Service(_) => "service",
            SyncEntity::WalletTransaction(_) => "wallet_transaction",
        }
    }

    /// Stamp the entity with a new version and sync time.
    pub fn stamp(&mut self, version: i64, now: DateTime<Utc>) {
        match self {
            SyncEntity::User(u) => {
                u.version = version;
                u.last_sync_at = now;
                u.updated_at = now;
            }
            SyncEntity::Booking(b) => {
                b.version = version;
                b.last_sync_at = now;
                b.updated_at = now;
            }
            SyncEntity::Service(s) => {
                s.version = version;
                s.last_sync_at = now;
                s.updated_at = now;
            }
            SyncEntity::WalletTransaction(t) => {
                t.version = version;
                t.last_sync_at = now;
            }
        }
    }
}
