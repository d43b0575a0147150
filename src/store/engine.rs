//! RocksDB-backed durable store.
//!
//! One column family per collection; values are JSON-encoded documents.
//! Per-user singletons (checkpoint, status rows) are keyed by user id,
//! entities and queue items by their own id. Scans filter in-process; a
//! deployment at real scale would add secondary indexes keyed by
//! `(user_id, status)` and `(user_id, priority)`.

use dashmap::DashMap;
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, DB};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::models::{
    BackgroundSyncStatus, Booking, Checkpoint, Service, SyncMetrics, SyncQueueItem, SyncStatus,
    User, WalletTransaction,
};

const CF_USERS: &str = "users";
const CF_BOOKINGS: &str = "bookings";
const CF_SERVICES: &str = "services";
const CF_WALLET_TXS: &str = "wallet_txs";
const CF_CHECKPOINTS: &str = "checkpoints";
const CF_SYNC_STATUS: &str = "sync_status";
const CF_BACKGROUND_STATUS: &str = "background_status";
const CF_SYNC_QUEUE: &str = "sync_queue";
const CF_SYNC_METRICS: &str = "sync_metrics";

const ALL_CFS: [&str; 9] = [
    CF_USERS,
    CF_BOOKINGS,
    CF_SERVICES,
    CF_WALLET_TXS,
    CF_CHECKPOINTS,
    CF_SYNC_STATUS,
    CF_BACKGROUND_STATUS,
    CF_SYNC_QUEUE,
    CF_SYNC_METRICS,
];

/// Durable keyed storage for entities and sync bookkeeping.
#[derive(Clone)]
pub struct StorageEngine {
    db: Arc<DB>,
    path: PathBuf,
    /// Per-user mutexes: mutations touching one user's data serialize on
    /// that user's lock while different users proceed in parallel.
    user_locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("path", &self.path)
            .finish()
    }
}

impl StorageEngine {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> SyncResult<Self> {
        let path = data_dir.as_ref().to_path_buf();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        // Bound WAL growth; this store sees many small overwrites
        opts.set_max_total_wal_size(50 * 1024 * 1024);
        opts.set_keep_log_file_num(5);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, &path, cf_descriptors)
            .map_err(|e| SyncError::Storage(format!("failed to open RocksDB: {}", e)))?;

        Ok(Self {
            db: Arc::new(db),
            path,
            user_locks: Arc::new(DashMap::new()),
        })
    }

    /// Lock guarding all of one user's sync state.
    pub fn user_lock(&self, user_id: Uuid) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn cf(&self, name: &str) -> SyncResult<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| SyncError::Storage(format!("missing column family '{}'", name)))
    }

    fn put_json<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> SyncResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(self.cf(cf_name)?, key, bytes)?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> SyncResult<Option<T>> {
        match self.db.get_cf(self.cf(cf_name)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn delete(&self, cf_name: &str, key: &[u8]) -> SyncResult<()> {
        self.db.delete_cf(self.cf(cf_name)?, key)?;
        Ok(())
    }

    /// Full-CF scan collecting every document that passes `filter`.
    fn scan<T, F>(&self, cf_name: &str, mut filter: F) -> SyncResult<Vec<T>>
    where
        T: DeserializeOwned,
        F: FnMut(&T) -> bool,
    {
        let mut out = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf_name)?, IteratorMode::Start) {
            let (_key, value) = item?;
            let doc: T = serde_json::from_slice(&value)?;
            if filter(&doc) {
                out.push(doc);
            }
        }
        Ok(out)
    }

    // ==================== Users ====================

    pub fn put_user(&self, user: &User) -> SyncResult<()> {
        self.put_json(CF_USERS, user.id.as_bytes(), user)
    }

    pub fn get_user(&self, user_id: Uuid) -> SyncResult<Option<User>> {
        self.get_json(CF_USERS, user_id.as_bytes())
    }

    /// Resolve the user or fail with `UserNotFound`.
    pub fn require_user(&self, user_id: Uuid) -> SyncResult<User> {
        self.get_user(user_id)?
            .ok_or_else(|| SyncError::UserNotFound(user_id.to_string()))
    }

    // ==================== Bookings ====================

    pub fn put_booking(&self, booking: &Booking) -> SyncResult<()> {
        self.put_json(CF_BOOKINGS, booking.id.as_bytes(), booking)
    }

    pub fn get_booking(&self, id: Uuid) -> SyncResult<Option<Booking>> {
        self.get_json(CF_BOOKINGS, id.as_bytes())
    }

    pub fn delete_booking(&self, id: Uuid) -> SyncResult<()> {
        self.delete(CF_BOOKINGS, id.as_bytes())
    }

    pub fn bookings_for_customer(&self, customer_id: Uuid) -> SyncResult<Vec<Booking>> {
        self.scan(CF_BOOKINGS, |b: &Booking| b.customer_id == customer_id)
    }

    // ==================== Services ====================

    pub fn put_service(&self, service: &Service) -> SyncResult<()> {
        self.put_json(CF_SERVICES, service.id.as_bytes(), service)
    }

    pub fn get_service(&self, id: Uuid) -> SyncResult<Option<Service>> {
        self.get_json(CF_SERVICES, id.as_bytes())
    }

    pub fn delete_service(&self, id: Uuid) -> SyncResult<()> {
        self.delete(CF_SERVICES, id.as_bytes())
    }

    pub fn services_for_provider(&self, provider_id: Uuid) -> SyncResult<Vec<Service>> {
        self.scan(CF_SERVICES, |s: &Service| s.provider_id == provider_id)
    }

    // ==================== Wallet transactions ====================

    pub fn put_wallet_tx(&self, tx: &WalletTransaction) -> SyncResult<()> {
        self.put_json(CF_WALLET_TXS, tx.id.as_bytes(), tx)
    }

    pub fn get_wallet_tx(&self, id: Uuid) -> SyncResult<Option<WalletTransaction>> {
        self.get_json(CF_WALLET_TXS, id.as_bytes())
    }

    pub fn delete_wallet_tx(&self, id: Uuid) -> SyncResult<()> {
        self.delete(CF_WALLET_TXS, id.as_bytes())
    }

    pub fn wallet_txs_for_user(&self, user_id: Uuid) -> SyncResult<Vec<WalletTransaction>> {
        self.scan(CF_WALLET_TXS, |t: &WalletTransaction| t.user_id == user_id)
    }

    // ==================== Checkpoints ====================

    pub fn put_checkpoint(&self, checkpoint: &Checkpoint) -> SyncResult<()> {
        self.put_json(CF_CHECKPOINTS, checkpoint.user_id.as_bytes(), checkpoint)
    }

    pub fn get_checkpoint(&self, user_id: Uuid) -> SyncResult<Option<Checkpoint>> {
        self.get_json(CF_CHECKPOINTS, user_id.as_bytes())
    }

    // ==================== Status rows ====================

    pub fn put_sync_status(&self, status: &SyncStatus) -> SyncResult<()> {
        self.put_json(CF_SYNC_STATUS, status.user_id.as_bytes(), status)
    }

    pub fn get_sync_status(&self, user_id: Uuid) -> SyncResult<Option<SyncStatus>> {
        self.get_json(CF_SYNC_STATUS, user_id.as_bytes())
    }

    pub fn put_background_status(&self, status: &BackgroundSyncStatus) -> SyncResult<()> {
        self.put_json(CF_BACKGROUND_STATUS, status.user_id.as_bytes(), status)
    }

    pub fn get_background_status(&self, user_id: Uuid) -> SyncResult<Option<BackgroundSyncStatus>> {
        self.get_json(CF_BACKGROUND_STATUS, user_id.as_bytes())
    }

    // ==================== Queue ====================

    pub fn put_queue_item(&self, item: &SyncQueueItem) -> SyncResult<()> {
        self.put_json(CF_SYNC_QUEUE, item.id.as_bytes(), item)
    }

    pub fn get_queue_item(&self, id: Uuid) -> SyncResult<Option<SyncQueueItem>> {
        self.get_json(CF_SYNC_QUEUE, id.as_bytes())
    }

    pub fn delete_queue_item(&self, id: Uuid) -> SyncResult<()> {
        self.delete(CF_SYNC_QUEUE, id.as_bytes())
    }

    pub fn queue_items_for_user(&self, user_id: Uuid) -> SyncResult<Vec<SyncQueueItem>> {
        self.scan(CF_SYNC_QUEUE, |i: &SyncQueueItem| i.user_id == user_id)
    }

    pub fn all_queue_items(&self) -> SyncResult<Vec<SyncQueueItem>> {
        self.scan(CF_SYNC_QUEUE, |_: &SyncQueueItem| true)
    }

    // ==================== Metrics ====================

    pub fn put_metrics(&self, metrics: &SyncMetrics) -> SyncResult<()> {
        self.put_json(CF_SYNC_METRICS, metrics.id.as_bytes(), metrics)
    }

    pub fn metrics_for_user(&self, user_id: Uuid) -> SyncResult<Vec<SyncMetrics>> {
        self.scan(CF_SYNC_METRICS, |m: &SyncMetrics| m.user_id == user_id)
    }
}
