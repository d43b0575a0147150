pub mod entity;
pub mod queue;
pub mod sync;

pub use entity::{
    Address, Booking, BookingStatus, Service, SyncEntity, TransactionKind, User, UserRole, Wallet,
    WalletTransaction,
};
pub use queue::{
    ConflictInfo, QueueItemStatus, QueueItemType, RetryPolicy, SyncQueueItem,
};
pub use sync::{
    BackgroundSyncStatus, Checkpoint, ChunkedSyncRequest, ChunkedSyncResponse, SyncData,
    SyncMetrics, SyncRequest, SyncResponse, SyncStatus,
};
