pub mod error;
pub mod models;
pub mod server;
pub mod store;
pub mod sync;

pub use error::{SyncError, SyncResult};
pub use server::create_router;
pub use store::StorageEngine;
