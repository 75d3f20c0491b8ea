//! In-memory confirmation store.
//!
//! Backs development runs and tests. Records live in a `dashmap` keyed by
//! confirmation key; queries scan the map.
//!
//! ```ignore
//! use confirm_db_memory::InMemoryStore;
//! use confirm_storage::ConfirmationStore;
//!
//! let store = InMemoryStore::new();
//! store.upsert(&confirmation).await?;
//! ```

pub mod storage;

pub use confirm_storage::{ConfirmationStore, StorageError};
pub use storage::InMemoryStore;

/// Creates a shareable in-memory store.
pub fn create_store() -> confirm_storage::DynStore {
    std::sync::Arc::new(InMemoryStore::new())
}
