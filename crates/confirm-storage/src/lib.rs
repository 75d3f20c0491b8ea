//! # confirm-storage
//!
//! Storage abstraction for confirmation records.
//!
//! This crate defines the trait and query types every backend implements;
//! backends live in `confirm-db-memory` and `confirm-db-postgres`.
//!
//! ```ignore
//! use confirm_storage::{ConfirmationFilter, ConfirmationStore};
//!
//! async fn pending_for(store: &dyn ConfirmationStore, email: &str) {
//!     let filter = ConfirmationFilter::new().with_email(email).pending();
//!     let found = store.find_many(&filter, &[]).await?;
//! }
//! ```

mod error;
mod filter;
mod traits;

pub use error::{ErrorCategory, StorageError};
pub use filter::{ConfirmationFilter, RecipientMatch, newest_first, prepare_for_write};
pub use traits::ConfirmationStore;

/// Type alias for a storage result.
pub type StorageResult<T> = Result<T, StorageError>;

/// Shared handle to a storage backend.
pub type DynStore = std::sync::Arc<dyn ConfirmationStore>;
