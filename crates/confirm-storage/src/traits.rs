//! The storage contract every confirmation backend implements.

use async_trait::async_trait;
use confirm_core::{Confirmation, ConfirmationStatus, ConfirmationType};
use time::{Duration, OffsetDateTime};

use crate::error::StorageError;
use crate::filter::ConfirmationFilter;

/// Durable CRUD and query over confirmation records.
///
/// Implementations must be thread-safe (`Send + Sync`). `upsert` by key is
/// atomic at the record level; nothing else is guaranteed across calls.
#[async_trait]
pub trait ConfirmationStore: Send + Sync {
    /// Inserts a new record or replaces the one with the same key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidRecord` if the record breaks a model
    /// invariant and `StorageError::Unavailable` if the backend is down.
    async fn upsert(&self, record: &Confirmation) -> Result<(), StorageError>;

    /// Returns the newest record matching `filter`, if any.
    async fn find_one(
        &self,
        filter: &ConfirmationFilter,
    ) -> Result<Option<Confirmation>, StorageError>;

    /// Returns all records matching `filter` whose status is in `statuses`
    /// (every status when empty), newest `created` first, ties by key.
    async fn find_many(
        &self,
        filter: &ConfirmationFilter,
        statuses: &[ConfirmationStatus],
    ) -> Result<Vec<Confirmation>, StorageError>;

    /// Deletes one record. Returns whether it existed.
    async fn remove(&self, key: &str) -> Result<bool, StorageError>;

    /// Deletes every record created by or addressed to `user_id`.
    async fn remove_all_for_user(&self, user_id: &str) -> Result<u64, StorageError>;

    /// Number of records of `kind` for `user_id` created at or after `since`.
    async fn count_since(
        &self,
        kind: ConfirmationType,
        user_id: &str,
        since: OffsetDateTime,
    ) -> Result<u64, StorageError>;

    /// Cheap reachability probe for health checks.
    async fn ping(&self) -> Result<(), StorageError>;

    /// Number of records of `kind` for `user_id` within the trailing `window`.
    async fn count_recent(
        &self,
        kind: ConfirmationType,
        user_id: &str,
        window: Duration,
    ) -> Result<u64, StorageError> {
        self.count_since(kind, user_id, OffsetDateTime::now_utc() - window)
            .await
    }

    /// Looks a record up by key.
    async fn get(&self, key: &str) -> Result<Option<Confirmation>, StorageError> {
        self.find_one(&ConfirmationFilter::by_key(key)).await
    }
}
