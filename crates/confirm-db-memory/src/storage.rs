use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use confirm_core::{Confirmation, ConfirmationStatus, ConfirmationType};
use confirm_storage::{
    ConfirmationFilter, ConfirmationStore, StorageError, newest_first, prepare_for_write,
};
use dashmap::DashMap;
use time::OffsetDateTime;

/// In-memory confirmation store using a sharded concurrent map.
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    data: Arc<DashMap<String, Confirmation>>,
    /// When set, every call fails with `Unavailable`.
    offline: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Snapshot of every record, newest first.
    pub fn all(&self) -> Vec<Confirmation> {
        let mut all: Vec<Confirmation> = self.data.iter().map(|e| e.value().clone()).collect();
        all.sort_by(newest_first);
        all
    }

    /// Simulates a backend outage.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<(), StorageError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable("in-memory store is offline"));
        }
        Ok(())
    }

    fn scan(&self, filter: &ConfirmationFilter, statuses: &[ConfirmationStatus]) -> Vec<Confirmation> {
        // key lookups skip the scan
        if let Some(key) = filter.key.as_deref() {
            return self
                .data
                .get(key)
                .map(|e| e.value().clone())
                .filter(|c| filter.matches(c))
                .filter(|c| statuses.is_empty() || statuses.contains(&c.status))
                .into_iter()
                .collect();
        }

        let mut found: Vec<Confirmation> = self
            .data
            .iter()
            .filter(|e| filter.matches(e.value()))
            .filter(|e| statuses.is_empty() || statuses.contains(&e.value().status))
            .map(|e| e.value().clone())
            .collect();
        found.sort_by(newest_first);
        found
    }
}

#[async_trait]
impl ConfirmationStore for InMemoryStore {
    async fn upsert(&self, record: &Confirmation) -> Result<(), StorageError> {
        self.check_online()?;
        let stored = prepare_for_write(record)?;
        self.data.insert(stored.key.clone(), stored);
        Ok(())
    }

    async fn find_one(
        &self,
        filter: &ConfirmationFilter,
    ) -> Result<Option<Confirmation>, StorageError> {
        self.check_online()?;
        Ok(self.scan(filter, &[]).into_iter().next())
    }

    async fn find_many(
        &self,
        filter: &ConfirmationFilter,
        statuses: &[ConfirmationStatus],
    ) -> Result<Vec<Confirmation>, StorageError> {
        self.check_online()?;
        Ok(self.scan(filter, statuses))
    }

    async fn remove(&self, key: &str) -> Result<bool, StorageError> {
        self.check_online()?;
        Ok(self.data.remove(key).is_some())
    }

    async fn remove_all_for_user(&self, user_id: &str) -> Result<u64, StorageError> {
        self.check_online()?;
        let before = self.data.len();
        self.data
            .retain(|_, c| c.creator_id != user_id && c.user_id.as_deref() != Some(user_id));
        Ok(before.saturating_sub(self.data.len()) as u64)
    }

    async fn count_since(
        &self,
        kind: ConfirmationType,
        user_id: &str,
        since: OffsetDateTime,
    ) -> Result<u64, StorageError> {
        self.check_online()?;
        let count = self
            .data
            .iter()
            .filter(|e| {
                let c = e.value();
                c.kind == kind && c.user_id.as_deref() == Some(user_id) && c.created >= since
            })
            .count();
        Ok(count as u64)
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.check_online()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use confirm_core::{ConfirmationStatus, TeamRef};
    use time::Duration;

    fn invite(creator: &str, email: &str) -> Confirmation {
        Confirmation::new(ConfirmationType::CareteamInvitation, creator).with_email(email)
    }

    #[tokio::test]
    async fn test_upsert_and_get_round_trip() {
        let store = InMemoryStore::new();
        let c = invite("A", "Bob@X.org").with_user_id("B");
        store.upsert(&c).await.unwrap();

        let loaded = store.get(&c.key).await.unwrap().unwrap();
        assert_eq!(loaded.email.as_deref(), Some("bob@x.org"));
        let mut expected = c.clone();
        expected.email = Some("bob@x.org".into());
        assert_eq!(loaded, expected);
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_key() {
        let store = InMemoryStore::new();
        let mut c = invite("A", "bob@x.org");
        store.upsert(&c).await.unwrap();
        c.transition(ConfirmationStatus::Completed, OffsetDateTime::now_utc())
            .unwrap();
        store.upsert(&c).await.unwrap();

        assert_eq!(store.len(), 1);
        let loaded = store.get(&c.key).await.unwrap().unwrap();
        assert_eq!(loaded.status, ConfirmationStatus::Completed);
    }

    #[tokio::test]
    async fn test_upsert_rejects_invalid_records() {
        let store = InMemoryStore::new();
        let c = Confirmation::new(ConfirmationType::CareteamInvitation, "A");
        let err = store.upsert(&c).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidRecord { .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_find_many_filters_status_and_orders_newest_first() {
        let store = InMemoryStore::new();
        let now = OffsetDateTime::now_utc();

        let old = Confirmation::new_at(ConfirmationType::CareteamInvitation, "A", now - Duration::days(2))
            .with_email("x@x.org");
        let new = Confirmation::new_at(ConfirmationType::CareteamInvitation, "A", now)
            .with_email("y@x.org");
        let mut done = Confirmation::new_at(ConfirmationType::CareteamInvitation, "A", now)
            .with_email("z@x.org");
        done.transition(ConfirmationStatus::Declined, now).unwrap();
        for c in [&old, &new, &done] {
            store.upsert(c).await.unwrap();
        }

        let filter = ConfirmationFilter::new().with_creator("A");
        let pending = store
            .find_many(&filter, &[ConfirmationStatus::Pending])
            .await
            .unwrap();
        assert_eq!(
            pending.iter().map(|c| c.key.clone()).collect::<Vec<_>>(),
            vec![new.key.clone(), old.key.clone()]
        );

        let sent = store
            .find_many(
                &filter,
                &[ConfirmationStatus::Pending, ConfirmationStatus::Declined],
            )
            .await
            .unwrap();
        assert_eq!(sent.len(), 3);
    }

    #[tokio::test]
    async fn test_email_lookup_is_case_insensitive() {
        let store = InMemoryStore::new();
        store.upsert(&invite("A", "bob@x.org")).await.unwrap();
        let found = store
            .find_one(&ConfirmationFilter::new().with_email("BOB@X.ORG"))
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_team_scope_filter() {
        let store = InMemoryStore::new();
        let c = Confirmation::new(ConfirmationType::MedicalteamInvitation, "A")
            .with_user_id("B")
            .with_team(TeamRef {
                id: "T1".into(),
                name: "Diabeto".into(),
            });
        store.upsert(&c).await.unwrap();
        let found = store
            .find_many(&ConfirmationFilter::new().with_team("T1"), &[])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        let none = store
            .find_many(&ConfirmationFilter::new().with_team("T2"), &[])
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_remove_all_for_user_covers_creator_and_recipient() {
        let store = InMemoryStore::new();
        store.upsert(&invite("U", "a@x.org")).await.unwrap();
        store
            .upsert(&invite("A", "b@x.org").with_user_id("U"))
            .await
            .unwrap();
        store.upsert(&invite("A", "c@x.org")).await.unwrap();

        assert_eq!(store.remove_all_for_user("U").await.unwrap(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.remove_all_for_user("U").await.unwrap(), 0);

        let left = store
            .find_many(&ConfirmationFilter::new().with_user("U"), &[])
            .await
            .unwrap();
        assert!(left.is_empty());
    }

    #[tokio::test]
    async fn test_count_recent_respects_window_and_type() {
        let store = InMemoryStore::new();
        let now = OffsetDateTime::now_utc();
        for hours in [1, 5, 23, 30] {
            let c = Confirmation::new_at(
                ConfirmationType::PatientPinReset,
                "P",
                now - Duration::hours(hours),
            )
            .with_user_id("P");
            store.upsert(&c).await.unwrap();
        }
        store
            .upsert(&Confirmation::new(ConfirmationType::EmailConfirmation, "P").with_user_id("P"))
            .await
            .unwrap();

        let count = store
            .count_recent(ConfirmationType::PatientPinReset, "P", Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_offline_store_reports_unavailable() {
        let store = InMemoryStore::new();
        store.set_offline(true);
        assert!(store.ping().await.unwrap_err().is_unavailable());
        assert!(
            store
                .upsert(&invite("A", "b@x.org"))
                .await
                .unwrap_err()
                .is_unavailable()
        );
        store.set_offline(false);
        assert!(store.ping().await.is_ok());
    }
}
