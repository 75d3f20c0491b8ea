use tracing::info;

use super::{Caller, Engine, Result};

impl Engine {
    /// Drops every record created by or addressed to a deleted account.
    pub async fn user_deleted(&self, caller: &Caller, user_id: &str) -> Result<u64> {
        self.require_server(caller)?;
        let removed = self.store.remove_all_for_user(user_id).await?;
        info!(user_id, removed, "Removed confirmations of deleted user");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::fixture;
    use confirm_core::{Confirmation, ConfirmationType};
    use confirm_storage::ConfirmationStore;

    #[tokio::test]
    async fn removes_both_directions_idempotently() {
        let f = fixture();
        let sent = Confirmation::new(ConfirmationType::CareteamInvitation, "U").with_email("x@x.org");
        let received = Confirmation::new(ConfirmationType::CareteamInvitation, "A").with_user_id("U");
        let other = Confirmation::new(ConfirmationType::CareteamInvitation, "A").with_user_id("B");
        for record in [&sent, &received, &other] {
            f.store.upsert(record).await.unwrap();
        }

        let server = Caller::server("svc");
        assert_eq!(f.engine.user_deleted(&server, "U").await.unwrap(), 2);
        assert_eq!(f.engine.user_deleted(&server, "U").await.unwrap(), 0);
        assert_eq!(f.store.len(), 1);
        assert!(f.engine.user_deleted(&Caller::user("U"), "U").await.is_err());
    }
}
