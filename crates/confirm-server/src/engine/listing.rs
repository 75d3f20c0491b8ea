use confirm_core::{Confirmation, ConfirmationStatus, ConfirmationType};
use confirm_storage::{ConfirmationFilter, RecipientMatch};

use super::{Caller, Engine, EngineError, Result};

impl Engine {
    /// Pending invitations addressed to `user_id` by id or by any of their emails.
    pub async fn received_invitations(
        &self,
        caller: &Caller,
        user_id: &str,
    ) -> Result<Vec<Confirmation>> {
        if !caller.is_server && !caller.is(user_id) {
            return Err(EngineError::unauthorized("caller is not the target user"));
        }
        let account = self
            .known_user(user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("user not found"))?;
        let filter = ConfirmationFilter::new()
            .with_types(ConfirmationType::RECEIVED)
            .with_recipient(RecipientMatch::new(
                Some(account.user_id.clone()),
                account.emails.iter().cloned(),
            ));
        let mut records = self
            .store
            .find_many(&filter, &[ConfirmationStatus::Pending])
            .await?;
        self.attach_user_ids(&mut records).await;
        Ok(records)
    }

    /// Care-team invitations `user_id` sent that are pending or were declined.
    pub async fn sent_invitations(
        &self,
        caller: &Caller,
        user_id: &str,
    ) -> Result<Vec<Confirmation>> {
        self.require_acting_for(caller, user_id).await?;
        let filter = ConfirmationFilter::new()
            .with_creator(user_id)
            .with_type(ConfirmationType::CareteamInvitation);
        let mut records = self
            .store
            .find_many(
                &filter,
                &[ConfirmationStatus::Pending, ConfirmationStatus::Declined],
            )
            .await?;
        self.attach_user_ids(&mut records).await;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{fixture, user};
    use confirm_core::TeamRef;
    use confirm_storage::ConfirmationStore;

    #[tokio::test]
    async fn received_matches_id_or_email() {
        let f = fixture();
        user(&f.dir, "B", "bob@x.org", &[]);
        let by_email = Confirmation::new(ConfirmationType::CareteamInvitation, "A")
            .with_email("BOB@x.org");
        let by_id = Confirmation::new(ConfirmationType::MedicalteamInvitation, "C")
            .with_user_id("B")
            .with_team(TeamRef {
                id: "T".into(),
                name: "Cardio".into(),
            });
        let not_listed = Confirmation::new(ConfirmationType::PasswordReset, "B").with_user_id("B");
        for record in [&by_email, &by_id, &not_listed] {
            f.store.upsert(record).await.unwrap();
        }

        let received = f
            .engine
            .received_invitations(&Caller::user("B"), "B")
            .await
            .unwrap();
        assert_eq!(received.len(), 2);
        let backfilled = received.iter().find(|r| r.key == by_email.key).unwrap();
        assert_eq!(backfilled.user_id.as_deref(), Some("B"));

        let err = f
            .engine
            .received_invitations(&Caller::user("A"), "B")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn sent_includes_declined() {
        let f = fixture();
        user(&f.dir, "A", "a@x.org", &[]);
        let pending = Confirmation::new(ConfirmationType::CareteamInvitation, "A")
            .with_email("x@x.org");
        let mut declined = Confirmation::new(ConfirmationType::CareteamInvitation, "A")
            .with_email("y@x.org");
        declined
            .transition(ConfirmationStatus::Declined, time::OffsetDateTime::now_utc())
            .unwrap();
        let mut canceled = Confirmation::new(ConfirmationType::CareteamInvitation, "A")
            .with_email("z@x.org");
        canceled
            .transition(ConfirmationStatus::Canceled, time::OffsetDateTime::now_utc())
            .unwrap();
        for record in [&pending, &declined, &canceled] {
            f.store.upsert(record).await.unwrap();
        }
        let sent = f
            .engine
            .sent_invitations(&Caller::user("A"), "A")
            .await
            .unwrap();
        assert_eq!(sent.len(), 2);
    }
}
