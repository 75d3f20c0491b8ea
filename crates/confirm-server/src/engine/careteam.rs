//! Care-team invitations between end users.

use confirm_core::{
    CareTeamContext, Confirmation, ConfirmationStatus, ConfirmationType, Permissions,
};
use confirm_storage::ConfirmationFilter;
use serde::Deserialize;
use tracing::info;

use super::{Caller, Engine, EngineError, LanguageHint, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct CareTeamInvite {
    pub email: String,
    #[serde(default)]
    pub permissions: Permissions,
}

impl Engine {
    /// `user_id` invites `invite.email` to view their data.
    pub async fn send_careteam_invite(
        &self,
        caller: &Caller,
        user_id: &str,
        invite: CareTeamInvite,
        hint: &LanguageHint,
    ) -> Result<Confirmation> {
        self.require_acting_for(caller, user_id).await?;
        let email = invite.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(EngineError::bad_request("a valid email is required"));
        }
        if invite.permissions.is_empty() {
            return Err(EngineError::bad_request("permissions are required"));
        }

        let invitee = self.known_user(email).await?;
        if invitee.as_ref().is_some_and(|u| u.user_id == user_id) {
            return Err(EngineError::bad_request("cannot invite yourself"));
        }

        self.ensure_no_duplicate(
            ConfirmationFilter::new()
                .with_creator(user_id)
                .with_type(ConfirmationType::CareteamInvitation)
                .with_email(email),
        )
        .await?;

        if let Some(invitee) = &invitee {
            let existing = self
                .dirs
                .permission
                .permissions(user_id, &invitee.user_id)
                .await?;
            if !existing.is_empty() {
                return Err(EngineError::existing_member());
            }
        }

        let mut record = Confirmation::new(ConfirmationType::CareteamInvitation, user_id)
            .with_email(email)
            .with_creator(self.creator_snapshot(user_id).await)
            .with_context(&CareTeamContext {
                permissions: invite.permissions,
            })?;
        if let Some(invitee) = &invitee {
            record = record.with_user_id(invitee.user_id.clone());
        }
        self.save(&record).await?;
        info!(key = %record.key, kind = %record.kind, creator_id = user_id, "Care-team invite created");

        let locale = self
            .recipient_language(record.user_id.as_deref(), hint)
            .await;
        self.deliver(&record, email, &locale, self.values_for(&record))
            .await?;
        Ok(record)
    }

    /// The invitee `user_id` accepts the invite sent by `invited_by`.
    pub async fn accept_careteam_invite(
        &self,
        caller: &Caller,
        user_id: &str,
        invited_by: &str,
        key: &str,
    ) -> Result<Confirmation> {
        self.require_self(caller, user_id)?;
        let mut record = self.load(&careteam_filter(key, invited_by)).await?;
        self.ensure_actionable(&record)?;
        let account = self.caller_account(caller).await?;
        self.ensure_recipient(&record, &account)?;

        let context: CareTeamContext = record.decode_context()?;
        self.dirs
            .permission
            .set_permissions(user_id, invited_by, &context.permissions)
            .await
            .map_err(|e| EngineError::side_effect("set permissions", e))?;

        record.user_id = Some(user_id.to_string());
        self.finish(&mut record, ConfirmationStatus::Completed)
            .await?;
        Ok(record)
    }

    pub async fn dismiss_careteam_invite(
        &self,
        caller: &Caller,
        user_id: &str,
        invited_by: &str,
        key: &str,
    ) -> Result<Confirmation> {
        self.require_self(caller, user_id)?;
        let mut record = self.load(&careteam_filter(key, invited_by)).await?;
        if !record.is_pending() {
            return Err(EngineError::forbidden("confirmation is no longer pending"));
        }
        let account = self.caller_account(caller).await?;
        self.ensure_recipient(&record, &account)?;
        self.finish(&mut record, ConfirmationStatus::Declined)
            .await?;
        Ok(record)
    }

    /// The sender withdraws their pending invite to `email`.
    pub async fn cancel_careteam_invite(
        &self,
        caller: &Caller,
        user_id: &str,
        email: &str,
    ) -> Result<Confirmation> {
        self.require_acting_for(caller, user_id).await?;
        let filter = ConfirmationFilter::new()
            .with_creator(user_id)
            .with_type(ConfirmationType::CareteamInvitation)
            .with_email(email)
            .pending();
        let mut record = self.load(&filter).await?;
        self.finish(&mut record, ConfirmationStatus::Canceled)
            .await?;
        Ok(record)
    }
}

fn careteam_filter(key: &str, invited_by: &str) -> ConfirmationFilter {
    ConfirmationFilter::by_key(key)
        .with_type(ConfirmationType::CareteamInvitation)
        .with_creator(invited_by)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{age, fixture, user, Fixture};
    use serde_json::json;

    fn view_note() -> Permissions {
        let mut p = Permissions::new();
        p.insert("view".into(), json!({}));
        p.insert("note".into(), json!({}));
        p
    }

    fn invite(email: &str) -> CareTeamInvite {
        CareTeamInvite {
            email: email.into(),
            permissions: view_note(),
        }
    }

    fn setup() -> Fixture {
        let f = fixture();
        user(&f.dir, "A", "alice@x.org", &[]);
        user(&f.dir, "B", "bob@x.org", &[]);
        f
    }

    #[tokio::test]
    async fn invite_then_accept_grants_permissions() {
        let f = setup();
        let alice = Caller::user("A");
        let record = f
            .engine
            .send_careteam_invite(&alice, "A", invite("bob@x.org"), &LanguageHint::none())
            .await
            .unwrap();
        assert_eq!(record.user_id.as_deref(), Some("B"));
        assert_eq!(f.mailer.count(), 1);

        let done = f
            .engine
            .accept_careteam_invite(&Caller::user("B"), "B", "A", &record.key)
            .await
            .unwrap();
        assert_eq!(done.status, ConfirmationStatus::Completed);
        assert_eq!(f.dir.granted("A", "B"), Some(view_note()));
        assert!(f.dir.calls().contains(&"set_permissions B A".to_string()));
    }

    #[tokio::test]
    async fn existing_member_is_rejected() {
        let f = setup();
        f.dir.grant("A", "B", view_note());
        let err = f
            .engine
            .send_careteam_invite(&Caller::user("A"), "A", invite("bob@x.org"), &LanguageHint::none())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
        assert_eq!(f.store.len(), 0);
    }

    #[tokio::test]
    async fn strangers_cannot_invite_for_others() {
        let f = setup();
        let err = f
            .engine
            .send_careteam_invite(&Caller::user("B"), "A", invite("carol@x.org"), &LanguageHint::none())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized(_)));
        assert_eq!(f.store.len(), 0);
    }

    #[tokio::test]
    async fn mail_failure_keeps_record() {
        let f = setup();
        f.mailer.set_failing(true);
        let err = f
            .engine
            .send_careteam_invite(&Caller::user("A"), "A", invite("carol@x.org"), &LanguageHint::none())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Mail(_)));
        let stored = f.store.all();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].is_pending());
        assert_eq!(stored[0].user_id, None);
    }

    #[tokio::test]
    async fn accept_by_wrong_user_is_forbidden() {
        let f = setup();
        user(&f.dir, "C", "carol@x.org", &[]);
        let record = f
            .engine
            .send_careteam_invite(&Caller::user("A"), "A", invite("bob@x.org"), &LanguageHint::none())
            .await
            .unwrap();
        let err = f
            .engine
            .accept_careteam_invite(&Caller::user("C"), "C", "A", &record.key)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
        assert!(f.dir.granted("A", "C").is_none());
    }

    #[tokio::test]
    async fn failed_grant_leaves_record_pending() {
        let f = setup();
        let record = f
            .engine
            .send_careteam_invite(&Caller::user("A"), "A", invite("bob@x.org"), &LanguageHint::none())
            .await
            .unwrap();
        f.dir.fail("set_permissions");
        let err = f
            .engine
            .accept_careteam_invite(&Caller::user("B"), "B", "A", &record.key)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Internal(_)));
        assert!(f.store.all()[0].is_pending());
    }

    #[tokio::test]
    async fn sender_cancels_by_email_case_insensitively() {
        let f = setup();
        f.engine
            .send_careteam_invite(&Caller::user("A"), "A", invite("Carol@X.org"), &LanguageHint::none())
            .await
            .unwrap();
        let canceled = f
            .engine
            .cancel_careteam_invite(&Caller::user("A"), "A", "carol@x.ORG")
            .await
            .unwrap();
        assert_eq!(canceled.status, ConfirmationStatus::Canceled);
    }

    #[tokio::test]
    async fn decline_is_terminal() {
        let f = setup();
        let record = f
            .engine
            .send_careteam_invite(&Caller::user("A"), "A", invite("bob@x.org"), &LanguageHint::none())
            .await
            .unwrap();
        let bob = Caller::user("B");
        f.engine
            .dismiss_careteam_invite(&bob, "B", "A", &record.key)
            .await
            .unwrap();
        let err = f
            .engine
            .accept_careteam_invite(&bob, "B", "A", &record.key)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
    }

    #[tokio::test]
    async fn expired_invite_no_longer_blocks() {
        let f = setup();
        let alice = Caller::user("A");
        let first = f
            .engine
            .send_careteam_invite(&alice, "A", invite("bob@x.org"), &LanguageHint::none())
            .await
            .unwrap();
        age(&f.store, &first.key, time::Duration::days(8)).await;

        let second = f
            .engine
            .send_careteam_invite(&alice, "A", invite("bob@x.org"), &LanguageHint::none())
            .await
            .unwrap();
        assert_ne!(second.key, first.key);
        assert!(second.is_pending());
        assert_eq!(f.store.len(), 2);
        assert_eq!(f.mailer.count(), 2);

        let pending: Vec<_> = f.store.all().into_iter().filter(|r| r.is_pending()).collect();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].key, second.key);
    }
}
