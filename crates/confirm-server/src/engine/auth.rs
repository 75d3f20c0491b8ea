//! Caller identity and the authority checks every flow starts with.

use confirm_directory::{OptionalExt, Team, TokenData, User};
use tracing::debug;

use super::{Engine, EngineError, Result};

const ROOT: &str = "root";
const CUSTODIAN: &str = "custodian";

/// The authenticated party behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub is_server: bool,
    pub role: Option<String>,
}

impl From<TokenData> for Caller {
    fn from(token: TokenData) -> Self {
        Self {
            user_id: token.user_id,
            is_server: token.is_server,
            role: token.role,
        }
    }
}

impl Caller {
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_server: false,
            role: None,
        }
    }

    pub fn server(name: impl Into<String>) -> Self {
        Self {
            user_id: name.into(),
            is_server: true,
            role: None,
        }
    }

    /// True when this is the person `user_id`.
    pub fn is(&self, user_id: &str) -> bool {
        !self.is_server && self.user_id == user_id
    }
}

impl Engine {
    pub async fn authenticate(&self, token: &str) -> Result<Caller> {
        match self.dirs.identity.authenticate(token).await? {
            Some(data) => Ok(data.into()),
            None => Err(EngineError::unauthorized("invalid session token")),
        }
    }

    /// Accept, decline and PIN reset must come from a person.
    pub(crate) fn require_person(&self, caller: &Caller) -> Result<()> {
        if caller.is_server {
            return Err(EngineError::forbidden(
                "server tokens cannot act on behalf of a user",
            ));
        }
        Ok(())
    }

    pub(crate) fn require_self(&self, caller: &Caller, user_id: &str) -> Result<()> {
        self.require_person(caller)?;
        if caller.user_id != user_id {
            return Err(EngineError::unauthorized("caller is not the target user"));
        }
        Ok(())
    }

    pub(crate) fn require_server(&self, caller: &Caller) -> Result<()> {
        if !caller.is_server {
            return Err(EngineError::forbidden("server token required"));
        }
        Ok(())
    }

    /// Server, the user themself, or a holder of root/custodian permission.
    pub(crate) async fn can_act_for(&self, caller: &Caller, user_id: &str) -> Result<bool> {
        if caller.is_server || caller.user_id == user_id {
            return Ok(true);
        }
        let perms = self
            .dirs
            .permission
            .permissions(user_id, &caller.user_id)
            .await?;
        Ok(perms.contains_key(ROOT) || perms.contains_key(CUSTODIAN))
    }

    pub(crate) async fn require_acting_for(&self, caller: &Caller, user_id: &str) -> Result<()> {
        if !self.can_act_for(caller, user_id).await? {
            debug!(caller = %caller.user_id, user_id, "Caller has no authority over user");
            return Err(EngineError::unauthorized("caller has no authority over user"));
        }
        Ok(())
    }

    pub(crate) async fn is_clinic_admin(&self, caller: &Caller, clinic_id: &str) -> Result<bool> {
        if caller.is_server {
            return Ok(true);
        }
        let clinician = self
            .dirs
            .clinic
            .get_clinician(clinic_id, &caller.user_id)
            .await
            .optional()?;
        Ok(clinician.is_some_and(|c| c.is_admin()))
    }

    pub(crate) async fn require_clinic_admin(&self, caller: &Caller, clinic_id: &str) -> Result<()> {
        if !self.is_clinic_admin(caller, clinic_id).await? {
            return Err(EngineError::unauthorized("caller is not a clinic admin"));
        }
        Ok(())
    }

    pub(crate) async fn require_clinic_member(
        &self,
        caller: &Caller,
        clinic_id: &str,
    ) -> Result<()> {
        if caller.is_server {
            return Ok(());
        }
        let clinician = self
            .dirs
            .clinic
            .get_clinician(clinic_id, &caller.user_id)
            .await
            .optional()?;
        if clinician.is_none() {
            return Err(EngineError::unauthorized("caller is not a clinician of the clinic"));
        }
        Ok(())
    }

    pub(crate) fn is_team_admin(&self, caller: &Caller, team: &Team) -> bool {
        caller.is_server || team.is_admin(&caller.user_id)
    }

    pub(crate) fn require_team_admin(&self, caller: &Caller, team: &Team) -> Result<()> {
        if !self.is_team_admin(caller, team) {
            return Err(EngineError::unauthorized("caller is not a team admin"));
        }
        Ok(())
    }

    /// The caller's account, used for recipient matching.
    pub(crate) async fn caller_account(&self, caller: &Caller) -> Result<User> {
        self.require_person(caller)?;
        match self.dirs.identity.get_user(&caller.user_id).await.optional()? {
            Some(user) => Ok(user),
            None => Err(EngineError::unauthorized("caller account not found")),
        }
    }

    /// Recipient check of accept/decline: by user id or one of the caller's emails.
    pub(crate) fn ensure_recipient(
        &self,
        record: &confirm_core::Confirmation,
        account: &User,
    ) -> Result<()> {
        if !record.is_addressed_to(&account.user_id, &account.emails) {
            return Err(EngineError::forbidden(
                "confirmation is not addressed to the caller",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{fixture, user};
    use confirm_core::Permissions;
    use confirm_directory::{Clinician, CLINIC_ADMIN};
    use serde_json::json;

    #[tokio::test]
    async fn custodians_act_for_others() {
        let f = fixture();
        user(&f.dir, "P", "p@x.org", &["patient"]);
        user(&f.dir, "C", "c@x.org", &[]);
        let engine = &f.engine;

        assert!(engine.can_act_for(&Caller::user("P"), "P").await.unwrap());
        assert!(engine.can_act_for(&Caller::server("svc"), "P").await.unwrap());
        assert!(!engine.can_act_for(&Caller::user("C"), "P").await.unwrap());

        let mut perms = Permissions::new();
        perms.insert("custodian".into(), json!({}));
        f.dir.grant("P", "C", perms);
        assert!(engine.can_act_for(&Caller::user("C"), "P").await.unwrap());
    }

    #[tokio::test]
    async fn clinic_admin_needs_the_role() {
        let f = fixture();
        f.dir.add_clinician(Clinician {
            clinic_id: "K".into(),
            user_id: Some("admin".into()),
            roles: vec![CLINIC_ADMIN.into()],
            ..Default::default()
        });
        f.dir.add_clinician(Clinician {
            clinic_id: "K".into(),
            user_id: Some("member".into()),
            roles: vec!["CLINIC_MEMBER".into()],
            ..Default::default()
        });
        let engine = &f.engine;
        assert!(engine.is_clinic_admin(&Caller::user("admin"), "K").await.unwrap());
        assert!(!engine.is_clinic_admin(&Caller::user("member"), "K").await.unwrap());
        assert!(!engine.is_clinic_admin(&Caller::user("stranger"), "K").await.unwrap());
        assert!(engine.require_clinic_member(&Caller::user("member"), "K").await.is_ok());
    }

    #[tokio::test]
    async fn unknown_tokens_are_rejected() {
        let f = fixture();
        user(&f.dir, "A", "a@x.org", &[]);
        f.dir.add_session("tok-a", "A");
        assert_eq!(f.engine.authenticate("tok-a").await.unwrap(), Caller::user("A"));
        assert!(matches!(
            f.engine.authenticate("nope").await,
            Err(EngineError::Unauthorized(_))
        ));
    }

    #[test]
    fn server_tokens_are_not_people() {
        let f = fixture();
        assert!(f.engine.require_person(&Caller::server("svc")).is_err());
        assert!(f.engine.require_self(&Caller::user("A"), "B").is_err());
        assert!(f.engine.require_self(&Caller::user("A"), "A").is_ok());
    }
}
