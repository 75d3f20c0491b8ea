//! Medical-team invitations, role changes and removals.

use confirm_core::{Confirmation, ConfirmationStatus, ConfirmationType, MemberRole, TeamRef};
use confirm_directory::{InvitationStatus, OptionalExt, Team, TeamMember, TeamPatient, User};
use confirm_storage::ConfirmationFilter;
use serde::Deserialize;
use tracing::info;

use super::{Caller, Engine, EngineError, LanguageHint, Result};

/// Team records a recipient acts on through the generic accept/dismiss routes.
const TEAM_ACTIONS: [ConfirmationType; 4] = [
    ConfirmationType::MedicalteamInvitation,
    ConfirmationType::MedicalteamPatientInvitation,
    ConfirmationType::MedicalteamDoAdmin,
    ConfirmationType::MedicalteamRemove,
];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamInvite {
    pub team_id: String,
    pub email: String,
    #[serde(default = "default_role")]
    pub role: MemberRole,
}

fn default_role() -> MemberRole {
    MemberRole::Member
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleChange {
    pub team_id: String,
    pub role: MemberRole,
}

fn team_ref(team: &Team) -> TeamRef {
    TeamRef {
        id: team.id.clone(),
        name: team.name.clone(),
    }
}

impl Engine {
    pub(crate) async fn team(&self, team_id: &str) -> Result<Team> {
        self.dirs
            .permission
            .get_team(team_id)
            .await
            .optional()?
            .ok_or_else(|| EngineError::not_found("team not found"))
    }

    async fn team_patient(&self, team_id: &str, user_id: &str) -> Result<Option<TeamPatient>> {
        let patients = self.dirs.permission.get_team_patients(team_id).await?;
        Ok(patients.into_iter().find(|p| p.user_id == user_id))
    }

    pub async fn send_team_invite(
        &self,
        caller: &Caller,
        invite: TeamInvite,
        hint: &LanguageHint,
    ) -> Result<Confirmation> {
        let email = invite.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(EngineError::bad_request("a valid email is required"));
        }
        let team = self.team(&invite.team_id).await?;
        self.require_team_admin(caller, &team)?;

        let as_patient = invite.role == MemberRole::Patient;
        let kind = if as_patient {
            ConfirmationType::MedicalteamPatientInvitation
        } else {
            ConfirmationType::MedicalteamInvitation
        };
        let invitee = self.known_user(email).await?;
        if let Some(user) = &invitee {
            if as_patient && user.is_clinical() {
                return Err(EngineError::RoleConflict(
                    "a clinical account cannot join as patient".into(),
                ));
            }
            if !as_patient && user.is_patient() {
                return Err(EngineError::RoleConflict(
                    "a patient account cannot join as team member".into(),
                ));
            }
        }

        self.ensure_no_duplicate(
            ConfirmationFilter::new()
                .with_type(kind)
                .with_team(&team.id)
                .with_email(email),
        )
        .await?;
        if let Some(user) = &invitee {
            self.ensure_not_in_team(&team, user, as_patient).await?;
        }

        let mut record = Confirmation::new(kind, &caller.user_id)
            .with_email(email)
            .with_team(team_ref(&team))
            .with_role(invite.role)
            .with_creator(self.creator_snapshot(&caller.user_id).await);
        if let Some(user) = &invitee {
            record = record.with_user_id(user.user_id.clone());
        }
        self.save(&record).await?;

        if let Some(user) = &invitee {
            let pending = self
                .add_pending_membership(&team, user, invite.role, email)
                .await;
            if let Err(e) = pending {
                return Err(self.compensate(&mut record, e.into()).await);
            }
        }
        info!(key = %record.key, kind = %kind, team_id = %team.id, "Team invite created");

        let locale = self
            .recipient_language(record.user_id.as_deref(), hint)
            .await;
        self.deliver(&record, email, &locale, self.values_for(&record))
            .await?;
        Ok(record)
    }

    /// Only an accepted membership blocks a new invite. A pending one is left
    /// behind by an invite that expired and is rewritten on send.
    async fn ensure_not_in_team(&self, team: &Team, user: &User, as_patient: bool) -> Result<()> {
        let status = if as_patient {
            self.team_patient(&team.id, &user.user_id)
                .await?
                .map(|p| p.invitation_status)
        } else {
            team.member(&user.user_id).map(|m| m.invitation_status)
        };
        if status == Some(InvitationStatus::Accepted) {
            return Err(EngineError::existing_member());
        }
        Ok(())
    }

    async fn add_pending_membership(
        &self,
        team: &Team,
        user: &User,
        role: MemberRole,
        email: &str,
    ) -> confirm_directory::Result<()> {
        if role == MemberRole::Patient {
            self.dirs
                .permission
                .add_patient(&TeamPatient {
                    team_id: team.id.clone(),
                    user_id: user.user_id.clone(),
                    invitation_status: InvitationStatus::Pending,
                    monitoring: None,
                })
                .await
        } else {
            self.dirs
                .permission
                .add_team_member(&TeamMember {
                    team_id: team.id.clone(),
                    user_id: user.user_id.clone(),
                    role,
                    invitation_status: InvitationStatus::Pending,
                    email: Some(email.to_string()),
                })
                .await
        }
    }

    /// Writes the membership state of `user_id` as of `status`, adding the
    /// membership when the directory has none.
    async fn set_membership(
        &self,
        record: &Confirmation,
        team_id: &str,
        user_id: &str,
        status: InvitationStatus,
    ) -> confirm_directory::Result<()> {
        let permission = &self.dirs.permission;
        match record.kind {
            ConfirmationType::MedicalteamInvitation => {
                let member = TeamMember {
                    team_id: team_id.to_string(),
                    user_id: user_id.to_string(),
                    role: record.role.unwrap_or(MemberRole::Member),
                    invitation_status: status,
                    email: record.email.clone(),
                };
                match permission.update_team_member(&member).await {
                    Err(e) if e.is_not_found() && status == InvitationStatus::Accepted => {
                        permission.add_team_member(&member).await
                    }
                    other => other,
                }
            }
            ConfirmationType::MedicalteamPatientInvitation => {
                let existing = permission
                    .get_team_patients(team_id)
                    .await?
                    .into_iter()
                    .find(|p| p.user_id == user_id);
                let patient = TeamPatient {
                    team_id: team_id.to_string(),
                    user_id: user_id.to_string(),
                    invitation_status: status,
                    monitoring: existing.and_then(|p| p.monitoring),
                };
                match permission.update_patient(&patient).await {
                    Err(e) if e.is_not_found() && status == InvitationStatus::Accepted => {
                        permission.add_patient(&patient).await
                    }
                    other => other,
                }
            }
            _ => Ok(()),
        }
    }

    /// The recipient acts on an invitation or acknowledges a role notice.
    pub async fn accept_team_invite(&self, caller: &Caller, key: &str) -> Result<Confirmation> {
        let account = self.caller_account(caller).await?;
        let mut record = self
            .load(&ConfirmationFilter::by_key(key).with_types(TEAM_ACTIONS))
            .await?;
        self.ensure_actionable(&record)?;
        self.ensure_recipient(&record, &account)?;
        let Some(team_id) = record.team_id().map(str::to_string) else {
            return Err(EngineError::internal("team confirmation has no team"));
        };

        self.set_membership(&record, &team_id, &account.user_id, InvitationStatus::Accepted)
            .await
            .map_err(|e| EngineError::side_effect("accept team membership", e))?;
        record.user_id = Some(account.user_id);
        self.finish(&mut record, ConfirmationStatus::Completed)
            .await?;
        Ok(record)
    }

    /// The recipient or a team admin turns a team record down.
    /// Already closed records answer `NotModified`.
    pub async fn dismiss_team_invite(
        &self,
        caller: &Caller,
        team_id: &str,
        key: &str,
    ) -> Result<Confirmation> {
        let mut record = self
            .load(
                &ConfirmationFilter::by_key(key)
                    .with_team(team_id)
                    .with_types(TEAM_ACTIONS),
            )
            .await?;
        if !record.is_pending() {
            return Err(EngineError::NotModified);
        }

        let is_recipient = if caller.is_server {
            false
        } else {
            let account = self.caller_account(caller).await?;
            record.is_addressed_to(&account.user_id, &account.emails)
        };
        if !is_recipient {
            let team = self.team(team_id).await?;
            self.require_team_admin(caller, &team)?;
        }

        if let Some(user_id) = record.user_id.clone() {
            match self
                .set_membership(&record, team_id, &user_id, InvitationStatus::Rejected)
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(EngineError::side_effect("reject team membership", e)),
            }
        }
        self.finish(&mut record, ConfirmationStatus::Declined)
            .await?;
        Ok(record)
    }

    /// Changes a member's role. Promotion to admin issues a notice.
    pub async fn change_member_role(
        &self,
        caller: &Caller,
        user_id: &str,
        change: RoleChange,
        hint: &LanguageHint,
    ) -> Result<Option<Confirmation>> {
        if change.role == MemberRole::Patient {
            return Err(EngineError::bad_request("patients are not team members"));
        }
        let team = self.team(&change.team_id).await?;
        self.require_team_admin(caller, &team)?;
        let Some(member) = team.member(user_id).cloned() else {
            return Err(EngineError::not_found("user is not a member of the team"));
        };
        if member.role == change.role {
            return Err(EngineError::conflict("member already has this role"));
        }

        let updated = TeamMember {
            role: change.role,
            ..member.clone()
        };
        self.dirs.permission.update_team_member(&updated).await?;
        info!(team_id = %team.id, user_id, role = %change.role, "Team role changed");

        if change.role != MemberRole::Admin {
            return Ok(None);
        }
        let notice = self
            .team_notice(
                ConfirmationType::MedicalteamDoAdmin,
                caller,
                &team,
                user_id,
                member.email.as_deref(),
                hint,
            )
            .await?;
        Ok(Some(notice))
    }

    /// Removes a member. Team admins may remove anyone; members may leave.
    pub async fn remove_member(
        &self,
        caller: &Caller,
        team_id: &str,
        user_id: &str,
        hint: &LanguageHint,
    ) -> Result<Confirmation> {
        let team = self.team(team_id).await?;
        if !caller.is(user_id) {
            self.require_team_admin(caller, &team)?;
        }
        let Some(member) = team.member(user_id).cloned() else {
            return Err(EngineError::not_found("user is not a member of the team"));
        };

        self.dirs
            .permission
            .remove_team_member(team_id, user_id)
            .await?;
        info!(team_id, user_id, "Team member removed");
        self.team_notice(
            ConfirmationType::MedicalteamRemove,
            caller,
            &team,
            user_id,
            member.email.as_deref(),
            hint,
        )
        .await
    }

    async fn team_notice(
        &self,
        kind: ConfirmationType,
        caller: &Caller,
        team: &Team,
        user_id: &str,
        email: Option<&str>,
        hint: &LanguageHint,
    ) -> Result<Confirmation> {
        let email = match email {
            Some(email) => Some(email.to_string()),
            None => self
                .known_user(user_id)
                .await?
                .and_then(|u| u.primary_email().map(str::to_string)),
        };
        let mut record = Confirmation::new(kind, &caller.user_id)
            .with_user_id(user_id)
            .with_team(team_ref(team))
            .with_creator(self.creator_snapshot(&caller.user_id).await);
        if let Some(email) = &email {
            record = record.with_email(email.clone());
        }
        self.save(&record).await?;

        if let Some(email) = &email {
            let locale = self.recipient_language(Some(user_id), hint).await;
            self.deliver(&record, email, &locale, self.values_for(&record))
                .await?;
        }
        Ok(record)
    }

    pub async fn list_team_invites(
        &self,
        caller: &Caller,
        team_id: &str,
    ) -> Result<Vec<Confirmation>> {
        let team = self.team(team_id).await?;
        self.require_team_admin(caller, &team)?;
        let filter = ConfirmationFilter::new().with_team(team_id).with_types([
            ConfirmationType::MedicalteamInvitation,
            ConfirmationType::MedicalteamPatientInvitation,
            ConfirmationType::MedicalteamMonitoringInvitation,
        ]);
        Ok(self
            .store
            .find_many(&filter, &[ConfirmationStatus::Pending])
            .await?)
    }
}
