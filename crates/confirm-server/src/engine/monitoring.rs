//! Remote-monitoring invitations from a monitoring team to one of its patients.

use confirm_core::{Confirmation, ConfirmationStatus, ConfirmationType, MonitoringContext, TeamRef};
use confirm_directory::{InvitationStatus, PatientMonitoring, TeamPatient};
use confirm_storage::ConfirmationFilter;
use serde::Deserialize;
use time::{Duration, OffsetDateTime};
use tracing::info;

use super::{Caller, Engine, EngineError, LanguageHint, Result, now};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringInvite {
    /// Length of the monitoring period once accepted.
    #[serde(default)]
    pub monitoring_days: Option<u32>,
}

fn monitoring_filter(team_id: &str, user_id: &str) -> ConfirmationFilter {
    ConfirmationFilter::new()
        .with_type(ConfirmationType::MedicalteamMonitoringInvitation)
        .with_team(team_id)
        .with_user(user_id)
}

fn with_monitoring(
    patient: TeamPatient,
    enabled: bool,
    status: InvitationStatus,
    monitoring_end: Option<OffsetDateTime>,
) -> TeamPatient {
    TeamPatient {
        monitoring: Some(PatientMonitoring {
            enabled,
            status: Some(status),
            monitoring_end,
        }),
        ..patient
    }
}

impl Engine {
    async fn monitored_patient(&self, team_id: &str, user_id: &str) -> Result<TeamPatient> {
        self.dirs
            .permission
            .get_team_patients(team_id)
            .await?
            .into_iter()
            .find(|p| p.user_id == user_id)
            .ok_or_else(|| EngineError::not_found("patient is not in the team"))
    }

    pub async fn send_monitoring_invite(
        &self,
        caller: &Caller,
        team_id: &str,
        user_id: &str,
        invite: MonitoringInvite,
        hint: &LanguageHint,
    ) -> Result<Confirmation> {
        let team = self.team(team_id).await?;
        if !team.is_monitoring() {
            return Err(EngineError::bad_request("team does not run remote monitoring"));
        }
        self.require_team_admin(caller, &team)?;
        if invite.monitoring_days == Some(0) {
            return Err(EngineError::bad_request("monitoringDays must be positive"));
        }
        let patient = self.monitored_patient(team_id, user_id).await?;
        self.ensure_no_duplicate(monitoring_filter(team_id, user_id))
            .await?;

        let email = self
            .known_user(user_id)
            .await?
            .and_then(|u| u.primary_email().map(str::to_string));
        let mut record =
            Confirmation::new(ConfirmationType::MedicalteamMonitoringInvitation, &caller.user_id)
                .with_user_id(user_id)
                .with_team(TeamRef {
                    id: team.id.clone(),
                    name: team.name.clone(),
                })
                .with_creator(self.creator_snapshot(&caller.user_id).await)
                .with_context(&MonitoringContext {
                    monitoring_days: invite.monitoring_days,
                })?;
        if let Some(email) = &email {
            record = record.with_email(email.clone());
        }
        self.save(&record).await?;

        let pending = with_monitoring(patient, false, InvitationStatus::Pending, None);
        if let Err(e) = self
            .dirs
            .permission
            .update_patient_monitoring(&pending)
            .await
        {
            return Err(self.compensate(&mut record, e.into()).await);
        }
        info!(key = %record.key, team_id, user_id, "Monitoring invite created");

        match &email {
            Some(email) => {
                let locale = self.recipient_language(Some(user_id), hint).await;
                self.deliver(&record, email, &locale, self.values_for(&record))
                    .await?;
            }
            None => info!(key = %record.key, user_id, "Patient has no email, invite not mailed"),
        }
        Ok(record)
    }

    async fn pending_monitoring(
        &self,
        team_id: &str,
        user_id: &str,
        key: Option<&str>,
    ) -> Result<Confirmation> {
        let mut filter = monitoring_filter(team_id, user_id);
        if let Some(key) = key.filter(|k| !k.is_empty()) {
            filter = filter.with_key(key);
        }
        self.load(&filter).await
    }

    /// The patient consents; monitoring starts now.
    pub async fn accept_monitoring_invite(
        &self,
        caller: &Caller,
        team_id: &str,
        user_id: &str,
        key: Option<&str>,
    ) -> Result<Confirmation> {
        self.require_self(caller, user_id)?;
        let mut record = self.pending_monitoring(team_id, user_id, key).await?;
        self.ensure_actionable(&record)?;

        let context: MonitoringContext = record.decode_context().unwrap_or_default();
        let days = context
            .monitoring_days
            .unwrap_or(self.settings.monitoring_days);
        let end = now() + Duration::days(i64::from(days));

        self.dirs
            .profile
            .set_monitoring_consent(user_id, team_id, true)
            .await
            .map_err(|e| EngineError::side_effect("record monitoring consent", e))?;
        let patient = self.monitored_patient(team_id, user_id).await.map_err(|e| {
            EngineError::internal(format!("load monitored patient failed: {e}"))
        })?;
        self.dirs
            .permission
            .update_patient_monitoring(&with_monitoring(
                patient,
                true,
                InvitationStatus::Accepted,
                Some(end),
            ))
            .await
            .map_err(|e| EngineError::side_effect("start monitoring", e))?;

        self.finish(&mut record, ConfirmationStatus::Completed)
            .await?;
        info!(key = %record.key, team_id, user_id, days, "Monitoring accepted");
        Ok(record)
    }

    pub async fn dismiss_monitoring_invite(
        &self,
        caller: &Caller,
        team_id: &str,
        user_id: &str,
        key: Option<&str>,
    ) -> Result<Confirmation> {
        self.require_self(caller, user_id)?;
        let mut record = self.pending_monitoring(team_id, user_id, key).await?;
        if !record.is_pending() {
            return Err(EngineError::forbidden("confirmation is no longer pending"));
        }

        self.dirs
            .profile
            .set_monitoring_consent(user_id, team_id, false)
            .await
            .map_err(|e| EngineError::side_effect("record monitoring consent", e))?;
        match self.monitored_patient(team_id, user_id).await {
            Ok(patient) => self
                .dirs
                .permission
                .update_patient_monitoring(&with_monitoring(
                    patient,
                    false,
                    InvitationStatus::Rejected,
                    None,
                ))
                .await
                .map_err(|e| EngineError::side_effect("stop monitoring", e))?,
            Err(EngineError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        self.finish(&mut record, ConfirmationStatus::Declined)
            .await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{Fixture, fixture, user};
    use confirm_core::MemberRole;
    use confirm_directory::{PermissionDirectory, Team, TeamMember, TeamMonitoring};
    use confirm_storage::ConfirmationStore;

    async fn setup(monitoring: bool) -> Fixture {
        let f = fixture();
        user(&f.dir, "ADM", "admin@team.org", &["hcp"]);
        user(&f.dir, "P", "p@x.org", &["patient"]);
        f.dir.add_team(Team {
            id: "T".into(),
            name: "Remote care".into(),
            members: vec![TeamMember {
                team_id: "T".into(),
                user_id: "ADM".into(),
                role: MemberRole::Admin,
                invitation_status: InvitationStatus::Accepted,
                email: None,
            }],
            monitoring: Some(TeamMonitoring {
                enabled: monitoring,
            }),
        });
        f.dir
            .add_patient(&TeamPatient {
                team_id: "T".into(),
                user_id: "P".into(),
                invitation_status: InvitationStatus::Accepted,
                monitoring: None,
            })
            .await
            .unwrap();
        f
    }

    #[tokio::test]
    async fn invite_and_accept_starts_monitoring() {
        let f = setup(true).await;
        let record = f
            .engine
            .send_monitoring_invite(
                &Caller::user("ADM"),
                "T",
                "P",
                MonitoringInvite {
                    monitoring_days: Some(30),
                },
                &LanguageHint::none(),
            )
            .await
            .unwrap();
        assert_eq!(record.email.as_deref(), Some("p@x.org"));
        let pending = f.dir.team_patient("T", "P").unwrap().monitoring.unwrap();
        assert_eq!(pending.status, Some(InvitationStatus::Pending));

        let done = f
            .engine
            .accept_monitoring_invite(&Caller::user("P"), "T", "P", None)
            .await
            .unwrap();
        assert_eq!(done.status, ConfirmationStatus::Completed);
        assert_eq!(f.dir.consent("P", "T"), Some(true));
        let monitoring = f.dir.team_patient("T", "P").unwrap().monitoring.unwrap();
        assert!(monitoring.enabled);
        let end = monitoring.monitoring_end.unwrap();
        let days = (end - now()).whole_days();
        assert!((29..=30).contains(&days));
    }

    #[tokio::test]
    async fn non_monitoring_team_is_rejected() {
        let f = setup(false).await;
        let err = f
            .engine
            .send_monitoring_invite(&Caller::user("ADM"), "T", "P", MonitoringInvite::default(), &LanguageHint::none())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::BadRequest(_)));
    }

    #[tokio::test]
    async fn non_admin_is_unauthorized() {
        let f = setup(true).await;
        let err = f
            .engine
            .send_monitoring_invite(&Caller::user("P"), "T", "P", MonitoringInvite::default(), &LanguageHint::none())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn expired_invite_stays_pending() {
        let f = setup(true).await;
        let created = now() - Duration::days(31);
        let record = Confirmation::new_at(
            ConfirmationType::MedicalteamMonitoringInvitation,
            "ADM",
            created,
        )
        .with_user_id("P")
        .with_team(TeamRef {
            id: "T".into(),
            name: "Remote care".into(),
        });
        f.store.upsert(&record).await.unwrap();

        let err = f
            .engine
            .accept_monitoring_invite(&Caller::user("P"), "T", "P", None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Expired));
        assert!(f.store.all()[0].is_pending());
        assert_eq!(f.dir.consent("P", "T"), None);
    }

    #[tokio::test]
    async fn dismiss_clears_monitoring() {
        let f = setup(true).await;
        f.engine
            .send_monitoring_invite(&Caller::user("ADM"), "T", "P", MonitoringInvite::default(), &LanguageHint::none())
            .await
            .unwrap();
        let declined = f
            .engine
            .dismiss_monitoring_invite(&Caller::user("P"), "T", "P", None)
            .await
            .unwrap();
        assert_eq!(declined.status, ConfirmationStatus::Declined);
        let monitoring = f.dir.team_patient("T", "P").unwrap().monitoring.unwrap();
        assert_eq!(monitoring.status, Some(InvitationStatus::Rejected));
        assert!(monitoring.monitoring_end.is_none());
        assert_eq!(f.dir.consent("P", "T"), Some(false));
    }
}
