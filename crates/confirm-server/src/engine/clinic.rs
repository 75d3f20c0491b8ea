//! Clinic-scoped flows: clinician invites sent by clinic admins, and
//! patient invites addressed to a clinic.

use confirm_core::{
    Confirmation, ConfirmationStatus, ConfirmationType, PatientClinicContext, Permissions,
};
use confirm_directory::{CLINIC_ADMIN, Clinic, Clinician, ClinicianFilter, OptionalExt};
use confirm_storage::ConfirmationFilter;
use serde::Deserialize;
use tracing::{info, warn};

use super::{Caller, Engine, EngineError, LanguageHint, Result, now};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientClinicInvite {
    /// Patient sharing their data; defaults to the caller.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub permissions: Permissions,
    /// When given, must match the clinic's share code.
    #[serde(default)]
    pub share_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClinicianInvite {
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Engine {
    async fn clinic(&self, clinic_id: &str) -> Result<Clinic> {
        self.dirs
            .clinic
            .get_clinic(clinic_id)
            .await
            .optional()?
            .ok_or_else(|| EngineError::not_found("clinic not found"))
    }

    fn clinic_filter(clinic_id: &str, kind: ConfirmationType) -> ConfirmationFilter {
        ConfirmationFilter::new().with_clinic(clinic_id).with_type(kind)
    }

    // ---- patient -> clinic ---------------------------------------------

    pub async fn send_patient_clinic_invite(
        &self,
        caller: &Caller,
        clinic_id: &str,
        invite: PatientClinicInvite,
        hint: &LanguageHint,
    ) -> Result<Confirmation> {
        let patient_id = match invite.user_id.as_deref().filter(|u| !u.is_empty()) {
            Some(user_id) => user_id.to_string(),
            None if caller.is_server => {
                return Err(EngineError::bad_request("userId is required"));
            }
            None => caller.user_id.clone(),
        };
        self.require_acting_for(caller, &patient_id).await?;
        if invite.permissions.is_empty() {
            return Err(EngineError::bad_request("permissions are required"));
        }

        let clinic = self.clinic(clinic_id).await?;
        if let Some(code) = invite.share_code.as_deref() {
            let matches = clinic
                .share_code
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(code));
            if !matches {
                return Err(EngineError::not_found("no clinic with this share code"));
            }
        }

        self.ensure_no_duplicate(
            Self::clinic_filter(clinic_id, ConfirmationType::PatientClinicInvitation)
                .with_creator(&patient_id),
        )
        .await?;
        if self
            .dirs
            .clinic
            .get_patient(clinic_id, &patient_id)
            .await
            .optional()?
            .is_some()
        {
            return Err(EngineError::existing_member());
        }

        let mut creator = self.creator_snapshot(&patient_id).await;
        creator.clinic_name = Some(clinic.name.clone());
        creator.clinic_id = Some(clinic.id.clone());
        let record = Confirmation::new(ConfirmationType::PatientClinicInvitation, &patient_id)
            .with_user_id(&patient_id)
            .with_clinic(clinic_id)
            .with_creator(creator)
            .with_context(&PatientClinicContext {
                permissions: invite.permissions,
                share_code: invite.share_code,
            })?;
        self.save(&record).await?;
        info!(key = %record.key, clinic_id, user_id = %patient_id, "Patient invited clinic");

        if clinic.suppresses_patient_invitations() {
            info!(key = %record.key, clinic_id, "Clinic suppresses patient invitation emails");
            return Ok(record);
        }

        let admins = self
            .dirs
            .clinic
            .list_clinicians(
                clinic_id,
                &ClinicianFilter {
                    role: Some(CLINIC_ADMIN.to_string()),
                    ..Default::default()
                },
            )
            .await?;
        let values = self.values_for(&record);
        let mut failures = Vec::new();
        for admin in &admins {
            let Some(email) = admin.email.as_deref() else {
                continue;
            };
            let locale = self.recipient_language(admin.user_id.as_deref(), hint).await;
            if let Err(e) = self.deliver(&record, email, &locale, values.clone()).await {
                failures.push(e.to_string());
            }
        }
        if admins.is_empty() {
            warn!(key = %record.key, clinic_id, "Clinic has no admin to notify");
        }
        if !failures.is_empty() {
            return Err(EngineError::Mail(failures.join("; ")));
        }
        Ok(record)
    }

    pub async fn list_patient_clinic_invites(
        &self,
        caller: &Caller,
        clinic_id: &str,
    ) -> Result<Vec<Confirmation>> {
        self.require_clinic_member(caller, clinic_id).await?;
        let filter = Self::clinic_filter(clinic_id, ConfirmationType::PatientClinicInvitation);
        Ok(self
            .store
            .find_many(&filter, &[ConfirmationStatus::Pending])
            .await?)
    }

    pub async fn accept_patient_clinic_invite(
        &self,
        caller: &Caller,
        clinic_id: &str,
        invite_id: &str,
    ) -> Result<Confirmation> {
        self.require_person(caller)?;
        self.require_clinic_member(caller, clinic_id).await?;
        let mut record = self
            .load(
                &Self::clinic_filter(clinic_id, ConfirmationType::PatientClinicInvitation)
                    .with_key(invite_id),
            )
            .await?;
        self.ensure_actionable(&record)?;

        let context: PatientClinicContext = record.decode_context()?;
        self.dirs
            .clinic
            .create_patient_from_user(clinic_id, &record.creator_id, &context.permissions)
            .await
            .map_err(|e| EngineError::side_effect("create clinic patient", e))?;
        self.finish(&mut record, ConfirmationStatus::Completed)
            .await?;
        Ok(record)
    }

    pub async fn decline_patient_clinic_invite(
        &self,
        caller: &Caller,
        clinic_id: &str,
        invite_id: &str,
    ) -> Result<Confirmation> {
        self.require_person(caller)?;
        self.require_clinic_member(caller, clinic_id).await?;
        let mut record = self
            .load(
                &Self::clinic_filter(clinic_id, ConfirmationType::PatientClinicInvitation)
                    .with_key(invite_id),
            )
            .await?;
        self.finish(&mut record, ConfirmationStatus::Declined)
            .await?;
        Ok(record)
    }

    // ---- clinician invites ---------------------------------------------

    pub async fn send_clinician_invite(
        &self,
        caller: &Caller,
        clinic_id: &str,
        invite: ClinicianInvite,
        hint: &LanguageHint,
    ) -> Result<Confirmation> {
        self.require_clinic_admin(caller, clinic_id).await?;
        let email = invite.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(EngineError::bad_request("a valid email is required"));
        }
        let clinic = self.clinic(clinic_id).await?;
        let invitee = self.known_user(email).await?;

        let superseded = self
            .ensure_no_duplicate(
                Self::clinic_filter(clinic_id, ConfirmationType::ClinicianInvitation)
                    .with_email(email),
            )
            .await?;
        for stale in &superseded {
            self.delete_invited_clinician(clinic_id, &stale.key).await?;
        }
        let by_email = self
            .dirs
            .clinic
            .list_clinicians(
                clinic_id,
                &ClinicianFilter {
                    email: Some(email.to_string()),
                    ..Default::default()
                },
            )
            .await?;
        let mut is_member = by_email.iter().any(|c| c.user_id.is_some());
        if let Some(invitee) = &invitee {
            is_member |= self
                .dirs
                .clinic
                .get_clinician(clinic_id, &invitee.user_id)
                .await
                .optional()?
                .is_some();
        }
        if is_member {
            return Err(EngineError::existing_member());
        }

        let mut creator = self.creator_snapshot(&caller.user_id).await;
        creator.clinic_name = Some(clinic.name.clone());
        creator.clinic_id = Some(clinic.id.clone());
        let mut record = Confirmation::new(ConfirmationType::ClinicianInvitation, &caller.user_id)
            .with_email(email)
            .with_clinic(clinic_id)
            .with_creator(creator);
        if let Some(invitee) = &invitee {
            record = record.with_user_id(invitee.user_id.clone());
        }
        self.save(&record).await?;

        let invited = Clinician {
            clinic_id: clinic_id.to_string(),
            invite_id: Some(record.key.clone()),
            email: Some(email.to_string()),
            roles: invite.roles,
            ..Default::default()
        };
        if let Err(e) = self.dirs.clinic.create_clinician(clinic_id, &invited).await {
            return Err(self.compensate(&mut record, e.into()).await);
        }
        info!(key = %record.key, clinic_id, "Clinician invited");

        let locale = self.recipient_language(record.user_id.as_deref(), hint).await;
        self.deliver(&record, email, &locale, self.values_for(&record))
            .await?;
        Ok(record)
    }

    pub async fn list_clinician_invites(
        &self,
        caller: &Caller,
        clinic_id: &str,
    ) -> Result<Vec<Confirmation>> {
        self.require_clinic_admin(caller, clinic_id).await?;
        let filter = Self::clinic_filter(clinic_id, ConfirmationType::ClinicianInvitation);
        Ok(self
            .store
            .find_many(&filter, &[ConfirmationStatus::Pending])
            .await?)
    }

    pub async fn resend_clinician_invite(
        &self,
        caller: &Caller,
        clinic_id: &str,
        invite_id: &str,
        hint: &LanguageHint,
    ) -> Result<Confirmation> {
        self.require_clinic_admin(caller, clinic_id).await?;
        let mut record = self
            .load(
                &Self::clinic_filter(clinic_id, ConfirmationType::ClinicianInvitation)
                    .with_key(invite_id)
                    .pending(),
            )
            .await?;
        record.touch(now());
        self.save(&record).await?;

        let Some(email) = record.email.clone() else {
            return Err(EngineError::internal("clinician invite has no email"));
        };
        let locale = self.recipient_language(record.user_id.as_deref(), hint).await;
        self.deliver(&record, &email, &locale, self.values_for(&record))
            .await?;
        Ok(record)
    }

    pub async fn accept_clinician_invite(
        &self,
        caller: &Caller,
        clinic_id: &str,
        invite_id: &str,
    ) -> Result<Confirmation> {
        let account = self.caller_account(caller).await?;
        let mut record = self
            .load(
                &Self::clinic_filter(clinic_id, ConfirmationType::ClinicianInvitation)
                    .with_key(invite_id),
            )
            .await?;
        self.ensure_actionable(&record)?;
        self.ensure_recipient(&record, &account)?;

        self.dirs
            .clinic
            .associate_clinician_to_user(clinic_id, invite_id, &account.user_id)
            .await
            .map_err(|e| EngineError::side_effect("associate clinician", e))?;
        record.user_id = Some(account.user_id);
        self.finish(&mut record, ConfirmationStatus::Completed)
            .await?;
        Ok(record)
    }

    /// The invitee turns the invite down.
    pub async fn dismiss_clinician_invite(
        &self,
        caller: &Caller,
        clinic_id: &str,
        invite_id: &str,
    ) -> Result<Confirmation> {
        let account = self.caller_account(caller).await?;
        let mut record = self
            .load(
                &Self::clinic_filter(clinic_id, ConfirmationType::ClinicianInvitation)
                    .with_key(invite_id),
            )
            .await?;
        if !record.is_pending() {
            return Err(EngineError::forbidden("confirmation is no longer pending"));
        }
        self.ensure_recipient(&record, &account)?;
        self.delete_invited_clinician(clinic_id, invite_id).await?;
        self.finish(&mut record, ConfirmationStatus::Declined)
            .await?;
        Ok(record)
    }

    /// An admin withdraws the invite.
    pub async fn cancel_clinician_invite(
        &self,
        caller: &Caller,
        clinic_id: &str,
        invite_id: &str,
    ) -> Result<Confirmation> {
        self.require_clinic_admin(caller, clinic_id).await?;
        let mut record = self
            .load(
                &Self::clinic_filter(clinic_id, ConfirmationType::ClinicianInvitation)
                    .with_key(invite_id),
            )
            .await?;
        if !record.is_pending() {
            return Err(EngineError::forbidden("confirmation is no longer pending"));
        }
        self.delete_invited_clinician(clinic_id, invite_id).await?;
        self.finish(&mut record, ConfirmationStatus::Canceled)
            .await?;
        Ok(record)
    }

    /// Idempotent: a missing invited clinician counts as deleted.
    async fn delete_invited_clinician(&self, clinic_id: &str, invite_id: &str) -> Result<()> {
        match self
            .dirs
            .clinic
            .delete_invited_clinician(clinic_id, invite_id)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(EngineError::side_effect("delete invited clinician", e)),
        }
    }
}
