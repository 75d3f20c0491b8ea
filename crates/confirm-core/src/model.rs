//! The confirmation record and its enumerations.
//!
//! Stable fields live directly on [`Confirmation`]; everything that varies
//! by [`ConfirmationType`] sits in the opaque `context` payload and is
//! decoded on demand (see [`crate::context`]).

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{CoreError, Result};
use crate::key::generate_key;

/// Kind of pending action a confirmation represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationType {
    PasswordReset,
    CareteamInvitation,
    /// Sign-up claim flow.
    EmailConfirmation,
    ClinicianInvitation,
    PatientClinicInvitation,
    MedicalteamInvitation,
    MedicalteamPatientInvitation,
    MedicalteamDoAdmin,
    MedicalteamRemove,
    MedicalteamMonitoringInvitation,
    PatientPinReset,
    PatientInformation,
    Notification,
}

impl ConfirmationType {
    pub const ALL: [ConfirmationType; 13] = [
        Self::PasswordReset,
        Self::CareteamInvitation,
        Self::EmailConfirmation,
        Self::ClinicianInvitation,
        Self::PatientClinicInvitation,
        Self::MedicalteamInvitation,
        Self::MedicalteamPatientInvitation,
        Self::MedicalteamDoAdmin,
        Self::MedicalteamRemove,
        Self::MedicalteamMonitoringInvitation,
        Self::PatientPinReset,
        Self::PatientInformation,
        Self::Notification,
    ];

    /// Types a user sees in their "received invitations" list.
    pub const RECEIVED: [ConfirmationType; 7] = [
        Self::CareteamInvitation,
        Self::ClinicianInvitation,
        Self::MedicalteamInvitation,
        Self::MedicalteamPatientInvitation,
        Self::MedicalteamMonitoringInvitation,
        Self::MedicalteamDoAdmin,
        Self::MedicalteamRemove,
    ];

    /// Medical-team types that carry a `team` scope.
    pub const TEAM: [ConfirmationType; 5] = [
        Self::MedicalteamInvitation,
        Self::MedicalteamPatientInvitation,
        Self::MedicalteamDoAdmin,
        Self::MedicalteamRemove,
        Self::MedicalteamMonitoringInvitation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PasswordReset => "password_reset",
            Self::CareteamInvitation => "careteam_invitation",
            Self::EmailConfirmation => "email_confirmation",
            Self::ClinicianInvitation => "clinician_invitation",
            Self::PatientClinicInvitation => "patient_clinic_invitation",
            Self::MedicalteamInvitation => "medicalteam_invitation",
            Self::MedicalteamPatientInvitation => "medicalteam_patient_invitation",
            Self::MedicalteamDoAdmin => "medicalteam_do_admin",
            Self::MedicalteamRemove => "medicalteam_remove",
            Self::MedicalteamMonitoringInvitation => "medicalteam_monitoring_invitation",
            Self::PatientPinReset => "patient_pin_reset",
            Self::PatientInformation => "patient_information",
            Self::Notification => "notification",
        }
    }

    /// Template rendered when no explicit template is chosen.
    pub fn default_template(&self) -> &'static str {
        match self {
            Self::EmailConfirmation => "signup_confirmation",
            Self::Notification => "prescription_notification",
            other => other.as_str(),
        }
    }

    /// Types admitted only while `countRecent(type, user, window)` stays under the limit.
    pub fn is_throttled(&self) -> bool {
        matches!(
            self,
            Self::EmailConfirmation | Self::PatientPinReset | Self::PasswordReset
        )
    }

    /// Whether a second pending record for the same tuple is rejected.
    ///
    /// Pure notifications may be issued repeatedly.
    pub fn is_deduplicated(&self) -> bool {
        !matches!(
            self,
            Self::Notification
                | Self::PatientInformation
                | Self::MedicalteamDoAdmin
                | Self::MedicalteamRemove
        )
    }

    pub fn is_team(&self) -> bool {
        Self::TEAM.contains(self)
    }
}

impl fmt::Display for ConfirmationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfirmationType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::unknown_type(s))
    }
}

/// Lifecycle state. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationStatus {
    Pending,
    Completed,
    Declined,
    Canceled,
}

impl ConfirmationStatus {
    pub const ALL: [ConfirmationStatus; 4] = [
        Self::Pending,
        Self::Completed,
        Self::Declined,
        Self::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Declined => "declined",
            Self::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn can_transition_to(&self, next: ConfirmationStatus) -> bool {
        *self == Self::Pending && next.is_terminal()
    }
}

impl fmt::Display for ConfirmationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfirmationStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| CoreError::unknown_status(s))
    }
}

/// Membership role carried by team and clinic invitations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Member,
    Admin,
    Patient,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
            Self::Patient => "patient",
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Medical-team scope.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TeamRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatorProfile {
    #[serde(default)]
    pub full_name: String,
}

/// Creator details captured at send time, used only for rendering emails.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<CreatorProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinic_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinic_id: Option<String>,
}

impl Creator {
    pub fn with_full_name(full_name: impl Into<String>) -> Self {
        Self {
            profile: Some(CreatorProfile {
                full_name: full_name.into(),
            }),
            ..Default::default()
        }
    }

    pub fn full_name(&self) -> &str {
        self.profile
            .as_ref()
            .map(|p| p.full_name.as_str())
            .unwrap_or_default()
    }
}

/// A persisted pending action awaiting an out-of-band completion step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: ConfirmationType,
    pub status: ConfirmationStatus,
    pub template_name: String,
    #[serde(default)]
    pub creator_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<MemberRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinic_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<TeamRef>,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub modified: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    #[serde(default)]
    pub creator: Creator,
}

impl Confirmation {
    /// Creates a pending record with a fresh key, stamped `now`.
    pub fn new(kind: ConfirmationType, creator_id: impl Into<String>) -> Self {
        Self::new_at(kind, creator_id, OffsetDateTime::now_utc())
    }

    pub fn new_at(
        kind: ConfirmationType,
        creator_id: impl Into<String>,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            key: generate_key(),
            kind,
            status: ConfirmationStatus::Pending,
            template_name: kind.default_template().to_string(),
            creator_id: creator_id.into(),
            user_id: None,
            email: None,
            role: None,
            clinic_id: None,
            team: None,
            created: now,
            modified: now,
            context: None,
            creator: Creator::default(),
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        self.user_id = (!user_id.is_empty()).then_some(user_id);
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        let email = email.into();
        self.email = (!email.trim().is_empty()).then_some(email);
        self
    }

    pub fn with_role(mut self, role: MemberRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_clinic(mut self, clinic_id: impl Into<String>) -> Self {
        self.clinic_id = Some(clinic_id.into());
        self
    }

    pub fn with_team(mut self, team: TeamRef) -> Self {
        self.team = Some(team);
        self
    }

    pub fn with_template(mut self, template_name: impl Into<String>) -> Self {
        self.template_name = template_name.into();
        self
    }

    pub fn with_creator(mut self, creator: Creator) -> Self {
        self.creator = creator;
        self
    }

    pub fn with_context<T: Serialize>(mut self, context: &T) -> Result<Self> {
        self.set_context(context)?;
        Ok(self)
    }

    pub fn set_context<T: Serialize>(&mut self, context: &T) -> Result<()> {
        self.context = Some(serde_json::to_value(context)?);
        Ok(())
    }

    /// Decodes `context` into the payload structure of this record's type.
    ///
    /// A missing context decodes from an empty object so payloads made of
    /// optional fields still load.
    pub fn decode_context<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self
            .context
            .clone()
            .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
        serde_json::from_value(value).map_err(|e| CoreError::invalid_context(self.kind.as_str(), e))
    }

    /// Checks the record-level invariants that must hold before persisting.
    pub fn validate(&self) -> Result<()> {
        crate::key::validate_key(&self.key)?;
        if self.user_id.is_none() && self.email.is_none() {
            return Err(CoreError::MissingRecipient);
        }
        Ok(())
    }

    pub fn is_pending(&self) -> bool {
        self.status == ConfirmationStatus::Pending
    }

    /// Moves a pending record to a terminal state and bumps `modified`.
    pub fn transition(&mut self, next: ConfirmationStatus, now: OffsetDateTime) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::invalid_transition(self.status, next));
        }
        self.status = next;
        self.touch(now);
        Ok(())
    }

    pub fn touch(&mut self, now: OffsetDateTime) {
        self.modified = now.max(self.created);
    }

    /// True when the record is addressed to this user id or any of these emails.
    pub fn is_addressed_to<S: AsRef<str>>(&self, user_id: &str, emails: &[S]) -> bool {
        if !user_id.is_empty() && self.user_id.as_deref() == Some(user_id) {
            return true;
        }
        match self.email.as_deref() {
            Some(email) => emails.iter().any(|e| e.as_ref().eq_ignore_ascii_case(email)),
            None => false,
        }
    }

    pub fn team_id(&self) -> Option<&str> {
        self.team.as_ref().map(|t| t.id.as_str())
    }
}

/// Canonical form used at the storage boundary for email comparisons.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
