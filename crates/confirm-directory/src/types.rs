//! Records exchanged with the directory services.

use confirm_core::{MemberRole, Permissions, normalize_email};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const ROLE_CLINIC: &str = "clinic";
pub const ROLE_HCP: &str = "hcp";
pub const ROLE_CAREGIVER: &str = "caregiver";
pub const ROLE_PATIENT: &str = "patient";
pub const CLINIC_ADMIN: &str = "CLINIC_ADMIN";

/// An account in the identity service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "userid", alias = "userId")]
    pub user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub email_verified: bool,
    /// Accounts created on behalf of a patient have no password yet.
    #[serde(default = "default_true")]
    pub password_exists: bool,
}

fn default_true() -> bool {
    true
}

impl User {
    pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        let email = email.into();
        Self {
            user_id: user_id.into(),
            username: Some(email.clone()),
            emails: vec![email],
            roles: Vec::new(),
            email_verified: true,
            password_exists: true,
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    /// Clinicians and other healthcare professionals.
    pub fn is_clinical(&self) -> bool {
        self.has_role(ROLE_CLINIC) || self.has_role(ROLE_HCP)
    }

    pub fn is_patient(&self) -> bool {
        self.has_role(ROLE_PATIENT) || (!self.is_clinical() && !self.has_role(ROLE_CAREGIVER))
    }

    /// First email, or the username when no email is recorded.
    pub fn primary_email(&self) -> Option<&str> {
        self.emails
            .first()
            .map(String::as_str)
            .or(self.username.as_deref())
    }

    pub fn owns_email(&self, email: &str) -> bool {
        let email = normalize_email(email);
        self.emails.iter().any(|e| normalize_email(e) == email)
            || self
                .username
                .as_deref()
                .is_some_and(|u| normalize_email(u) == email)
    }
}

/// Result of validating a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenData {
    #[serde(rename = "userid", alias = "userId")]
    pub user_id: String,
    #[serde(rename = "isserver", alias = "isServer", default)]
    pub is_server: bool,
    #[serde(default)]
    pub role: Option<String>,
}

/// Partial account update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientProfile {
    #[serde(default)]
    pub birthday: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub patient: Option<PatientProfile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default)]
    pub display_language_code: Option<String>,
}

/// Profile documents stored for a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileData {
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub preferences: Option<Preferences>,
}

impl ProfileData {
    pub fn full_name(&self) -> Option<&str> {
        self.profile.as_ref()?.full_name.as_deref()
    }

    pub fn language(&self) -> Option<&str> {
        self.preferences
            .as_ref()?
            .display_language_code
            .as_deref()
            .filter(|l| !l.is_empty())
    }

    pub fn birthday(&self) -> Option<&str> {
        self.profile.as_ref()?.patient.as_ref()?.birthday.as_deref()
    }
}

/// Which profile documents to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKey {
    Profile,
    Preferences,
}

impl ProfileKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::Preferences => "preferences",
        }
    }
}

/// Invitation state of a team membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMonitoring {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub team_id: String,
    pub user_id: String,
    pub role: MemberRole,
    pub invitation_status: InvitationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl TeamMember {
    pub fn is_admin(&self) -> bool {
        self.role == MemberRole::Admin && self.invitation_status == InvitationStatus::Accepted
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientMonitoring {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<InvitationStatus>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub monitoring_end: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamPatient {
    pub team_id: String,
    pub user_id: String,
    pub invitation_status: InvitationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<PatientMonitoring>,
}

/// A medical team with its professional members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub members: Vec<TeamMember>,
    #[serde(default)]
    pub monitoring: Option<TeamMonitoring>,
}

impl Team {
    pub fn member(&self, user_id: &str) -> Option<&TeamMember> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.member(user_id).is_some_and(TeamMember::is_admin)
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring.as_ref().is_some_and(|m| m.enabled)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuppressedNotifications {
    #[serde(default)]
    pub patient_clinic_invitation: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clinic {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub share_code: Option<String>,
    #[serde(default)]
    pub suppressed_notifications: Option<SuppressedNotifications>,
}

impl Clinic {
    pub fn suppresses_patient_invitations(&self) -> bool {
        self.suppressed_notifications
            .as_ref()
            .is_some_and(|s| s.patient_clinic_invitation)
    }
}

/// A clinician record, or a pending clinician invitation when `user_id` is unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clinician {
    #[serde(default)]
    pub clinic_id: String,
    #[serde(default, rename = "id", alias = "userId")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub invite_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Clinician {
    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == CLINIC_ADMIN)
    }
}

/// Sparse clinician lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClinicianFilter {
    pub email: Option<String>,
    pub role: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClinicPatient {
    pub clinic_id: String,
    #[serde(rename = "id", alias = "userId")]
    pub user_id: String,
    #[serde(default)]
    pub permissions: Permissions,
}

/// Device settings kept by the data service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSettings {
    #[serde(default)]
    pub imei: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}
