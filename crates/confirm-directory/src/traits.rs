//! Contracts the confirmation engine relies on.
//!
//! Every call may fail with [`DirectoryError::Unavailable`] or
//! [`DirectoryError::NotFound`]; callers decide which failures are fatal.
//!
//! [`DirectoryError::Unavailable`]: crate::DirectoryError::Unavailable
//! [`DirectoryError::NotFound`]: crate::DirectoryError::NotFound

use async_trait::async_trait;
use confirm_core::Permissions;

use crate::error::Result;
use crate::types::{
    Clinic, ClinicPatient, Clinician, ClinicianFilter, DeviceSettings, ProfileData, ProfileKey,
    Team, TeamMember, TeamPatient, TokenData, User, UserUpdate,
};

#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Looks an account up by id or email.
    async fn get_user(&self, id_or_email: &str) -> Result<User>;

    /// Validates a session token. `Ok(None)` when the token is not valid.
    async fn authenticate(&self, token: &str) -> Result<Option<TokenData>>;

    async fn update_user(&self, user_id: &str, update: &UserUpdate) -> Result<()>;
}

#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn get(&self, user_id: &str, keys: &[ProfileKey]) -> Result<ProfileData>;

    /// Records the patient's answer to a team's remote-monitoring request.
    async fn set_monitoring_consent(&self, user_id: &str, team_id: &str, accepted: bool)
    -> Result<()>;
}

#[async_trait]
pub trait PermissionDirectory: Send + Sync {
    /// Permissions `user_id` holds over the data of `group_id`; empty when none.
    async fn permissions(&self, group_id: &str, user_id: &str) -> Result<Permissions>;

    /// Grants `grantee` the given permissions over the data of `owner`.
    async fn set_permissions(&self, grantee: &str, owner: &str, permissions: &Permissions)
    -> Result<()>;

    async fn get_team(&self, team_id: &str) -> Result<Team>;
    async fn add_team_member(&self, member: &TeamMember) -> Result<()>;
    async fn update_team_member(&self, member: &TeamMember) -> Result<()>;
    async fn remove_team_member(&self, team_id: &str, user_id: &str) -> Result<()>;
    async fn add_patient(&self, patient: &TeamPatient) -> Result<()>;
    async fn update_patient(&self, patient: &TeamPatient) -> Result<()>;
    async fn update_patient_monitoring(&self, patient: &TeamPatient) -> Result<()>;
    async fn get_team_patients(&self, team_id: &str) -> Result<Vec<TeamPatient>>;
}

#[async_trait]
pub trait ClinicDirectory: Send + Sync {
    async fn list_clinics(&self, share_code: Option<&str>, limit: u32) -> Result<Vec<Clinic>>;
    async fn get_clinic(&self, clinic_id: &str) -> Result<Clinic>;
    async fn list_clinicians(
        &self,
        clinic_id: &str,
        filter: &ClinicianFilter,
    ) -> Result<Vec<Clinician>>;
    async fn get_clinician(&self, clinic_id: &str, user_id: &str) -> Result<Clinician>;
    /// Creates an invited clinician (no user yet) keyed by `invite_id`.
    async fn create_clinician(&self, clinic_id: &str, clinician: &Clinician) -> Result<Clinician>;
    async fn get_invited_clinician(&self, clinic_id: &str, invite_id: &str) -> Result<Clinician>;
    async fn delete_invited_clinician(&self, clinic_id: &str, invite_id: &str) -> Result<()>;
    async fn associate_clinician_to_user(
        &self,
        clinic_id: &str,
        invite_id: &str,
        user_id: &str,
    ) -> Result<Clinician>;
    async fn create_patient_from_user(
        &self,
        clinic_id: &str,
        user_id: &str,
        permissions: &Permissions,
    ) -> Result<ClinicPatient>;
    async fn get_patient(&self, clinic_id: &str, user_id: &str) -> Result<ClinicPatient>;
}

#[async_trait]
pub trait MedicalDataDirectory: Send + Sync {
    async fn get_settings(&self, user_id: &str) -> Result<DeviceSettings>;
}
