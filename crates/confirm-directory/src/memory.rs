//! In-process directories for development runs and tests.
//!
//! One [`MemoryDirectory`] implements every directory trait. Mutating calls
//! are recorded so tests can assert on side effects, and any operation can
//! be switched to fail with `Unavailable`.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use confirm_core::{Permissions, normalize_email};
use dashmap::{DashMap, DashSet};

use crate::error::{DirectoryError, Result};
use crate::traits::{
    ClinicDirectory, IdentityDirectory, MedicalDataDirectory, PermissionDirectory,
    ProfileDirectory,
};
use crate::types::{
    Clinic, ClinicPatient, Clinician, ClinicianFilter, DeviceSettings, ProfileData, ProfileKey,
    Team, TeamMember, TeamPatient, TokenData, User, UserUpdate,
};

#[derive(Debug, Default)]
struct Inner {
    users: DashMap<String, User>,
    tokens: DashMap<String, TokenData>,
    profiles: DashMap<String, ProfileData>,
    consents: DashMap<(String, String), bool>,
    permissions: DashMap<(String, String), Permissions>,
    teams: DashMap<String, Team>,
    team_patients: DashMap<(String, String), TeamPatient>,
    clinics: DashMap<String, Clinic>,
    clinicians: DashMap<String, Vec<Clinician>>,
    clinic_patients: DashMap<(String, String), ClinicPatient>,
    settings: DashMap<String, DeviceSettings>,
    failing: DashSet<String>,
    calls: Mutex<Vec<String>>,
}

/// Every directory, held in memory. Cloning shares state.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    inner: Arc<Inner>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- seeding -------------------------------------------------------

    pub fn add_user(&self, user: User) {
        self.inner.users.insert(user.user_id.clone(), user);
    }

    /// Registers a session token for an existing user.
    pub fn add_session(&self, token: impl Into<String>, user_id: impl Into<String>) {
        let user_id = user_id.into();
        let role = self
            .inner
            .users
            .get(&user_id)
            .and_then(|u| u.roles.first().cloned());
        self.inner.tokens.insert(
            token.into(),
            TokenData {
                user_id,
                is_server: false,
                role,
            },
        );
    }

    /// Registers a token belonging to a peer service.
    pub fn add_server_session(&self, token: impl Into<String>, name: impl Into<String>) {
        self.inner.tokens.insert(
            token.into(),
            TokenData {
                user_id: name.into(),
                is_server: true,
                role: None,
            },
        );
    }

    pub fn set_profile(&self, user_id: impl Into<String>, data: ProfileData) {
        self.inner.profiles.insert(user_id.into(), data);
    }

    pub fn grant(&self, group_id: &str, user_id: &str, permissions: Permissions) {
        self.inner
            .permissions
            .insert((group_id.to_string(), user_id.to_string()), permissions);
    }

    pub fn add_team(&self, team: Team) {
        self.inner.teams.insert(team.id.clone(), team);
    }

    pub fn add_clinic(&self, clinic: Clinic) {
        self.inner.clinics.insert(clinic.id.clone(), clinic);
    }

    pub fn add_clinician(&self, clinician: Clinician) {
        self.inner
            .clinicians
            .entry(clinician.clinic_id.clone())
            .or_default()
            .push(clinician);
    }

    pub fn set_device_settings(&self, user_id: impl Into<String>, settings: DeviceSettings) {
        self.inner.settings.insert(user_id.into(), settings);
    }

    /// Makes `operation` (a trait method name) fail with `Unavailable`.
    pub fn fail(&self, operation: &str) {
        self.inner.failing.insert(operation.to_string());
    }

    pub fn recover(&self, operation: &str) {
        self.inner.failing.remove(operation);
    }

    // ---- inspection ----------------------------------------------------

    /// Mutating calls seen so far, e.g. `set_permissions B A`.
    pub fn calls(&self) -> Vec<String> {
        self.inner
            .calls
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub fn user(&self, user_id: &str) -> Option<User> {
        self.inner.users.get(user_id).map(|u| u.clone())
    }

    pub fn granted(&self, group_id: &str, user_id: &str) -> Option<Permissions> {
        self.inner
            .permissions
            .get(&(group_id.to_string(), user_id.to_string()))
            .map(|p| p.clone())
    }

    pub fn team(&self, team_id: &str) -> Option<Team> {
        self.inner.teams.get(team_id).map(|t| t.clone())
    }

    pub fn team_patient(&self, team_id: &str, user_id: &str) -> Option<TeamPatient> {
        self.inner
            .team_patients
            .get(&(team_id.to_string(), user_id.to_string()))
            .map(|p| p.clone())
    }

    pub fn clinic_patient(&self, clinic_id: &str, user_id: &str) -> Option<ClinicPatient> {
        self.inner
            .clinic_patients
            .get(&(clinic_id.to_string(), user_id.to_string()))
            .map(|p| p.clone())
    }

    pub fn clinicians_of(&self, clinic_id: &str) -> Vec<Clinician> {
        self.inner
            .clinicians
            .get(clinic_id)
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub fn consent(&self, user_id: &str, team_id: &str) -> Option<bool> {
        self.inner
            .consents
            .get(&(user_id.to_string(), team_id.to_string()))
            .map(|c| *c)
    }

    fn check(&self, service: &'static str, operation: &str) -> Result<()> {
        if self.inner.failing.contains(operation) {
            return Err(DirectoryError::unavailable(
                service,
                format!("{operation} is failing"),
            ));
        }
        Ok(())
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.inner.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl IdentityDirectory for MemoryDirectory {
    async fn get_user(&self, id_or_email: &str) -> Result<User> {
        self.check("identity", "get_user")?;
        if let Some(user) = self.inner.users.get(id_or_email) {
            return Ok(user.clone());
        }
        self.inner
            .users
            .iter()
            .find(|u| u.owns_email(id_or_email))
            .map(|u| u.clone())
            .ok_or_else(|| DirectoryError::not_found("identity", id_or_email))
    }

    async fn authenticate(&self, token: &str) -> Result<Option<TokenData>> {
        self.check("identity", "authenticate")?;
        Ok(self.inner.tokens.get(token).map(|t| t.clone()))
    }

    async fn update_user(&self, user_id: &str, update: &UserUpdate) -> Result<()> {
        self.check("identity", "update_user")?;
        let mut user = self
            .inner
            .users
            .get_mut(user_id)
            .ok_or_else(|| DirectoryError::not_found("identity", user_id))?;
        if let Some(verified) = update.email_verified {
            user.email_verified = verified;
        }
        if update.password.is_some() {
            user.password_exists = true;
        }
        drop(user);
        self.record(format!("update_user {user_id}"));
        Ok(())
    }
}

#[async_trait]
impl ProfileDirectory for MemoryDirectory {
    async fn get(&self, user_id: &str, keys: &[ProfileKey]) -> Result<ProfileData> {
        self.check("profile", "get")?;
        let stored = self
            .inner
            .profiles
            .get(user_id)
            .map(|p| p.clone())
            .unwrap_or_default();
        Ok(ProfileData {
            profile: stored
                .profile
                .filter(|_| keys.contains(&ProfileKey::Profile)),
            preferences: stored
                .preferences
                .filter(|_| keys.contains(&ProfileKey::Preferences)),
        })
    }

    async fn set_monitoring_consent(
        &self,
        user_id: &str,
        team_id: &str,
        accepted: bool,
    ) -> Result<()> {
        self.check("profile", "set_monitoring_consent")?;
        self.inner
            .consents
            .insert((user_id.to_string(), team_id.to_string()), accepted);
        self.record(format!("set_monitoring_consent {user_id} {team_id} {accepted}"));
        Ok(())
    }
}

#[async_trait]
impl PermissionDirectory for MemoryDirectory {
    async fn permissions(&self, group_id: &str, user_id: &str) -> Result<Permissions> {
        self.check("permission", "permissions")?;
        Ok(self.granted(group_id, user_id).unwrap_or_default())
    }

    async fn set_permissions(
        &self,
        grantee: &str,
        owner: &str,
        permissions: &Permissions,
    ) -> Result<()> {
        self.check("permission", "set_permissions")?;
        self.grant(owner, grantee, permissions.clone());
        self.record(format!("set_permissions {grantee} {owner}"));
        Ok(())
    }

    async fn get_team(&self, team_id: &str) -> Result<Team> {
        self.check("permission", "get_team")?;
        self.team(team_id)
            .ok_or_else(|| DirectoryError::not_found("permission", team_id))
    }

    async fn add_team_member(&self, member: &TeamMember) -> Result<()> {
        self.check("permission", "add_team_member")?;
        let mut team = self
            .inner
            .teams
            .get_mut(&member.team_id)
            .ok_or_else(|| DirectoryError::not_found("permission", &member.team_id))?;
        team.members.retain(|m| m.user_id != member.user_id);
        team.members.push(member.clone());
        drop(team);
        self.record(format!("add_team_member {} {}", member.team_id, member.user_id));
        Ok(())
    }

    async fn update_team_member(&self, member: &TeamMember) -> Result<()> {
        self.check("permission", "update_team_member")?;
        let mut team = self
            .inner
            .teams
            .get_mut(&member.team_id)
            .ok_or_else(|| DirectoryError::not_found("permission", &member.team_id))?;
        let existing = team
            .members
            .iter_mut()
            .find(|m| m.user_id == member.user_id)
            .ok_or_else(|| DirectoryError::not_found("permission", &member.user_id))?;
        *existing = member.clone();
        drop(team);
        self.record(format!(
            "update_team_member {} {}",
            member.team_id, member.user_id
        ));
        Ok(())
    }

    async fn remove_team_member(&self, team_id: &str, user_id: &str) -> Result<()> {
        self.check("permission", "remove_team_member")?;
        let mut team = self
            .inner
            .teams
            .get_mut(team_id)
            .ok_or_else(|| DirectoryError::not_found("permission", team_id))?;
        let before = team.members.len();
        team.members.retain(|m| m.user_id != user_id);
        let removed = team.members.len() < before;
        drop(team);
        if !removed {
            return Err(DirectoryError::not_found("permission", user_id));
        }
        self.record(format!("remove_team_member {team_id} {user_id}"));
        Ok(())
    }

    async fn add_patient(&self, patient: &TeamPatient) -> Result<()> {
        self.check("permission", "add_patient")?;
        self.inner.team_patients.insert(
            (patient.team_id.clone(), patient.user_id.clone()),
            patient.clone(),
        );
        self.record(format!("add_patient {} {}", patient.team_id, patient.user_id));
        Ok(())
    }

    async fn update_patient(&self, patient: &TeamPatient) -> Result<()> {
        self.check("permission", "update_patient")?;
        let key = (patient.team_id.clone(), patient.user_id.clone());
        if !self.inner.team_patients.contains_key(&key) {
            return Err(DirectoryError::not_found("permission", &patient.user_id));
        }
        self.inner.team_patients.insert(key, patient.clone());
        self.record(format!(
            "update_patient {} {}",
            patient.team_id, patient.user_id
        ));
        Ok(())
    }

    async fn update_patient_monitoring(&self, patient: &TeamPatient) -> Result<()> {
        self.check("permission", "update_patient_monitoring")?;
        let key = (patient.team_id.clone(), patient.user_id.clone());
        let mut existing = self
            .inner
            .team_patients
            .get_mut(&key)
            .ok_or_else(|| DirectoryError::not_found("permission", &patient.user_id))?;
        existing.monitoring = patient.monitoring.clone();
        drop(existing);
        self.record(format!(
            "update_patient_monitoring {} {}",
            patient.team_id, patient.user_id
        ));
        Ok(())
    }

    async fn get_team_patients(&self, team_id: &str) -> Result<Vec<TeamPatient>> {
        self.check("permission", "get_team_patients")?;
        Ok(self
            .inner
            .team_patients
            .iter()
            .filter(|p| p.team_id == team_id)
            .map(|p| p.clone())
            .collect())
    }
}

#[async_trait]
impl ClinicDirectory for MemoryDirectory {
    async fn list_clinics(&self, share_code: Option<&str>, limit: u32) -> Result<Vec<Clinic>> {
        self.check("clinic", "list_clinics")?;
        Ok(self
            .inner
            .clinics
            .iter()
            .filter(|c| share_code.is_none() || c.share_code.as_deref() == share_code)
            .map(|c| c.clone())
            .take(limit as usize)
            .collect())
    }

    async fn get_clinic(&self, clinic_id: &str) -> Result<Clinic> {
        self.check("clinic", "get_clinic")?;
        self.inner
            .clinics
            .get(clinic_id)
            .map(|c| c.clone())
            .ok_or_else(|| DirectoryError::not_found("clinic", clinic_id))
    }

    async fn list_clinicians(
        &self,
        clinic_id: &str,
        filter: &ClinicianFilter,
    ) -> Result<Vec<Clinician>> {
        self.check("clinic", "list_clinicians")?;
        let email = filter.email.as_deref().map(normalize_email);
        let found = self
            .clinicians_of(clinic_id)
            .into_iter()
            .filter(|c| {
                email.as_deref().is_none_or(|want| {
                    c.email.as_deref().map(normalize_email).as_deref() == Some(want)
                })
            })
            .filter(|c| {
                filter
                    .role
                    .as_deref()
                    .is_none_or(|role| c.roles.iter().any(|r| r == role))
            })
            .take(filter.limit.map_or(usize::MAX, |l| l as usize))
            .collect();
        Ok(found)
    }

    async fn get_clinician(&self, clinic_id: &str, user_id: &str) -> Result<Clinician> {
        self.check("clinic", "get_clinician")?;
        self.clinicians_of(clinic_id)
            .into_iter()
            .find(|c| c.user_id.as_deref() == Some(user_id))
            .ok_or_else(|| DirectoryError::not_found("clinic", user_id))
    }

    async fn create_clinician(&self, clinic_id: &str, clinician: &Clinician) -> Result<Clinician> {
        self.check("clinic", "create_clinician")?;
        let mut created = clinician.clone();
        created.clinic_id = clinic_id.to_string();
        self.add_clinician(created.clone());
        self.record(format!(
            "create_clinician {clinic_id} {}",
            created.invite_id.as_deref().unwrap_or_default()
        ));
        Ok(created)
    }

    async fn get_invited_clinician(&self, clinic_id: &str, invite_id: &str) -> Result<Clinician> {
        self.check("clinic", "get_invited_clinician")?;
        self.clinicians_of(clinic_id)
            .into_iter()
            .find(|c| c.invite_id.as_deref() == Some(invite_id) && c.user_id.is_none())
            .ok_or_else(|| DirectoryError::not_found("clinic", invite_id))
    }

    async fn delete_invited_clinician(&self, clinic_id: &str, invite_id: &str) -> Result<()> {
        self.check("clinic", "delete_invited_clinician")?;
        let removed = match self.inner.clinicians.get_mut(clinic_id) {
            Some(mut list) => {
                let before = list.len();
                list.retain(|c| !(c.invite_id.as_deref() == Some(invite_id) && c.user_id.is_none()));
                list.len() < before
            }
            None => false,
        };
        if !removed {
            return Err(DirectoryError::not_found("clinic", invite_id));
        }
        self.record(format!("delete_invited_clinician {clinic_id} {invite_id}"));
        Ok(())
    }

    async fn associate_clinician_to_user(
        &self,
        clinic_id: &str,
        invite_id: &str,
        user_id: &str,
    ) -> Result<Clinician> {
        self.check("clinic", "associate_clinician_to_user")?;
        let mut list = self
            .inner
            .clinicians
            .get_mut(clinic_id)
            .ok_or_else(|| DirectoryError::not_found("clinic", clinic_id))?;
        let clinician = list
            .iter_mut()
            .find(|c| c.invite_id.as_deref() == Some(invite_id) && c.user_id.is_none())
            .ok_or_else(|| DirectoryError::not_found("clinic", invite_id))?;
        clinician.user_id = Some(user_id.to_string());
        let associated = clinician.clone();
        drop(list);
        self.record(format!(
            "associate_clinician_to_user {clinic_id} {invite_id} {user_id}"
        ));
        Ok(associated)
    }

    async fn create_patient_from_user(
        &self,
        clinic_id: &str,
        user_id: &str,
        permissions: &Permissions,
    ) -> Result<ClinicPatient> {
        self.check("clinic", "create_patient_from_user")?;
        let patient = ClinicPatient {
            clinic_id: clinic_id.to_string(),
            user_id: user_id.to_string(),
            permissions: permissions.clone(),
        };
        self.inner.clinic_patients.insert(
            (clinic_id.to_string(), user_id.to_string()),
            patient.clone(),
        );
        self.record(format!("create_patient_from_user {clinic_id} {user_id}"));
        Ok(patient)
    }

    async fn get_patient(&self, clinic_id: &str, user_id: &str) -> Result<ClinicPatient> {
        self.check("clinic", "get_patient")?;
        self.clinic_patient(clinic_id, user_id)
            .ok_or_else(|| DirectoryError::not_found("clinic", user_id))
    }
}

#[async_trait]
impl MedicalDataDirectory for MemoryDirectory {
    async fn get_settings(&self, user_id: &str) -> Result<DeviceSettings> {
        self.check("data", "get_settings")?;
        self.inner
            .settings
            .get(user_id)
            .map(|s| s.clone())
            .ok_or_else(|| DirectoryError::not_found("data", user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InvitationStatus;
    use confirm_core::MemberRole;
    use serde_json::json;

    #[tokio::test]
    async fn users_resolve_by_id_or_email() {
        let dir = MemoryDirectory::new();
        dir.add_user(User::new("B", "Bob@X.org"));
        assert_eq!(dir.get_user("B").await.unwrap().user_id, "B");
        assert_eq!(dir.get_user("bob@x.org").await.unwrap().user_id, "B");
        assert!(dir.get_user("eve@x.org").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn set_permissions_is_recorded() {
        let dir = MemoryDirectory::new();
        let mut perms = Permissions::new();
        perms.insert("view".into(), json!({}));
        dir.set_permissions("B", "A", &perms).await.unwrap();
        assert_eq!(dir.permissions("A", "B").await.unwrap(), perms);
        assert_eq!(dir.calls(), vec!["set_permissions B A".to_string()]);
    }

    #[tokio::test]
    async fn failing_operations_report_unavailable() {
        let dir = MemoryDirectory::new();
        dir.fail("get_settings");
        let err = dir.get_settings("P").await.unwrap_err();
        assert!(matches!(err, DirectoryError::Unavailable { .. }));
        dir.recover("get_settings");
        assert!(dir.get_settings("P").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn team_membership_lifecycle() {
        let dir = MemoryDirectory::new();
        dir.add_team(Team {
            id: "T".into(),
            name: "Team".into(),
            members: Vec::new(),
            monitoring: None,
        });
        let mut member = TeamMember {
            team_id: "T".into(),
            user_id: "B".into(),
            role: MemberRole::Member,
            invitation_status: InvitationStatus::Pending,
            email: None,
        };
        dir.add_team_member(&member).await.unwrap();
        member.invitation_status = InvitationStatus::Accepted;
        dir.update_team_member(&member).await.unwrap();
        assert_eq!(
            dir.team("T").unwrap().member("B").unwrap().invitation_status,
            InvitationStatus::Accepted
        );
        dir.remove_team_member("T", "B").await.unwrap();
        assert!(dir.remove_team_member("T", "B").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn invited_clinician_can_be_associated_once() {
        let dir = MemoryDirectory::new();
        dir.create_clinician(
            "C",
            &Clinician {
                invite_id: Some("K".into()),
                email: Some("doc@x.org".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let found = dir
            .list_clinicians(
                "C",
                &ClinicianFilter {
                    email: Some("DOC@x.org".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        dir.associate_clinician_to_user("C", "K", "D").await.unwrap();
        assert_eq!(dir.get_clinician("C", "D").await.unwrap().invite_id.as_deref(), Some("K"));
        assert!(dir.get_invited_clinician("C", "K").await.unwrap_err().is_not_found());
    }
}
