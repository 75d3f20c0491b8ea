use async_trait::async_trait;
use confirm_core::Permissions;
use reqwest::Method;

use super::ServiceClient;
use crate::error::{OptionalExt, Result};
use crate::traits::PermissionDirectory;
use crate::types::{Team, TeamMember, TeamPatient};

/// Permission and team membership service client.
///
/// `/access/{groupId}/{userId}` for data-sharing grants, `/teams/{teamId}/…`
/// for medical teams.
pub struct HttpPermissionDirectory {
    client: ServiceClient,
}

impl HttpPermissionDirectory {
    pub(crate) fn new(client: ServiceClient) -> Self {
        Self { client }
    }

    async fn write<B: serde::Serialize + Sync + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        body: &B,
        what: &str,
    ) -> Result<()> {
        let url = self.client.url(segments)?;
        self.client.send_json(method, url, body, what).await?;
        Ok(())
    }
}

#[async_trait]
impl PermissionDirectory for HttpPermissionDirectory {
    async fn permissions(&self, group_id: &str, user_id: &str) -> Result<Permissions> {
        let url = self.client.url(&["access", group_id, user_id])?;
        Ok(self
            .client
            .get_json(url, user_id)
            .await
            .optional()?
            .unwrap_or_default())
    }

    async fn set_permissions(
        &self,
        grantee: &str,
        owner: &str,
        permissions: &Permissions,
    ) -> Result<()> {
        self.write(Method::POST, &["access", owner, grantee], permissions, grantee)
            .await
    }

    async fn get_team(&self, team_id: &str) -> Result<Team> {
        let url = self.client.url(&["teams", team_id])?;
        self.client.get_json(url, team_id).await
    }

    async fn add_team_member(&self, member: &TeamMember) -> Result<()> {
        self.write(
            Method::POST,
            &["teams", member.team_id.as_str(), "members"],
            member,
            &member.user_id,
        )
        .await
    }

    async fn update_team_member(&self, member: &TeamMember) -> Result<()> {
        self.write(
            Method::PUT,
            &["teams", member.team_id.as_str(), "members", member.user_id.as_str()],
            member,
            &member.user_id,
        )
        .await
    }

    async fn remove_team_member(&self, team_id: &str, user_id: &str) -> Result<()> {
        let url = self.client.url(&["teams", team_id, "members", user_id])?;
        let req = self.client.request(Method::DELETE, url).await?;
        self.client.send(req, user_id).await?;
        Ok(())
    }

    async fn add_patient(&self, patient: &TeamPatient) -> Result<()> {
        self.write(
            Method::POST,
            &["teams", patient.team_id.as_str(), "patients"],
            patient,
            &patient.user_id,
        )
        .await
    }

    async fn update_patient(&self, patient: &TeamPatient) -> Result<()> {
        self.write(
            Method::PUT,
            &["teams", patient.team_id.as_str(), "patients", patient.user_id.as_str()],
            patient,
            &patient.user_id,
        )
        .await
    }

    async fn update_patient_monitoring(&self, patient: &TeamPatient) -> Result<()> {
        self.write(
            Method::PUT,
            &[
                "teams",
                patient.team_id.as_str(),
                "patients",
                patient.user_id.as_str(),
                "monitoring",
            ],
            patient,
            &patient.user_id,
        )
        .await
    }

    async fn get_team_patients(&self, team_id: &str) -> Result<Vec<TeamPatient>> {
        let url = self.client.url(&["teams", team_id, "patients"])?;
        self.client.get_json(url, team_id).await
    }
}
