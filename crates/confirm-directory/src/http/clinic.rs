use async_trait::async_trait;
use confirm_core::Permissions;
use reqwest::Method;
use serde_json::json;

use super::{ServiceClient, decode};
use crate::error::Result;
use crate::traits::ClinicDirectory;
use crate::types::{Clinic, ClinicPatient, Clinician, ClinicianFilter};

/// Clinic service client (`/v1/clinics/…`).
pub struct HttpClinicDirectory {
    client: ServiceClient,
}

impl HttpClinicDirectory {
    pub(crate) fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClinicDirectory for HttpClinicDirectory {
    async fn list_clinics(&self, share_code: Option<&str>, limit: u32) -> Result<Vec<Clinic>> {
        let mut url = self.client.url(&["v1", "clinics"])?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(code) = share_code {
                query.append_pair("shareCode", code);
            }
            query.append_pair("limit", &limit.to_string());
        }
        self.client.get_json(url, "clinics").await
    }

    async fn get_clinic(&self, clinic_id: &str) -> Result<Clinic> {
        let url = self.client.url(&["v1", "clinics", clinic_id])?;
        self.client.get_json(url, clinic_id).await
    }

    async fn list_clinicians(
        &self,
        clinic_id: &str,
        filter: &ClinicianFilter,
    ) -> Result<Vec<Clinician>> {
        let mut url = self.client.url(&["v1", "clinics", clinic_id, "clinicians"])?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(email) = &filter.email {
                query.append_pair("email", email);
            }
            if let Some(role) = &filter.role {
                query.append_pair("role", role);
            }
            if let Some(limit) = filter.limit {
                query.append_pair("limit", &limit.to_string());
            }
        }
        let mut clinicians: Vec<Clinician> = self.client.get_json(url, clinic_id).await?;
        for c in &mut clinicians {
            if c.clinic_id.is_empty() {
                c.clinic_id = clinic_id.to_string();
            }
        }
        Ok(clinicians)
    }

    async fn get_clinician(&self, clinic_id: &str, user_id: &str) -> Result<Clinician> {
        let url = self
            .client
            .url(&["v1", "clinics", clinic_id, "clinicians", user_id])?;
        self.client.get_json(url, user_id).await
    }

    async fn create_clinician(&self, clinic_id: &str, clinician: &Clinician) -> Result<Clinician> {
        let url = self.client.url(&["v1", "clinics", clinic_id, "clinicians"])?;
        let resp = self
            .client
            .send_json(Method::POST, url, clinician, clinic_id)
            .await?;
        decode(self.client.service(), resp).await
    }

    async fn get_invited_clinician(&self, clinic_id: &str, invite_id: &str) -> Result<Clinician> {
        let url = self.client.url(&[
            "v1",
            "clinics",
            clinic_id,
            "invites",
            "clinicians",
            invite_id,
            "clinician",
        ])?;
        self.client.get_json(url, invite_id).await
    }

    async fn delete_invited_clinician(&self, clinic_id: &str, invite_id: &str) -> Result<()> {
        let url = self.client.url(&[
            "v1",
            "clinics",
            clinic_id,
            "invites",
            "clinicians",
            invite_id,
            "clinician",
        ])?;
        let req = self.client.request(Method::DELETE, url).await?;
        self.client.send(req, invite_id).await?;
        Ok(())
    }

    async fn associate_clinician_to_user(
        &self,
        clinic_id: &str,
        invite_id: &str,
        user_id: &str,
    ) -> Result<Clinician> {
        let url = self.client.url(&[
            "v1",
            "clinics",
            clinic_id,
            "invites",
            "clinicians",
            invite_id,
            "clinician",
        ])?;
        let resp = self
            .client
            .send_json(Method::PATCH, url, &json!({ "userId": user_id }), invite_id)
            .await?;
        decode(self.client.service(), resp).await
    }

    async fn create_patient_from_user(
        &self,
        clinic_id: &str,
        user_id: &str,
        permissions: &Permissions,
    ) -> Result<ClinicPatient> {
        let url = self
            .client
            .url(&["v1", "clinics", clinic_id, "patients", user_id, "from_user"])?;
        let resp = self
            .client
            .send_json(
                Method::POST,
                url,
                &json!({ "permissions": permissions }),
                user_id,
            )
            .await?;
        decode(self.client.service(), resp).await
    }

    async fn get_patient(&self, clinic_id: &str, user_id: &str) -> Result<ClinicPatient> {
        let url = self
            .client
            .url(&["v1", "clinics", clinic_id, "patients", user_id])?;
        self.client.get_json(url, user_id).await
    }
}
