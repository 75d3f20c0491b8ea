use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;

use super::ServiceClient;
use crate::error::{OptionalExt, Result};
use crate::traits::ProfileDirectory;
use crate::types::{ProfileData, ProfileKey};

/// Profile/preferences store client (`/{userId}/{collection}`).
pub struct HttpProfileDirectory {
    client: ServiceClient,
}

impl HttpProfileDirectory {
    pub(crate) fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ProfileDirectory for HttpProfileDirectory {
    async fn get(&self, user_id: &str, keys: &[ProfileKey]) -> Result<ProfileData> {
        let mut data = ProfileData::default();
        for key in keys {
            let url = self.client.url(&[user_id, key.as_str()])?;
            match key {
                ProfileKey::Profile => {
                    data.profile = self.client.get_json(url, user_id).await.optional()?;
                }
                ProfileKey::Preferences => {
                    data.preferences = self.client.get_json(url, user_id).await.optional()?;
                }
            }
        }
        Ok(data)
    }

    async fn set_monitoring_consent(
        &self,
        user_id: &str,
        team_id: &str,
        accepted: bool,
    ) -> Result<()> {
        let url = self
            .client
            .url(&[user_id, "consents", "monitoring", team_id])?;
        self.client
            .send_json(Method::PUT, url, &json!({ "accepted": accepted }), user_id)
            .await?;
        Ok(())
    }
}
