use async_trait::async_trait;

use super::ServiceClient;
use crate::error::Result;
use crate::traits::MedicalDataDirectory;
use crate::types::DeviceSettings;

/// Device data service client.
pub struct HttpMedicalDataDirectory {
    client: ServiceClient,
}

impl HttpMedicalDataDirectory {
    pub(crate) fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MedicalDataDirectory for HttpMedicalDataDirectory {
    async fn get_settings(&self, user_id: &str) -> Result<DeviceSettings> {
        let url = self.client.url(&["v1", "users", user_id, "settings"])?;
        self.client.get_json(url, user_id).await
    }
}
