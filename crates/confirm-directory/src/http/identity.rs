use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::json;

use super::{ServiceClient, decode};
use crate::error::{DirectoryError, Result};
use crate::traits::IdentityDirectory;
use crate::types::{TokenData, User, UserUpdate};

/// Identity service client (`/user`, `/token`).
pub struct HttpIdentityDirectory {
    client: ServiceClient,
}

impl HttpIdentityDirectory {
    pub(crate) fn new(client: ServiceClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IdentityDirectory for HttpIdentityDirectory {
    async fn get_user(&self, id_or_email: &str) -> Result<User> {
        let url = self.client.url(&["user", id_or_email])?;
        self.client.get_json(url, id_or_email).await
    }

    async fn authenticate(&self, token: &str) -> Result<Option<TokenData>> {
        let url = self.client.url(&["token", token])?;
        let req = self.client.request(Method::GET, url).await?;
        let resp = req
            .send()
            .await
            .map_err(|e| DirectoryError::unavailable(self.client.service(), e.to_string()))?;

        match resp.status() {
            s if s.is_success() => decode(self.client.service(), resp).await.map(Some),
            StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => Ok(None),
            s => Err(DirectoryError::unavailable(
                self.client.service(),
                format!("token check failed with HTTP {s}"),
            )),
        }
    }

    async fn update_user(&self, user_id: &str, update: &UserUpdate) -> Result<()> {
        let url = self.client.url(&["user", user_id])?;
        self.client
            .send_json(Method::PUT, url, &json!({ "updates": update }), user_id)
            .await?;
        Ok(())
    }
}
