use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use super::{SERVER_NAME_HEADER, SERVER_SECRET_HEADER, SESSION_TOKEN_HEADER, parse_base};
use crate::error::{DirectoryError, Result};

/// This service's own token for calls to peer services.
///
/// Obtained from the identity service's `/serverlogin` and swapped in place
/// on refresh; readers never block.
pub struct ServerToken {
    http: reqwest::Client,
    login_url: Option<Url>,
    name: String,
    secret: String,
    current: ArcSwapOption<String>,
}

impl std::fmt::Debug for ServerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerToken")
            .field("name", &self.name)
            .field("has_token", &self.current.load().is_some())
            .finish()
    }
}

impl ServerToken {
    pub fn new(http: reqwest::Client, auth_url: &str, name: &str, secret: &str) -> Result<Self> {
        let mut login_url = parse_base("identity", auth_url)?;
        login_url
            .path_segments_mut()
            .map_err(|_| DirectoryError::unavailable("identity", "base URL cannot be a base"))?
            .pop_if_empty()
            .push("serverlogin");
        Ok(Self {
            http,
            login_url: Some(login_url),
            name: name.to_string(),
            secret: secret.to_string(),
            current: ArcSwapOption::empty(),
        })
    }

    /// A token that is never refreshed.
    pub fn fixed(token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            login_url: None,
            name: String::new(),
            secret: String::new(),
            current: ArcSwapOption::from_pointee(token.into()),
        }
    }

    /// Current token, logging in first when none is held.
    pub async fn get(&self) -> Result<Arc<String>> {
        if let Some(token) = self.current.load_full() {
            return Ok(token);
        }
        self.refresh().await
    }

    /// Forgets the held token so the next call logs in again.
    pub fn invalidate(&self) {
        if self.login_url.is_some() {
            self.current.store(None);
        }
    }

    pub async fn refresh(&self) -> Result<Arc<String>> {
        let Some(url) = self.login_url.clone() else {
            return self
                .current
                .load_full()
                .ok_or_else(|| DirectoryError::unavailable("identity", "no server token"));
        };

        let resp = self
            .http
            .post(url)
            .header(SERVER_NAME_HEADER, &self.name)
            .header(SERVER_SECRET_HEADER, &self.secret)
            .send()
            .await
            .map_err(|e| DirectoryError::unavailable("identity", e.to_string()))?;

        if !resp.status().is_success() {
            return Err(DirectoryError::unavailable(
                "identity",
                format!("server login failed with HTTP {}", resp.status()),
            ));
        }

        let token = resp
            .headers()
            .get(SESSION_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| DirectoryError::invalid_response("identity", "server login returned no token"))?
            .to_string();

        let token = Arc::new(token);
        self.current.store(Some(token.clone()));
        debug!(server = %self.name, "Obtained server token");
        Ok(token)
    }

    /// Refreshes the token on a fixed interval until the task is aborted.
    pub fn spawn_refresh(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                if let Err(e) = this.refresh().await {
                    warn!(error = %e, "Server token refresh failed");
                }
            }
        })
    }
}
