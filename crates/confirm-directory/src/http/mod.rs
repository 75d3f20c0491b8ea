//! `reqwest` clients for the peer directory services.

mod clinic;
mod data;
mod identity;
mod permission;
mod profile;
mod token;

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

pub use clinic::HttpClinicDirectory;
pub use data::HttpMedicalDataDirectory;
pub use identity::HttpIdentityDirectory;
pub use permission::HttpPermissionDirectory;
pub use profile::HttpProfileDirectory;
pub use token::ServerToken;

use crate::Directories;
use crate::error::{DirectoryError, Result};

/// Header carrying session and server tokens between services.
pub const SESSION_TOKEN_HEADER: &str = "x-tidepool-session-token";
pub const SERVER_NAME_HEADER: &str = "x-tidepool-server-name";
pub const SERVER_SECRET_HEADER: &str = "x-tidepool-server-secret";

/// Base URLs and credentials for the peer services.
#[derive(Debug, Clone)]
pub struct HttpDirectoryConfig {
    pub auth_url: String,
    pub profile_url: String,
    pub permission_url: String,
    pub clinic_url: String,
    pub data_url: String,
    pub server_name: String,
    pub server_secret: String,
    /// Per-call timeout.
    pub timeout: Duration,
}

/// Shared plumbing for one peer service.
#[derive(Clone)]
pub(crate) struct ServiceClient {
    service: &'static str,
    http: reqwest::Client,
    base: Url,
    token: Arc<ServerToken>,
}

impl ServiceClient {
    pub(crate) fn new(
        service: &'static str,
        http: reqwest::Client,
        base_url: &str,
        token: Arc<ServerToken>,
    ) -> Result<Self> {
        let base = parse_base(service, base_url)?;
        Ok(Self {
            service,
            http,
            base,
            token,
        })
    }

    pub(crate) fn service(&self) -> &'static str {
        self.service
    }

    /// Appends percent-encoded path segments to the base URL.
    pub(crate) fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| DirectoryError::unavailable(self.service, "base URL cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub(crate) async fn request(&self, method: Method, url: Url) -> Result<RequestBuilder> {
        let token = self.token.get().await?;
        Ok(self
            .http
            .request(method, url)
            .header(SESSION_TOKEN_HEADER, token.as_str()))
    }

    pub(crate) async fn send(&self, req: RequestBuilder, what: &str) -> Result<Response> {
        let resp = req
            .send()
            .await
            .map_err(|e| DirectoryError::unavailable(self.service, e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::UNAUTHORIZED {
            self.token.invalidate();
        }
        let body = resp.text().await.unwrap_or_default();
        Err(self.status_error(status, what, body))
    }

    fn status_error(&self, status: StatusCode, what: &str, body: String) -> DirectoryError {
        if status == StatusCode::NOT_FOUND {
            DirectoryError::not_found(self.service, what)
        } else if status.is_server_error() || status == StatusCode::UNAUTHORIZED {
            DirectoryError::unavailable(self.service, format!("HTTP {status}"))
        } else {
            DirectoryError::rejected(self.service, status.as_u16(), body)
        }
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: Url, what: &str) -> Result<T> {
        let req = self.request(Method::GET, url).await?;
        let resp = self.send(req, what).await?;
        resp.json()
            .await
            .map_err(|e| DirectoryError::invalid_response(self.service, e.to_string()))
    }

    pub(crate) async fn send_json<B: Serialize + Sync + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: &B,
        what: &str,
    ) -> Result<Response> {
        let req = self.request(method, url).await?.json(body);
        self.send(req, what).await
    }
}

pub(crate) fn parse_base(service: &'static str, base_url: &str) -> Result<Url> {
    Url::parse(base_url.trim_end_matches('/'))
        .map_err(|e| DirectoryError::unavailable(service, format!("invalid base URL: {e}")))
}

pub(crate) async fn decode<T: DeserializeOwned>(service: &'static str, resp: Response) -> Result<T> {
    resp.json()
        .await
        .map_err(|e| DirectoryError::invalid_response(service, e.to_string()))
}

/// Builds the HTTP-backed directories sharing one client and one server token.
pub fn build(config: &HttpDirectoryConfig) -> Result<(Directories, Arc<ServerToken>)> {
    let http = reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(|e| DirectoryError::unavailable("http", e.to_string()))?;

    let token = Arc::new(ServerToken::new(
        http.clone(),
        &config.auth_url,
        &config.server_name,
        &config.server_secret,
    )?);

    let client = |service: &'static str, base: &str| {
        ServiceClient::new(service, http.clone(), base, token.clone())
    };

    let directories = Directories {
        identity: Arc::new(HttpIdentityDirectory::new(client("identity", &config.auth_url)?)),
        profile: Arc::new(HttpProfileDirectory::new(client("profile", &config.profile_url)?)),
        permission: Arc::new(HttpPermissionDirectory::new(client(
            "permission",
            &config.permission_url,
        )?)),
        clinic: Arc::new(HttpClinicDirectory::new(client("clinic", &config.clinic_url)?)),
        medical_data: Arc::new(HttpMedicalDataDirectory::new(client("data", &config.data_url)?)),
    };
    Ok((directories, token))
}
