use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use confirm_core::{ConfirmationType, ExpiryPolicy};
use confirm_db_postgres::PostgresConfig;
use confirm_directory::http::HttpDirectoryConfig;
use confirm_notifications::{MailConfig, MailProvider};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub templates: TemplatesConfig,
    pub mail: MailConfig,
    pub directories: DirectoriesConfig,
    pub confirmations: ConfirmationsConfig,
}

impl AppConfig {
    pub fn addr(&self) -> SocketAddr {
        let ip: std::net::IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0]));
        SocketAddr::from((ip, self.server.port))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.request_timeout_ms == 0 {
            return Err("server.request_timeout_ms must be > 0".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        if self.storage.backend == StorageBackend::Postgres && self.storage.postgres.url.is_empty()
        {
            return Err("storage.backend=postgres requires storage.postgres.url".into());
        }
        if self.templates.path.as_os_str().is_empty() {
            return Err("templates.path must be set".into());
        }
        match self.mail.provider {
            MailProvider::Ses if self.mail.ses.region.is_empty() => {
                return Err("mail.provider=ses requires mail.ses.region".into());
            }
            MailProvider::Smtp if self.mail.smtp.host.is_empty() => {
                return Err("mail.provider=smtp requires mail.smtp.host".into());
            }
            _ => {}
        }
        if self.directories.backend == DirectoryBackend::Http {
            let d = &self.directories;
            for (name, url) in [
                ("auth_url", &d.auth_url),
                ("profile_url", &d.profile_url),
                ("permission_url", &d.permission_url),
                ("clinic_url", &d.clinic_url),
                ("data_url", &d.data_url),
            ] {
                if url.is_empty() {
                    return Err(format!("directories.backend=http requires directories.{name}"));
                }
            }
            if d.server_secret.is_empty() {
                return Err("directories.backend=http requires directories.server_secret".into());
            }
        }
        if self.confirmations.throttle_limit == 0 {
            return Err("confirmations.throttle_limit must be > 0".into());
        }
        if self.confirmations.throttle_window_hours == 0 {
            return Err("confirmations.throttle_window_hours must be > 0".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub body_limit_bytes: usize,
    /// Deadline applied to every request, directory calls included.
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 9157,
            body_limit_bytes: 1024 * 1024,
            request_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub postgres: PostgresConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Directory holding `meta/`, `html/` and `locales/`.
    pub path: PathBuf,
    pub default_language: String,
    /// Mounts the `/preview` routes.
    pub preview: bool,
    /// Base URL of the web application, used in links.
    pub web_url: String,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("templates"),
            default_language: "en".into(),
            preview: false,
            web_url: "http://localhost:3000".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryBackend {
    Http,
    /// In-process directories, for local runs.
    #[default]
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoriesConfig {
    pub backend: DirectoryBackend,
    pub auth_url: String,
    pub profile_url: String,
    pub permission_url: String,
    pub clinic_url: String,
    pub data_url: String,
    pub server_name: String,
    pub server_secret: String,
    pub timeout_ms: u64,
    pub token_refresh_secs: u64,
}

impl Default for DirectoriesConfig {
    fn default() -> Self {
        Self {
            backend: DirectoryBackend::Memory,
            auth_url: String::new(),
            profile_url: String::new(),
            permission_url: String::new(),
            clinic_url: String::new(),
            data_url: String::new(),
            server_name: "confirm".into(),
            server_secret: String::new(),
            timeout_ms: 5_000,
            token_refresh_secs: 20 * 60,
        }
    }
}

impl DirectoriesConfig {
    pub fn http(&self) -> HttpDirectoryConfig {
        HttpDirectoryConfig {
            auth_url: self.auth_url.clone(),
            profile_url: self.profile_url.clone(),
            permission_url: self.permission_url.clone(),
            clinic_url: self.clinic_url.clone(),
            data_url: self.data_url.clone(),
            server_name: self.server_name.clone(),
            server_secret: self.server_secret.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationsConfig {
    /// Records of a throttled type a user may hold inside the window.
    pub throttle_limit: u64,
    pub throttle_window_hours: u64,
    pub default_expiry_hours: u64,
    pub monitoring_expiry_hours: u64,
    pub pin_reset_expiry_minutes: u64,
    /// Monitoring length granted when the request does not name one.
    pub monitoring_days: u32,
}

impl Default for ConfirmationsConfig {
    fn default() -> Self {
        Self {
            throttle_limit: 10,
            throttle_window_hours: 24,
            default_expiry_hours: 7 * 24,
            monitoring_expiry_hours: 30 * 24,
            pin_reset_expiry_minutes: 60,
            monitoring_days: 90,
        }
    }
}

impl ConfirmationsConfig {
    pub fn expiry(&self) -> ExpiryPolicy {
        ExpiryPolicy::new(hours(self.default_expiry_hours))
            .with_override(
                ConfirmationType::MedicalteamMonitoringInvitation,
                hours(self.monitoring_expiry_hours),
            )
            .with_override(
                ConfirmationType::PatientPinReset,
                time::Duration::minutes(self.pin_reset_expiry_minutes as i64),
            )
    }

    pub fn throttle_window(&self) -> time::Duration {
        hours(self.throttle_window_hours)
    }
}

fn hours(h: u64) -> time::Duration {
    time::Duration::hours(h as i64)
}

/// Pre-prefix environment names still honoured by deployments.
pub const LEGACY_ENV: [&str; 7] = [
    "TEMPLATE_PATH",
    "AUTH_URL",
    "PROFILE_URL",
    "PERMISSION_URL",
    "CLINIC_URL",
    "DATA_URL",
    "SERVER_SECRET",
];

/// Applies the legacy variables on top of the loaded configuration.
/// Setting any of the service URLs switches the directories to HTTP.
pub fn apply_legacy_env(cfg: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(path) = get("TEMPLATE_PATH") {
        cfg.templates.path = PathBuf::from(path);
    }
    let d = &mut cfg.directories;
    let mut any_url = false;
    for (name, slot) in [
        ("AUTH_URL", &mut d.auth_url),
        ("PROFILE_URL", &mut d.profile_url),
        ("PERMISSION_URL", &mut d.permission_url),
        ("CLINIC_URL", &mut d.clinic_url),
        ("DATA_URL", &mut d.data_url),
    ] {
        if let Some(url) = get(name) {
            *slot = url;
            any_url = true;
        }
    }
    if any_url {
        d.backend = DirectoryBackend::Http;
    }
    if let Some(secret) = get("SERVER_SECRET") {
        d.server_secret = secret;
    }
}

pub mod loader {
    use super::{AppConfig, apply_legacy_env};
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub const DEFAULT_PATH: &str = "confirm.toml";

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_PATH));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., CONFIRM__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("CONFIRM")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let mut merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        apply_legacy_env(&mut merged, |name| std::env::var(name).ok());
        merged.validate()?;
        Ok(merged)
    }
}
