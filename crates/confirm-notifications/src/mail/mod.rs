//! Outgoing mail.

mod memory;
mod smtp;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::{NullMailer, RecordingMailer};
pub use smtp::SmtpMailer;

use crate::error::{NotificationError, Result};
use crate::templates::Rendered;

/// A rendered message ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub tags: BTreeMap<String, String>,
}

impl Email {
    pub fn new(to: impl Into<String>, rendered: Rendered) -> Self {
        Self {
            to: vec![to.into()],
            subject: rendered.subject,
            html: rendered.html,
            text: rendered.text,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Outcome reported by the transport. `200` means accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailReceipt {
    pub status: u16,
    pub message: String,
}

impl MailReceipt {
    pub fn accepted(message: impl Into<String>) -> Self {
        Self {
            status: 200,
            message: message.into(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == 200
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, email: &Email) -> Result<MailReceipt>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailProvider {
    Ses,
    Smtp,
    #[default]
    Null,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpTls {
    None,
    #[default]
    Starttls,
    Tls,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: SmtpTls,
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 587,
            username: None,
            password: None,
            tls: SmtpTls::Starttls,
            timeout_secs: 30,
        }
    }
}

/// SES over its SMTP interface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SesConfig {
    pub region: String,
    pub configuration_set: Option<String>,
    /// Message tags added to every email.
    pub tags: BTreeMap<String, String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl SesConfig {
    pub fn endpoint(&self) -> String {
        format!("email-smtp.{}.amazonaws.com", self.region)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub provider: MailProvider,
    pub from: String,
    pub smtp: SmtpConfig,
    pub ses: SesConfig,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            provider: MailProvider::Null,
            from: "no-reply@localhost".to_string(),
            smtp: SmtpConfig::default(),
            ses: SesConfig::default(),
        }
    }
}

pub fn build_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    Ok(match config.provider {
        MailProvider::Smtp => Arc::new(SmtpMailer::smtp(&config.from, &config.smtp)?),
        MailProvider::Ses => Arc::new(SmtpMailer::ses(&config.from, &config.ses)?),
        MailProvider::Null => Arc::new(NullMailer),
    })
}

/// IDNA-encodes the domain of `address`; the local part is kept as written.
pub fn encode_address(address: &str) -> Result<String> {
    let address = address.trim();
    let Some((local, domain)) = address.rsplit_once('@') else {
        return Err(NotificationError::invalid_address(address, "missing @"));
    };
    if local.is_empty() || domain.is_empty() {
        return Err(NotificationError::invalid_address(address, "empty local part or domain"));
    }
    let domain = idna::domain_to_ascii(domain)
        .map_err(|e| NotificationError::invalid_address(address, format!("{e:?}")))?;
    Ok(format!("{local}@{domain}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_is_punycoded_local_part_kept() {
        assert_eq!(
            encode_address("Jürgen@bücher.example").unwrap(),
            "Jürgen@xn--bcher-kva.example"
        );
        assert_eq!(encode_address(" bob@x.org ").unwrap(), "bob@x.org");
    }

    #[test]
    fn malformed_addresses_are_rejected() {
        assert!(encode_address("no-at-sign").is_err());
        assert!(encode_address("@x.org").is_err());
        assert!(encode_address("bob@").is_err());
    }

    #[test]
    fn null_is_the_default_provider() {
        let config = MailConfig::default();
        assert_eq!(config.provider, MailProvider::Null);
        assert_eq!(build_mailer(&config).unwrap().name(), "null");
    }

    #[test]
    fn ses_endpoint_follows_region() {
        let ses = SesConfig {
            region: "eu-west-1".into(),
            ..Default::default()
        };
        assert_eq!(ses.endpoint(), "email-smtp.eu-west-1.amazonaws.com");
    }
}
