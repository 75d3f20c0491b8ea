use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::{HeaderName, HeaderValue};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, warn};

use super::{Email, MailReceipt, Mailer, SesConfig, SmtpConfig, SmtpTls, encode_address};
use crate::error::{NotificationError, Result};

const SES_CONFIGURATION_SET: &str = "X-SES-CONFIGURATION-SET";
const SES_MESSAGE_TAGS: &str = "X-SES-MESSAGE-TAGS";

/// SMTP delivery, optionally through the SES SMTP interface.
pub struct SmtpMailer {
    name: &'static str,
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    configuration_set: Option<String>,
    default_tags: BTreeMap<String, String>,
    ses: bool,
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("name", &self.name)
            .field("from", &self.from.to_string())
            .finish()
    }
}

impl SmtpMailer {
    pub fn smtp(from: &str, config: &SmtpConfig) -> Result<Self> {
        if config.host.is_empty() {
            return Err(NotificationError::InvalidConfig("Missing smtp host".into()));
        }
        let builder = match config.tls {
            SmtpTls::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| NotificationError::InvalidConfig(e.to_string()))?,
            SmtpTls::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| NotificationError::InvalidConfig(e.to_string()))?,
            SmtpTls::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
        };
        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            name: "smtp",
            transport: builder.build(),
            from: parse_mailbox(from)?,
            configuration_set: None,
            default_tags: BTreeMap::new(),
            ses: false,
        })
    }

    pub fn ses(from: &str, config: &SesConfig) -> Result<Self> {
        if config.region.is_empty() {
            return Err(NotificationError::InvalidConfig("Missing ses region".into()));
        }
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.endpoint())
            .map_err(|e| NotificationError::InvalidConfig(e.to_string()))?
            .port(587);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            name: "ses",
            transport: builder.build(),
            from: parse_mailbox(from)?,
            configuration_set: config.configuration_set.clone(),
            default_tags: config.tags.clone(),
            ses: true,
        })
    }

    fn build_message(&self, email: &Email) -> Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(email.subject.clone());
        for to in &email.to {
            builder = builder.to(parse_mailbox(&encode_address(to)?)?);
        }

        if self.ses {
            if let Some(set) = &self.configuration_set {
                builder = builder.raw_header(HeaderValue::new(
                    HeaderName::new_from_ascii_str(SES_CONFIGURATION_SET),
                    set.clone(),
                ));
            }
            let tags = ses_tags(&self.default_tags, &email.tags);
            if !tags.is_empty() {
                builder = builder.raw_header(HeaderValue::new(
                    HeaderName::new_from_ascii_str(SES_MESSAGE_TAGS),
                    tags,
                ));
            }
        } else if !email.tags.is_empty() {
            debug!(tags = ?email.tags, "SMTP transport ignores message tags");
        }

        builder
            .multipart(MultiPart::alternative_plain_html(
                email.text.clone(),
                email.html.clone(),
            ))
            .map_err(|e| NotificationError::SendFailed(e.to_string()))
    }
}

/// `k1=v1, k2=v2`, per-message tags overriding the defaults.
fn ses_tags(defaults: &BTreeMap<String, String>, tags: &BTreeMap<String, String>) -> String {
    let mut merged = defaults.clone();
    merged.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e| NotificationError::invalid_address(address, e))
}

#[async_trait]
impl Mailer for SmtpMailer {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn send(&self, email: &Email) -> Result<MailReceipt> {
        let message = self.build_message(email)?;
        match self.transport.send(message).await {
            Ok(response) => {
                let text = response.message().collect::<Vec<_>>().join(" ");
                debug!(transport = self.name, to = ?email.to, "Mail accepted");
                Ok(MailReceipt::accepted(text))
            }
            Err(e) => {
                warn!(transport = self.name, to = ?email.to, error = %e, "Mail dispatch failed");
                Err(NotificationError::SendFailed(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> Email {
        Email {
            to: vec!["bob@bücher.example".into()],
            subject: "Subject".into(),
            html: "<p>Hello</p>".into(),
            text: "Hello".into(),
            tags: BTreeMap::from([("type".to_string(), "careteam_invitation".to_string())]),
        }
    }

    fn headers(message: &Message) -> String {
        String::from_utf8_lossy(&message.formatted()).into_owned()
    }

    #[test]
    fn tags_merge_with_defaults() {
        let defaults = BTreeMap::from([
            ("env".to_string(), "prod".to_string()),
            ("type".to_string(), "default".to_string()),
        ]);
        let tags = BTreeMap::from([("type".to_string(), "signup".to_string())]);
        assert_eq!(ses_tags(&defaults, &tags), "env=prod, type=signup");
    }

    #[tokio::test]
    async fn ses_messages_carry_configuration_headers() {
        let config = SesConfig {
            region: "eu-west-1".into(),
            configuration_set: Some("confirm".into()),
            tags: BTreeMap::from([("env".to_string(), "test".to_string())]),
            ..Default::default()
        };
        let mailer = SmtpMailer::ses("Confirm <no-reply@example.org>", &config).unwrap();
        let raw = headers(&mailer.build_message(&email()).unwrap());
        assert!(raw.contains("X-SES-CONFIGURATION-SET: confirm"));
        assert!(raw.contains("X-SES-MESSAGE-TAGS: env=test, type=careteam_invitation"));
        assert!(raw.contains("bob@xn--bcher-kva.example"));
        assert!(raw.contains("multipart/alternative"));
    }

    #[tokio::test]
    async fn plain_smtp_has_no_ses_headers() {
        let config = SmtpConfig {
            host: "localhost".into(),
            tls: SmtpTls::None,
            ..Default::default()
        };
        let mailer = SmtpMailer::smtp("no-reply@example.org", &config).unwrap();
        let raw = headers(&mailer.build_message(&email()).unwrap());
        assert!(!raw.contains("X-SES"));
    }

    #[test]
    fn configuration_is_checked() {
        assert!(SmtpMailer::smtp("a@b.c", &SmtpConfig::default()).is_err());
        assert!(SmtpMailer::ses("a@b.c", &SesConfig::default()).is_err());
    }
}
