//! Notifications issued by peer services on a patient's behalf.

use std::fmt;
use std::str::FromStr;

use confirm_core::{Confirmation, ConfirmationType, NotificationContext};
use serde::Deserialize;
use tracing::info;

use super::{Caller, Engine, EngineError, LanguageHint, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Prescription,
    AccountInformation,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prescription => "prescription",
            Self::AccountInformation => "account_information",
        }
    }

    fn kind(&self) -> ConfirmationType {
        match self {
            Self::Prescription => ConfirmationType::Notification,
            Self::AccountInformation => ConfirmationType::PatientInformation,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "prescription" => Ok(Self::Prescription),
            "account_information" => Ok(Self::AccountInformation),
            other => Err(EngineError::bad_request(format!(
                "unknown notification topic: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Clinician on whose behalf the notification is sent.
    #[serde(default)]
    pub creator_id: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Engine {
    pub async fn send_notification(
        &self,
        caller: &Caller,
        topic: &str,
        request: NotificationRequest,
        hint: &LanguageHint,
    ) -> Result<Confirmation> {
        self.require_server(caller)?;
        let topic: Topic = topic.parse()?;

        let account = match request.user_id.as_deref() {
            Some(user_id) => Some(
                self.known_user(user_id)
                    .await?
                    .ok_or_else(|| EngineError::not_found("user not found"))?,
            ),
            None => None,
        };
        let email = request
            .email
            .filter(|e| !e.trim().is_empty())
            .or_else(|| {
                account
                    .as_ref()
                    .and_then(|u| u.primary_email().map(str::to_string))
            })
            .ok_or_else(|| EngineError::bad_request("recipient email is required"))?;

        let creator_id = request.creator_id.unwrap_or_else(|| caller.user_id.clone());
        let mut record = Confirmation::new(topic.kind(), &creator_id)
            .with_email(&email)
            .with_creator(self.creator_snapshot(&creator_id).await);
        if let Some(account) = &account {
            record = record.with_user_id(account.user_id.clone());
        }
        if topic == Topic::Prescription {
            record = record.with_context(&NotificationContext {
                topic: topic.to_string(),
                payload: request.payload,
            })?;
        }
        self.save(&record).await?;
        info!(key = %record.key, topic = %topic, "Notification issued");

        let locale = self
            .recipient_language(record.user_id.as_deref(), hint)
            .await;
        self.deliver(&record, &email, &locale, self.values_for(&record))
            .await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{fixture, user};
    use serde_json::json;

    #[test]
    fn topics_parse() {
        assert_eq!("prescription".parse::<Topic>().unwrap(), Topic::Prescription);
        assert!(matches!(
            "weather".parse::<Topic>(),
            Err(EngineError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn prescription_keeps_payload() {
        let f = fixture();
        user(&f.dir, "P", "p@x.org", &["patient"]);
        let record = f
            .engine
            .send_notification(
                &Caller::server("svc"),
                "prescription",
                NotificationRequest {
                    user_id: Some("P".into()),
                    payload: json!({"id": "rx-1"}),
                    ..Default::default()
                },
                &LanguageHint::none(),
            )
            .await
            .unwrap();
        assert_eq!(record.kind, ConfirmationType::Notification);
        assert_eq!(record.template_name, "prescription_notification");
        let ctx: NotificationContext = record.decode_context().unwrap();
        assert_eq!(ctx.payload["id"], "rx-1");
        assert_eq!(f.mailer.count(), 1);
    }

    #[tokio::test]
    async fn people_cannot_notify() {
        let f = fixture();
        let err = f
            .engine
            .send_notification(
                &Caller::user("A"),
                "prescription",
                NotificationRequest::default(),
                &LanguageHint::none(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
    }

    #[tokio::test]
    async fn account_information_needs_a_recipient() {
        let f = fixture();
        let err = f
            .engine
            .send_notification(
                &Caller::server("svc"),
                "account_information",
                NotificationRequest::default(),
                &LanguageHint::none(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::BadRequest(_)));

        let record = f
            .engine
            .send_notification(
                &Caller::server("svc"),
                "account_information",
                NotificationRequest {
                    email: Some("new@x.org".into()),
                    ..Default::default()
                },
                &LanguageHint::none(),
            )
            .await
            .unwrap();
        assert_eq!(record.template_name, "patient_information");
    }
}
