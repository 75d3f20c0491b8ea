use confirm_core::{Confirmation, ConfirmationStatus, ConfirmationType, normalize_email};
use confirm_directory::UserUpdate;
use confirm_notifications::Values;
use confirm_storage::ConfirmationFilter;
use serde::Deserialize;
use tracing::info;

use super::signup::is_valid_password;
use super::{Engine, EngineError, LanguageHint, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordResetAccept {
    pub key: String,
    pub email: String,
    pub password: String,
}

impl Engine {
    /// Starts a password reset. Answers the same way whether or not the
    /// email belongs to an account.
    pub async fn send_forgot(&self, email: &str, hint: &LanguageHint) -> Result<()> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(EngineError::bad_request("a valid email is required"));
        }

        let Some(account) = self.known_user(email).await? else {
            info!("Password reset requested for unknown email");
            let values = Values::from([
                ("WebURL".to_string(), self.settings.web_url.clone()),
                ("Email".to_string(), email.to_string()),
            ]);
            let locale = self.recipient_language(None, hint).await;
            return self
                .send_template("password_reset_no_account", email, &locale, values)
                .await;
        };

        match self
            .check_throttle(ConfirmationType::PasswordReset, &account.user_id)
            .await
        {
            Err(EngineError::TooManyAttempts) => return Ok(()),
            other => other?,
        }

        let record = Confirmation::new(ConfirmationType::PasswordReset, &account.user_id)
            .with_user_id(&account.user_id)
            .with_email(email);
        self.save(&record).await?;
        info!(key = %record.key, user_id = %account.user_id, "Password reset created");

        let locale = self
            .recipient_language(Some(&account.user_id), hint)
            .await;
        self.deliver(&record, email, &locale, self.values_for(&record))
            .await
    }

    pub async fn accept_forgot(&self, accept: PasswordResetAccept) -> Result<Confirmation> {
        let filter = ConfirmationFilter::by_key(&accept.key)
            .with_type(ConfirmationType::PasswordReset);
        let mut record = self.load(&filter).await?;
        let same_email = record
            .email
            .as_deref()
            .is_some_and(|e| normalize_email(e) == normalize_email(&accept.email));
        if !same_email {
            return Err(EngineError::not_found("confirmation not found"));
        }
        self.ensure_actionable(&record)?;
        if !is_valid_password(&accept.password) {
            return Err(EngineError::bad_request("password does not meet the requirements"));
        }
        let Some(user_id) = record.user_id.clone() else {
            return Err(EngineError::internal("password reset has no user"));
        };

        self.dirs
            .identity
            .update_user(
                &user_id,
                &UserUpdate {
                    password: Some(accept.password),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| EngineError::side_effect("update password", e))?;
        self.finish(&mut record, ConfirmationStatus::Completed)
            .await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{fixture, user};

    #[tokio::test]
    async fn unknown_email_gets_no_account_mail() {
        let f = fixture();
        f.engine
            .send_forgot("ghost@x.org", &LanguageHint::none())
            .await
            .unwrap();
        assert_eq!(f.store.len(), 0);
        let mail = f.mailer.last().unwrap();
        assert_eq!(mail.to, vec!["ghost@x.org".to_string()]);
    }

    #[tokio::test]
    async fn reset_round_trip() {
        let f = fixture();
        user(&f.dir, "U", "u@x.org", &[]);
        f.engine
            .send_forgot("u@x.org", &LanguageHint::none())
            .await
            .unwrap();
        let record = f.store.all().remove(0);
        assert_eq!(record.kind, ConfirmationType::PasswordReset);
        assert!(f.mailer.last().unwrap().html.contains("confirm-password-reset"));

        let err = f
            .engine
            .accept_forgot(PasswordResetAccept {
                key: record.key.clone(),
                email: "other@x.org".into(),
                password: "long-enough".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));

        let err = f
            .engine
            .accept_forgot(PasswordResetAccept {
                key: record.key.clone(),
                email: "U@x.org".into(),
                password: "short".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::BadRequest(_)));

        let done = f
            .engine
            .accept_forgot(PasswordResetAccept {
                key: record.key,
                email: "U@x.org".into(),
                password: "long-enough".into(),
            })
            .await
            .unwrap();
        assert_eq!(done.status, ConfirmationStatus::Completed);
        assert!(f.dir.calls().contains(&"update_user U".to_string()));
    }

    #[tokio::test]
    async fn throttled_requests_are_silent() {
        let f = fixture();
        user(&f.dir, "U", "u@x.org", &[]);
        for _ in 0..10 {
            f.engine
                .send_forgot("u@x.org", &LanguageHint::none())
                .await
                .unwrap();
        }
        f.mailer.clear();
        f.engine
            .send_forgot("u@x.org", &LanguageHint::none())
            .await
            .unwrap();
        assert_eq!(f.store.len(), 10);
        assert_eq!(f.mailer.count(), 0);
    }
}
