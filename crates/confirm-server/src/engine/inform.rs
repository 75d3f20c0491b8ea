use confirm_core::{Confirmation, ConfirmationType};
use confirm_notifications::Values;
use tracing::{error, info};

use super::{Caller, Engine, EngineError, LanguageHint, Result};

impl Engine {
    /// Tells a patient their account was created on their behalf.
    pub async fn send_inform(
        &self,
        caller: &Caller,
        user_id: &str,
        hint: &LanguageHint,
    ) -> Result<Confirmation> {
        self.require_acting_for(caller, user_id).await?;
        let account = self
            .known_user(user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("user not found"))?;
        if !account.email_verified {
            return Err(EngineError::forbidden("email is not verified"));
        }
        let Some(email) = account.primary_email().map(str::to_string) else {
            return Err(EngineError::bad_request("account has no email"));
        };

        let record = Confirmation::new(ConfirmationType::PatientInformation, &caller.user_id)
            .with_user_id(user_id)
            .with_email(&email)
            .with_creator(self.creator_snapshot(&caller.user_id).await);
        self.save(&record).await?;
        info!(key = %record.key, user_id, "Account information issued");

        let locale = self.recipient_language(Some(user_id), hint).await;
        self.deliver(&record, &email, &locale, self.values_for(&record))
            .await?;
        Ok(record)
    }

    /// Sends the `sanity_check` template to a user, bypassing the store.
    pub async fn sanity_check(
        &self,
        caller: &Caller,
        user_id: &str,
        hint: &LanguageHint,
    ) -> Result<()> {
        self.require_acting_for(caller, user_id).await?;
        let email = self
            .known_user(user_id)
            .await?
            .and_then(|u| u.primary_email().map(str::to_string))
            .ok_or_else(|| EngineError::bad_request("unknown user"))?;

        let values = Values::from([("WebURL".to_string(), self.settings.web_url.clone())]);
        let locale = self.recipient_language(Some(user_id), hint).await;
        self.send_template("sanity_check", &email, &locale, values)
            .await
            .map_err(|e| {
                error!(user_id, error = %e, "Sanity check mail failed");
                EngineError::internal(e.to_string())
            })
    }
}
