//! Sign-up: email verification and claiming accounts created on a
//! patient's behalf.

use confirm_core::{Confirmation, ConfirmationStatus, ConfirmationType};
use confirm_directory::{OptionalExt, ProfileKey, User, UserUpdate};
use confirm_storage::ConfirmationFilter;
use serde::Deserialize;
use time::Date;
use time::macros::format_description;
use tracing::info;

use super::{Caller, ClaimError, Engine, EngineError, LanguageHint, Result, now};

/// Body of a sign-up claim.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignupAccept {
    #[serde(default)]
    pub password: Option<String>,
    /// `YYYY-MM-DD`, compared against the patient profile.
    #[serde(default)]
    pub birthday: Option<String>,
}

/// 8 to 72 characters, no whitespace.
pub(crate) fn is_valid_password(password: &str) -> bool {
    let len = password.chars().count();
    (8..=72).contains(&len) && !password.chars().any(char::is_whitespace)
}

fn parse_birthday(value: &str) -> Option<Date> {
    Date::parse(value.trim(), format_description!("[year]-[month]-[day]")).ok()
}

fn signup_filter() -> ConfirmationFilter {
    ConfirmationFilter::new().with_type(ConfirmationType::EmailConfirmation)
}

impl Engine {
    async fn signup_account(&self, user_id: &str) -> Result<User> {
        self.dirs
            .identity
            .get_user(user_id)
            .await
            .optional()?
            .ok_or_else(|| EngineError::not_found("user not found"))
    }

    /// Issues a new sign-up confirmation for an unverified account.
    pub async fn send_signup(
        &self,
        caller: &Caller,
        user_id: &str,
        hint: &LanguageHint,
    ) -> Result<Confirmation> {
        self.require_acting_for(caller, user_id).await?;
        let account = self.signup_account(user_id).await?;
        if account.email_verified {
            return Err(EngineError::conflict("email is already verified"));
        }
        self.check_throttle(ConfirmationType::EmailConfirmation, &account.user_id)
            .await?;
        self.ensure_no_duplicate(signup_filter().with_user(&account.user_id))
            .await?;
        self.issue_signup(&account, hint).await
    }

    async fn issue_signup(&self, account: &User, hint: &LanguageHint) -> Result<Confirmation> {
        let Some(email) = account.primary_email().map(str::to_string) else {
            return Err(EngineError::bad_request("account has no email"));
        };
        let record = Confirmation::new(ConfirmationType::EmailConfirmation, &account.user_id)
            .with_user_id(&account.user_id)
            .with_email(&email)
            .with_creator(self.creator_snapshot(&account.user_id).await);
        self.save(&record).await?;
        info!(key = %record.key, user_id = %account.user_id, "Sign-up confirmation created");

        let locale = self.recipient_language(Some(&account.user_id), hint).await;
        self.deliver(&record, &email, &locale, self.values_for(&record))
            .await?;
        Ok(record)
    }

    /// Re-dispatches the pending sign-up for `email`, creating one when none is pending.
    pub async fn resend_signup(
        &self,
        caller: &Caller,
        email: &str,
        hint: &LanguageHint,
    ) -> Result<Confirmation> {
        self.require_server(caller)?;
        let account = self.signup_account(email).await?;
        if account.email_verified {
            return Err(EngineError::conflict("email is already verified"));
        }

        let pending = self
            .live_duplicate(signup_filter().with_user(&account.user_id))
            .await?;
        let Some(mut record) = pending else {
            self.check_throttle(ConfirmationType::EmailConfirmation, &account.user_id)
                .await?;
            return self.issue_signup(&account, hint).await;
        };

        record.touch(now());
        self.save(&record).await?;
        let to = record.email.clone().unwrap_or_else(|| email.to_string());
        let locale = self.recipient_language(Some(&account.user_id), hint).await;
        self.deliver(&record, &to, &locale, self.values_for(&record))
            .await?;
        info!(key = %record.key, user_id = %account.user_id, "Sign-up confirmation resent");
        Ok(record)
    }

    /// Completes a sign-up. Unauthenticated: the key is the credential.
    pub async fn accept_signup(
        &self,
        user_id: &str,
        key: &str,
        body: Option<SignupAccept>,
    ) -> Result<Confirmation> {
        let mut record = self
            .load(&signup_filter().with_key(key).with_user(user_id))
            .await?;
        self.ensure_actionable(&record)?;
        let account = self.signup_account(user_id).await?;

        let mut update = UserUpdate {
            email_verified: Some(true),
            ..Default::default()
        };
        if !account.password_exists {
            let claim = self.check_claim(user_id, body).await?;
            update.password = Some(claim);
        }

        self.dirs
            .identity
            .update_user(user_id, &update)
            .await
            .map_err(|e| EngineError::side_effect("update user", e))?;
        self.finish(&mut record, ConfirmationStatus::Completed)
            .await?;
        Ok(record)
    }

    /// Validates the password and birthday of a claim, returning the password.
    async fn check_claim(&self, user_id: &str, body: Option<SignupAccept>) -> Result<String> {
        let Some(body) = body else {
            return Err(EngineError::Claim(ClaimError::PasswordNeeded));
        };
        let Some(password) = body.password.filter(|p| !p.is_empty()) else {
            return Err(EngineError::Claim(ClaimError::PasswordMissing));
        };
        if !is_valid_password(&password) {
            return Err(EngineError::Claim(ClaimError::PasswordInvalid));
        }
        let Some(birthday) = body.birthday.filter(|b| !b.trim().is_empty()) else {
            return Err(EngineError::Claim(ClaimError::BirthdayMissing));
        };
        let Some(given) = parse_birthday(&birthday) else {
            return Err(EngineError::Claim(ClaimError::BirthdayInvalid));
        };

        let profile = self
            .dirs
            .profile
            .get(user_id, &[ProfileKey::Profile])
            .await?;
        let expected = profile.birthday().and_then(parse_birthday);
        if expected != Some(given) {
            return Err(EngineError::Claim(ClaimError::BirthdayMismatch));
        }
        Ok(password)
    }

    pub async fn dismiss_signup(&self, user_id: &str, key: &str) -> Result<Confirmation> {
        if key.trim().is_empty() {
            return Err(EngineError::bad_request("key is required"));
        }
        let mut record = self
            .load(&signup_filter().with_key(key).with_user(user_id))
            .await?;
        self.finish(&mut record, ConfirmationStatus::Declined)
            .await?;
        Ok(record)
    }

    pub async fn get_signup(&self, caller: &Caller, user_id: &str) -> Result<Confirmation> {
        if !caller.is_server && !caller.is(user_id) {
            return Err(EngineError::unauthorized("caller is not the target user"));
        }
        self.load(&signup_filter().with_user(user_id).pending())
            .await
    }

    /// Cancels every pending sign-up of `user_id`.
    pub async fn cancel_signups(&self, caller: &Caller, user_id: &str) -> Result<Vec<Confirmation>> {
        if !caller.is_server && !caller.is(user_id) {
            return Err(EngineError::unauthorized("caller is not the target user"));
        }
        let mut pending = self
            .store
            .find_many(
                &signup_filter().with_user(user_id),
                &[ConfirmationStatus::Pending],
            )
            .await?;
        if pending.is_empty() {
            return Err(EngineError::not_found("no pending sign-up"));
        }
        for record in &mut pending {
            self.finish(record, ConfirmationStatus::Canceled).await?;
        }
        Ok(pending)
    }
}
