//! PIN reset for a patient's handset: a short-lived TOTP code derived
//! from the user and the device IMEI, sent by email.

use confirm_core::{Confirmation, ConfirmationType, PinResetContext, Totp};
use tracing::{error, info};

use super::{Caller, Engine, EngineError, LanguageHint, Result, now};

impl Engine {
    /// Issues a PIN reset code. The returned record has its context removed.
    pub async fn send_pin_reset(
        &self,
        caller: &Caller,
        user_id: &str,
        hint: &LanguageHint,
    ) -> Result<Confirmation> {
        self.require_self(caller, user_id)?;
        let account = self
            .known_user(user_id)
            .await?
            .ok_or_else(|| EngineError::not_found("user not found"))?;
        if account.is_clinical() {
            return Err(EngineError::forbidden("PIN reset is only available to patients"));
        }
        let Some(email) = account.primary_email().map(str::to_string) else {
            return Err(EngineError::bad_request("account has no email"));
        };
        self.check_throttle(ConfirmationType::PatientPinReset, user_id)
            .await?;

        let imei = match self.dirs.medical_data.get_settings(user_id).await {
            Ok(settings) => settings.imei.filter(|i| !i.is_empty()),
            Err(e) => {
                error!(user_id, error = %e, "Device settings unavailable");
                None
            }
        };
        let Some(imei) = imei else {
            return Err(EngineError::internal("no device IMEI on record"));
        };

        let issued = now();
        let code = Totp::pin_reset(user_id, &imei).at(issued);
        let mut record = Confirmation::new_at(ConfirmationType::PatientPinReset, user_id, issued)
            .with_user_id(user_id)
            .with_email(&email)
            .with_creator(self.creator_snapshot(user_id).await)
            .with_context(&PinResetContext {
                timestamp: code.timestamp,
                otp: code.otp.clone(),
            })?;
        self.save(&record).await?;
        info!(key = %record.key, user_id, "PIN reset issued");

        let mut values = self.values_for(&record);
        values.insert("Otp".into(), code.grouped());
        let locale = self.recipient_language(Some(user_id), hint).await;
        self.deliver(&record, &email, &locale, values).await?;

        record.context = None;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{Fixture, fixture, user};
    use confirm_directory::DeviceSettings;
    use confirm_storage::ConfirmationStore;

    const IMEI: &str = "123456789012345";

    fn setup() -> Fixture {
        let f = fixture();
        user(&f.dir, "P", "p@x.org", &["patient"]);
        f.dir.set_device_settings(
            "P",
            DeviceSettings {
                imei: Some(IMEI.into()),
                device_id: None,
            },
        );
        f
    }

    #[tokio::test]
    async fn code_is_grouped_and_reproducible() {
        let f = setup();
        let record = f
            .engine
            .send_pin_reset(&Caller::user("P"), "P", &LanguageHint::none())
            .await
            .unwrap();
        assert!(record.context.is_none());

        let stored = f.store.all().remove(0);
        let context: PinResetContext = stored.decode_context().unwrap();
        assert_eq!(context.otp.len(), 9);
        let again = Totp::pin_reset("P", IMEI).at(stored.created);
        assert_eq!(again.otp, context.otp);

        let mail = f.mailer.last().unwrap();
        assert!(mail.html.contains(&again.grouped()));
    }

    #[tokio::test]
    async fn throttled_after_ten() {
        let f = setup();
        for _ in 0..10 {
            let record = Confirmation::new(ConfirmationType::PatientPinReset, "P").with_user_id("P");
            f.store.upsert(&record).await.unwrap();
        }
        let err = f
            .engine
            .send_pin_reset(&Caller::user("P"), "P", &LanguageHint::none())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::TooManyAttempts));
        assert_eq!(f.store.len(), 10);
        assert_eq!(f.mailer.count(), 0);
    }

    #[tokio::test]
    async fn clinicians_and_servers_are_refused() {
        let f = setup();
        user(&f.dir, "DOC", "doc@x.org", &["hcp"]);
        let err = f
            .engine
            .send_pin_reset(&Caller::user("DOC"), "DOC", &LanguageHint::none())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));

        let err = f
            .engine
            .send_pin_reset(&Caller::server("svc"), "P", &LanguageHint::none())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
    }

    #[tokio::test]
    async fn missing_imei_is_internal() {
        let f = fixture();
        user(&f.dir, "P", "p@x.org", &["patient"]);
        let err = f
            .engine
            .send_pin_reset(&Caller::user("P"), "P", &LanguageHint::none())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Internal(_)));
        assert_eq!(f.store.len(), 0);
    }
}
