use confirm_directory::ProfileKey;
use confirm_notifications::language_of;
use tracing::debug;

use super::Engine;

/// Language requested by the client through `x-user-language` or
/// `Accept-Language`, already reduced to a two-letter code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LanguageHint(pub Option<String>);

impl LanguageHint {
    pub fn none() -> Self {
        Self(None)
    }

    /// `x-user-language` wins; otherwise the first `Accept-Language` token.
    pub fn from_headers(user_language: Option<&str>, accept_language: Option<&str>) -> Self {
        let explicit = user_language.and_then(language_of);
        let accepted = || {
            accept_language
                .and_then(|v| v.split(',').next())
                .map(|tag| tag.split(';').next().unwrap_or(tag).trim())
                .and_then(language_of)
        };
        Self(explicit.or_else(accepted))
    }
}

impl Engine {
    /// Profile preference of a known recipient, then the hint, then the default.
    pub(crate) async fn recipient_language(
        &self,
        recipient: Option<&str>,
        hint: &LanguageHint,
    ) -> String {
        if let Some(user_id) = recipient {
            match self
                .dirs
                .profile
                .get(user_id, &[ProfileKey::Preferences])
                .await
            {
                Ok(data) => {
                    if let Some(lang) = data.language().and_then(language_of) {
                        return lang;
                    }
                }
                Err(e) => debug!(user_id, error = %e, "Preferences unavailable"),
            }
        }
        hint.0
            .clone()
            .unwrap_or_else(|| self.settings.default_language.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::fixture;
    use confirm_directory::{Preferences, ProfileData};

    #[test]
    fn header_precedence() {
        assert_eq!(
            LanguageHint::from_headers(Some("fr"), Some("de-DE,de;q=0.9")).0.as_deref(),
            Some("fr")
        );
        assert_eq!(
            LanguageHint::from_headers(None, Some("de-DE,de;q=0.9")).0.as_deref(),
            Some("de")
        );
        assert_eq!(LanguageHint::from_headers(None, None), LanguageHint::none());
        assert_eq!(LanguageHint::from_headers(Some("*"), None), LanguageHint::none());
    }

    #[tokio::test]
    async fn profile_preference_beats_headers() {
        let f = fixture();
        f.dir.set_profile(
            "B",
            ProfileData {
                preferences: Some(Preferences {
                    display_language_code: Some("fr".into()),
                }),
                ..Default::default()
            },
        );
        let hint = LanguageHint(Some("de".into()));
        assert_eq!(f.engine.recipient_language(Some("B"), &hint).await, "fr");
        assert_eq!(f.engine.recipient_language(Some("nobody"), &hint).await, "de");
        assert_eq!(
            f.engine.recipient_language(None, &LanguageHint::none()).await,
            "en"
        );
    }

    #[tokio::test]
    async fn profile_outage_falls_back() {
        let f = fixture();
        f.dir.fail("get");
        let hint = LanguageHint(Some("fr".into()));
        assert_eq!(f.engine.recipient_language(Some("B"), &hint).await, "fr");
    }
}
