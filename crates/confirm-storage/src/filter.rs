//! Sparse query patterns over confirmation records.

use std::cmp::Ordering;

use confirm_core::{Confirmation, ConfirmationStatus, ConfirmationType, normalize_email};

/// Matches records addressed to a user either by id or by one of their emails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipientMatch {
    pub user_id: Option<String>,
    pub emails: Vec<String>,
}

impl RecipientMatch {
    pub fn new(user_id: Option<String>, emails: impl IntoIterator<Item = String>) -> Self {
        Self {
            user_id,
            emails: emails.into_iter().map(|e| normalize_email(&e)).collect(),
        }
    }

    pub fn matches(&self, c: &Confirmation) -> bool {
        if let (Some(want), Some(have)) = (&self.user_id, &c.user_id)
            && want == have
        {
            return true;
        }
        match &c.email {
            Some(email) => {
                let email = normalize_email(email);
                self.emails.iter().any(|e| *e == email)
            }
            None => false,
        }
    }
}

/// A sparse pattern: only fields that are set take part in matching.
///
/// Emails are compared case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfirmationFilter {
    pub key: Option<String>,
    /// Any of these types; empty means every type.
    pub types: Vec<ConfirmationType>,
    pub status: Option<ConfirmationStatus>,
    pub creator_id: Option<String>,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub clinic_id: Option<String>,
    pub team_id: Option<String>,
    pub recipient: Option<RecipientMatch>,
}

impl ConfirmationFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_key(key: impl Into<String>) -> Self {
        Self::new().with_key(key)
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_type(mut self, kind: ConfirmationType) -> Self {
        self.types.push(kind);
        self
    }

    pub fn with_types(mut self, kinds: impl IntoIterator<Item = ConfirmationType>) -> Self {
        self.types.extend(kinds);
        self
    }

    pub fn with_status(mut self, status: ConfirmationStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn pending(self) -> Self {
        self.with_status(ConfirmationStatus::Pending)
    }

    pub fn with_creator(mut self, creator_id: impl Into<String>) -> Self {
        self.creator_id = Some(creator_id.into());
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(normalize_email(email));
        self
    }

    pub fn with_clinic(mut self, clinic_id: impl Into<String>) -> Self {
        self.clinic_id = Some(clinic_id.into());
        self
    }

    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    pub fn with_recipient(mut self, recipient: RecipientMatch) -> Self {
        self.recipient = Some(recipient);
        self
    }

    pub fn matches(&self, c: &Confirmation) -> bool {
        fn eq_opt(want: &Option<String>, have: Option<&str>) -> bool {
            match want {
                Some(w) if !w.is_empty() => have == Some(w.as_str()),
                _ => true,
            }
        }

        if !eq_opt(&self.key, Some(&c.key)) {
            return false;
        }
        if !self.types.is_empty() && !self.types.contains(&c.kind) {
            return false;
        }
        if let Some(status) = self.status
            && status != c.status
        {
            return false;
        }
        if !eq_opt(&self.creator_id, Some(&c.creator_id))
            || !eq_opt(&self.user_id, c.user_id.as_deref())
            || !eq_opt(&self.clinic_id, c.clinic_id.as_deref())
            || !eq_opt(&self.team_id, c.team_id())
        {
            return false;
        }
        if let Some(email) = self.email.as_deref().filter(|e| !e.is_empty()) {
            let matches = c
                .email
                .as_deref()
                .is_some_and(|have| normalize_email(have) == normalize_email(email));
            if !matches {
                return false;
            }
        }
        if let Some(recipient) = &self.recipient
            && !recipient.matches(c)
        {
            return false;
        }
        true
    }
}

/// Newest `created` first, ties broken by ascending key.
pub fn newest_first(a: &Confirmation, b: &Confirmation) -> Ordering {
    b.created.cmp(&a.created).then_with(|| a.key.cmp(&b.key))
}

/// Validates a record and lowercases its email before it is written.
pub fn prepare_for_write(record: &Confirmation) -> confirm_core::Result<Confirmation> {
    record.validate()?;
    let mut stored = record.clone();
    if let Some(email) = &stored.email {
        stored.email = Some(normalize_email(email));
    }
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use confirm_core::TeamRef;
    use time::macros::datetime;

    fn invite() -> Confirmation {
        Confirmation::new_at(
            ConfirmationType::CareteamInvitation,
            "A",
            datetime!(2024-01-01 00:00:00 UTC),
        )
        .with_email("Bob@X.org")
        .with_user_id("B")
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(ConfirmationFilter::new().matches(&invite()));
    }

    #[test]
    fn email_match_is_case_insensitive() {
        let c = invite();
        assert!(ConfirmationFilter::new().with_email("bob@x.ORG").matches(&c));
        assert!(!ConfirmationFilter::new().with_email("eve@x.org").matches(&c));
    }

    #[test]
    fn type_status_and_scope_fields_must_all_match() {
        let c = invite();
        let f = ConfirmationFilter::new()
            .with_type(ConfirmationType::CareteamInvitation)
            .with_creator("A")
            .pending();
        assert!(f.matches(&c));
        assert!(!f.clone().with_clinic("C1").matches(&c));
        assert!(
            !ConfirmationFilter::new()
                .with_type(ConfirmationType::PasswordReset)
                .matches(&c)
        );
        assert!(
            !ConfirmationFilter::new()
                .with_status(ConfirmationStatus::Completed)
                .matches(&c)
        );
    }

    #[test]
    fn team_filter_uses_team_id() {
        let c = Confirmation::new(ConfirmationType::MedicalteamInvitation, "A")
            .with_user_id("B")
            .with_team(TeamRef {
                id: "T1".into(),
                name: "Team".into(),
            });
        assert!(ConfirmationFilter::new().with_team("T1").matches(&c));
        assert!(!ConfirmationFilter::new().with_team("T2").matches(&c));
    }

    #[test]
    fn recipient_matches_by_id_or_any_email() {
        let c = invite();
        let by_id = RecipientMatch::new(Some("B".into()), Vec::new());
        let by_email = RecipientMatch::new(Some("Z".into()), vec!["BOB@x.org".to_string()]);
        let neither = RecipientMatch::new(Some("Z".into()), vec!["z@x.org".to_string()]);
        assert!(by_id.matches(&c));
        assert!(by_email.matches(&c));
        assert!(!neither.matches(&c));
    }

    #[test]
    fn prepare_for_write_normalizes_email() {
        let stored = prepare_for_write(&invite()).unwrap();
        assert_eq!(stored.email.as_deref(), Some("bob@x.org"));
    }

    #[test]
    fn prepare_for_write_rejects_recipientless_records() {
        let c = Confirmation::new(ConfirmationType::CareteamInvitation, "A");
        assert!(prepare_for_write(&c).is_err());
    }

    #[test]
    fn ordering_is_newest_first_then_key() {
        let mut a = invite();
        a.key = "b".into();
        let mut b = invite();
        b.key = "a".into();
        let mut c = invite();
        c.created = datetime!(2024-02-01 00:00:00 UTC);
        let mut all = vec![a.clone(), b.clone(), c.clone()];
        all.sort_by(newest_first);
        let keys: Vec<_> = all.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec![c.key.as_str(), "a", "b"]);
    }
}
