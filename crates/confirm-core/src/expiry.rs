use std::collections::HashMap;

use time::{Duration, OffsetDateTime};

use crate::model::{Confirmation, ConfirmationType};

/// Per-type lifetime of a confirmation.
///
/// Expiry is derived from `created`; it never changes the stored status.
#[derive(Debug, Clone)]
pub struct ExpiryPolicy {
    default: Duration,
    overrides: HashMap<ConfirmationType, Duration>,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self::new(Duration::days(7))
            .with_override(
                ConfirmationType::MedicalteamMonitoringInvitation,
                Duration::days(30),
            )
            .with_override(ConfirmationType::PatientPinReset, Duration::hours(1))
    }
}

impl ExpiryPolicy {
    pub fn new(default: Duration) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, kind: ConfirmationType, duration: Duration) -> Self {
        self.overrides.insert(kind, duration);
        self
    }

    pub fn duration_for(&self, kind: ConfirmationType) -> Duration {
        self.overrides.get(&kind).copied().unwrap_or(self.default)
    }

    pub fn expires_at(&self, confirmation: &Confirmation) -> OffsetDateTime {
        confirmation.created + self.duration_for(confirmation.kind)
    }

    /// `now - created > duration(type)`.
    pub fn is_expired(&self, confirmation: &Confirmation, now: OffsetDateTime) -> bool {
        now - confirmation.created > self.duration_for(confirmation.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn record(kind: ConfirmationType) -> Confirmation {
        Confirmation::new_at(kind, "A", datetime!(2024-01-01 00:00:00 UTC)).with_user_id("B")
    }

    #[test]
    fn default_durations() {
        let policy = ExpiryPolicy::default();
        assert_eq!(
            policy.duration_for(ConfirmationType::CareteamInvitation),
            Duration::days(7)
        );
        assert_eq!(
            policy.duration_for(ConfirmationType::MedicalteamMonitoringInvitation),
            Duration::days(30)
        );
        assert_eq!(
            policy.duration_for(ConfirmationType::PatientPinReset),
            Duration::hours(1)
        );
    }

    #[test]
    fn expiry_is_strictly_after_duration() {
        let policy = ExpiryPolicy::default();
        let c = record(ConfirmationType::CareteamInvitation);
        assert!(!policy.is_expired(&c, datetime!(2024-01-08 00:00:00 UTC)));
        assert!(policy.is_expired(&c, datetime!(2024-01-08 00:00:01 UTC)));
        assert_eq!(policy.expires_at(&c), datetime!(2024-01-08 00:00:00 UTC));
    }

    #[test]
    fn monitoring_invite_expires_after_thirty_days() {
        let policy = ExpiryPolicy::default();
        let c = record(ConfirmationType::MedicalteamMonitoringInvitation);
        assert!(!policy.is_expired(&c, datetime!(2024-01-20 00:00:00 UTC)));
        assert!(policy.is_expired(&c, datetime!(2024-02-01 00:00:00 UTC)));
    }
}
