//! Email composition: template values, links into the web app, dispatch.

use confirm_core::{Confirmation, ConfirmationType};
use confirm_notifications::{Outgoing, Values};
use tracing::warn;
use url::Url;

use super::{Engine, Result};

/// Page of the web app that completes a confirmation of this type.
fn landing_page(kind: ConfirmationType) -> Option<&'static str> {
    match kind {
        ConfirmationType::EmailConfirmation => Some("signup/verify"),
        ConfirmationType::PasswordReset => Some("confirm-password-reset"),
        ConfirmationType::CareteamInvitation
        | ConfirmationType::ClinicianInvitation
        | ConfirmationType::MedicalteamInvitation
        | ConfirmationType::MedicalteamPatientInvitation => Some("login"),
        ConfirmationType::PatientClinicInvitation => Some("clinic-workspace/invites"),
        ConfirmationType::MedicalteamMonitoringInvitation => Some("patient/monitoring"),
        ConfirmationType::PatientInformation => Some("login"),
        ConfirmationType::MedicalteamDoAdmin
        | ConfirmationType::MedicalteamRemove
        | ConfirmationType::PatientPinReset
        | ConfirmationType::Notification => None,
    }
}

impl Engine {
    /// `web_url/path?k=v...`; falls back to plain concatenation for an unparsable base.
    pub(crate) fn link(&self, path: &str, params: &[(&str, &str)]) -> String {
        let base = format!("{}/", self.settings.web_url);
        match Url::parse(&base).and_then(|b| b.join(path)) {
            Ok(mut url) => {
                if !params.is_empty() {
                    url.query_pairs_mut().extend_pairs(params.iter());
                }
                url.to_string()
            }
            Err(_) => format!("{base}{path}"),
        }
    }

    /// Link that lets the recipient act on `record`.
    pub(crate) fn action_link(&self, record: &Confirmation) -> Option<String> {
        let page = landing_page(record.kind)?;
        let mut params: Vec<(&str, &str)> = Vec::new();
        if record.kind != ConfirmationType::PatientInformation {
            params.push(("key", &record.key));
        }
        if let Some(email) = record.email.as_deref() {
            params.push(("email", email));
        }
        if let Some(user_id) = record.user_id.as_deref() {
            params.push(("userId", user_id));
        }
        if let Some(team_id) = record.team_id() {
            params.push(("teamId", team_id));
        }
        if let Some(clinic_id) = record.clinic_id.as_deref() {
            params.push(("clinicId", clinic_id));
        }
        Some(self.link(page, &params))
    }

    /// Values every template may reference.
    pub(crate) fn values_for(&self, record: &Confirmation) -> Values {
        let mut values = Values::new();
        values.insert("WebURL".into(), self.settings.web_url.clone());
        values.insert("CreatorName".into(), record.creator.full_name().to_string());
        if let Some(email) = &record.email {
            values.insert("Email".into(), email.clone());
        }
        if let Some(team) = &record.team {
            values.insert("TeamName".into(), team.name.clone());
        }
        if let Some(clinic) = &record.creator.clinic_name {
            values.insert("ClinicName".into(), clinic.clone());
        }
        if let Some(link) = self.action_link(record) {
            values.insert("ActionURL".into(), link);
        }
        values
    }

    /// Renders the record's template for `to` and sends it.
    pub(crate) async fn deliver(
        &self,
        record: &Confirmation,
        to: &str,
        locale: &str,
        values: Values,
    ) -> Result<()> {
        self.send_template(&record.template_name, to, locale, values)
            .await
            .inspect_err(|e| {
                warn!(key = %record.key, kind = %record.kind, error = %e, "Confirmation mail failed");
            })
    }

    pub(crate) async fn send_template(
        &self,
        template: &str,
        to: &str,
        locale: &str,
        values: Values,
    ) -> Result<()> {
        self.dispatcher
            .send(Outgoing {
                template,
                to,
                locale,
                values,
            })
            .await?;
        Ok(())
    }
}
