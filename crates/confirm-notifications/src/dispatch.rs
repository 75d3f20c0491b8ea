use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{NotificationError, Result};
use crate::mail::{Email, MailReceipt, Mailer};
use crate::templates::Templates;
use crate::text::Values;

/// Renders a template and hands it to the mailer.
#[derive(Clone)]
pub struct Dispatcher {
    templates: Arc<Templates>,
    mailer: Arc<dyn Mailer>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("mailer", &self.mailer.name())
            .finish()
    }
}

/// One email to render and send.
#[derive(Debug, Clone)]
pub struct Outgoing<'a> {
    pub template: &'a str,
    pub to: &'a str,
    pub locale: &'a str,
    pub values: Values,
}

impl Dispatcher {
    pub fn new(templates: Arc<Templates>, mailer: Arc<dyn Mailer>) -> Self {
        Self { templates, mailer }
    }

    pub fn templates(&self) -> &Arc<Templates> {
        &self.templates
    }

    pub fn mailer(&self) -> &Arc<dyn Mailer> {
        &self.mailer
    }

    pub async fn send(&self, outgoing: Outgoing<'_>) -> Result<MailReceipt> {
        let rendered = self
            .templates
            .render(outgoing.template, &outgoing.values, outgoing.locale)?;
        let email = Email::new(outgoing.to, rendered).with_tag("template", outgoing.template);

        let receipt = self.mailer.send(&email).await?;
        if !receipt.is_accepted() {
            warn!(
                template = outgoing.template,
                status = receipt.status,
                message = %receipt.message,
                "Mail was not accepted"
            );
            return Err(NotificationError::SendFailed(format!(
                "status {}: {}",
                receipt.status, receipt.message
            )));
        }
        info!(
            template = outgoing.template,
            locale = outgoing.locale,
            mailer = self.mailer.name(),
            "Mail sent"
        );
        Ok(receipt)
    }
}
