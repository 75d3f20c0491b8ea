use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::info;

use super::{Email, MailReceipt, Mailer};
use crate::error::{NotificationError, Result};

/// Accepts everything and sends nothing.
#[derive(Debug, Default)]
pub struct NullMailer;

#[async_trait]
impl Mailer for NullMailer {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn send(&self, email: &Email) -> Result<MailReceipt> {
        info!(to = ?email.to, subject = %email.subject, "Mail discarded");
        Ok(MailReceipt::accepted("discarded"))
    }
}

/// Keeps sent messages in memory.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Email>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every send fails.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<Email> {
        self.sent.lock().ok().and_then(|s| s.last().cloned())
    }

    pub fn count(&self) -> usize {
        self.sent.lock().map(|s| s.len()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, email: &Email) -> Result<MailReceipt> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::SendFailed("mailer is failing".into()));
        }
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| NotificationError::SendFailed("mailer state poisoned".into()))?;
        sent.push(email.clone());
        Ok(MailReceipt::accepted(format!("recorded #{}", sent.len())))
    }
}
