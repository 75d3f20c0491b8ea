//! The confirmation lifecycle engine.
//!
//! Each submodule owns one family of flows (care team, clinic, team,
//! sign-up, ...). They share the helpers defined here for duplicate
//! detection, throttling, lookups with the accept-time checks, and the
//! persist-then-side-effect pattern with compensation.

mod auth;
mod careteam;
mod clinic;
mod error;
mod events;
mod forgot;
mod inform;
mod language;
mod listing;
mod mail;
mod monitoring;
mod notifications;
mod pin_reset;
mod preview;
mod signup;
mod team;

use confirm_core::{Confirmation, ConfirmationStatus, ConfirmationType, Creator, ExpiryPolicy};
use confirm_directory::{Directories, OptionalExt, ProfileKey};
use confirm_notifications::Dispatcher;
use confirm_storage::{ConfirmationFilter, DynStore};
use serde::Deserialize;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

pub use auth::Caller;
pub use careteam::CareTeamInvite;
pub use clinic::{ClinicianInvite, PatientClinicInvite};
pub use error::{ClaimError, EngineError, Result};
pub use forgot::PasswordResetAccept;
pub use language::LanguageHint;
pub use monitoring::MonitoringInvite;
pub use notifications::{NotificationRequest, Topic};
pub use preview::Preview;
pub use signup::SignupAccept;
pub use team::{RoleChange, TeamInvite};

use crate::config::AppConfig;

/// Body of the routes that act on a single record by key.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfirmationKey {
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub throttle_limit: u64,
    pub throttle_window: time::Duration,
    pub expiry: ExpiryPolicy,
    /// Monitoring length applied on accept when the invite names none.
    pub monitoring_days: u32,
    /// Base URL of the web application used to build links.
    pub web_url: String,
    pub default_language: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for EngineSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            throttle_limit: cfg.confirmations.throttle_limit,
            throttle_window: cfg.confirmations.throttle_window(),
            expiry: cfg.confirmations.expiry(),
            monitoring_days: cfg.confirmations.monitoring_days,
            web_url: cfg.templates.web_url.trim_end_matches('/').to_string(),
            default_language: cfg.templates.default_language.clone(),
        }
    }
}

pub struct Engine {
    store: DynStore,
    dirs: Directories,
    dispatcher: Dispatcher,
    settings: EngineSettings,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("dispatcher", &self.dispatcher)
            .field("settings", &self.settings)
            .finish()
    }
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

impl Engine {
    pub fn new(
        store: DynStore,
        dirs: Directories,
        dispatcher: Dispatcher,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            dirs,
            dispatcher,
            settings,
        }
    }

    pub fn store(&self) -> &DynStore {
        &self.store
    }

    pub fn directories(&self) -> &Directories {
        &self.dirs
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub async fn status(&self) -> Result<()> {
        self.store.ping().await?;
        Ok(())
    }

    fn is_expired(&self, record: &Confirmation) -> bool {
        self.settings.expiry.is_expired(record, now())
    }

    /// The pending, non-expired record matching `filter`, if any.
    async fn live_duplicate(&self, filter: ConfirmationFilter) -> Result<Option<Confirmation>> {
        let pending = self.store.find_many(&filter.pending(), &[]).await?;
        Ok(pending.into_iter().find(|c| !self.is_expired(c)))
    }

    /// Rejects a send while a live pending record matches `filter`.
    ///
    /// Expired pending matches no longer block: they are canceled so their
    /// keys stop working, and handed back for callers that keep directory
    /// state per invite.
    async fn ensure_no_duplicate(&self, filter: ConfirmationFilter) -> Result<Vec<Confirmation>> {
        let pending = self.store.find_many(&filter.pending(), &[]).await?;
        let (expired, live): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(|c| self.is_expired(c));
        if let Some(existing) = live.first() {
            info!(
                key = %existing.key,
                kind = %existing.kind,
                creator_id = %existing.creator_id,
                "Rejecting duplicate invitation"
            );
            return Err(EngineError::existing_invite());
        }

        let mut superseded = Vec::with_capacity(expired.len());
        for mut stale in expired {
            self.finish(&mut stale, ConfirmationStatus::Canceled).await?;
            info!(key = %stale.key, kind = %stale.kind, "Expired confirmation superseded");
            superseded.push(stale);
        }
        Ok(superseded)
    }

    /// Admits a new record of a throttled type while fewer than the limit
    /// were created for `user_id` inside the window.
    async fn check_throttle(&self, kind: ConfirmationType, user_id: &str) -> Result<()> {
        if !kind.is_throttled() {
            return Ok(());
        }
        let recent = self
            .store
            .count_recent(kind, user_id, self.settings.throttle_window)
            .await?;
        if recent >= self.settings.throttle_limit {
            warn!(kind = %kind, user_id, recent, "Throttle limit reached");
            return Err(EngineError::TooManyAttempts);
        }
        Ok(())
    }

    async fn save(&self, record: &Confirmation) -> Result<()> {
        self.store.upsert(record).await?;
        debug!(
            key = %record.key,
            kind = %record.kind,
            status = %record.status,
            "Confirmation saved"
        );
        Ok(())
    }

    /// Newest record matching `filter`, or `NotFound`.
    async fn load(&self, filter: &ConfirmationFilter) -> Result<Confirmation> {
        self.store
            .find_one(filter)
            .await?
            .ok_or_else(|| EngineError::not_found("confirmation not found"))
    }

    /// Checks applied before completing a record: still pending, not expired.
    fn ensure_actionable(&self, record: &Confirmation) -> Result<()> {
        if !record.is_pending() {
            return Err(EngineError::forbidden(format!(
                "confirmation is already {}",
                record.status
            )));
        }
        if self.is_expired(record) {
            info!(key = %record.key, kind = %record.kind, "Confirmation expired");
            return Err(EngineError::Expired);
        }
        Ok(())
    }

    async fn finish(&self, record: &mut Confirmation, status: ConfirmationStatus) -> Result<()> {
        record.transition(status, now())?;
        self.save(record).await?;
        info!(
            key = %record.key,
            kind = %record.kind,
            status = %status,
            user_id = record.user_id.as_deref().unwrap_or_default(),
            "Confirmation closed"
        );
        Ok(())
    }

    /// Cancels a freshly persisted record whose directory side effect failed
    /// and hands back the original failure.
    async fn compensate(&self, record: &mut Confirmation, cause: EngineError) -> EngineError {
        warn!(key = %record.key, kind = %record.kind, error = %cause, "Side effect failed, canceling");
        if let Err(e) = self.finish(record, ConfirmationStatus::Canceled).await {
            warn!(key = %record.key, error = %e, "Could not cancel confirmation");
        }
        cause
    }

    /// Creator snapshot for rendering. Profile failures fall back to an empty name.
    async fn creator_snapshot(&self, creator_id: &str) -> Creator {
        if creator_id.is_empty() {
            return Creator::default();
        }
        match self
            .dirs
            .profile
            .get(creator_id, &[ProfileKey::Profile])
            .await
        {
            Ok(data) => Creator::with_full_name(data.full_name().unwrap_or_default()),
            Err(e) => {
                warn!(user_id = creator_id, error = %e, "Creator profile unavailable");
                Creator::default()
            }
        }
    }

    /// Account behind an email or id, `None` when unknown.
    async fn known_user(&self, id_or_email: &str) -> Result<Option<confirm_directory::User>> {
        Ok(self.dirs.identity.get_user(id_or_email).await.optional()?)
    }

    /// Fills `userId` on records whose recipient has since signed up.
    async fn attach_user_ids(&self, records: &mut [Confirmation]) {
        for record in records.iter_mut().filter(|r| r.user_id.is_none()) {
            let Some(email) = record.email.clone() else {
                continue;
            };
            match self.dirs.identity.get_user(&email).await.optional() {
                Ok(Some(user)) => {
                    record.user_id = Some(user.user_id);
                    if let Err(e) = self.store.upsert(record).await {
                        warn!(key = %record.key, error = %e, "Could not attach user id");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(key = %record.key, error = %e, "Recipient lookup failed");
                }
            }
        }
    }
}
