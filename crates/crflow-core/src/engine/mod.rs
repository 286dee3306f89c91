//! Change request lifecycle engine
//!
//! Every mutation follows the same shape: load, check (not found, role,
//! division or ownership, notes, status and counters), write through a
//! conditional update keyed on the status and counters that were checked,
//! append the audit entry, then fire side effects. Side effects never fail an operation.

mod owner;
mod query;
mod review;

pub use query::{CrDetail, Inbox, ListQuery, Page, SortField, SortOrder};
pub use review::Decision;

use crate::approval::{ApprovalAction, ApprovalLogEntry};
use crate::blob::BlobStore;
use crate::config::Config;
use crate::document::DocumentGenerator;
use crate::notify::{Notifier, Payload};
use crate::store::{Conditional, Expected, RecordStore};
use crate::{ChangeRequest, CrPatch, Error, Result, Role, Status, User};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Drives change requests through the approval chain
pub struct Engine {
    store: Arc<dyn RecordStore>,
    notifier: Arc<dyn Notifier>,
    generator: Arc<dyn DocumentGenerator>,
    blobs: Arc<dyn BlobStore>,
    config: Config,
    /// Serializes id allocation: read max sequence, then insert
    id_lock: Mutex<()>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn Notifier>,
        generator: Arc<dyn DocumentGenerator>,
        blobs: Arc<dyn BlobStore>,
        config: Config,
    ) -> Self {
        Self {
            store,
            notifier,
            generator,
            blobs,
            config,
            id_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Register a participant
    pub async fn register_user(
        &self,
        email: &str,
        name: &str,
        role: Role,
        division: Option<String>,
    ) -> Result<User> {
        let user = User::new(email, name, role, division);
        user.validate()?;
        self.store.insert_user(user.clone()).await?;
        tracing::info!(user = %user.id, role = %user.role, "user registered");
        Ok(user)
    }

    /// Resolve an actor by id or email
    pub async fn resolve_user(&self, key: &str) -> Result<User> {
        if let Some(user) = self.store.get_user(key).await? {
            return Ok(user);
        }
        self.store
            .find_user_by_email(key)
            .await?
            .ok_or_else(|| Error::not_found("User", key))
    }

    async fn load(&self, id: &str) -> Result<ChangeRequest> {
        self.store
            .get_cr(id)
            .await?
            .ok_or_else(|| Error::not_found("Change request", id))
    }

    /// Write `patch` if `cr` is still stored exactly as it was checked
    async fn transition(&self, cr: &ChangeRequest, patch: CrPatch) -> Result<ChangeRequest> {
        let from = cr.status();
        match self.store.update_cr_if(&cr.id, &Expected::of(cr), &patch).await? {
            Conditional::Applied(updated) => {
                if updated.status() != from {
                    tracing::info!(cr_id = %cr.id, %from, to = %updated.status(), "transition");
                }
                Ok(updated)
            }
            Conditional::Stale(current) => Err(Error::precondition(
                format!("{} changed concurrently", cr.id),
                current,
            )),
        }
    }

    async fn record(
        &self,
        cr_id: &str,
        actor: &User,
        action: ApprovalAction,
        notes: impl Into<String>,
    ) -> Result<ApprovalLogEntry> {
        let entry = ApprovalLogEntry::new(cr_id, actor, action, notes);
        Ok(self.store.append_approval_log(entry).await?)
    }

    /// Trimmed notes, provided they meet the configured minimum
    fn decision_notes(&self, notes: &str) -> Result<String> {
        let notes = notes.trim();
        let min = self.config.workflow.min_decision_notes;
        if notes.chars().count() < min {
            return Err(Error::invalid(
                "notes",
                format!("must be at least {} characters", min),
            ));
        }
        Ok(notes.to_string())
    }

    async fn notify_user(&self, user_id: &str, payload: Payload) {
        if let Err(e) = self.notifier.notify_user(user_id, &payload).await {
            tracing::warn!(user = %user_id, kind = %payload.kind, error = %e, "notification failed");
        }
    }

    async fn notify_role(&self, role: Role, payload: Payload) {
        if let Err(e) = self.notifier.notify_role(role, &payload).await {
            tracing::warn!(%role, kind = %payload.kind, error = %e, "notification failed");
        }
    }

    async fn notify_division_managers(&self, division: Option<&str>, payload: Payload) {
        let Some(division) = division else {
            tracing::warn!(kind = %payload.kind, "owner has no division, no manager notified");
            return;
        };
        if let Err(e) = self
            .notifier
            .notify_division_managers(division, &payload)
            .await
        {
            tracing::warn!(%division, kind = %payload.kind, error = %e, "notification failed");
        }
    }
}

/// Fail unless `cr` is in `status`
fn expect_status(cr: &ChangeRequest, status: Status, reason: &str) -> Result<()> {
    if cr.status() == status {
        Ok(())
    } else {
        Err(Error::precondition(reason, cr.status()))
    }
}
