//! Notifications: the notifier contract and the store-backed inbox

use crate::store::{RecordStore, UserFilter};
use crate::{Result, Role};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Event a notification reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    CrSubmitted,
    CrResubmitted,
    CrApprovedManager,
    CrPendingVp,
    CrRejectedFinal,
    CrRevisionManager,
    CrApprovedVp,
    CrNeedMapping,
    CrRejectedVp,
    CrRevisionVp,
    CrAssigned,
    CrAssignedDev,
    CrCompleted,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::CrSubmitted => "CR_SUBMITTED",
            NotificationKind::CrResubmitted => "CR_RESUBMITTED",
            NotificationKind::CrApprovedManager => "CR_APPROVED_MANAGER",
            NotificationKind::CrPendingVp => "CR_PENDING_VP",
            NotificationKind::CrRejectedFinal => "CR_REJECTED_FINAL",
            NotificationKind::CrRevisionManager => "CR_REVISION_MANAGER",
            NotificationKind::CrApprovedVp => "CR_APPROVED_VP",
            NotificationKind::CrNeedMapping => "CR_NEED_MAPPING",
            NotificationKind::CrRejectedVp => "CR_REJECTED_VP",
            NotificationKind::CrRevisionVp => "CR_REVISION_VP",
            NotificationKind::CrAssigned => "CR_ASSIGNED",
            NotificationKind::CrAssignedDev => "CR_ASSIGNED_DEV",
            NotificationKind::CrCompleted => "CR_COMPLETED",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content of one notification, before it is addressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    /// Change request the event concerns
    pub related_id: Option<String>,
}

impl Payload {
    pub fn new(kind: NotificationKind, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            kind,
            related_id: None,
        }
    }

    pub fn about(mut self, cr_id: &str) -> Self {
        self.related_id = Some(cr_id.to_string());
        self
    }
}

/// A stored inbox entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub id: u64,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_id: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(user_id: &str, payload: &Payload) -> Self {
        Self {
            id: 0,
            user_id: user_id.to_string(),
            title: payload.title.clone(),
            message: payload.message.clone(),
            kind: payload.kind,
            related_id: payload.related_id.clone(),
            is_read: false,
            created_at: Utc::now(),
        }
    }
}

/// Delivers workflow events to people
///
/// Failures are reported to the caller; the engine logs and ignores them.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_user(&self, user_id: &str, payload: &Payload) -> Result<()>;

    /// Notify every user holding `role`, returning how many were reached
    async fn notify_role(&self, role: Role, payload: &Payload) -> Result<usize>;

    /// Notify the managers of one division
    async fn notify_division_managers(&self, division: &str, payload: &Payload) -> Result<usize>;
}

/// Writes notifications into the record store inbox
pub struct StoreNotifier {
    store: Arc<dyn RecordStore>,
}

impl StoreNotifier {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    async fn fan_out(&self, filter: UserFilter, payload: &Payload) -> Result<usize> {
        let recipients = self.store.find_users(&filter).await?;
        let mut reached = 0;
        for user in recipients {
            match self.notify_user(&user.id, payload).await {
                Ok(()) => reached += 1,
                Err(e) => {
                    tracing::warn!(user = %user.id, kind = %payload.kind, error = %e, "notification not stored")
                }
            }
        }
        Ok(reached)
    }
}

#[async_trait]
impl Notifier for StoreNotifier {
    async fn notify_user(&self, user_id: &str, payload: &Payload) -> Result<()> {
        let stored = self
            .store
            .push_notification(Notification::new(user_id, payload))
            .await?;
        tracing::debug!(id = stored.id, user = %user_id, kind = %payload.kind, "notification stored");
        Ok(())
    }

    async fn notify_role(&self, role: Role, payload: &Payload) -> Result<usize> {
        self.fan_out(UserFilter::role(role), payload).await
    }

    async fn notify_division_managers(&self, division: &str, payload: &Payload) -> Result<usize> {
        let filter = UserFilter {
            division: Some(division.to_string()),
            ..UserFilter::role(Role::Manager)
        };
        self.fan_out(filter, payload).await
    }
}
