//! Record store contract and the bundled backends
//!
//! The engine only talks to [`RecordStore`]. Two backends share one table
//! implementation: [`MemoryStore`] (volatile) and [`JsonlStore`] (one JSONL
//! file per table under `.crflow/`).

mod jsonl;
mod tables;

pub use jsonl::{CRFLOW_DIR, JsonlFiles, JsonlStore};
pub use tables::{Persist, Table, TableStore, Tables, Volatile};

use crate::approval::{ApprovalLogEntry, DeveloperAssignment};
use crate::document::Document;
use crate::error::StoreError;
use crate::notify::Notification;
use crate::request::{ChangeRequest, CrPatch, Status};
use crate::user::{Role, User};
use async_trait::async_trait;
use std::collections::HashSet;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// In-memory store, lost on drop
pub type MemoryStore = TableStore<Volatile>;

/// The state a caller checked before asking for a conditional update
///
/// Counters are part of the guard: a record that left a status and came back
/// to it has moved on even though the status matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expected {
    pub status: Status,
    pub manager_revision_count: u32,
    pub vp_revision_count: u32,
}

impl Expected {
    pub fn of(cr: &ChangeRequest) -> Self {
        Self {
            status: cr.status(),
            manager_revision_count: cr.manager_revision_count,
            vp_revision_count: cr.vp_revision_count,
        }
    }

    pub fn matches(&self, cr: &ChangeRequest) -> bool {
        *self == Self::of(cr)
    }
}

/// Outcome of a conditional update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conditional {
    /// Precondition held; the updated record
    Applied(ChangeRequest),
    /// Record had already moved on; the status found instead
    Stale(Status),
}

/// Persistence-level filter for change request collections
#[derive(Debug, Clone, Default)]
pub struct CrFilter {
    pub owner_id: Option<String>,
    pub owner_division: Option<String>,
    /// `None` means any status
    pub statuses: Option<Vec<Status>>,
    /// Restrict to these ids
    pub ids: Option<HashSet<String>>,
    pub include_deleted: bool,
    /// Case-insensitive substring of id or title
    pub search: Option<String>,
}

impl CrFilter {
    pub fn matches(&self, cr: &ChangeRequest) -> bool {
        if !self.include_deleted && cr.status() == Status::Deleted {
            return false;
        }
        if let Some(ref owner) = self.owner_id
            && &cr.owner_id != owner
        {
            return false;
        }
        if let Some(ref division) = self.owner_division
            && cr.owner_division.as_ref() != Some(division)
        {
            return false;
        }
        if let Some(ref statuses) = self.statuses
            && !statuses.contains(&cr.status())
        {
            return false;
        }
        if let Some(ref ids) = self.ids
            && !ids.contains(&cr.id)
        {
            return false;
        }
        if let Some(ref needle) = self.search {
            let needle = needle.to_lowercase();
            if !cr.id.to_lowercase().contains(&needle)
                && !cr.form_data.title.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub division: Option<String>,
    pub ids: Option<Vec<String>>,
}

impl UserFilter {
    pub fn role(role: Role) -> Self {
        Self {
            role: Some(role),
            ..Self::default()
        }
    }

    pub fn matches(&self, user: &User) -> bool {
        self.role.is_none_or(|role| user.role == role)
            && self
                .division
                .as_ref()
                .is_none_or(|d| user.division.as_ref() == Some(d))
            && self.ids.as_ref().is_none_or(|ids| ids.contains(&user.id))
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentFilter {
    pub cr_id: Option<String>,
    pub developer_id: Option<String>,
}

impl AssignmentFilter {
    pub fn cr(cr_id: &str) -> Self {
        Self {
            cr_id: Some(cr_id.to_string()),
            developer_id: None,
        }
    }

    pub fn developer(developer_id: &str) -> Self {
        Self {
            cr_id: None,
            developer_id: Some(developer_id.to_string()),
        }
    }

    pub fn matches(&self, assignment: &DeveloperAssignment) -> bool {
        self.cr_id.as_ref().is_none_or(|id| &assignment.cr_id == id)
            && self
                .developer_id
                .as_ref()
                .is_none_or(|id| &assignment.developer_id == id)
    }
}

/// Durable storage consumed by the lifecycle engine
///
/// Implementations must make `update_cr_if` and `create_assignments` atomic:
/// the comparison against [`Expected`] and the write happen under one lock or
/// transaction, across every handle open on the same storage.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // Change requests

    async fn get_cr(&self, id: &str) -> StoreResult<Option<ChangeRequest>>;

    /// Highest sequence stored under a month prefix, deleted records included
    async fn max_cr_sequence(&self, period: &str) -> StoreResult<Option<u32>>;

    /// Insert a new record; fails with `Conflict` if the id exists
    async fn insert_cr(&self, cr: ChangeRequest) -> StoreResult<()>;

    /// Apply `patch` only if the stored record still matches `expected`
    async fn update_cr_if(
        &self,
        id: &str,
        expected: &Expected,
        patch: &CrPatch,
    ) -> StoreResult<Conditional>;

    async fn list_crs(&self, filter: &CrFilter) -> StoreResult<Vec<ChangeRequest>>;

    // Approval log

    /// Append an entry, returning it with its assigned sequence number
    async fn append_approval_log(&self, entry: ApprovalLogEntry) -> StoreResult<ApprovalLogEntry>;

    /// Entries for one change request in append order
    async fn approval_log(&self, cr_id: &str) -> StoreResult<Vec<ApprovalLogEntry>>;

    // Assignments

    /// Insert every entry or none
    async fn create_assignments(&self, entries: Vec<DeveloperAssignment>) -> StoreResult<()>;

    async fn assignments(&self, filter: &AssignmentFilter)
    -> StoreResult<Vec<DeveloperAssignment>>;

    // Documents

    async fn insert_document(&self, document: Document) -> StoreResult<Document>;

    async fn documents(&self, cr_id: &str) -> StoreResult<Vec<Document>>;

    async fn delete_document(&self, cr_id: &str, document_id: u64)
    -> StoreResult<Option<Document>>;

    async fn count_documents(&self, cr_id: &str) -> StoreResult<usize>;

    // Users

    /// Insert a user; fails with `Conflict` on a duplicate id or email
    async fn insert_user(&self, user: User) -> StoreResult<()>;

    async fn get_user(&self, id: &str) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_users(&self, filter: &UserFilter) -> StoreResult<Vec<User>>;

    // Notifications

    async fn push_notification(&self, notification: Notification) -> StoreResult<Notification>;

    /// Newest first
    async fn notifications(&self, user_id: &str, unread_only: bool)
    -> StoreResult<Vec<Notification>>;

    async fn mark_notification_read(&self, user_id: &str, id: u64) -> StoreResult<bool>;

    async fn mark_all_notifications_read(&self, user_id: &str) -> StoreResult<usize>;
}
