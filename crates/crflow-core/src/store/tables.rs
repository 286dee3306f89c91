//! Table-backed [`RecordStore`] shared by the memory and JSONL backends

use super::{
    AssignmentFilter, Conditional, CrFilter, Expected, RecordStore, StoreResult, UserFilter,
};
use crate::approval::{ApprovalLogEntry, DeveloperAssignment};
use crate::document::Document;
use crate::error::StoreError;
use crate::id::sequence_in;
use crate::notify::Notification;
use crate::request::{ChangeRequest, CrPatch};
use crate::user::User;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use tokio::sync::{RwLock, RwLockReadGuard};

/// Identifies one table for persistence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    ChangeRequests,
    ApprovalLog,
    Assignments,
    Documents,
    Users,
    Notifications,
}

/// All records, held in memory
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub crs: HashMap<String, ChangeRequest>,
    pub approval_log: Vec<ApprovalLogEntry>,
    pub assignments: Vec<DeveloperAssignment>,
    pub documents: Vec<Document>,
    pub users: HashMap<String, User>,
    pub notifications: Vec<Notification>,
}

impl Tables {
    fn next_log_id(&self) -> u64 {
        self.approval_log.iter().map(|e| e.id).max().unwrap_or(0) + 1
    }

    fn next_document_id(&self) -> u64 {
        self.documents.iter().map(|d| d.id).max().unwrap_or(0) + 1
    }

    fn next_notification_id(&self) -> u64 {
        self.notifications.iter().map(|n| n.id).max().unwrap_or(0) + 1
    }
}

/// Writes tables somewhere after each mutation
///
/// Backends shared between processes hand out a lock and fresh tables so that
/// every mutation runs against what is stored, not against this handle's copy.
pub trait Persist: Send + Sync {
    fn save(&self, tables: &Tables, table: Table) -> StoreResult<()>;

    /// Exclusive lock held for the whole of one mutation; released on drop
    fn lock_exclusive(&self) -> StoreResult<Option<File>> {
        Ok(None)
    }

    /// Stored tables, read under the exclusive lock already held
    fn reload(&self) -> StoreResult<Option<Tables>> {
        Ok(None)
    }

    /// Stored tables, read under a shared lock
    fn snapshot(&self) -> StoreResult<Option<Tables>> {
        Ok(None)
    }
}

/// Keeps nothing
#[derive(Debug, Default)]
pub struct Volatile;

impl Persist for Volatile {
    fn save(&self, _tables: &Tables, _table: Table) -> StoreResult<()> {
        Ok(())
    }
}

/// Record store over in-memory tables and a persistence strategy
pub struct TableStore<P: Persist> {
    tables: RwLock<Tables>,
    persist: P,
}

impl TableStore<Volatile> {
    pub fn new() -> Self {
        Self::with_tables(Tables::default(), Volatile)
    }
}

impl Default for TableStore<Volatile> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Persist> TableStore<P> {
    pub(crate) fn with_tables(tables: Tables, persist: P) -> Self {
        Self {
            tables: RwLock::new(tables),
            persist,
        }
    }

    pub(crate) fn persist(&self) -> &P {
        &self.persist
    }

    /// Mutate a copy under both locks; it replaces the tables once saved
    async fn write<T>(
        &self,
        table: Table,
        f: impl FnOnce(&mut Tables) -> StoreResult<T> + Send,
    ) -> StoreResult<T> {
        let mut tables = self.tables.write().await;
        let lock = self.persist.lock_exclusive()?;
        let mut next = match self.persist.reload()? {
            Some(stored) => stored,
            None => tables.clone(),
        };
        let out = f(&mut next)?;
        self.persist.save(&next, table)?;
        *tables = next;
        drop(lock);
        Ok(out)
    }

    /// Current tables, refreshed from storage when the backend is shared
    async fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        let mut tables = self.tables.write().await;
        if let Some(stored) = self.persist.snapshot()? {
            *tables = stored;
        }
        Ok(tables.downgrade())
    }
}

#[async_trait]
impl<P: Persist> RecordStore for TableStore<P> {
    async fn get_cr(&self, id: &str) -> StoreResult<Option<ChangeRequest>> {
        Ok(self.read().await?.crs.get(id).cloned())
    }

    async fn max_cr_sequence(&self, period: &str) -> StoreResult<Option<u32>> {
        let tables = self.read().await?;
        Ok(tables
            .crs
            .keys()
            .filter_map(|id| sequence_in(id, period))
            .max())
    }

    async fn insert_cr(&self, cr: ChangeRequest) -> StoreResult<()> {
        self.write(Table::ChangeRequests, |tables| {
            if tables.crs.contains_key(&cr.id) {
                return Err(StoreError::Conflict(cr.id));
            }
            tables.crs.insert(cr.id.clone(), cr);
            Ok(())
        })
        .await
    }

    async fn update_cr_if(
        &self,
        id: &str,
        expected: &Expected,
        patch: &CrPatch,
    ) -> StoreResult<Conditional> {
        self.write(Table::ChangeRequests, |tables| {
            let cr = tables
                .crs
                .get_mut(id)
                .ok_or_else(|| StoreError::Missing(id.to_string()))?;
            if !expected.matches(cr) {
                return Ok(Conditional::Stale(cr.status()));
            }
            cr.apply(patch);
            Ok(Conditional::Applied(cr.clone()))
        })
        .await
    }

    async fn list_crs(&self, filter: &CrFilter) -> StoreResult<Vec<ChangeRequest>> {
        let tables = self.read().await?;
        Ok(tables
            .crs
            .values()
            .filter(|cr| filter.matches(cr))
            .cloned()
            .collect())
    }

    async fn append_approval_log(
        &self,
        mut entry: ApprovalLogEntry,
    ) -> StoreResult<ApprovalLogEntry> {
        self.write(Table::ApprovalLog, |tables| {
            entry.id = tables.next_log_id();
            tables.approval_log.push(entry.clone());
            Ok(entry)
        })
        .await
    }

    async fn approval_log(&self, cr_id: &str) -> StoreResult<Vec<ApprovalLogEntry>> {
        let tables = self.read().await?;
        let mut entries: Vec<_> = tables
            .approval_log
            .iter()
            .filter(|e| e.cr_id == cr_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.id);
        Ok(entries)
    }

    async fn create_assignments(&self, entries: Vec<DeveloperAssignment>) -> StoreResult<()> {
        self.write(Table::Assignments, |tables| {
            let mut seen: HashSet<(String, String)> = tables
                .assignments
                .iter()
                .map(|a| (a.cr_id.clone(), a.developer_id.clone()))
                .collect();
            for entry in &entries {
                if !seen.insert((entry.cr_id.clone(), entry.developer_id.clone())) {
                    return Err(StoreError::Conflict(format!(
                        "{} already assigned to {}",
                        entry.developer_id, entry.cr_id
                    )));
                }
            }
            tables.assignments.extend(entries);
            Ok(())
        })
        .await
    }

    async fn assignments(
        &self,
        filter: &AssignmentFilter,
    ) -> StoreResult<Vec<DeveloperAssignment>> {
        let tables = self.read().await?;
        Ok(tables
            .assignments
            .iter()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect())
    }

    async fn insert_document(&self, mut document: Document) -> StoreResult<Document> {
        self.write(Table::Documents, |tables| {
            document.id = tables.next_document_id();
            tables.documents.push(document.clone());
            Ok(document)
        })
        .await
    }

    async fn documents(&self, cr_id: &str) -> StoreResult<Vec<Document>> {
        let tables = self.read().await?;
        Ok(tables
            .documents
            .iter()
            .filter(|d| d.cr_id == cr_id)
            .cloned()
            .collect())
    }

    async fn delete_document(
        &self,
        cr_id: &str,
        document_id: u64,
    ) -> StoreResult<Option<Document>> {
        self.write(Table::Documents, |tables| {
            let pos = tables
                .documents
                .iter()
                .position(|d| d.id == document_id && d.cr_id == cr_id);
            Ok(pos.map(|pos| tables.documents.remove(pos)))
        })
        .await
    }

    async fn count_documents(&self, cr_id: &str) -> StoreResult<usize> {
        let tables = self.read().await?;
        Ok(tables.documents.iter().filter(|d| d.cr_id == cr_id).count())
    }

    async fn insert_user(&self, user: User) -> StoreResult<()> {
        self.write(Table::Users, |tables| {
            if tables.users.contains_key(&user.id) {
                return Err(StoreError::Conflict(user.id));
            }
            if tables
                .users
                .values()
                .any(|u| u.email.eq_ignore_ascii_case(&user.email))
            {
                return Err(StoreError::Conflict(user.email));
            }
            tables.users.insert(user.id.clone(), user);
            Ok(())
        })
        .await
    }

    async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.read().await?.users.get(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = email.trim();
        let tables = self.read().await?;
        Ok(tables
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_users(&self, filter: &UserFilter) -> StoreResult<Vec<User>> {
        let tables = self.read().await?;
        let mut users: Vec<_> = tables
            .users
            .values()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    async fn push_notification(&self, mut notification: Notification) -> StoreResult<Notification> {
        self.write(Table::Notifications, |tables| {
            notification.id = tables.next_notification_id();
            tables.notifications.push(notification.clone());
            Ok(notification)
        })
        .await
    }

    async fn notifications(
        &self,
        user_id: &str,
        unread_only: bool,
    ) -> StoreResult<Vec<Notification>> {
        let tables = self.read().await?;
        let mut found: Vec<_> = tables
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && (!unread_only || !n.is_read))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(found)
    }

    async fn mark_notification_read(&self, user_id: &str, id: u64) -> StoreResult<bool> {
        self.write(Table::Notifications, |tables| {
            let found = tables
                .notifications
                .iter_mut()
                .find(|n| n.id == id && n.user_id == user_id);
            Ok(match found {
                Some(n) => {
                    n.is_read = true;
                    true
                }
                None => false,
            })
        })
        .await
    }

    async fn mark_all_notifications_read(&self, user_id: &str) -> StoreResult<usize> {
        self.write(Table::Notifications, |tables| {
            let mut changed = 0;
            for n in tables
                .notifications
                .iter_mut()
                .filter(|n| n.user_id == user_id && !n.is_read)
            {
                n.is_read = true;
                changed += 1;
            }
            Ok(changed)
        })
        .await
    }
}
