//! Read side: detail, listing, projections and the notification inbox

use super::Engine;
use crate::access::{ListScope, assigned_ids, can_view};
use crate::approval::{ApprovalLogEntry, DeveloperAssignment};
use crate::dashboard::Dashboard;
use crate::document::Document;
use crate::notify::Notification;
use crate::progress::Progress;
use crate::store::{AssignmentFilter, CrFilter, UserFilter};
use crate::{ChangeRequest, Error, Result, Role, Status, User};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Id,
}

impl std::str::FromStr for SortField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "created_at" | "created" => Ok(SortField::CreatedAt),
            "updated_at" | "updated" => Ok(SortField::UpdatedAt),
            "id" => Ok(SortField::Id),
            _ => Err(Error::invalid(
                "sort",
                format!("unknown sort field '{}' (created_at, updated_at, id)", s),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl std::str::FromStr for SortOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(Error::invalid("order", format!("expected asc or desc, got '{}'", s))),
        }
    }
}

/// Collection query; scoping by role is applied on top
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub status: Option<Status>,
    pub search: Option<String>,
    pub sort: SortField,
    pub order: SortOrder,
    /// 1-based
    pub page: usize,
    /// Falls back to the configured default; clamped to the configured max
    pub limit: Option<usize>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            status: None,
            search: None,
            sort: SortField::default(),
            order: SortOrder::default(),
            page: 1,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
}

impl<T> Page<T> {
    fn empty(page: usize, limit: usize) -> Self {
        Self {
            items: Vec::new(),
            page,
            limit,
            total: 0,
        }
    }

    pub fn pages(&self) -> usize {
        self.total.div_ceil(self.limit.max(1))
    }
}

/// A change request with its history and attachments
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrDetail {
    #[serde(flatten)]
    pub cr: ChangeRequest,
    pub approval_log: Vec<ApprovalLogEntry>,
    pub assignments: Vec<DeveloperAssignment>,
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inbox {
    pub items: Vec<Notification>,
    pub unread: usize,
}

fn sort_crs(crs: &mut [ChangeRequest], field: SortField, order: SortOrder) {
    crs.sort_by(|a, b| {
        let ord = match field {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)),
            SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at).then_with(|| a.id.cmp(&b.id)),
            SortField::Id => a.id.cmp(&b.id),
        };
        match order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });
}

impl Engine {
    /// Load `cr_id` with its assignments, provided `actor` may see it
    ///
    /// A deleted request is reported missing to everyone but its owner.
    async fn visible(&self, actor: &User, cr_id: &str) -> Result<(ChangeRequest, Vec<DeveloperAssignment>)> {
        let cr = self.load(cr_id).await?;
        if cr.status() == Status::Deleted && !cr.is_owned_by(&actor.id) {
            return Err(Error::not_found("Change request", cr_id));
        }
        let assignments = self.store.assignments(&AssignmentFilter::cr(cr_id)).await?;
        if !can_view(&cr, actor, &assignments) {
            return Err(Error::forbidden(format!("you cannot view {}", cr_id)));
        }
        Ok((cr, assignments))
    }

    /// Display names keyed by user id; `None` loads everyone
    async fn names(&self, ids: Option<Vec<String>>) -> Result<HashMap<String, String>> {
        let users = self
            .store
            .find_users(&UserFilter {
                ids,
                ..UserFilter::default()
            })
            .await?;
        Ok(users.into_iter().map(|u| (u.id, u.name)).collect())
    }

    pub async fn get(&self, actor: &User, cr_id: &str) -> Result<CrDetail> {
        let (cr, assignments) = self.visible(actor, cr_id).await?;
        let approval_log = self.store.approval_log(cr_id).await?;
        let documents = self.store.documents(cr_id).await?;
        Ok(CrDetail {
            cr,
            approval_log,
            assignments,
            documents,
        })
    }

    /// Change requests visible to `actor`, one page at a time
    pub async fn list(&self, actor: &User, query: &ListQuery) -> Result<Page<ChangeRequest>> {
        if query.page == 0 {
            return Err(Error::invalid("page", "must be at least 1"));
        }
        let limits = &self.config.list;
        let limit = query
            .limit
            .unwrap_or(limits.default_limit)
            .clamp(1, limits.max_limit.max(1));

        let assigned = if actor.is(Role::Dev) {
            let mine = self
                .store
                .assignments(&AssignmentFilter::developer(&actor.id))
                .await?;
            assigned_ids(&mine, &actor.id)
        } else {
            HashSet::new()
        };
        let Some(filter) = ListScope::for_actor(actor).filter(query.status, &assigned) else {
            return Ok(Page::empty(query.page, limit));
        };
        let filter = CrFilter {
            search: query
                .search
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            ..filter
        };

        let mut crs = self.store.list_crs(&filter).await?;
        sort_crs(&mut crs, query.sort, query.order);
        let total = crs.len();
        let items = crs
            .into_iter()
            .skip((query.page - 1).saturating_mul(limit))
            .take(limit)
            .collect();

        Ok(Page {
            items,
            page: query.page,
            limit,
            total,
        })
    }

    /// Milestone view of a change request
    pub async fn progress(&self, actor: &User, cr_id: &str) -> Result<Progress> {
        let (cr, assignments) = self.visible(actor, cr_id).await?;
        let log = self.store.approval_log(cr_id).await?;

        let ids: HashSet<String> = log
            .iter()
            .map(|e| e.approver_id.clone())
            .chain(assignments.iter().map(|a| a.developer_id.clone()))
            .collect();
        let names = self.names(Some(ids.into_iter().collect())).await?;

        Ok(Progress::build(&cr, &log, &assignments, &names))
    }

    pub async fn dashboard(&self, actor: &User) -> Result<Dashboard> {
        let crs = self.store.list_crs(&CrFilter::default()).await?;
        let assignments = self.store.assignments(&AssignmentFilter::default()).await?;
        let names = self.names(None).await?;
        Ok(Dashboard::build(actor, &crs, &assignments, &names))
    }

    /// Attachment and approval document metadata
    pub async fn documents(&self, actor: &User, cr_id: &str) -> Result<Vec<Document>> {
        self.visible(actor, cr_id).await?;
        Ok(self.store.documents(cr_id).await?)
    }

    /// Metadata and contents of one document
    pub async fn download_document(
        &self,
        actor: &User,
        cr_id: &str,
        document_id: u64,
    ) -> Result<(Document, Vec<u8>)> {
        let doc = self
            .documents(actor, cr_id)
            .await?
            .into_iter()
            .find(|d| d.id == document_id)
            .ok_or_else(|| Error::not_found("Document", document_id.to_string()))?;
        let bytes = self.blobs.get(&doc.file_path).await?;
        Ok((doc, bytes))
    }

    pub async fn users(&self, filter: &UserFilter) -> Result<Vec<User>> {
        Ok(self.store.find_users(filter).await?)
    }

    /// Own notifications, newest first
    pub async fn inbox(&self, actor: &User, unread_only: bool) -> Result<Inbox> {
        let items = self.store.notifications(&actor.id, unread_only).await?;
        let unread = if unread_only {
            items.len()
        } else {
            items.iter().filter(|n| !n.is_read).count()
        };
        Ok(Inbox { items, unread })
    }

    pub async fn mark_read(&self, actor: &User, notification_id: u64) -> Result<()> {
        if self
            .store
            .mark_notification_read(&actor.id, notification_id)
            .await?
        {
            Ok(())
        } else {
            Err(Error::not_found("Notification", notification_id.to_string()))
        }
    }

    /// Returns how many notifications changed
    pub async fn mark_all_read(&self, actor: &User) -> Result<usize> {
        Ok(self.store.mark_all_notifications_read(&actor.id).await?)
    }
}
