//! Operations available to the owner of a change request

use super::{Engine, expect_status};
use crate::access::{ensure_owner, ensure_role};
use crate::approval::ApprovalAction;
use crate::blob::sanitize_file_name;
use crate::config::ResubmitRouting;
use crate::document::{Document, FileType, NewAttachment};
use crate::error::{FieldError, StoreError};
use crate::id::{next_cr_id, period_prefix};
use crate::notify::{NotificationKind, Payload};
use crate::request::{MANAGER_REVISION_CAP, VP_REVISION_CAP};
use crate::{ChangeRequest, CrPatch, Error, FormData, Result, Role, Status, User};
use chrono::Utc;

impl Engine {
    /// Create a draft with a freshly allocated id
    pub async fn create(&self, actor: &User, form: FormData) -> Result<ChangeRequest> {
        ensure_role(actor, &[Role::User])?;
        form.validate()?;

        let _guard = self.id_lock.lock().await;
        let period = period_prefix(self.config.prefix(), Utc::now());
        let mut retried = false;
        loop {
            let max = self.store.max_cr_sequence(&period).await?;
            let cr = ChangeRequest::draft(
                next_cr_id(&period, max),
                actor.id.clone(),
                actor.division.clone(),
                form.clone(),
            );
            match self.store.insert_cr(cr.clone()).await {
                Ok(()) => {
                    tracing::info!(cr_id = %cr.id, owner = %actor.id, "change request created");
                    return Ok(cr);
                }
                Err(StoreError::Conflict(id)) if !retried => {
                    tracing::debug!(%id, "id taken, allocating again");
                    retried = true;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Replace the form data while the request is editable
    pub async fn edit(&self, actor: &User, cr_id: &str, form: FormData) -> Result<ChangeRequest> {
        let cr = self.load(cr_id).await?;
        ensure_owner(&cr, actor)?;
        form.validate()?;
        if !cr.status().is_editable() {
            return Err(Error::precondition(
                "only DRAFT or revision requests can be edited",
                cr.status(),
            ));
        }
        self.transition(&cr, CrPatch::form(form)).await
    }

    /// Soft-delete a draft and drop its stored files
    pub async fn delete(&self, actor: &User, cr_id: &str) -> Result<ChangeRequest> {
        let cr = self.load(cr_id).await?;
        ensure_owner(&cr, actor)?;
        expect_status(&cr, Status::Draft, "only DRAFT requests can be deleted")?;

        let deleted = self.transition(&cr, CrPatch::to(Status::Deleted)).await?;

        match self.store.documents(cr_id).await {
            Ok(documents) => {
                for doc in documents {
                    if let Err(e) = self.blobs.delete(&doc.file_path).await {
                        tracing::warn!(%cr_id, blob = %doc.file_path, error = %e, "blob not deleted");
                    }
                }
            }
            Err(e) => tracing::warn!(%cr_id, error = %e, "could not list documents for cleanup"),
        }

        Ok(deleted)
    }

    /// Send a draft to the division manager
    pub async fn submit(&self, actor: &User, cr_id: &str) -> Result<ChangeRequest> {
        let cr = self.load(cr_id).await?;
        ensure_owner(&cr, actor)?;
        expect_status(&cr, Status::Draft, "only DRAFT requests can be submitted")?;

        let updated = self
            .transition(&cr, CrPatch::to(Status::PendingManager))
            .await?;
        self.record(cr_id, actor, ApprovalAction::Submit, "CR submitted for manager approval")
            .await?;

        self.notify_division_managers(
            cr.owner_division.as_deref(),
            Payload::new(
                NotificationKind::CrSubmitted,
                "New change request awaiting approval",
                format!("{} from {} is waiting for your approval", cr_id, actor.name),
            )
            .about(cr_id),
        )
        .await;

        Ok(updated)
    }

    /// Send a revised request back into review
    pub async fn resubmit(&self, actor: &User, cr_id: &str) -> Result<ChangeRequest> {
        let cr = self.load(cr_id).await?;
        ensure_owner(&cr, actor)?;

        let mut patch = match cr.status() {
            Status::RevisionManager => {
                let count = cr.manager_revision_count + 1;
                if count > MANAGER_REVISION_CAP {
                    return Err(Error::revision_cap(
                        format!("at most {} manager revisions", MANAGER_REVISION_CAP),
                        cr.status(),
                        cr.manager_revision_count,
                    ));
                }
                CrPatch {
                    manager_revision_count: Some(count),
                    ..CrPatch::to(Status::PendingManager)
                }
            }
            Status::RevisionVp => {
                let count = cr.vp_revision_count + 1;
                if count > VP_REVISION_CAP {
                    return Err(Error::revision_cap(
                        format!("at most {} VP revisions", VP_REVISION_CAP),
                        cr.status(),
                        cr.vp_revision_count,
                    ));
                }
                CrPatch {
                    vp_revision_count: Some(count),
                    ..CrPatch::to(Status::PendingManager)
                }
            }
            other => {
                return Err(Error::precondition(
                    "only requests under revision can be resubmitted",
                    other,
                ));
            }
        };

        if cr.status() == Status::RevisionVp
            && self.config.workflow.resubmit_routing == ResubmitRouting::ReturnToVp
        {
            patch.status = Some(Status::PendingVp);
        }

        let updated = self.transition(&cr, patch).await?;
        self.record(cr_id, actor, ApprovalAction::Resubmit, "CR resubmitted after revision")
            .await?;

        let payload = Payload::new(
            NotificationKind::CrResubmitted,
            "Revised change request awaiting approval",
            format!("{} from {} was revised and is waiting for your approval", cr_id, actor.name),
        )
        .about(cr_id);
        match updated.status() {
            Status::PendingVp => self.notify_role(Role::Vp, payload).await,
            _ => {
                self.notify_division_managers(cr.owner_division.as_deref(), payload)
                    .await
            }
        }

        Ok(updated)
    }

    /// Upload an attachment while the request is editable
    pub async fn add_attachment(
        &self,
        actor: &User,
        cr_id: &str,
        upload: NewAttachment,
    ) -> Result<Document> {
        let cr = self.load(cr_id).await?;
        ensure_owner(&cr, actor)?;

        let limits = &self.config.attachments;
        let mut errors = Vec::new();
        if upload.file_name.trim().is_empty() {
            errors.push(FieldError::new("file_name", "must not be empty"));
        }
        if upload.bytes.len() as u64 > limits.max_file_size {
            errors.push(FieldError::new(
                "file",
                format!("must be at most {} bytes", limits.max_file_size),
            ));
        }
        if !limits.allows(&upload.mime_type) {
            errors.push(FieldError::new(
                "mime_type",
                format!("{} is not an accepted file type", upload.mime_type),
            ));
        }
        if !errors.is_empty() {
            return Err(Error::Validation(errors));
        }

        if !cr.status().is_editable() {
            return Err(Error::precondition(
                "attachments can only be added while the request is editable",
                cr.status(),
            ));
        }
        let count = self.store.count_documents(cr_id).await?;
        if count >= limits.max_per_cr {
            return Err(Error::precondition(
                format!("at most {} documents per request", limits.max_per_cr),
                cr.status(),
            ));
        }

        let key = format!(
            "attachments/{}/{}-{}",
            cr_id,
            Utc::now().timestamp_millis(),
            sanitize_file_name(&upload.file_name)
        );
        let reference = self.blobs.put(&key, &upload.bytes).await?;
        let document = Document::new(
            cr_id,
            upload.file_name.trim(),
            reference,
            upload.bytes.len() as u64,
            upload.mime_type.trim(),
            FileType::Attachment,
        );
        let stored = self.store.insert_document(document).await?;
        tracing::info!(%cr_id, document = stored.id, "attachment added");
        Ok(stored)
    }

    /// Remove an attachment while the request is editable
    pub async fn remove_attachment(&self, actor: &User, cr_id: &str, document_id: u64) -> Result<()> {
        let cr = self.load(cr_id).await?;
        ensure_owner(&cr, actor)?;
        if !cr.status().is_editable() {
            return Err(Error::precondition(
                "attachments can only be removed while the request is editable",
                cr.status(),
            ));
        }

        let document = self
            .store
            .documents(cr_id)
            .await?
            .into_iter()
            .find(|d| d.id == document_id && d.file_type == FileType::Attachment)
            .ok_or_else(|| Error::not_found("Document", document_id.to_string()))?;

        self.blobs.delete(&document.file_path).await?;
        self.store.delete_document(cr_id, document_id).await?;
        tracing::info!(%cr_id, document = document_id, "attachment removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{Harness, NOTES_50};
    use crate::engine::Engine;
    use crate::approval::{ApprovalLogEntry, DeveloperAssignment};
    use crate::config::{Config, ResubmitRouting};
    use crate::document::{Document, MarkdownApprovalGenerator, NewAttachment};
    use crate::id::sequence_in;
    use crate::notify::{Notification, NotificationKind, StoreNotifier};
    use crate::request::tests::sample_form;
    use crate::store::{
        AssignmentFilter, Conditional, CrFilter, Expected, MemoryStore, RecordStore, StoreResult,
        UserFilter,
    };
    use crate::{ApprovalAction, ChangeRequest, CrPatch, Error, Role, Status, User};
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use tokio::sync::oneshot;

    /// Memory store whose next `get_cr` can be held open after it reads
    struct StallingStore {
        inner: Arc<MemoryStore>,
        hold: Mutex<Option<(oneshot::Sender<()>, oneshot::Receiver<()>)>>,
    }

    impl StallingStore {
        fn new(inner: Arc<MemoryStore>) -> Self {
            Self {
                inner,
                hold: Mutex::new(None),
            }
        }

        /// Stall the next read; returns (read done, release)
        fn arm(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
            let (loaded_tx, loaded_rx) = oneshot::channel();
            let (resume_tx, resume_rx) = oneshot::channel();
            *self.hold.lock().unwrap() = Some((loaded_tx, resume_rx));
            (loaded_rx, resume_tx)
        }
    }

    #[async_trait]
    impl RecordStore for StallingStore {
        async fn get_cr(&self, id: &str) -> StoreResult<Option<ChangeRequest>> {
            let found = self.inner.get_cr(id).await?;
            let hold = self.hold.lock().unwrap().take();
            if let Some((loaded, resume)) = hold {
                let _ = loaded.send(());
                let _ = resume.await;
            }
            Ok(found)
        }
        async fn max_cr_sequence(&self, period: &str) -> StoreResult<Option<u32>> {
            self.inner.max_cr_sequence(period).await
        }
        async fn insert_cr(&self, cr: ChangeRequest) -> StoreResult<()> {
            self.inner.insert_cr(cr).await
        }
        async fn update_cr_if(
            &self,
            id: &str,
            expected: &Expected,
            patch: &CrPatch,
        ) -> StoreResult<Conditional> {
            self.inner.update_cr_if(id, expected, patch).await
        }
        async fn list_crs(&self, filter: &CrFilter) -> StoreResult<Vec<ChangeRequest>> {
            self.inner.list_crs(filter).await
        }
        async fn append_approval_log(&self, entry: ApprovalLogEntry) -> StoreResult<ApprovalLogEntry> {
            self.inner.append_approval_log(entry).await
        }
        async fn approval_log(&self, cr_id: &str) -> StoreResult<Vec<ApprovalLogEntry>> {
            self.inner.approval_log(cr_id).await
        }
        async fn create_assignments(&self, entries: Vec<DeveloperAssignment>) -> StoreResult<()> {
            self.inner.create_assignments(entries).await
        }
        async fn assignments(
            &self,
            filter: &AssignmentFilter,
        ) -> StoreResult<Vec<DeveloperAssignment>> {
            self.inner.assignments(filter).await
        }
        async fn insert_document(&self, document: Document) -> StoreResult<Document> {
            self.inner.insert_document(document).await
        }
        async fn documents(&self, cr_id: &str) -> StoreResult<Vec<Document>> {
            self.inner.documents(cr_id).await
        }
        async fn delete_document(
            &self,
            cr_id: &str,
            document_id: u64,
        ) -> StoreResult<Option<Document>> {
            self.inner.delete_document(cr_id, document_id).await
        }
        async fn count_documents(&self, cr_id: &str) -> StoreResult<usize> {
            self.inner.count_documents(cr_id).await
        }
        async fn insert_user(&self, user: User) -> StoreResult<()> {
            self.inner.insert_user(user).await
        }
        async fn get_user(&self, id: &str) -> StoreResult<Option<User>> {
            self.inner.get_user(id).await
        }
        async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
            self.inner.find_user_by_email(email).await
        }
        async fn find_users(&self, filter: &UserFilter) -> StoreResult<Vec<User>> {
            self.inner.find_users(filter).await
        }
        async fn push_notification(&self, notification: Notification) -> StoreResult<Notification> {
            self.inner.push_notification(notification).await
        }
        async fn notifications(
            &self,
            user_id: &str,
            unread_only: bool,
        ) -> StoreResult<Vec<Notification>> {
            self.inner.notifications(user_id, unread_only).await
        }
        async fn mark_notification_read(&self, user_id: &str, id: u64) -> StoreResult<bool> {
            self.inner.mark_notification_read(user_id, id).await
        }
        async fn mark_all_notifications_read(&self, user_id: &str) -> StoreResult<usize> {
            self.inner.mark_all_notifications_read(user_id).await
        }
    }

    /// Force a revision record's counter, as if earlier cycles had happened
    async fn set_counts(h: &Harness, cr_id: &str, manager: u32, vp: u32) -> ChangeRequest {
        let current = h.store.get_cr(cr_id).await.unwrap().unwrap();
        let patch = CrPatch {
            manager_revision_count: Some(manager),
            vp_revision_count: Some(vp),
            ..CrPatch::default()
        };
        match h
            .store
            .update_cr_if(cr_id, &Expected::of(&current), &patch)
            .await
            .unwrap()
        {
            Conditional::Applied(cr) => cr,
            Conditional::Stale(status) => panic!("unexpected concurrent change to {}", status),
        }
    }

    fn count_actions(log: &[ApprovalLogEntry], action: ApprovalAction) -> usize {
        log.iter().filter(|e| e.action == action).count()
    }

    fn upload(name: &str, bytes: usize) -> NewAttachment {
        NewAttachment {
            file_name: name.into(),
            mime_type: "application/pdf".into(),
            bytes: vec![7; bytes],
        }
    }

    #[tokio::test]
    async fn test_create_requires_user_role_and_valid_form() {
        let h = Harness::new().await;
        assert!(matches!(
            h.engine.create(&h.manager, sample_form()).await,
            Err(Error::Forbidden(_))
        ));

        let mut form = sample_form();
        form.title = "abc".into();
        let err = h.engine.create(&h.owner, form).await.unwrap_err();
        assert_eq!(err.field_errors()[0].field, "title");

        let cr = h.draft().await;
        assert_eq!(cr.status(), Status::Draft);
        assert_eq!(cr.current_approver_role(), None);
        assert_eq!(cr.owner_division.as_deref(), Some("Unit A"));
    }

    #[tokio::test]
    async fn test_concurrent_creates_get_dense_unique_ids() {
        let h = Harness::new().await;
        let mut handles = Vec::new();
        for _ in 0..20 {
            let engine = Arc::clone(&h.engine);
            let owner = h.owner.clone();
            handles.push(tokio::spawn(async move {
                engine.create(&owner, sample_form()).await.unwrap().id
            }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }

        let unique: HashSet<_> = ids.iter().cloned().collect();
        assert_eq!(unique.len(), 20);

        let period = &ids[0][..ids[0].len() - 7];
        let mut sequences: Vec<u32> = ids.iter().filter_map(|id| sequence_in(id, period)).collect();
        sequences.sort();
        assert_eq!(sequences, (1..=20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_deleted_ids_are_not_reused() {
        let h = Harness::new().await;
        let first = h.draft().await;
        h.engine.delete(&h.owner, &first.id).await.unwrap();
        let second = h.draft().await;
        assert_ne!(first.id, second.id);
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn test_edit_only_by_owner_and_while_editable() {
        let h = Harness::new().await;
        let cr = h.draft().await;

        let mut form = sample_form();
        form.title = "Vendor portal SSO phase two".into();
        assert!(matches!(
            h.engine.edit(&h.manager, &cr.id, form.clone()).await,
            Err(Error::Forbidden(_))
        ));
        let edited = h.engine.edit(&h.owner, &cr.id, form.clone()).await.unwrap();
        assert_eq!(edited.title(), "Vendor portal SSO phase two");
        assert_eq!(edited.status(), Status::Draft);

        h.engine.submit(&h.owner, &cr.id).await.unwrap();
        let err = h.engine.edit(&h.owner, &cr.id, form).await.unwrap_err();
        assert!(matches!(err, Error::Precondition { status: Status::PendingManager, .. }));
    }

    #[tokio::test]
    async fn test_delete_only_drafts_and_cleans_blobs() {
        let h = Harness::new().await;
        let cr = h.draft().await;
        h.engine
            .add_attachment(&h.owner, &cr.id, upload("scope.pdf", 10))
            .await
            .unwrap();
        assert_eq!(h.blobs.len().await, 1);

        let deleted = h.engine.delete(&h.owner, &cr.id).await.unwrap();
        assert_eq!(deleted.status(), Status::Deleted);
        assert_eq!(deleted.current_approver_role(), None);
        assert_eq!(h.blobs.len().await, 0);

        let submitted = h.draft().await;
        h.engine.submit(&h.owner, &submitted.id).await.unwrap();
        assert!(matches!(
            h.engine.delete(&h.owner, &submitted.id).await,
            Err(Error::Precondition { .. })
        ));
    }

    #[tokio::test]
    async fn test_submit_logs_and_notifies_division() {
        let h = Harness::new().await;
        let cr = h.draft().await;

        let submitted = h.engine.submit(&h.owner, &cr.id).await.unwrap();
        assert_eq!(submitted.status(), Status::PendingManager);
        assert_eq!(submitted.current_approver_role(), Some(Role::Manager));

        let log = h.store.approval_log(&cr.id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, ApprovalAction::Submit);

        assert_eq!(h.inbox_kinds(&h.manager).await, vec![NotificationKind::CrSubmitted]);
        assert!(h.inbox_kinds(&h.other_manager).await.is_empty());

        // A second submit loses: the request is no longer a draft
        assert!(matches!(
            h.engine.submit(&h.owner, &cr.id).await,
            Err(Error::Precondition { status: Status::PendingManager, .. })
        ));
        assert_eq!(h.store.approval_log(&cr.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resubmit_requires_revision_status() {
        let h = Harness::new().await;
        let cr = h.draft().await;
        assert!(matches!(
            h.engine.resubmit(&h.owner, &cr.id).await,
            Err(Error::Precondition { status: Status::Draft, .. })
        ));
    }

    #[tokio::test]
    async fn test_resubmit_at_manager_cap_is_refused() {
        let h = Harness::new().await;
        let cr = h.draft().await;
        h.engine.submit(&h.owner, &cr.id).await.unwrap();
        h.engine
            .manager_request_revision(&h.manager, &cr.id, NOTES_50)
            .await
            .unwrap();
        let before = set_counts(&h, &cr.id, 3, 0).await;

        let err = h.engine.resubmit(&h.owner, &cr.id).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Precondition {
                status: Status::RevisionManager,
                count: Some(3),
                ..
            }
        ));
        assert_eq!(h.store.get_cr(&cr.id).await.unwrap().unwrap(), before);
        let log = h.store.approval_log(&cr.id).await.unwrap();
        assert_eq!(count_actions(&log, ApprovalAction::Resubmit), 0);
    }

    #[tokio::test]
    async fn test_resubmit_at_vp_cap_is_refused() {
        let h = Harness::new().await;
        let cr = h.at_vp().await;
        h.engine
            .vp_request_revision(&h.vp, &cr.id, NOTES_50)
            .await
            .unwrap();
        let before = set_counts(&h, &cr.id, 0, 2).await;

        let err = h.engine.resubmit(&h.owner, &cr.id).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Precondition {
                status: Status::RevisionVp,
                count: Some(2),
                ..
            }
        ));
        assert_eq!(h.store.get_cr(&cr.id).await.unwrap().unwrap(), before);
    }

    #[tokio::test]
    async fn test_stale_resubmit_cannot_skip_a_revision_cycle() {
        let h = Harness::new().await;
        let stalling = Arc::new(StallingStore::new(h.store.clone()));
        let slow = Arc::new(Engine::new(
            stalling.clone(),
            Arc::new(StoreNotifier::new(h.store.clone())),
            Arc::new(MarkdownApprovalGenerator::new(h.store.clone(), h.blobs.clone())),
            h.blobs.clone(),
            Config::default(),
        ));

        let cr = h.draft().await;
        h.engine.submit(&h.owner, &cr.id).await.unwrap();
        h.engine
            .manager_request_revision(&h.manager, &cr.id, NOTES_50)
            .await
            .unwrap();

        let (loaded, release) = stalling.arm();
        let stale = {
            let slow = slow.clone();
            let owner = h.owner.clone();
            let id = cr.id.clone();
            tokio::spawn(async move { slow.resubmit(&owner, &id).await })
        };
        loaded.await.unwrap();

        // A full cycle completes while the first resubmit is still in flight
        h.engine.resubmit(&h.owner, &cr.id).await.unwrap();
        h.engine
            .manager_request_revision(&h.manager, &cr.id, NOTES_50)
            .await
            .unwrap();

        release.send(()).unwrap();
        assert!(matches!(
            stale.await.unwrap(),
            Err(Error::Precondition {
                status: Status::RevisionManager,
                ..
            })
        ));
        let stored = h.store.get_cr(&cr.id).await.unwrap().unwrap();
        assert_eq!(stored.status(), Status::RevisionManager);
        assert_eq!(stored.manager_revision_count, 1);

        // The cap still allows exactly three revision requests in total
        while h.engine.resubmit(&h.owner, &cr.id).await.is_ok() {
            if h
                .engine
                .manager_request_revision(&h.manager, &cr.id, NOTES_50)
                .await
                .is_err()
            {
                break;
            }
        }
        let log = h.store.approval_log(&cr.id).await.unwrap();
        assert_eq!(count_actions(&log, ApprovalAction::RequestRevision), 3);
        assert_eq!(count_actions(&log, ApprovalAction::Resubmit), 3);
    }

    #[tokio::test]
    async fn test_vp_revision_restarts_at_manager_by_default() {
        let h = Harness::new().await;
        let cr = h.at_vp().await;
        h.engine
            .vp_request_revision(&h.vp, &cr.id, NOTES_50)
            .await
            .unwrap();

        let resubmitted = h.engine.resubmit(&h.owner, &cr.id).await.unwrap();
        assert_eq!(resubmitted.status(), Status::PendingManager);
        assert_eq!(resubmitted.current_approver_role(), Some(Role::Manager));
        assert_eq!(resubmitted.vp_revision_count, 1);
        assert_eq!(resubmitted.manager_revision_count, 0);
        assert!(h.inbox_kinds(&h.manager).await.contains(&NotificationKind::CrResubmitted));
    }

    #[tokio::test]
    async fn test_vp_revision_can_return_to_vp() {
        let mut config = Config::default();
        config.workflow.resubmit_routing = ResubmitRouting::ReturnToVp;
        let h = Harness::with_config(config).await;

        let cr = h.at_vp().await;
        h.engine
            .vp_request_revision(&h.vp, &cr.id, NOTES_50)
            .await
            .unwrap();
        let resubmitted = h.engine.resubmit(&h.owner, &cr.id).await.unwrap();
        assert_eq!(resubmitted.status(), Status::PendingVp);
        assert_eq!(resubmitted.current_approver_role(), Some(Role::Vp));
        assert!(h.inbox_kinds(&h.vp).await.contains(&NotificationKind::CrResubmitted));

        // Manager revisions still go back to the manager
        let other = h.draft().await;
        h.engine.submit(&h.owner, &other.id).await.unwrap();
        h.engine
            .manager_request_revision(&h.manager, &other.id, NOTES_50)
            .await
            .unwrap();
        let again = h.engine.resubmit(&h.owner, &other.id).await.unwrap();
        assert_eq!(again.status(), Status::PendingManager);
    }

    #[tokio::test]
    async fn test_attachment_limits() {
        let h = Harness::new().await;
        let cr = h.draft().await;

        let err = h
            .engine
            .add_attachment(&h.owner, &cr.id, upload("huge.pdf", 10 * 1024 * 1024 + 1))
            .await
            .unwrap_err();
        assert_eq!(err.field_errors()[0].field, "file");

        let mut exe = upload("tool.exe", 10);
        exe.mime_type = "application/x-msdownload".into();
        assert!(matches!(
            h.engine.add_attachment(&h.owner, &cr.id, exe).await,
            Err(Error::Validation(_))
        ));

        assert!(matches!(
            h.engine
                .add_attachment(&h.manager, &cr.id, upload("a.pdf", 10))
                .await,
            Err(Error::Forbidden(_))
        ));

        for n in 0..5 {
            h.engine
                .add_attachment(&h.owner, &cr.id, upload(&format!("part{}.pdf", n), 10))
                .await
                .unwrap();
        }
        assert!(matches!(
            h.engine
                .add_attachment(&h.owner, &cr.id, upload("sixth.pdf", 10))
                .await,
            Err(Error::Precondition { .. })
        ));

        h.engine.submit(&h.owner, &cr.id).await.unwrap();
        let docs = h.store.documents(&cr.id).await.unwrap();
        assert!(matches!(
            h.engine.remove_attachment(&h.owner, &cr.id, docs[0].id).await,
            Err(Error::Precondition { .. })
        ));
    }

    #[tokio::test]
    async fn test_remove_attachment_deletes_blob_and_record() {
        let h = Harness::new().await;
        let cr = h.draft().await;
        let doc = h
            .engine
            .add_attachment(&h.owner, &cr.id, upload("../../scope.pdf", 10))
            .await
            .unwrap();
        assert!(doc.file_path.ends_with("-scope.pdf"));
        assert!(h.blobs.contains(&doc.file_path).await);

        h.engine
            .remove_attachment(&h.owner, &cr.id, doc.id)
            .await
            .unwrap();
        assert!(!h.blobs.contains(&doc.file_path).await);
        assert_eq!(h.store.count_documents(&cr.id).await.unwrap(), 0);
        assert!(matches!(
            h.engine.remove_attachment(&h.owner, &cr.id, doc.id).await,
            Err(Error::NotFound { .. })
        ));
    }
}
