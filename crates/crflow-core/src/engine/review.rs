//! Approver, IT manager and developer operations

use super::{Engine, expect_status};
use crate::access::{can_complete, ensure_role};
use crate::approval::{ApprovalAction, DeveloperAssignment};
use crate::notify::{NotificationKind, Payload};
use crate::request::{MANAGER_REVISION_CAP, VP_REVISION_CAP};
use crate::store::{AssignmentFilter, Expected, UserFilter};
use crate::{ChangeRequest, CrPatch, Error, Result, Role, Status, User};
use std::collections::HashSet;

const VP_REJECT_PREFIX: &str = "[VP REJECT - Manager Approval Voided] ";
const VP_REVISION_PREFIX: &str = "[VP REVISION - Manager Approval Voided] ";

/// An approver's verdict, dispatched on the actor's role
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Approve { notes: Option<String> },
    Reject { notes: String },
    RequestRevision { notes: String },
}

fn approve_notes(notes: Option<&str>, default: &str) -> String {
    notes
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(default)
        .to_string()
}

fn with_notes(message: String, notes: Option<&str>) -> String {
    match notes.map(str::trim).filter(|n| !n.is_empty()) {
        Some(notes) => format!("{} Notes: {}", message, notes),
        None => message,
    }
}

/// Division managers may only act on their own division's requests
fn ensure_same_division(cr: &ChangeRequest, actor: &User) -> Result<()> {
    match (&cr.owner_division, &actor.division) {
        (Some(cr_division), Some(division)) if cr_division == division => Ok(()),
        _ => Err(Error::forbidden(format!(
            "{} belongs to another division",
            cr.id
        ))),
    }
}

impl Engine {
    /// Apply `decision` at whichever stage the actor's role reviews
    pub async fn decide(&self, actor: &User, cr_id: &str, decision: Decision) -> Result<ChangeRequest> {
        match (actor.role, decision) {
            (Role::Manager, Decision::Approve { notes }) => {
                self.manager_approve(actor, cr_id, notes.as_deref()).await
            }
            (Role::Manager, Decision::Reject { notes }) => {
                self.manager_reject(actor, cr_id, &notes).await
            }
            (Role::Manager, Decision::RequestRevision { notes }) => {
                self.manager_request_revision(actor, cr_id, &notes).await
            }
            (Role::Vp, Decision::Approve { notes }) => {
                self.vp_approve(actor, cr_id, notes.as_deref()).await
            }
            (Role::Vp, Decision::Reject { notes }) => self.vp_reject(actor, cr_id, &notes).await,
            (Role::Vp, Decision::RequestRevision { notes }) => {
                self.vp_request_revision(actor, cr_id, &notes).await
            }
            (Role::User | Role::ManagerIt | Role::Dev, _) => {
                self.load(cr_id).await?;
                Err(Error::forbidden(format!(
                    "role {} does not review change requests",
                    actor.role
                )))
            }
        }
    }

    pub async fn manager_approve(
        &self,
        actor: &User,
        cr_id: &str,
        notes: Option<&str>,
    ) -> Result<ChangeRequest> {
        let cr = self.load(cr_id).await?;
        ensure_role(actor, &[Role::Manager])?;
        ensure_same_division(&cr, actor)?;
        expect_status(&cr, Status::PendingManager, "not awaiting manager approval")?;

        let updated = self.transition(&cr, CrPatch::to(Status::PendingVp)).await?;
        self.record(
            cr_id,
            actor,
            ApprovalAction::Approve,
            approve_notes(notes, "Approved by Manager"),
        )
        .await?;

        self.notify_role(
            Role::Vp,
            Payload::new(
                NotificationKind::CrPendingVp,
                "Change request awaiting VP approval",
                format!("{} was approved by its manager and awaits VP approval", cr_id),
            )
            .about(cr_id),
        )
        .await;
        self.notify_user(
            &cr.owner_id,
            Payload::new(
                NotificationKind::CrApprovedManager,
                "Approved by manager",
                with_notes(
                    format!("Your {} was approved by your manager and awaits VP approval.", cr_id),
                    notes,
                ),
            )
            .about(cr_id),
        )
        .await;

        Ok(updated)
    }

    /// Final rejection; the request cannot be resubmitted
    pub async fn manager_reject(&self, actor: &User, cr_id: &str, notes: &str) -> Result<ChangeRequest> {
        let cr = self.load(cr_id).await?;
        ensure_role(actor, &[Role::Manager])?;
        ensure_same_division(&cr, actor)?;
        let notes = self.decision_notes(notes)?;
        expect_status(&cr, Status::PendingManager, "not awaiting manager approval")?;

        let updated = self
            .transition(&cr, CrPatch::to(Status::RejectedManager))
            .await?;
        self.record(cr_id, actor, ApprovalAction::Reject, notes.as_str())
            .await?;

        self.notify_user(
            &cr.owner_id,
            Payload::new(
                NotificationKind::CrRejectedFinal,
                "Rejected by manager (final)",
                format!(
                    "Your {} was rejected by your manager. Reason: {}. It cannot be resubmitted.",
                    cr_id, notes
                ),
            )
            .about(cr_id),
        )
        .await;

        Ok(updated)
    }

    pub async fn manager_request_revision(
        &self,
        actor: &User,
        cr_id: &str,
        notes: &str,
    ) -> Result<ChangeRequest> {
        let cr = self.load(cr_id).await?;
        ensure_role(actor, &[Role::Manager])?;
        ensure_same_division(&cr, actor)?;
        let notes = self.decision_notes(notes)?;
        expect_status(&cr, Status::PendingManager, "not awaiting manager approval")?;
        if cr.manager_revision_count >= MANAGER_REVISION_CAP {
            return Err(Error::revision_cap(
                format!("manager revision limit ({}) reached", MANAGER_REVISION_CAP),
                cr.status(),
                cr.manager_revision_count,
            ));
        }

        let updated = self
            .transition(&cr, CrPatch::to(Status::RevisionManager))
            .await?;
        self.record(cr_id, actor, ApprovalAction::RequestRevision, notes.as_str())
            .await?;

        self.notify_user(
            &cr.owner_id,
            Payload::new(
                NotificationKind::CrRevisionManager,
                "Revision requested",
                format!("Your {} needs revision. Instructions: {}", cr_id, notes),
            )
            .about(cr_id),
        )
        .await;

        Ok(updated)
    }

    /// Final approval; triggers the approval document
    pub async fn vp_approve(&self, actor: &User, cr_id: &str, notes: Option<&str>) -> Result<ChangeRequest> {
        let cr = self.load(cr_id).await?;
        ensure_role(actor, &[Role::Vp])?;
        expect_status(&cr, Status::PendingVp, "not awaiting VP approval")?;

        let updated = self.transition(&cr, CrPatch::to(Status::Approved)).await?;
        self.record(
            cr_id,
            actor,
            ApprovalAction::Approve,
            approve_notes(notes, "Approved by VP"),
        )
        .await?;

        match self.generator.generate_approval_document(cr_id).await {
            Ok(doc) => tracing::info!(%cr_id, document = doc.id, "approval document generated"),
            Err(e) => tracing::warn!(%cr_id, error = %e, "approval document not generated"),
        }

        self.notify_role(
            Role::ManagerIt,
            Payload::new(
                NotificationKind::CrNeedMapping,
                "Change request needs developers",
                format!("{} was approved by the VP and needs developer assignment", cr_id),
            )
            .about(cr_id),
        )
        .await;
        self.notify_user(
            &cr.owner_id,
            Payload::new(
                NotificationKind::CrApprovedVp,
                "Approved by VP",
                with_notes(format!("Your {} was approved by the VP.", cr_id), notes),
            )
            .about(cr_id),
        )
        .await;

        Ok(updated)
    }

    /// Final rejection; voids the manager's approval
    pub async fn vp_reject(&self, actor: &User, cr_id: &str, notes: &str) -> Result<ChangeRequest> {
        let cr = self.load(cr_id).await?;
        ensure_role(actor, &[Role::Vp])?;
        let notes = self.decision_notes(notes)?;
        expect_status(&cr, Status::PendingVp, "not awaiting VP approval")?;

        let updated = self.transition(&cr, CrPatch::to(Status::RejectedVp)).await?;
        self.record(
            cr_id,
            actor,
            ApprovalAction::Reject,
            format!("{}{}", VP_REJECT_PREFIX, notes),
        )
        .await?;

        self.notify_user(
            &cr.owner_id,
            Payload::new(
                NotificationKind::CrRejectedVp,
                "Rejected by VP (final)",
                format!(
                    "Your {} was rejected by the VP; the manager approval is void. Reason: {}",
                    cr_id, notes
                ),
            )
            .about(cr_id),
        )
        .await;

        Ok(updated)
    }

    /// Send back to the owner; voids the manager's approval
    pub async fn vp_request_revision(&self, actor: &User, cr_id: &str, notes: &str) -> Result<ChangeRequest> {
        let cr = self.load(cr_id).await?;
        ensure_role(actor, &[Role::Vp])?;
        let notes = self.decision_notes(notes)?;
        expect_status(&cr, Status::PendingVp, "not awaiting VP approval")?;
        if cr.vp_revision_count >= VP_REVISION_CAP {
            return Err(Error::revision_cap(
                format!("VP revision limit ({}) reached", VP_REVISION_CAP),
                cr.status(),
                cr.vp_revision_count,
            ));
        }

        let updated = self.transition(&cr, CrPatch::to(Status::RevisionVp)).await?;
        self.record(
            cr_id,
            actor,
            ApprovalAction::RequestRevision,
            format!("{}{}", VP_REVISION_PREFIX, notes),
        )
        .await?;

        self.notify_user(
            &cr.owner_id,
            Payload::new(
                NotificationKind::CrRevisionVp,
                "Revision requested by VP",
                format!(
                    "Your {} needs revision; the manager approval is void. Instructions: {}",
                    cr_id, notes
                ),
            )
            .about(cr_id),
        )
        .await;

        Ok(updated)
    }

    /// Map an approved request onto one or more developers
    pub async fn assign_developers(
        &self,
        actor: &User,
        cr_id: &str,
        developer_ids: &[String],
        notes: Option<String>,
    ) -> Result<ChangeRequest> {
        let cr = self.load(cr_id).await?;
        ensure_role(actor, &[Role::ManagerIt])?;

        if developer_ids.is_empty() {
            return Err(Error::invalid("developer_ids", "at least one developer is required"));
        }
        let unique: HashSet<&str> = developer_ids.iter().map(String::as_str).collect();
        if unique.len() != developer_ids.len() {
            return Err(Error::invalid("developer_ids", "must not contain duplicates"));
        }
        let notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());

        expect_status(&cr, Status::Approved, "not approved")?;

        let developers = self
            .store
            .find_users(&UserFilter {
                role: Some(Role::Dev),
                ids: Some(developer_ids.to_vec()),
                ..UserFilter::default()
            })
            .await?;
        if developers.len() != developer_ids.len() {
            return Err(Error::precondition(
                "one or more developer ids are not developers",
                cr.status(),
            ));
        }

        let updated = self
            .transition(&cr, CrPatch::to(Status::AssignedDev))
            .await?;
        let entries = developer_ids
            .iter()
            .map(|dev| DeveloperAssignment::new(cr_id, dev, actor, notes.clone()))
            .collect();
        if let Err(e) = self.store.create_assignments(entries).await {
            // Put the request back so the IT manager can try again
            if let Err(revert) = self
                .store
                .update_cr_if(cr_id, &Expected::of(&updated), &CrPatch::to(Status::Approved))
                .await
            {
                tracing::warn!(%cr_id, error = %revert, "could not revert failed assignment");
            }
            return Err(e.into());
        }

        for dev in developer_ids {
            self.notify_user(
                dev,
                Payload::new(
                    NotificationKind::CrAssigned,
                    "New change request assigned",
                    with_notes(format!("{} has been assigned to you.", cr_id), notes.as_deref()),
                )
                .about(cr_id),
            )
            .await;
        }
        let names: Vec<_> = developers.iter().map(|d| d.name.as_str()).collect();
        self.notify_user(
            &cr.owner_id,
            Payload::new(
                NotificationKind::CrAssignedDev,
                "Assigned to developers",
                with_notes(
                    format!("Your {} has been assigned to: {}.", cr_id, names.join(", ")),
                    notes.as_deref(),
                ),
            )
            .about(cr_id),
        )
        .await;

        Ok(updated)
    }

    /// Mark assigned work done
    pub async fn complete(&self, actor: &User, cr_id: &str) -> Result<ChangeRequest> {
        let cr = self.load(cr_id).await?;
        ensure_role(actor, &[Role::ManagerIt, Role::Dev])?;
        let assignments = self.store.assignments(&AssignmentFilter::cr(cr_id)).await?;
        if !can_complete(actor, &assignments) {
            return Err(Error::forbidden(format!("{} is not assigned to you", cr_id)));
        }
        expect_status(&cr, Status::AssignedDev, "not assigned to developers")?;

        let updated = self.transition(&cr, CrPatch::to(Status::Completed)).await?;

        self.notify_user(
            &cr.owner_id,
            Payload::new(
                NotificationKind::CrCompleted,
                "Change request completed",
                format!("Your {} has been completed.", cr_id),
            )
            .about(cr_id),
        )
        .await;

        Ok(updated)
    }
}
