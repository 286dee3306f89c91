//! Audit trail and developer assignments

use crate::{Role, User};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Action recorded in the approval log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalAction {
    Submit,
    Resubmit,
    Approve,
    Reject,
    RequestRevision,
}

impl ApprovalAction {
    /// Decisions that must carry a written justification
    pub fn requires_notes(&self) -> bool {
        matches!(self, ApprovalAction::Reject | ApprovalAction::RequestRevision)
    }
}

impl std::fmt::Display for ApprovalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalAction::Submit => write!(f, "SUBMIT"),
            ApprovalAction::Resubmit => write!(f, "RESUBMIT"),
            ApprovalAction::Approve => write!(f, "APPROVE"),
            ApprovalAction::Reject => write!(f, "REJECT"),
            ApprovalAction::RequestRevision => write!(f, "REQUEST_REVISION"),
        }
    }
}

/// Append-only audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalLogEntry {
    /// Store-assigned sequence number, orders entries with equal timestamps
    #[serde(default)]
    pub id: u64,

    pub cr_id: String,

    /// Actor who performed the action
    pub approver_id: String,

    /// Actor's role at the time of the action
    pub approver_role: Role,

    pub action: ApprovalAction,

    pub notes: String,

    pub created_at: DateTime<Utc>,
}

impl ApprovalLogEntry {
    pub fn new(cr_id: &str, actor: &User, action: ApprovalAction, notes: impl Into<String>) -> Self {
        Self {
            id: 0,
            cr_id: cr_id.to_string(),
            approver_id: actor.id.clone(),
            approver_role: actor.role,
            action,
            notes: notes.into(),
            created_at: Utc::now(),
        }
    }
}

/// A developer mapped onto an approved change request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeveloperAssignment {
    pub cr_id: String,

    pub developer_id: String,

    pub assigned_by_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    pub assigned_at: DateTime<Utc>,
}

impl DeveloperAssignment {
    pub fn new(cr_id: &str, developer_id: &str, assigned_by: &User, notes: Option<String>) -> Self {
        Self {
            cr_id: cr_id.to_string(),
            developer_id: developer_id.to_string(),
            assigned_by_id: assigned_by.id.clone(),
            notes,
            assigned_at: Utc::now(),
        }
    }
}

/// Whether `developer_id` is among `assignments`
pub fn is_assigned(assignments: &[DeveloperAssignment], developer_id: &str) -> bool {
    assignments.iter().any(|a| a.developer_id == developer_id)
}
