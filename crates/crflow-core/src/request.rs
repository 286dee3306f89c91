//! Change request data model
//!
//! A change request moves through a fixed approval chain. Its status and the
//! role whose action it awaits are stored side by side but only ever change
//! together, through [`Stage`].

use crate::Role;
use crate::error::FieldError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Maximum revision cycles a division manager may request
pub const MANAGER_REVISION_CAP: u32 = 3;

/// Maximum revision cycles a VP may request
pub const VP_REVISION_CAP: u32 = 2;

/// Change request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    #[default]
    Draft,
    PendingManager,
    RevisionManager,
    RejectedManager,
    PendingVp,
    RevisionVp,
    RejectedVp,
    Approved,
    AssignedDev,
    Completed,
    /// Soft-deleted; the id stays reserved
    Deleted,
}

impl Status {
    pub const ALL: [Status; 11] = [
        Status::Draft,
        Status::PendingManager,
        Status::RevisionManager,
        Status::RejectedManager,
        Status::PendingVp,
        Status::RevisionVp,
        Status::RejectedVp,
        Status::Approved,
        Status::AssignedDev,
        Status::Completed,
        Status::Deleted,
    ];

    /// No transition leaves these
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::RejectedManager | Status::RejectedVp | Status::Completed | Status::Deleted
        )
    }

    /// The owner may change form data and attachments
    pub fn is_editable(&self) -> bool {
        matches!(
            self,
            Status::Draft | Status::RevisionManager | Status::RevisionVp
        )
    }

    pub fn is_revision(&self) -> bool {
        matches!(self, Status::RevisionManager | Status::RevisionVp)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Status::RejectedManager | Status::RejectedVp)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Status::PendingManager | Status::PendingVp)
    }

    /// Role whose action a request in this status awaits
    pub fn awaiting(&self) -> Option<Role> {
        match self {
            Status::PendingManager => Some(Role::Manager),
            Status::PendingVp => Some(Role::Vp),
            Status::Approved => Some(Role::ManagerIt),
            Status::Draft
            | Status::RevisionManager
            | Status::RejectedManager
            | Status::RevisionVp
            | Status::RejectedVp
            | Status::AssignedDev
            | Status::Completed
            | Status::Deleted => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Draft => "DRAFT",
            Status::PendingManager => "PENDING_MANAGER",
            Status::RevisionManager => "REVISION_MANAGER",
            Status::RejectedManager => "REJECTED_MANAGER",
            Status::PendingVp => "PENDING_VP",
            Status::RevisionVp => "REVISION_VP",
            Status::RejectedVp => "REJECTED_VP",
            Status::Approved => "APPROVED",
            Status::AssignedDev => "ASSIGNED_DEV",
            Status::Completed => "COMPLETED",
            Status::Deleted => "DELETED",
        }
    }
}

impl std::str::FromStr for Status {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace('-', "_");
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| crate::Error::InvalidStatus(s.to_string()))
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status paired with the approver role it implies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub status: Status,
    pub approver: Option<Role>,
}

impl Stage {
    pub fn of(status: Status) -> Self {
        Self {
            status,
            approver: status.awaiting(),
        }
    }
}

/// Requester-supplied form content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FormData {
    /// Requested completion date, `YYYY-MM-DD`
    pub target_date: String,
    pub title: String,
    pub requester1: String,
    /// Second requester, normally the division manager
    pub requester2: String,
    pub business_area: String,
    pub category_impact: String,
    pub impact_description: String,
    pub background: String,
    pub objective: String,
    pub service_explanation: String,
    pub services_needed: String,
}

fn char_len(value: &str) -> usize {
    value.trim().chars().count()
}

impl FormData {
    /// Validate every field, reporting all failures at once
    pub fn validate(&self) -> crate::Result<()> {
        let mut errors = Vec::new();

        if NaiveDate::parse_from_str(self.target_date.trim(), "%Y-%m-%d").is_err() {
            errors.push(FieldError::new(
                "target_date",
                "must be a valid date (YYYY-MM-DD)",
            ));
        }

        let title_len = char_len(&self.title);
        if title_len < 5 {
            errors.push(FieldError::new("title", "must be at least 5 characters"));
        } else if title_len > 200 {
            errors.push(FieldError::new("title", "must be at most 200 characters"));
        }

        let minimums: [(&str, &str, usize); 9] = [
            ("requester1", self.requester1.as_str(), 2),
            ("requester2", self.requester2.as_str(), 2),
            ("business_area", self.business_area.as_str(), 2),
            ("category_impact", self.category_impact.as_str(), 2),
            ("impact_description", self.impact_description.as_str(), 10),
            ("background", self.background.as_str(), 20),
            ("objective", self.objective.as_str(), 10),
            ("service_explanation", self.service_explanation.as_str(), 10),
            ("services_needed", self.services_needed.as_str(), 5),
        ];
        for (field, value, min) in minimums {
            if char_len(value) < min {
                errors.push(FieldError::new(
                    field,
                    format!("must be at least {} characters", min),
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(crate::Error::Validation(errors))
        }
    }
}

/// A change request record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequest {
    /// `CR-YYYY-MM-NNNNNN`
    pub id: String,

    /// Creator; the only user allowed to mutate the request
    pub owner_id: String,

    /// Creator's division at creation time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_division: Option<String>,

    pub form_data: FormData,

    status: Status,

    #[serde(skip_serializing_if = "Option::is_none")]
    current_approver_role: Option<Role>,

    #[serde(default)]
    pub manager_revision_count: u32,

    #[serde(default)]
    pub vp_revision_count: u32,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl ChangeRequest {
    /// Create a new draft
    pub fn draft(id: String, owner_id: String, owner_division: Option<String>, form_data: FormData) -> Self {
        let now = Utc::now();
        let stage = Stage::of(Status::Draft);
        Self {
            id,
            owner_id,
            owner_division,
            form_data,
            status: stage.status,
            current_approver_role: stage.approver,
            manager_revision_count: 0,
            vp_revision_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn current_approver_role(&self) -> Option<Role> {
        self.current_approver_role
    }

    pub fn stage(&self) -> Stage {
        Stage {
            status: self.status,
            approver: self.current_approver_role,
        }
    }

    /// Move to a new status, updating the approver role with it
    pub fn enter(&mut self, status: Status) {
        let stage = Stage::of(status);
        self.status = stage.status;
        self.current_approver_role = stage.approver;
        self.updated_at = Utc::now();
    }

    /// Status and approver role agree
    pub fn is_consistent(&self) -> bool {
        Stage::of(self.status) == self.stage()
            && self.manager_revision_count <= MANAGER_REVISION_CAP
            && self.vp_revision_count <= VP_REVISION_CAP
    }

    pub fn title(&self) -> &str {
        &self.form_data.title
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }

    /// Apply a partial update
    pub fn apply(&mut self, patch: &CrPatch) {
        if let Some(ref form_data) = patch.form_data {
            self.form_data = form_data.clone();
        }
        if let Some(count) = patch.manager_revision_count {
            self.manager_revision_count = count;
        }
        if let Some(count) = patch.vp_revision_count {
            self.vp_revision_count = count;
        }
        match patch.status {
            Some(status) => self.enter(status),
            None => self.updated_at = Utc::now(),
        }
    }
}

impl std::fmt::Display for ChangeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}] {}", self.id, self.status, self.form_data.title)
    }
}

/// Partial update applied by a conditional store write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrPatch {
    pub status: Option<Status>,
    pub form_data: Option<FormData>,
    pub manager_revision_count: Option<u32>,
    pub vp_revision_count: Option<u32>,
}

impl CrPatch {
    pub fn to(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn form(form_data: FormData) -> Self {
        Self {
            form_data: Some(form_data),
            ..Self::default()
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_form() -> FormData {
        FormData {
            target_date: "2026-12-01".into(),
            title: "Vendor portal SSO".into(),
            requester1: "Ahmad".into(),
            requester2: "Manager Unit A".into(),
            business_area: "Procurement".into(),
            category_impact: "High".into(),
            impact_description: "Vendors cannot log in without support".into(),
            background: "Vendors share passwords over email today".into(),
            objective: "Single sign-on for vendors".into(),
            service_explanation: "Integrate the portal with the identity provider".into(),
            services_needed: "IdP, portal changes".into(),
        }
    }

    #[test]
    fn test_stage_invariant_holds_for_every_status() {
        for status in Status::ALL {
            let mut cr = ChangeRequest::draft("CR-2026-10-000001".into(), "u1".into(), None, sample_form());
            cr.enter(status);
            assert!(cr.is_consistent());
            let expect_null = matches!(
                status,
                Status::Draft
                    | Status::RevisionManager
                    | Status::RevisionVp
                    | Status::RejectedManager
                    | Status::RejectedVp
                    | Status::AssignedDev
                    | Status::Completed
                    | Status::Deleted
            );
            assert_eq!(cr.current_approver_role().is_none(), expect_null, "{status}");
        }
    }

    #[test]
    fn test_status_parse_roundtrip() {
        for status in Status::ALL {
            assert_eq!(status.to_string().parse::<Status>().unwrap(), status);
        }
        assert_eq!("pending-vp".parse::<Status>().unwrap(), Status::PendingVp);
        assert!("archived".parse::<Status>().is_err());
    }

    #[test]
    fn test_form_validation_collects_all_errors() {
        let mut form = sample_form();
        form.title = "SSO".into();
        form.background = "too short".into();
        form.target_date = "2026-13-40".into();

        let err = form.validate().unwrap_err();
        let fields: Vec<_> = err.field_errors().iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["target_date", "title", "background"]);
        assert!(sample_form().validate().is_ok());
    }

    #[test]
    fn test_form_validation_trims_whitespace() {
        let mut form = sample_form();
        form.services_needed = "  ab  ".into();
        assert!(form.validate().is_err());
    }

    #[test]
    fn test_patch_moves_stage_together() {
        let mut cr = ChangeRequest::draft("CR-2026-10-000001".into(), "u1".into(), None, sample_form());
        cr.apply(&CrPatch::to(Status::PendingVp));
        assert_eq!(cr.status(), Status::PendingVp);
        assert_eq!(cr.current_approver_role(), Some(Role::Vp));

        cr.apply(&CrPatch {
            vp_revision_count: Some(1),
            ..CrPatch::to(Status::RevisionVp)
        });
        assert_eq!(cr.current_approver_role(), None);
        assert_eq!(cr.vp_revision_count, 1);
    }

    #[test]
    fn test_inconsistent_record_detected() {
        let json = r#"{
            "id": "CR-2026-10-000001",
            "owner_id": "u1",
            "form_data": {
                "target_date": "2026-12-01", "title": "t", "requester1": "a",
                "requester2": "b", "business_area": "c", "category_impact": "d",
                "impact_description": "e", "background": "f", "objective": "g",
                "service_explanation": "h", "services_needed": "i"
            },
            "status": "PENDING_VP",
            "current_approver_role": "MANAGER",
            "created_at": "2026-10-01T00:00:00Z",
            "updated_at": "2026-10-01T00:00:00Z"
        }"#;
        let cr: ChangeRequest = serde_json::from_str(json).unwrap();
        assert!(!cr.is_consistent());
    }
}
