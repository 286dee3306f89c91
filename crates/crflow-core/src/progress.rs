//! Progress view reconstructed from the audit trail

use crate::approval::{ApprovalAction, ApprovalLogEntry, DeveloperAssignment};
use crate::{ChangeRequest, Role, Status};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MilestoneState {
    Completed,
    Current,
    Pending,
}

impl std::fmt::Display for MilestoneState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MilestoneState::Completed => write!(f, "completed"),
            MilestoneState::Current => write!(f, "current"),
            MilestoneState::Pending => write!(f, "pending"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Milestone {
    pub step: u8,
    pub name: &'static str,
    pub state: MilestoneState,
    pub timestamp: Option<DateTime<Utc>>,
    /// Name of the approver, for approval milestones
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,
    /// Developer names, for the assignment milestone
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub developers: Vec<String>,
}

impl Milestone {
    fn pending(step: u8, name: &'static str) -> Self {
        Self {
            step,
            name,
            state: MilestoneState::Pending,
            timestamp: None,
            approver: None,
            developers: Vec::new(),
        }
    }

    fn reached(&mut self, at: DateTime<Utc>) {
        self.state = MilestoneState::Completed;
        self.timestamp = Some(at);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub cr_id: String,
    pub current_status: Status,
    pub steps: Vec<Milestone>,
}

impl Progress {
    /// Derive the six milestones of `cr`
    ///
    /// `log` must be in append order. `names` maps user ids to display names;
    /// unknown ids are shown as-is.
    pub fn build(
        cr: &ChangeRequest,
        log: &[ApprovalLogEntry],
        assignments: &[DeveloperAssignment],
        names: &HashMap<String, String>,
    ) -> Self {
        let name_of = |id: &str| names.get(id).cloned().unwrap_or_else(|| id.to_string());

        let mut steps = vec![
            Milestone::pending(1, "Draft"),
            Milestone::pending(2, "Submit to Manager"),
            Milestone::pending(3, "Manager Approval"),
            Milestone::pending(4, "VP Approval"),
            Milestone::pending(5, "Assigned to Developer"),
            Milestone::pending(6, "Completed"),
        ];

        steps[0].reached(cr.created_at);

        if let Some(submit) = log
            .iter()
            .find(|e| matches!(e.action, ApprovalAction::Submit | ApprovalAction::Resubmit))
        {
            steps[1].reached(submit.created_at);
        }

        let first_approval = |role: Role| {
            log.iter()
                .find(|e| e.action == ApprovalAction::Approve && e.approver_role == role)
        };
        if let Some(entry) = first_approval(Role::Manager) {
            steps[2].reached(entry.created_at);
            steps[2].approver = Some(name_of(&entry.approver_id));
        }
        if let Some(entry) = first_approval(Role::Vp) {
            steps[3].reached(entry.created_at);
            steps[3].approver = Some(name_of(&entry.approver_id));
        }

        if let Some(first) = assignments.first() {
            steps[4].reached(first.assigned_at);
            steps[4].developers = assignments.iter().map(|a| name_of(&a.developer_id)).collect();
        }

        if cr.status() == Status::Completed {
            steps[5].reached(cr.updated_at);
        }

        if let Some(current) = steps
            .iter()
            .position(|s| s.state == MilestoneState::Pending)
        {
            steps[current].state = MilestoneState::Current;
            for step in &mut steps[current + 1..] {
                *step = Milestone::pending(step.step, step.name);
            }
        }

        Self {
            cr_id: cr.id.clone(),
            current_status: cr.status(),
            steps,
        }
    }

    pub fn current(&self) -> Option<&Milestone> {
        self.steps
            .iter()
            .find(|s| s.state == MilestoneState::Current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::User;
    use crate::request::tests::sample_form;

    fn states(progress: &Progress) -> Vec<MilestoneState> {
        progress.steps.iter().map(|s| s.state).collect()
    }

    #[test]
    fn test_fresh_draft_points_at_submit() {
        let cr = ChangeRequest::draft("CR-2026-10-000001".into(), "u1".into(), None, sample_form());
        let progress = Progress::build(&cr, &[], &[], &HashMap::new());
        use MilestoneState::*;
        assert_eq!(
            states(&progress),
            vec![Completed, Current, Pending, Pending, Pending, Pending]
        );
        assert_eq!(progress.current().unwrap().name, "Submit to Manager");
    }

    #[test]
    fn test_full_path_names_people() {
        let owner = User::new("a@company.com", "Ahmad", Role::User, Some("Unit A".into()));
        let manager = User::new("b@company.com", "Budi", Role::Manager, Some("Unit A".into()));
        let vp = User::new("c@company.com", "Citra", Role::Vp, None);
        let it = User::new("d@company.com", "Dewi", Role::ManagerIt, None);
        let dev = User::new("e@company.com", "Eko", Role::Dev, None);

        let mut cr = ChangeRequest::draft("CR-2026-10-000001".into(), owner.id.clone(), None, sample_form());
        cr.enter(Status::Completed);
        let log = vec![
            ApprovalLogEntry::new(&cr.id, &owner, ApprovalAction::Submit, ""),
            ApprovalLogEntry::new(&cr.id, &manager, ApprovalAction::Approve, "ok"),
            ApprovalLogEntry::new(&cr.id, &vp, ApprovalAction::Approve, "ok"),
        ];
        let assignments = vec![DeveloperAssignment::new(&cr.id, &dev.id, &it, None)];
        let names: HashMap<_, _> = [&owner, &manager, &vp, &it, &dev]
            .into_iter()
            .map(|u| (u.id.clone(), u.name.clone()))
            .collect();

        let progress = Progress::build(&cr, &log, &assignments, &names);
        assert!(progress.steps.iter().all(|s| s.state == MilestoneState::Completed));
        assert!(progress.current().is_none());
        assert_eq!(progress.steps[2].approver.as_deref(), Some("Budi"));
        assert_eq!(progress.steps[3].approver.as_deref(), Some("Citra"));
        assert_eq!(progress.steps[4].developers, vec!["Eko".to_string()]);
        assert_eq!(progress.steps[5].timestamp, Some(cr.updated_at));
    }

    #[test]
    fn test_exactly_one_current_after_gap() {
        // VP approval recorded but manager approval missing: the gap is current
        let owner = User::new("a@company.com", "Ahmad", Role::User, None);
        let vp = User::new("c@company.com", "Citra", Role::Vp, None);
        let cr = ChangeRequest::draft("CR-2026-10-000001".into(), owner.id.clone(), None, sample_form());
        let log = vec![
            ApprovalLogEntry::new(&cr.id, &owner, ApprovalAction::Submit, ""),
            ApprovalLogEntry::new(&cr.id, &vp, ApprovalAction::Approve, ""),
        ];
        let progress = Progress::build(&cr, &log, &[], &HashMap::new());
        use MilestoneState::*;
        assert_eq!(
            states(&progress),
            vec![Completed, Completed, Current, Pending, Pending, Pending]
        );
        assert_eq!(
            progress.steps.iter().filter(|s| s.state == Current).count(),
            1
        );
    }

    #[test]
    fn test_rejections_do_not_count_as_approval() {
        let owner = User::new("a@company.com", "Ahmad", Role::User, None);
        let manager = User::new("b@company.com", "Budi", Role::Manager, None);
        let cr = ChangeRequest::draft("CR-2026-10-000001".into(), owner.id.clone(), None, sample_form());
        let log = vec![
            ApprovalLogEntry::new(&cr.id, &owner, ApprovalAction::Submit, ""),
            ApprovalLogEntry::new(&cr.id, &manager, ApprovalAction::Reject, "no"),
        ];
        let progress = Progress::build(&cr, &log, &[], &HashMap::new());
        assert_eq!(progress.current().unwrap().step, 3);
    }
}
