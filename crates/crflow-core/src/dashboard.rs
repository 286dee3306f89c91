//! Per-role dashboard summaries

use crate::approval::DeveloperAssignment;
use crate::{ChangeRequest, Role, Status, User};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrSummary {
    pub id: String,
    pub title: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub division: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CrSummary {
    fn of(cr: &ChangeRequest, names: &HashMap<String, String>) -> Self {
        Self {
            id: cr.id.clone(),
            title: cr.form_data.title.clone(),
            status: cr.status(),
            requester: names.get(&cr.owner_id).cloned(),
            division: cr.owner_division.clone(),
            created_at: cr.created_at,
            updated_at: cr.updated_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub total: usize,
    pub draft: usize,
    pub pending: usize,
    pub revision: usize,
    pub approved: usize,
    pub rejected: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManagerStats {
    pub pending_approval: usize,
    pub total_division: usize,
    pub approved: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VpStats {
    pub pending_approval: usize,
    pub total_all: usize,
    pub approved: usize,
    pub assigned: usize,
    pub completed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManagerItStats {
    pub need_mapping: usize,
    pub total_assigned: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workload {
    pub developer: String,
    pub assigned_crs: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DevStats {
    pub assigned: usize,
    pub completed: usize,
    pub in_progress: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignedCr {
    #[serde(flatten)]
    pub cr: CrSummary,
    pub assigned_by: String,
    pub assigned_at: DateTime<Utc>,
    pub target_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Role-specific part of a dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum RoleView {
    User {
        stats: UserStats,
        recent: Vec<CrSummary>,
    },
    Manager {
        stats: ManagerStats,
        pending: Vec<CrSummary>,
    },
    Vp {
        stats: VpStats,
        pending: Vec<CrSummary>,
    },
    ManagerIt {
        stats: ManagerItStats,
        workload: Vec<Workload>,
        need_mapping: Vec<CrSummary>,
    },
    Dev {
        stats: DevStats,
        assigned: Vec<AssignedCr>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub user_id: String,
    pub name: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub division: Option<String>,
    #[serde(flatten)]
    pub view: RoleView,
}

fn count(crs: &[&ChangeRequest], statuses: &[Status]) -> usize {
    crs.iter().filter(|cr| statuses.contains(&cr.status())).count()
}

/// Oldest first by creation, at most `n`
fn oldest<'a>(mut crs: Vec<&'a ChangeRequest>, n: usize) -> Vec<&'a ChangeRequest> {
    crs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    crs.truncate(n);
    crs
}

/// Most recently updated first, at most `n`
fn latest<'a>(mut crs: Vec<&'a ChangeRequest>, n: usize) -> Vec<&'a ChangeRequest> {
    crs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
    crs.truncate(n);
    crs
}

impl Dashboard {
    /// Summarize `crs` for `actor`
    ///
    /// `crs` is every stored request (deleted ones are ignored),
    /// `assignments` every assignment, `names` user ids to display names.
    pub fn build(
        actor: &User,
        crs: &[ChangeRequest],
        assignments: &[DeveloperAssignment],
        names: &HashMap<String, String>,
    ) -> Self {
        let live: Vec<&ChangeRequest> = crs
            .iter()
            .filter(|cr| cr.status() != Status::Deleted)
            .collect();
        let summarize = |list: Vec<&ChangeRequest>| -> Vec<CrSummary> {
            list.into_iter().map(|cr| CrSummary::of(cr, names)).collect()
        };

        let view = match actor.role {
            Role::User => {
                let own: Vec<_> = live
                    .iter()
                    .copied()
                    .filter(|cr| cr.is_owned_by(&actor.id))
                    .collect();
                let stats = UserStats {
                    total: own.len(),
                    draft: count(&own, &[Status::Draft]),
                    pending: count(&own, &[Status::PendingManager, Status::PendingVp]),
                    revision: count(&own, &[Status::RevisionManager, Status::RevisionVp]),
                    approved: count(&own, &[Status::Approved]),
                    rejected: count(&own, &[Status::RejectedManager, Status::RejectedVp]),
                    completed: count(&own, &[Status::Completed]),
                };
                RoleView::User {
                    stats,
                    recent: summarize(latest(own, 5)),
                }
            }
            Role::Manager => {
                let division: Vec<_> = live
                    .iter()
                    .copied()
                    .filter(|cr| {
                        actor.division.is_some() && cr.owner_division == actor.division
                    })
                    .collect();
                let pending: Vec<_> = division
                    .iter()
                    .copied()
                    .filter(|cr| cr.status() == Status::PendingManager)
                    .collect();
                let stats = ManagerStats {
                    pending_approval: pending.len(),
                    total_division: division.len(),
                    approved: count(&division, &[Status::Approved]),
                    rejected: count(&division, &[Status::RejectedManager, Status::RejectedVp]),
                };
                RoleView::Manager {
                    stats,
                    pending: summarize(oldest(pending, 10)),
                }
            }
            Role::Vp => {
                let pending: Vec<_> = live
                    .iter()
                    .copied()
                    .filter(|cr| cr.status() == Status::PendingVp)
                    .collect();
                let stats = VpStats {
                    pending_approval: pending.len(),
                    total_all: live.len(),
                    approved: count(&live, &[Status::Approved]),
                    assigned: count(&live, &[Status::AssignedDev]),
                    completed: count(&live, &[Status::Completed]),
                };
                RoleView::Vp {
                    stats,
                    pending: summarize(oldest(pending, 10)),
                }
            }
            Role::ManagerIt => {
                let approved: Vec<_> = live
                    .iter()
                    .copied()
                    .filter(|cr| cr.status() == Status::Approved)
                    .collect();
                let mut per_dev: BTreeMap<&str, usize> = BTreeMap::new();
                for a in assignments {
                    *per_dev.entry(a.developer_id.as_str()).or_default() += 1;
                }
                let workload = per_dev
                    .into_iter()
                    .map(|(id, n)| Workload {
                        developer: names.get(id).cloned().unwrap_or_else(|| "Unknown".into()),
                        assigned_crs: n,
                    })
                    .collect();
                RoleView::ManagerIt {
                    stats: ManagerItStats {
                        need_mapping: approved.len(),
                        total_assigned: assignments.len(),
                    },
                    workload,
                    need_mapping: summarize(latest(approved, 10)),
                }
            }
            Role::Dev => {
                let by_id: HashMap<&str, &ChangeRequest> =
                    crs.iter().map(|cr| (cr.id.as_str(), cr)).collect();
                let mut mine: Vec<_> = assignments
                    .iter()
                    .filter(|a| a.developer_id == actor.id)
                    .filter_map(|a| by_id.get(a.cr_id.as_str()).map(|cr| (a, *cr)))
                    .collect();
                mine.sort_by(|(a, _), (b, _)| b.assigned_at.cmp(&a.assigned_at));

                let stats = DevStats {
                    assigned: mine.len(),
                    completed: mine
                        .iter()
                        .filter(|(_, cr)| cr.status() == Status::Completed)
                        .count(),
                    in_progress: mine
                        .iter()
                        .filter(|(_, cr)| cr.status() == Status::AssignedDev)
                        .count(),
                };
                let assigned = mine
                    .into_iter()
                    .map(|(a, cr)| AssignedCr {
                        cr: CrSummary::of(cr, names),
                        assigned_by: names
                            .get(&a.assigned_by_id)
                            .cloned()
                            .unwrap_or_else(|| a.assigned_by_id.clone()),
                        assigned_at: a.assigned_at,
                        target_date: cr.form_data.target_date.clone(),
                        notes: a.notes.clone(),
                    })
                    .collect();
                RoleView::Dev { stats, assigned }
            }
        };

        Self {
            user_id: actor.id.clone(),
            name: actor.name.clone(),
            role: actor.role,
            division: actor.division.clone(),
            view,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::tests::sample_form;

    fn cr(id: &str, owner: &User, status: Status) -> ChangeRequest {
        let mut cr = ChangeRequest::draft(id.into(), owner.id.clone(), owner.division.clone(), sample_form());
        cr.enter(status);
        cr
    }

    struct Fixture {
        owner: User,
        dev: User,
        it: User,
        crs: Vec<ChangeRequest>,
        assignments: Vec<DeveloperAssignment>,
        names: HashMap<String, String>,
    }

    fn fixture() -> Fixture {
        let owner = User::new("a@company.com", "Ahmad", Role::User, Some("Unit A".into()));
        let other = User::new("b@company.com", "Bayu", Role::User, Some("Unit B".into()));
        let dev = User::new("d@company.com", "Dian", Role::Dev, None);
        let it = User::new("i@company.com", "Indra", Role::ManagerIt, None);
        let crs = vec![
            cr("CR-2026-10-000001", &owner, Status::Draft),
            cr("CR-2026-10-000002", &owner, Status::PendingManager),
            cr("CR-2026-10-000003", &owner, Status::RevisionVp),
            cr("CR-2026-10-000004", &owner, Status::Deleted),
            cr("CR-2026-10-000005", &other, Status::PendingVp),
            cr("CR-2026-10-000006", &other, Status::Approved),
            cr("CR-2026-10-000007", &owner, Status::AssignedDev),
            cr("CR-2026-10-000008", &other, Status::Completed),
        ];
        let assignments = vec![
            DeveloperAssignment::new("CR-2026-10-000007", &dev.id, &it, Some("urgent".into())),
            DeveloperAssignment::new("CR-2026-10-000008", &dev.id, &it, None),
        ];
        let names = [&owner, &other, &dev, &it]
            .into_iter()
            .map(|u| (u.id.clone(), u.name.clone()))
            .collect();
        Fixture {
            owner,
            dev,
            it,
            crs,
            assignments,
            names,
        }
    }

    #[test]
    fn test_user_dashboard_skips_deleted() {
        let f = fixture();
        let dashboard = Dashboard::build(&f.owner, &f.crs, &f.assignments, &f.names);
        let RoleView::User { stats, recent } = dashboard.view else {
            panic!("expected user view");
        };
        assert_eq!(stats.total, 4);
        assert_eq!(stats.draft, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.revision, 1);
        assert_eq!(recent.len(), 4);
        assert!(recent.iter().all(|s| s.status != Status::Deleted));
    }

    #[test]
    fn test_manager_dashboard_is_division_scoped() {
        let f = fixture();
        let manager = User::new("m@company.com", "Maya", Role::Manager, Some("Unit A".into()));
        let dashboard = Dashboard::build(&manager, &f.crs, &f.assignments, &f.names);
        let RoleView::Manager { stats, pending } = dashboard.view else {
            panic!("expected manager view");
        };
        assert_eq!(stats.total_division, 4);
        assert_eq!(stats.pending_approval, 1);
        assert_eq!(pending[0].id, "CR-2026-10-000002");
        assert_eq!(pending[0].requester.as_deref(), Some("Ahmad"));

        let nowhere = User::new("n@company.com", "Nina", Role::Manager, None);
        let RoleView::Manager { stats, .. } =
            Dashboard::build(&nowhere, &f.crs, &f.assignments, &f.names).view
        else {
            panic!("expected manager view");
        };
        assert_eq!(stats, ManagerStats::default());
    }

    #[test]
    fn test_it_and_dev_dashboards() {
        let f = fixture();
        let RoleView::ManagerIt { stats, workload, need_mapping } =
            Dashboard::build(&f.it, &f.crs, &f.assignments, &f.names).view
        else {
            panic!("expected IT view");
        };
        assert_eq!(stats.need_mapping, 1);
        assert_eq!(stats.total_assigned, 2);
        assert_eq!(workload, vec![Workload { developer: "Dian".into(), assigned_crs: 2 }]);
        assert_eq!(need_mapping[0].id, "CR-2026-10-000006");

        let RoleView::Dev { stats, assigned } =
            Dashboard::build(&f.dev, &f.crs, &f.assignments, &f.names).view
        else {
            panic!("expected dev view");
        };
        assert_eq!(stats, DevStats { assigned: 2, completed: 1, in_progress: 1 });
        assert_eq!(assigned.len(), 2);
        assert!(assigned.iter().all(|a| a.assigned_by == "Indra"));
    }

    #[test]
    fn test_vp_dashboard_counts_everything_live() {
        let f = fixture();
        let vp = User::new("v@company.com", "Vina", Role::Vp, None);
        let RoleView::Vp { stats, pending } =
            Dashboard::build(&vp, &f.crs, &f.assignments, &f.names).view
        else {
            panic!("expected VP view");
        };
        assert_eq!(stats.total_all, 7);
        assert_eq!(stats.pending_approval, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(pending.len(), 1);
    }
}
