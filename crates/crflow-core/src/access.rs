//! Who may see and who may change a change request
//!
//! Everything here is a pure function of its arguments. The engine fetches
//! whatever extra context a rule needs (assignments) before asking.

use crate::approval::{DeveloperAssignment, is_assigned};
use crate::store::CrFilter;
use crate::{ChangeRequest, Error, Result, Role, Status, User};
use std::collections::HashSet;

/// Statuses a VP may see regardless of ownership
pub const VP_VISIBLE: [Status; 6] = [
    Status::PendingVp,
    Status::RejectedVp,
    Status::RevisionVp,
    Status::Approved,
    Status::AssignedDev,
    Status::Completed,
];

/// Statuses an IT manager may see
pub const IT_VISIBLE: [Status; 3] = [Status::Approved, Status::AssignedDev, Status::Completed];

/// Whether `actor` may read `cr`
///
/// `assignments` are the developer assignments of `cr`; only consulted for
/// developers.
pub fn can_view(cr: &ChangeRequest, actor: &User, assignments: &[DeveloperAssignment]) -> bool {
    let owner = cr.is_owned_by(&actor.id);
    if cr.status() == Status::Deleted {
        return owner;
    }
    match actor.role {
        Role::User => owner,
        Role::Manager => matches!(
            (&cr.owner_division, &actor.division),
            (Some(cr_division), Some(division)) if cr_division == division
        ),
        Role::Vp => owner || VP_VISIBLE.contains(&cr.status()),
        Role::ManagerIt => IT_VISIBLE.contains(&cr.status()),
        Role::Dev => assignments
            .iter()
            .filter(|a| a.cr_id == cr.id)
            .any(|a| a.developer_id == actor.id),
    }
}

/// Whether `actor` may change `cr`; strict ownership
pub fn can_mutate(cr: &ChangeRequest, actor: &User) -> bool {
    cr.is_owned_by(&actor.id)
}

pub fn ensure_owner(cr: &ChangeRequest, actor: &User) -> Result<()> {
    if can_mutate(cr, actor) {
        Ok(())
    } else {
        Err(Error::forbidden(format!(
            "only the owner may modify {}",
            cr.id
        )))
    }
}

/// Fail unless `actor` holds one of `roles`
pub fn ensure_role(actor: &User, roles: &[Role]) -> Result<()> {
    if roles.contains(&actor.role) {
        return Ok(());
    }
    let wanted: Vec<_> = roles.iter().map(Role::as_str).collect();
    Err(Error::forbidden(format!(
        "role {} cannot do this (requires {})",
        actor.role,
        wanted.join(" or ")
    )))
}

/// Collection-query scope derived from the actor's role
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListScope {
    /// Requests created by this user
    Owner(String),
    /// Requests whose owner is in this division
    Division(String),
    /// Requests in these statuses
    Statuses(Vec<Status>),
    /// Requests the developer is assigned to
    Assigned,
    /// Nothing is visible
    Nothing,
}

impl ListScope {
    pub fn for_actor(actor: &User) -> Self {
        match actor.role {
            Role::User => ListScope::Owner(actor.id.clone()),
            Role::Manager => match actor.division {
                Some(ref division) => ListScope::Division(division.clone()),
                None => ListScope::Nothing,
            },
            Role::Vp => ListScope::Statuses(VP_VISIBLE.to_vec()),
            Role::ManagerIt => ListScope::Statuses(IT_VISIBLE.to_vec()),
            Role::Dev => ListScope::Assigned,
        }
    }

    /// Build the store filter, or `None` when the result must be empty
    ///
    /// `requested` narrows the scope to one status; a status the scope does not
    /// allow empties the result instead of failing. `assigned` holds the ids
    /// of requests assigned to the actor and is only used by [`ListScope::Assigned`].
    pub fn filter(&self, requested: Option<Status>, assigned: &HashSet<String>) -> Option<CrFilter> {
        if requested == Some(Status::Deleted) {
            return None;
        }

        let mut filter = CrFilter::default();
        match self {
            ListScope::Nothing => return None,
            ListScope::Owner(owner) => filter.owner_id = Some(owner.clone()),
            ListScope::Division(division) => filter.owner_division = Some(division.clone()),
            ListScope::Statuses(allowed) => {
                let statuses = match requested {
                    Some(status) if allowed.contains(&status) => vec![status],
                    Some(_) => return None,
                    None => allowed.clone(),
                };
                filter.statuses = Some(statuses);
                return Some(filter);
            }
            ListScope::Assigned => {
                if assigned.is_empty() {
                    return None;
                }
                filter.ids = Some(assigned.clone());
            }
        }
        filter.statuses = requested.map(|s| vec![s]);
        Some(filter)
    }
}

/// Ids of requests among `assignments` given to `developer_id`
pub fn assigned_ids(assignments: &[DeveloperAssignment], developer_id: &str) -> HashSet<String> {
    assignments
        .iter()
        .filter(|a| a.developer_id == developer_id)
        .map(|a| a.cr_id.clone())
        .collect()
}

/// Developers may complete only what they are assigned to
pub fn can_complete(actor: &User, assignments: &[DeveloperAssignment]) -> bool {
    match actor.role {
        Role::ManagerIt => true,
        Role::Dev => is_assigned(assignments, &actor.id),
        Role::User | Role::Manager | Role::Vp => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::tests::sample_form;

    fn user(role: Role, division: Option<&str>) -> User {
        User::new(
            &format!("{}@company.com", role.as_str().to_lowercase()),
            "Someone",
            role,
            division.map(String::from),
        )
    }

    fn cr_of(owner: &User, status: Status) -> ChangeRequest {
        let mut cr = ChangeRequest::draft(
            "CR-2026-10-000001".into(),
            owner.id.clone(),
            owner.division.clone(),
            sample_form(),
        );
        cr.enter(status);
        cr
    }

    #[test]
    fn test_user_sees_only_own() {
        let owner = user(Role::User, Some("Unit A"));
        let other = user(Role::User, Some("Unit A"));
        let cr = cr_of(&owner, Status::PendingManager);
        assert!(can_view(&cr, &owner, &[]));
        assert!(!can_view(&cr, &other, &[]));
    }

    #[test]
    fn test_manager_by_division() {
        let owner = user(Role::User, Some("Unit A"));
        let cr = cr_of(&owner, Status::PendingManager);
        assert!(can_view(&cr, &user(Role::Manager, Some("Unit A")), &[]));
        assert!(!can_view(&cr, &user(Role::Manager, Some("Unit B")), &[]));
        assert!(!can_view(&cr, &user(Role::Manager, None), &[]));

        let no_division = cr_of(&user(Role::User, None), Status::PendingManager);
        assert!(!can_view(&no_division, &user(Role::Manager, None), &[]));
    }

    #[test]
    fn test_vp_and_it_status_sets() {
        let owner = user(Role::User, Some("Unit A"));
        let vp = user(Role::Vp, None);
        let it = user(Role::ManagerIt, None);
        for status in Status::ALL {
            let cr = cr_of(&owner, status);
            let deleted = status == Status::Deleted;
            assert_eq!(can_view(&cr, &vp, &[]), !deleted && VP_VISIBLE.contains(&status));
            assert_eq!(can_view(&cr, &it, &[]), !deleted && IT_VISIBLE.contains(&status));
        }

        let own = cr_of(&vp, Status::Draft);
        assert!(can_view(&own, &vp, &[]));
    }

    #[test]
    fn test_unassigned_dev_never_sees() {
        let owner = user(Role::User, Some("Unit A"));
        let it = user(Role::ManagerIt, None);
        let dev = user(Role::Dev, None);
        let other_dev = user(Role::Dev, None);

        for status in Status::ALL {
            let cr = cr_of(&owner, status);
            let assignments = vec![DeveloperAssignment::new(&cr.id, &other_dev.id, &it, None)];
            assert!(!can_view(&cr, &dev, &assignments), "{status}");
            assert!(!can_view(&cr, &dev, &[]), "{status}");
        }

        let cr = cr_of(&owner, Status::AssignedDev);
        let assignments = vec![DeveloperAssignment::new(&cr.id, &dev.id, &it, None)];
        assert!(can_view(&cr, &dev, &assignments));
        // Assignments for some other request do not count
        let elsewhere = vec![DeveloperAssignment::new("CR-2026-10-000002", &dev.id, &it, None)];
        assert!(!can_view(&cr, &dev, &elsewhere));
    }

    #[test]
    fn test_can_view_is_pure() {
        let owner = user(Role::User, Some("Unit A"));
        let manager = user(Role::Manager, Some("Unit A"));
        let cr = cr_of(&owner, Status::PendingManager);
        let before = cr.clone();
        let first = can_view(&cr, &manager, &[]);
        let second = can_view(&cr, &manager, &[]);
        assert_eq!(first, second);
        assert_eq!(cr, before);
    }

    #[test]
    fn test_deleted_visible_to_owner_only() {
        let owner = user(Role::User, Some("Unit A"));
        let cr = cr_of(&owner, Status::Deleted);
        assert!(can_view(&cr, &owner, &[]));
        assert!(!can_view(&cr, &user(Role::Manager, Some("Unit A")), &[]));
    }

    #[test]
    fn test_ensure_role_message() {
        let dev = user(Role::Dev, None);
        assert!(ensure_role(&dev, &[Role::ManagerIt, Role::Dev]).is_ok());
        let err = ensure_role(&dev, &[Role::Vp]).unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        assert!(err.to_string().contains("requires VP"));
    }

    #[test]
    fn test_list_scope_status_outside_allowed_is_empty() {
        let none = HashSet::new();
        let it = ListScope::for_actor(&user(Role::ManagerIt, None));
        assert!(it.filter(Some(Status::PendingManager), &none).is_none());
        let filter = it.filter(Some(Status::Approved), &none).unwrap();
        assert_eq!(filter.statuses, Some(vec![Status::Approved]));

        let vp = ListScope::for_actor(&user(Role::Vp, None));
        assert!(vp.filter(Some(Status::Draft), &none).is_none());
        assert_eq!(vp.filter(None, &none).unwrap().statuses.unwrap().len(), 6);
    }

    #[test]
    fn test_list_scope_edges() {
        let none = HashSet::new();
        assert_eq!(
            ListScope::for_actor(&user(Role::Manager, None)),
            ListScope::Nothing
        );
        assert!(ListScope::Assigned.filter(None, &none).is_none());

        let owner = user(Role::User, None);
        let scope = ListScope::for_actor(&owner);
        assert!(scope.filter(Some(Status::Deleted), &none).is_none());
        let filter = scope.filter(Some(Status::Draft), &none).unwrap();
        assert_eq!(filter.owner_id.as_deref(), Some(owner.id.as_str()));
        assert!(!filter.include_deleted);
    }
}
