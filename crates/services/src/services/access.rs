use db::types::MemberRole;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Everything a member can be allowed to do inside a project. The UI
/// hides controls for actions missing from the current member's list;
/// the server enforces the same table on every mutating route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    ViewProject,
    ViewSettings,
    CreateTasks,
    UpdateTasks,
    DeleteTasks,
    Comment,
    ManageStatuses,
    ManageMembers,
    ManagePhases,
    CompletePhases,
    CloseProject,
    DeleteProject,
}

const READ_ACTIONS: &[Action] = &[Action::ViewProject];

const WRITE_ACTIONS: &[Action] = &[
    Action::ViewProject,
    Action::CreateTasks,
    Action::UpdateTasks,
    Action::Comment,
];

const ADMIN_ACTIONS: &[Action] = &[
    Action::ViewProject,
    Action::ViewSettings,
    Action::CreateTasks,
    Action::UpdateTasks,
    Action::DeleteTasks,
    Action::Comment,
    Action::ManageStatuses,
    Action::ManageMembers,
    Action::ManagePhases,
    Action::CompletePhases,
];

const OWNER_ACTIONS: &[Action] = &[
    Action::ViewProject,
    Action::ViewSettings,
    Action::CreateTasks,
    Action::UpdateTasks,
    Action::DeleteTasks,
    Action::Comment,
    Action::ManageStatuses,
    Action::ManageMembers,
    Action::ManagePhases,
    Action::CompletePhases,
    Action::CloseProject,
    Action::DeleteProject,
];

/// The static capability table.
pub fn allowed_actions(role: MemberRole) -> &'static [Action] {
    match role {
        MemberRole::Read => READ_ACTIONS,
        MemberRole::Write => WRITE_ACTIONS,
        MemberRole::Admin => ADMIN_ACTIONS,
        MemberRole::Owner => OWNER_ACTIONS,
    }
}

/// Exact-capability check; consults the table rather than the role
/// order.
pub fn can(role: MemberRole, action: Action) -> bool {
    allowed_actions(role).contains(&action)
}

/// Minimum-role check over `read < write < admin < owner`.
pub fn has_min_role(role: MemberRole, min: MemberRole) -> bool {
    role >= min
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_members_cannot_create_tasks_but_admins_can() {
        assert!(!can(MemberRole::Read, Action::CreateTasks));
        assert!(can(MemberRole::Admin, Action::CreateTasks));
    }

    #[test]
    fn min_role_follows_the_partial_order() {
        assert!(!has_min_role(MemberRole::Write, MemberRole::Admin));
        assert!(has_min_role(MemberRole::Owner, MemberRole::Admin));
        assert!(has_min_role(MemberRole::Admin, MemberRole::Admin));
    }

    #[test]
    fn destructive_project_actions_are_owner_only() {
        for role in [MemberRole::Read, MemberRole::Write, MemberRole::Admin] {
            assert!(!can(role, Action::CloseProject));
            assert!(!can(role, Action::DeleteProject));
        }
        assert!(can(MemberRole::Owner, Action::CloseProject));
        assert!(can(MemberRole::Owner, Action::DeleteProject));
    }

    #[test]
    fn every_role_can_view_the_project() {
        for role in [
            MemberRole::Read,
            MemberRole::Write,
            MemberRole::Admin,
            MemberRole::Owner,
        ] {
            assert!(can(role, Action::ViewProject));
        }
    }
}
