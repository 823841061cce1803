use db::{
    ConnectionTrait, DbErr,
    models::{project::Project, project_member::ProjectMember},
    types::{InviteState, MemberRole},
};
use serde::Serialize;
use ts_rs::TS;
use uuid::Uuid;

/// The membership a user effectively holds in a project. The project
/// creator always resolves to an owner, whether or not a row exists in
/// the membership table.
#[derive(Debug, Clone, Serialize, TS)]
pub struct EffectiveMembership {
    pub role: MemberRole,
    /// True when no membership row backs this record (creator fallback).
    pub synthesized: bool,
}

/// Pure resolution over an already-loaded membership collection.
pub fn resolve_effective_membership(
    project: &Project,
    memberships: &[ProjectMember],
    user_id: Uuid,
) -> Option<EffectiveMembership> {
    if project.created_by == user_id {
        return Some(EffectiveMembership {
            role: MemberRole::Owner,
            synthesized: !memberships
                .iter()
                .any(|m| m.user_id == user_id && m.invite_status == InviteState::Accepted),
        });
    }

    memberships
        .iter()
        .find(|m| m.user_id == user_id && m.invite_status == InviteState::Accepted)
        .map(|m| EffectiveMembership {
            role: m.role,
            synthesized: false,
        })
}

/// Database-backed variant used by request handlers.
pub async fn effective_membership<C: ConnectionTrait>(
    db: &C,
    project: &Project,
    user_id: Uuid,
) -> Result<Option<EffectiveMembership>, DbErr> {
    if project.created_by == user_id {
        return Ok(Some(EffectiveMembership {
            role: MemberRole::Owner,
            synthesized: ProjectMember::find_membership(db, project.id, user_id)
                .await?
                .map(|m| m.invite_status != InviteState::Accepted)
                .unwrap_or(true),
        }));
    }

    let membership = ProjectMember::find_membership(db, project.id, user_id).await?;
    Ok(membership
        .filter(|m| m.invite_status == InviteState::Accepted)
        .map(|m| EffectiveMembership {
            role: m.role,
            synthesized: false,
        }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use db::types::ProjectCategory;

    fn project(created_by: Uuid) -> Project {
        let now = Utc::now();
        Project {
            id: Uuid::new_v4(),
            name: "Apollo".to_string(),
            description: None,
            category: ProjectCategory::Internal,
            code: "APL".to_string(),
            closed: false,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    fn member(
        project_id: Uuid,
        user_id: Uuid,
        role: MemberRole,
        invite_status: InviteState,
    ) -> ProjectMember {
        let now = Utc::now();
        ProjectMember {
            id: Uuid::new_v4(),
            project_id,
            user_id,
            role,
            invite_status,
            invited_at: now,
            joined_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn creator_is_owner_without_a_membership_row() {
        let creator = Uuid::new_v4();
        let project = project(creator);

        let resolved = resolve_effective_membership(&project, &[], creator).unwrap();
        assert_eq!(resolved.role, MemberRole::Owner);
        assert!(resolved.synthesized);
    }

    #[test]
    fn accepted_member_resolves_to_their_role() {
        let creator = Uuid::new_v4();
        let user = Uuid::new_v4();
        let project = project(creator);
        let members = vec![member(
            project.id,
            user,
            MemberRole::Write,
            InviteState::Accepted,
        )];

        let resolved = resolve_effective_membership(&project, &members, user).unwrap();
        assert_eq!(resolved.role, MemberRole::Write);
        assert!(!resolved.synthesized);
    }

    #[test]
    fn pending_or_declined_members_resolve_to_none() {
        let creator = Uuid::new_v4();
        let user = Uuid::new_v4();
        let project = project(creator);

        for state in [InviteState::Invited, InviteState::Declined, InviteState::Expired] {
            let members = vec![member(project.id, user, MemberRole::Admin, state)];
            assert!(resolve_effective_membership(&project, &members, user).is_none());
        }
    }

    #[test]
    fn creator_outranks_a_lesser_membership_row() {
        let creator = Uuid::new_v4();
        let project = project(creator);
        let members = vec![member(
            project.id,
            creator,
            MemberRole::Read,
            InviteState::Accepted,
        )];

        let resolved = resolve_effective_membership(&project, &members, creator).unwrap();
        assert_eq!(resolved.role, MemberRole::Owner);
        assert!(!resolved.synthesized);
    }
}
