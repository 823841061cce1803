use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use crate::{
    entities::project_member,
    models::ids,
    types::{InviteState, MemberRole},
};

/// Pending invitations resolve as expired after this many days.
pub const INVITE_TTL_DAYS: i64 = 14;

#[derive(Debug, Error)]
pub enum MemberError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Member not found")]
    MemberNotFound,
    #[error("Project not found")]
    ProjectNotFound,
    #[error("User not found")]
    UserNotFound,
    #[error("User is already a member of this project")]
    AlreadyMember,
    #[error("Invitation is not pending")]
    InviteNotPending,
    #[error("Only the invitee can respond to an invitation")]
    NotInvitee,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct ProjectMember {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
    pub invite_status: InviteState,
    #[ts(type = "Date")]
    pub invited_at: DateTime<Utc>,
    #[ts(type = "Date | null")]
    pub joined_at: Option<DateTime<Utc>>,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

impl ProjectMember {
    /// Expiry is resolved on read: a pending invitation past its TTL
    /// reports `expired` without a write.
    fn effective_invite_state(model: &project_member::Model, now: DateTime<Utc>) -> InviteState {
        if model.invite_status == InviteState::Invited
            && model.invited_at + Duration::days(INVITE_TTL_DAYS) < now
        {
            InviteState::Expired
        } else {
            model.invite_status
        }
    }

    async fn from_model<C: ConnectionTrait>(
        db: &C,
        model: project_member::Model,
    ) -> Result<Self, DbErr> {
        let project_id = ids::project_uuid_by_id(db, model.project_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;
        let user_id = ids::user_uuid_by_id(db, model.user_id)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;
        let invite_status = Self::effective_invite_state(&model, Utc::now());
        Ok(Self {
            id: model.uuid,
            project_id,
            user_id,
            role: model.role,
            invite_status,
            invited_at: model.invited_at,
            joined_at: model.joined_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }

    pub async fn invite<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
        user_id: Uuid,
        role: MemberRole,
    ) -> Result<Self, MemberError> {
        let project_row_id = ids::project_id_by_uuid(db, project_id)
            .await?
            .ok_or(MemberError::ProjectNotFound)?;
        let user_row_id = ids::user_id_by_uuid(db, user_id)
            .await?
            .ok_or(MemberError::UserNotFound)?;

        let existing = project_member::Entity::find()
            .filter(project_member::Column::ProjectId.eq(project_row_id))
            .filter(project_member::Column::UserId.eq(user_row_id))
            .one(db)
            .await?;
        if existing.is_some() {
            return Err(MemberError::AlreadyMember);
        }

        let now = Utc::now();
        let active = project_member::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            project_id: Set(project_row_id),
            user_id: Set(user_row_id),
            role: Set(role),
            invite_status: Set(InviteState::Invited),
            invited_at: Set(now),
            joined_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let model = active.insert(db).await?;
        Self::from_model(db, model).await.map_err(MemberError::from)
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = project_member::Entity::find()
            .filter(project_member::Column::Uuid.eq(id))
            .one(db)
            .await?;
        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    pub async fn find_by_project<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
    ) -> Result<Vec<Self>, MemberError> {
        let project_row_id = ids::project_id_by_uuid(db, project_id)
            .await?
            .ok_or(MemberError::ProjectNotFound)?;
        let records = project_member::Entity::find()
            .filter(project_member::Column::ProjectId.eq(project_row_id))
            .order_by_asc(project_member::Column::CreatedAt)
            .all(db)
            .await?;

        let mut members = Vec::with_capacity(records.len());
        for model in records {
            members.push(Self::from_model(db, model).await?);
        }
        Ok(members)
    }

    pub async fn find_membership<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, DbErr> {
        let Some(project_row_id) = ids::project_id_by_uuid(db, project_id).await? else {
            return Ok(None);
        };
        let Some(user_row_id) = ids::user_id_by_uuid(db, user_id).await? else {
            return Ok(None);
        };
        let record = project_member::Entity::find()
            .filter(project_member::Column::ProjectId.eq(project_row_id))
            .filter(project_member::Column::UserId.eq(user_row_id))
            .one(db)
            .await?;
        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    async fn respond<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        acting_user_id: Uuid,
        response: InviteState,
    ) -> Result<Self, MemberError> {
        let record = project_member::Entity::find()
            .filter(project_member::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(MemberError::MemberNotFound)?;

        let invitee_uuid = ids::user_uuid_by_id(db, record.user_id)
            .await?
            .ok_or(MemberError::UserNotFound)?;
        if invitee_uuid != acting_user_id {
            return Err(MemberError::NotInvitee);
        }
        if Self::effective_invite_state(&record, Utc::now()) != InviteState::Invited {
            return Err(MemberError::InviteNotPending);
        }

        let now = Utc::now();
        let mut active: project_member::ActiveModel = record.into();
        active.invite_status = Set(response);
        if response == InviteState::Accepted {
            active.joined_at = Set(Some(now));
        }
        active.updated_at = Set(now);
        let updated = active.update(db).await?;
        Self::from_model(db, updated).await.map_err(MemberError::from)
    }

    pub async fn accept<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        acting_user_id: Uuid,
    ) -> Result<Self, MemberError> {
        Self::respond(db, id, acting_user_id, InviteState::Accepted).await
    }

    pub async fn decline<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        acting_user_id: Uuid,
    ) -> Result<Self, MemberError> {
        Self::respond(db, id, acting_user_id, InviteState::Declined).await
    }

    pub async fn update_role<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        role: MemberRole,
    ) -> Result<Self, MemberError> {
        let record = project_member::Entity::find()
            .filter(project_member::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(MemberError::MemberNotFound)?;

        let mut active: project_member::ActiveModel = record.into();
        active.role = Set(role);
        active.updated_at = Set(Utc::now());
        let updated = active.update(db).await?;
        Self::from_model(db, updated).await.map_err(MemberError::from)
    }

    pub async fn remove<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<u64, DbErr> {
        let result = project_member::Entity::delete_many()
            .filter(project_member::Column::Uuid.eq(id))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        project::{CreateProject, Project},
        user::{CreateUser, User},
    };
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;

    async fn setup() -> (sea_orm::DatabaseConnection, User, User, Project) {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db_migration::Migrator::up(&db, None).await.unwrap();
        let owner = User::create(
            &db,
            &CreateUser {
                username: "ada".to_string(),
                email: "ada@example.com".to_string(),
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        let invitee = User::create(
            &db,
            &CreateUser {
                username: "grace".to_string(),
                email: "grace@example.com".to_string(),
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        let project = Project::create(
            &db,
            &CreateProject {
                name: "Apollo".to_string(),
                description: None,
                category: None,
                code: "APL".to_string(),
            },
            Uuid::new_v4(),
            owner.id,
        )
        .await
        .unwrap();
        (db, owner, invitee, project)
    }

    #[tokio::test]
    async fn acceptance_stamps_joined_at() {
        let (db, _owner, invitee, project) = setup().await;

        let member = ProjectMember::invite(&db, project.id, invitee.id, MemberRole::Write)
            .await
            .unwrap();
        assert_eq!(member.invite_status, InviteState::Invited);
        assert!(member.joined_at.is_none());

        let accepted = ProjectMember::accept(&db, member.id, invitee.id)
            .await
            .unwrap();
        assert_eq!(accepted.invite_status, InviteState::Accepted);
        assert!(accepted.joined_at.is_some());

        // A second response is rejected.
        let err = ProjectMember::decline(&db, member.id, invitee.id)
            .await
            .unwrap_err();
        assert!(matches!(err, MemberError::InviteNotPending));
    }

    #[tokio::test]
    async fn only_the_invitee_can_respond() {
        let (db, owner, invitee, project) = setup().await;

        let member = ProjectMember::invite(&db, project.id, invitee.id, MemberRole::Read)
            .await
            .unwrap();
        let err = ProjectMember::accept(&db, member.id, owner.id).await.unwrap_err();
        assert!(matches!(err, MemberError::NotInvitee));
    }

    #[tokio::test]
    async fn duplicate_invitation_is_rejected() {
        let (db, _owner, invitee, project) = setup().await;

        ProjectMember::invite(&db, project.id, invitee.id, MemberRole::Read)
            .await
            .unwrap();
        let err = ProjectMember::invite(&db, project.id, invitee.id, MemberRole::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, MemberError::AlreadyMember));
    }

    #[test]
    fn stale_invitations_read_as_expired() {
        let now = Utc::now();
        let model = project_member::Model {
            id: 1,
            uuid: Uuid::new_v4(),
            project_id: 1,
            user_id: 1,
            role: MemberRole::Read,
            invite_status: InviteState::Invited,
            invited_at: now - Duration::days(INVITE_TTL_DAYS + 1),
            joined_at: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(
            ProjectMember::effective_invite_state(&model, now),
            InviteState::Expired
        );

        let fresh = project_member::Model {
            invited_at: now - Duration::days(1),
            ..model
        };
        assert_eq!(
            ProjectMember::effective_invite_state(&fresh, now),
            InviteState::Invited
        );
    }
}
