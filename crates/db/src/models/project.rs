use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use crate::{
    entities::{project, project_member},
    models::{ids, priority::Priority, status::Status},
    types::{InviteState, MemberRole, ProjectCategory},
};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Project not found")]
    ProjectNotFound,
    #[error("A project with this code already exists")]
    DuplicateCode,
    #[error("Failed to create project: {0}")]
    CreateFailed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: ProjectCategory,
    pub code: String,
    pub closed: bool,
    pub created_by: Uuid,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateProject {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<ProjectCategory>,
    pub code: String,
}

#[derive(Debug, Deserialize, TS)]
pub struct UpdateProject {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<ProjectCategory>,
}

impl Project {
    async fn from_model<C: ConnectionTrait>(
        db: &C,
        model: project::Model,
    ) -> Result<Self, DbErr> {
        let created_by = ids::user_uuid_by_id(db, model.created_by)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;
        Ok(Self {
            id: model.uuid,
            name: model.name,
            description: model.description,
            category: model.category,
            code: model.code,
            closed: model.closed,
            created_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }

    /// Inserts the project row, seeds its status/priority catalogs and
    /// records the creator as an accepted owner member. Callers should
    /// run this inside a transaction.
    pub async fn create<C: ConnectionTrait>(
        db: &C,
        data: &CreateProject,
        project_id: Uuid,
        creator_user_id: Uuid,
    ) -> Result<Self, ProjectError> {
        let creator_row_id = ids::user_id_by_uuid(db, creator_user_id)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;

        let code = data.code.trim().to_ascii_uppercase();
        let duplicate = project::Entity::find()
            .filter(project::Column::Code.eq(code.clone()))
            .one(db)
            .await?;
        if duplicate.is_some() {
            return Err(ProjectError::DuplicateCode);
        }

        let now = Utc::now();
        let active = project::ActiveModel {
            uuid: Set(project_id),
            name: Set(data.name.trim().to_string()),
            description: Set(data.description.clone()),
            category: Set(data.category.unwrap_or_default()),
            code: Set(code),
            closed: Set(false),
            created_by: Set(creator_row_id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let model = active.insert(db).await?;

        Status::seed_defaults(db, model.id).await?;
        Priority::seed_defaults(db, model.id).await?;

        let owner = project_member::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            project_id: Set(model.id),
            user_id: Set(creator_row_id),
            role: Set(MemberRole::Owner),
            invite_status: Set(InviteState::Accepted),
            invited_at: Set(now),
            joined_at: Set(Some(now)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        owner.insert(db).await?;

        Self::from_model(db, model).await.map_err(ProjectError::from)
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = project::Entity::find()
            .filter(project::Column::Uuid.eq(id))
            .one(db)
            .await?;
        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    /// Projects visible to a user: those they created plus those where
    /// they hold an accepted membership.
    pub async fn find_for_user<C: ConnectionTrait>(
        db: &C,
        user_id: Uuid,
    ) -> Result<Vec<Self>, DbErr> {
        let Some(user_row_id) = ids::user_id_by_uuid(db, user_id).await? else {
            return Ok(Vec::new());
        };

        let member_project_ids: Vec<i64> = project_member::Entity::find()
            .select_only()
            .column(project_member::Column::ProjectId)
            .filter(project_member::Column::UserId.eq(user_row_id))
            .filter(project_member::Column::InviteStatus.eq(InviteState::Accepted))
            .into_tuple()
            .all(db)
            .await?;

        let records = project::Entity::find()
            .filter(
                Condition::any()
                    .add(project::Column::CreatedBy.eq(user_row_id))
                    .add(project::Column::Id.is_in(member_project_ids)),
            )
            .order_by_desc(project::Column::CreatedAt)
            .all(db)
            .await?;

        let mut projects = Vec::with_capacity(records.len());
        for model in records {
            projects.push(Self::from_model(db, model).await?);
        }
        Ok(projects)
    }

    pub async fn update<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        payload: &UpdateProject,
    ) -> Result<Self, DbErr> {
        let record = project::Entity::find()
            .filter(project::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;

        let mut active: project::ActiveModel = record.into();
        if let Some(name) = payload.name.clone() {
            active.name = Set(name.trim().to_string());
        }
        if payload.description.is_some() {
            active.description = Set(payload.description.clone());
        }
        if let Some(category) = payload.category {
            active.category = Set(category);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await?;
        Self::from_model(db, updated).await
    }

    /// The reversible closed/active toggle. Separate from the phase
    /// state machine.
    pub async fn set_closed<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        closed: bool,
    ) -> Result<Self, DbErr> {
        let record = project::Entity::find()
            .filter(project::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;

        let mut active: project::ActiveModel = record.into();
        active.closed = Set(closed);
        active.updated_at = Set(Utc::now());
        let updated = active.update(db).await?;
        Self::from_model(db, updated).await
    }

    pub async fn delete<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<u64, DbErr> {
        let result = project::Entity::delete_many()
            .filter(project::Column::Uuid.eq(id))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::{CreateUser, User};
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;

    async fn setup_db() -> sea_orm::DatabaseConnection {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db_migration::Migrator::up(&db, None).await.unwrap();
        db
    }

    async fn make_user(db: &sea_orm::DatabaseConnection, email: &str) -> User {
        User::create(
            db,
            &CreateUser {
                username: email.split('@').next().unwrap().to_string(),
                email: email.to_string(),
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn create_seeds_catalogs_and_owner_membership() {
        let db = setup_db().await;
        let creator = make_user(&db, "ada@example.com").await;

        let project = Project::create(
            &db,
            &CreateProject {
                name: "Apollo".to_string(),
                description: Some("moon".to_string()),
                category: Some(ProjectCategory::External),
                code: "apl".to_string(),
            },
            Uuid::new_v4(),
            creator.id,
        )
        .await
        .unwrap();

        assert_eq!(project.code, "APL");
        assert_eq!(project.created_by, creator.id);
        assert!(!project.closed);

        let statuses = Status::find_by_project(&db, project.id).await.unwrap();
        assert_eq!(statuses.len(), 4);
        let priorities = Priority::find_by_project(&db, project.id).await.unwrap();
        assert_eq!(priorities.len(), 4);

        let visible = Project::find_for_user(&db, creator.id).await.unwrap();
        assert_eq!(visible.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_code_is_rejected() {
        let db = setup_db().await;
        let creator = make_user(&db, "ada@example.com").await;

        let data = CreateProject {
            name: "Apollo".to_string(),
            description: None,
            category: None,
            code: "APL".to_string(),
        };
        Project::create(&db, &data, Uuid::new_v4(), creator.id)
            .await
            .unwrap();

        let err = Project::create(&db, &data, Uuid::new_v4(), creator.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ProjectError::DuplicateCode));
    }

    #[tokio::test]
    async fn closed_toggle_is_reversible() {
        let db = setup_db().await;
        let creator = make_user(&db, "ada@example.com").await;
        let project = Project::create(
            &db,
            &CreateProject {
                name: "Apollo".to_string(),
                description: None,
                category: None,
                code: "APL".to_string(),
            },
            Uuid::new_v4(),
            creator.id,
        )
        .await
        .unwrap();

        let closed = Project::set_closed(&db, project.id, true).await.unwrap();
        assert!(closed.closed);
        let reopened = Project::set_closed(&db, project.id, false).await.unwrap();
        assert!(!reopened.closed);
    }
}
