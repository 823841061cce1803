use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use crate::{entities::status, models::ids};

/// Sentinel labels with special handling: applied by the completion
/// flow and the overdue sweeper, never offered in manual pickers.
pub const DONE_LABEL: &str = "Done";
pub const OVERDUE_LABEL: &str = "Overdue";

const DEFAULT_STATUSES: &[(&str, &str)] = &[
    ("Not Started", "#94a3b8"),
    ("In Progress", "#3b82f6"),
    (DONE_LABEL, "#22c55e"),
    (OVERDUE_LABEL, "#ef4444"),
];

#[derive(Debug, Error)]
pub enum StatusError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Status not found")]
    StatusNotFound,
    #[error("Project not found")]
    ProjectNotFound,
    #[error("'{0}' is a reserved status label")]
    ReservedLabel(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Status {
    pub id: Uuid,
    pub project_id: Uuid,
    pub label: String,
    pub color: String,
    pub sort_order: i32,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateStatus {
    pub label: String,
    pub color: String,
}

impl Status {
    pub fn is_sentinel(label: &str) -> bool {
        label == DONE_LABEL || label == OVERDUE_LABEL
    }

    fn from_model(model: status::Model, project_uuid: Uuid) -> Self {
        Self {
            id: model.uuid,
            project_id: project_uuid,
            label: model.label,
            color: model.color,
            sort_order: model.sort_order,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }

    /// Installs the default catalog for a fresh project. Runs inside the
    /// project-creation transaction.
    pub async fn seed_defaults<C: ConnectionTrait>(
        db: &C,
        project_row_id: i64,
    ) -> Result<(), DbErr> {
        let now = Utc::now();
        for (index, (label, color)) in DEFAULT_STATUSES.iter().enumerate() {
            let active = status::ActiveModel {
                uuid: Set(Uuid::new_v4()),
                project_id: Set(project_row_id),
                label: Set(label.to_string()),
                color: Set(color.to_string()),
                sort_order: Set(index as i32 + 1),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            active.insert(db).await?;
        }
        Ok(())
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
        data: &CreateStatus,
    ) -> Result<Self, StatusError> {
        let label = data.label.trim().to_string();
        if Self::is_sentinel(&label) {
            return Err(StatusError::ReservedLabel(label));
        }
        let project_row_id = ids::project_id_by_uuid(db, project_id)
            .await?
            .ok_or(StatusError::ProjectNotFound)?;

        let max_order: Option<i32> = status::Entity::find()
            .select_only()
            .column(status::Column::SortOrder)
            .filter(status::Column::ProjectId.eq(project_row_id))
            .order_by_desc(status::Column::SortOrder)
            .into_tuple()
            .one(db)
            .await?;

        let now = Utc::now();
        let active = status::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            project_id: Set(project_row_id),
            label: Set(label),
            color: Set(data.color.clone()),
            sort_order: Set(max_order.unwrap_or(0) + 1),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let model = active.insert(db).await?;
        Ok(Self::from_model(model, project_id))
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = status::Entity::find()
            .filter(status::Column::Uuid.eq(id))
            .one(db)
            .await?;
        match record {
            Some(model) => {
                let project_uuid = ids::project_uuid_by_id(db, model.project_id)
                    .await?
                    .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;
                Ok(Some(Self::from_model(model, project_uuid)))
            }
            None => Ok(None),
        }
    }

    pub async fn find_by_project<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
    ) -> Result<Vec<Self>, StatusError> {
        let project_row_id = ids::project_id_by_uuid(db, project_id)
            .await?
            .ok_or(StatusError::ProjectNotFound)?;
        let records = status::Entity::find()
            .filter(status::Column::ProjectId.eq(project_row_id))
            .order_by_asc(status::Column::SortOrder)
            .all(db)
            .await?;
        Ok(records
            .into_iter()
            .map(|model| Self::from_model(model, project_id))
            .collect())
    }

    /// Catalog entries offered in manual status pickers; the sentinel
    /// labels are excluded.
    pub async fn find_selectable<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
    ) -> Result<Vec<Self>, StatusError> {
        Ok(Self::find_by_project(db, project_id)
            .await?
            .into_iter()
            .filter(|status| !Self::is_sentinel(&status.label))
            .collect())
    }

    pub async fn find_by_label<C: ConnectionTrait>(
        db: &C,
        project_row_id: i64,
        label: &str,
    ) -> Result<Option<status::Model>, DbErr> {
        status::Entity::find()
            .filter(status::Column::ProjectId.eq(project_row_id))
            .filter(status::Column::Label.eq(label))
            .one(db)
            .await
    }

    pub async fn find_map_by_project<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
    ) -> Result<HashMap<Uuid, Self>, StatusError> {
        Ok(Self::find_by_project(db, project_id)
            .await?
            .into_iter()
            .map(|status| (status.id, status))
            .collect())
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

    async fn setup() -> (sea_orm::DatabaseConnection, Uuid) {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db_migration::Migrator::up(&db, None).await.unwrap();
        let creator = User::create(
            &db,
            &CreateUser {
                username: "ada".to_string(),
                email: "ada@example.com".to_string(),
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
            creator.id,
        )
        .await
        .unwrap();
        (db, project.id)
    }

    #[tokio::test]
    async fn seeded_catalog_contains_sentinels_but_picker_does_not() {
        let (db, project_id) = setup().await;

        let all = Status::find_by_project(&db, project_id).await.unwrap();
        let labels: Vec<&str> = all.iter().map(|s| s.label.as_str()).collect();
        assert!(labels.contains(&DONE_LABEL));
        assert!(labels.contains(&OVERDUE_LABEL));

        let selectable = Status::find_selectable(&db, project_id).await.unwrap();
        assert!(
            selectable
                .iter()
                .all(|s| s.label != DONE_LABEL && s.label != OVERDUE_LABEL)
        );
        assert!(!selectable.is_empty());
    }

    #[tokio::test]
    async fn custom_status_appends_after_existing_orders() {
        let (db, project_id) = setup().await;

        let created = Status::create(
            &db,
            project_id,
            &CreateStatus {
                label: "Blocked".to_string(),
                color: "#f97316".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(created.sort_order, 5);

        let err = Status::create(
            &db,
            project_id,
            &CreateStatus {
                label: DONE_LABEL.to_string(),
                color: "#000000".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StatusError::ReservedLabel(_)));
    }
}
