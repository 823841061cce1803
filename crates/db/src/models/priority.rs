use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use crate::{entities::priority, models::ids};

const DEFAULT_PRIORITIES: &[(&str, &str)] = &[
    ("Low", "#94a3b8"),
    ("Medium", "#eab308"),
    ("High", "#f97316"),
    ("Urgent", "#ef4444"),
];

#[derive(Debug, Error)]
pub enum PriorityError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Priority not found")]
    PriorityNotFound,
    #[error("Project not found")]
    ProjectNotFound,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Priority {
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

impl Priority {
    fn from_model(model: priority::Model, project_uuid: Uuid) -> Self {
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

    pub async fn seed_defaults<C: ConnectionTrait>(
        db: &C,
        project_row_id: i64,
    ) -> Result<(), DbErr> {
        let now = Utc::now();
        for (index, (label, color)) in DEFAULT_PRIORITIES.iter().enumerate() {
            let active = priority::ActiveModel {
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

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = priority::Entity::find()
            .filter(priority::Column::Uuid.eq(id))
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
    ) -> Result<Vec<Self>, PriorityError> {
        let project_row_id = ids::project_id_by_uuid(db, project_id)
            .await?
            .ok_or(PriorityError::ProjectNotFound)?;
        let records = priority::Entity::find()
            .filter(priority::Column::ProjectId.eq(project_row_id))
            .order_by_asc(priority::Column::SortOrder)
            .all(db)
            .await?;
        Ok(records
            .into_iter()
            .map(|model| Self::from_model(model, project_id))
            .collect())
    }

    pub async fn find_map_by_project<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
    ) -> Result<HashMap<Uuid, Self>, PriorityError> {
        Ok(Self::find_by_project(db, project_id)
            .await?
            .into_iter()
            .map(|priority| (priority.id, priority))
            .collect())
    }
}
