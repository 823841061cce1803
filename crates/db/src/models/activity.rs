use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryOrder, QueryFilter,
    Set,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use crate::{entities::activity, models::ids};

#[derive(Debug, Error)]
pub enum ActivityError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    #[error("Task not found")]
    TaskNotFound,
}

/// One element of an activity's content: either literal text or a typed
/// reference resolved against a lookup table at render time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActivityToken {
    Text { text: String },
    User { id: Uuid },
    Users { ids: Vec<Uuid> },
    Date { value: NaiveDate },
    Status { id: Uuid },
    Priority { id: Uuid },
    Attachment { name: String },
}

impl ActivityToken {
    pub fn text(value: impl Into<String>) -> Self {
        ActivityToken::Text { text: value.into() }
    }
}

/// Immutable audit entry attached to a task. Recorded by the mutation
/// that it describes, inside the same transaction.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Activity {
    pub id: Uuid,
    pub task_id: Uuid,
    pub actor_id: Uuid,
    pub content: Vec<ActivityToken>,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
}

impl Activity {
    async fn from_model<C: ConnectionTrait>(
        db: &C,
        model: activity::Model,
    ) -> Result<Self, ActivityError> {
        let task_id = ids::task_uuid_by_id(db, model.task_id)
            .await?
            .ok_or(ActivityError::TaskNotFound)?;
        let actor_id = ids::user_uuid_by_id(db, model.actor_id)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;
        let content: Vec<ActivityToken> = serde_json::from_value(model.content)?;
        Ok(Self {
            id: model.uuid,
            task_id,
            actor_id,
            content,
            created_at: model.created_at,
        })
    }

    pub async fn record<C: ConnectionTrait>(
        db: &C,
        task_row_id: i64,
        actor_row_id: i64,
        content: Vec<ActivityToken>,
    ) -> Result<(), ActivityError> {
        let active = activity::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            task_id: Set(task_row_id),
            actor_id: Set(actor_row_id),
            content: Set(serde_json::to_value(&content)?),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        active.insert(db).await?;
        Ok(())
    }

    pub async fn find_by_task<C: ConnectionTrait>(
        db: &C,
        task_id: Uuid,
    ) -> Result<Vec<Self>, ActivityError> {
        let task_row_id = ids::task_id_by_uuid(db, task_id)
            .await?
            .ok_or(ActivityError::TaskNotFound)?;
        let records = activity::Entity::find()
            .filter(activity::Column::TaskId.eq(task_row_id))
            .order_by_asc(activity::Column::CreatedAt)
            .all(db)
            .await?;

        let mut activities = Vec::with_capacity(records.len());
        for model in records {
            activities.push(Self::from_model(db, model).await?);
        }
        Ok(activities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_round_trip_through_tagged_json() {
        let tokens = vec![
            ActivityToken::text("changed status to"),
            ActivityToken::Status { id: Uuid::new_v4() },
            ActivityToken::Users {
                ids: vec![Uuid::new_v4(), Uuid::new_v4()],
            },
            ActivityToken::Attachment {
                name: "design.pdf".to_string(),
            },
        ];

        let json = serde_json::to_value(&tokens).unwrap();
        assert_eq!(
            json[0].get("type").and_then(|v| v.as_str()),
            Some("text")
        );
        assert_eq!(
            json[1].get("type").and_then(|v| v.as_str()),
            Some("status")
        );

        let parsed: Vec<ActivityToken> = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, tokens);
    }
}
