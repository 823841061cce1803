use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use crate::{entities::comment, models::ids};

#[derive(Debug, Error)]
pub enum CommentError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Comment not found")]
    CommentNotFound,
    #[error("Task not found")]
    TaskNotFound,
    #[error("Replies cannot be nested")]
    NestedReply,
    #[error("Parent comment belongs to a different task")]
    ParentTaskMismatch,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Comment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub author_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub body: String,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

/// A top-level comment with its replies nested underneath, the shape the
/// timeline renders.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CommentWithReplies {
    #[serde(flatten)]
    #[ts(flatten)]
    pub comment: Comment,
    pub replies: Vec<Comment>,
}

impl std::ops::Deref for CommentWithReplies {
    type Target = Comment;
    fn deref(&self) -> &Self::Target {
        &self.comment
    }
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateComment {
    pub body: String,
    pub parent_id: Option<Uuid>,
}

impl Comment {
    async fn from_model<C: ConnectionTrait>(
        db: &C,
        model: comment::Model,
    ) -> Result<Self, DbErr> {
        let task_id = ids::task_uuid_by_id(db, model.task_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Task not found".to_string()))?;
        let author_id = ids::user_uuid_by_id(db, model.author_id)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;
        let parent_id = match model.parent_id {
            Some(id) => comment::Entity::find_by_id(id)
                .one(db)
                .await?
                .map(|parent| parent.uuid),
            None => None,
        };
        Ok(Self {
            id: model.uuid,
            task_id,
            author_id,
            parent_id,
            body: model.body,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }

    /// Threading is one level deep: replying to a reply is rejected.
    pub async fn create<C: ConnectionTrait>(
        db: &C,
        task_id: Uuid,
        data: &CreateComment,
        author_user_id: Uuid,
    ) -> Result<Self, CommentError> {
        let task_row_id = ids::task_id_by_uuid(db, task_id)
            .await?
            .ok_or(CommentError::TaskNotFound)?;
        let author_row_id = ids::user_id_by_uuid(db, author_user_id)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;

        let parent_row_id = match data.parent_id {
            Some(parent_id) => {
                let parent = comment::Entity::find()
                    .filter(comment::Column::Uuid.eq(parent_id))
                    .one(db)
                    .await?
                    .ok_or(CommentError::CommentNotFound)?;
                if parent.task_id != task_row_id {
                    return Err(CommentError::ParentTaskMismatch);
                }
                if parent.parent_id.is_some() {
                    return Err(CommentError::NestedReply);
                }
                Some(parent.id)
            }
            None => None,
        };

        let now = Utc::now();
        let active = comment::ActiveModel {
            uuid: Set(Uuid::new_v4()),
            task_id: Set(task_row_id),
            author_id: Set(author_row_id),
            parent_id: Set(parent_row_id),
            body: Set(data.body.trim().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let model = active.insert(db).await?;
        Self::from_model(db, model).await.map_err(CommentError::from)
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = comment::Entity::find()
            .filter(comment::Column::Uuid.eq(id))
            .one(db)
            .await?;
        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    /// Top-level comments in creation order with replies attached, each
    /// reply list also in creation order.
    pub async fn find_threaded_by_task<C: ConnectionTrait>(
        db: &C,
        task_id: Uuid,
    ) -> Result<Vec<CommentWithReplies>, CommentError> {
        let task_row_id = ids::task_id_by_uuid(db, task_id)
            .await?
            .ok_or(CommentError::TaskNotFound)?;
        let models = comment::Entity::find()
            .filter(comment::Column::TaskId.eq(task_row_id))
            .order_by_asc(comment::Column::CreatedAt)
            .all(db)
            .await?;

        let mut top_level = Vec::new();
        let mut replies_by_parent: std::collections::HashMap<i64, Vec<Comment>> =
            std::collections::HashMap::new();
        for model in models {
            match model.parent_id {
                Some(parent_row_id) => {
                    let reply = Self::from_model(db, model).await?;
                    replies_by_parent.entry(parent_row_id).or_default().push(reply);
                }
                None => {
                    let row_id = model.id;
                    let comment = Self::from_model(db, model).await?;
                    top_level.push((row_id, comment));
                }
            }
        }

        Ok(top_level
            .into_iter()
            .map(|(row_id, comment)| CommentWithReplies {
                comment,
                replies: replies_by_parent.remove(&row_id).unwrap_or_default(),
            })
            .collect())
    }

    pub async fn delete<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<u64, DbErr> {
        let result = comment::Entity::delete_many()
            .filter(comment::Column::Uuid.eq(id))
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
        task::{CreateTask, Task},
        user::{CreateUser, User},
    };
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;

    async fn setup() -> (sea_orm::DatabaseConnection, User, Uuid) {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db_migration::Migrator::up(&db, None).await.unwrap();
        let user = User::create(
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
            user.id,
        )
        .await
        .unwrap();
        let task = Task::create(
            &db,
            &CreateTask {
                project_id: project.id,
                phase_id: None,
                milestone_id: None,
                parent_task_id: None,
                title: "Design".to_string(),
                description: None,
                status_id: None,
                priority_id: None,
                start_date: None,
                end_date: None,
                assignee_ids: Vec::new(),
            },
            Uuid::new_v4(),
            user.id,
        )
        .await
        .unwrap();
        (db, user, task.id)
    }

    #[tokio::test]
    async fn replies_nest_one_level_only() {
        let (db, user, task_id) = setup().await;

        let top = Comment::create(
            &db,
            task_id,
            &CreateComment {
                body: "Looks good".to_string(),
                parent_id: None,
            },
            user.id,
        )
        .await
        .unwrap();

        let reply = Comment::create(
            &db,
            task_id,
            &CreateComment {
                body: "Agreed".to_string(),
                parent_id: Some(top.id),
            },
            user.id,
        )
        .await
        .unwrap();

        let err = Comment::create(
            &db,
            task_id,
            &CreateComment {
                body: "Too deep".to_string(),
                parent_id: Some(reply.id),
            },
            user.id,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CommentError::NestedReply));

        let threaded = Comment::find_threaded_by_task(&db, task_id).await.unwrap();
        assert_eq!(threaded.len(), 1);
        assert_eq!(threaded[0].replies.len(), 1);
        assert_eq!(threaded[0].replies[0].id, reply.id);
    }
}
