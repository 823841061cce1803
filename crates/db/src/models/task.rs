use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use crate::{
    entities::{milestone, phase, priority, status, task, task_assignee},
    models::{
        activity::{Activity, ActivityToken},
        ids,
        status::{DONE_LABEL, OVERDUE_LABEL},
    },
};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error(transparent)]
    Activity(#[from] super::activity::ActivityError),
    #[error("Task not found")]
    TaskNotFound,
    #[error("Project not found")]
    ProjectNotFound,
    #[error("Phase not found")]
    PhaseNotFound,
    #[error("Milestone not found")]
    MilestoneNotFound,
    #[error("Status not found in this project")]
    StatusNotFound,
    #[error("Priority not found in this project")]
    PriorityNotFound,
    #[error("Parent task not found")]
    ParentTaskNotFound,
    #[error("Parent task belongs to a different project")]
    ParentTaskProjectMismatch,
    #[error("Subtasks cannot be nested more than one level deep")]
    SubtaskDepthExceeded,
    #[error("Milestone does not belong to the given phase")]
    MilestonePhaseMismatch,
    #[error("Assignee not found: {0}")]
    AssigneeNotFound(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub phase_id: Option<Uuid>,
    pub milestone_id: Option<Uuid>,
    pub parent_task_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub status_id: Uuid,
    pub priority_id: Uuid,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub assignees: Vec<Uuid>,
    pub created_by: Uuid,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "Date")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateTask {
    pub project_id: Uuid,
    pub phase_id: Option<Uuid>,
    pub milestone_id: Option<Uuid>,
    pub parent_task_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub status_id: Option<Uuid>,
    pub priority_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub assignee_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, TS)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Label-resolved snapshot consumed by the progress aggregator.
#[derive(Debug, Clone)]
pub struct TaskDigest {
    pub status_label: String,
    pub end_date: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

/// Which collection of tasks a query is scoped to.
#[derive(Debug, Clone, Copy)]
pub enum TaskScope {
    Project(Uuid),
    Phase(Uuid),
    Milestone(Uuid),
}

impl Task {
    async fn from_model<C: ConnectionTrait>(db: &C, model: task::Model) -> Result<Self, DbErr> {
        let project_id = ids::project_uuid_by_id(db, model.project_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Project not found".to_string()))?;
        let phase_id = match model.phase_id {
            Some(id) => Some(
                ids::phase_uuid_by_id(db, id)
                    .await?
                    .ok_or(DbErr::RecordNotFound("Phase not found".to_string()))?,
            ),
            None => None,
        };
        let milestone_id = match model.milestone_id {
            Some(id) => Some(
                ids::milestone_uuid_by_id(db, id)
                    .await?
                    .ok_or(DbErr::RecordNotFound("Milestone not found".to_string()))?,
            ),
            None => None,
        };
        let parent_task_id = match model.parent_task_id {
            Some(id) => Some(
                ids::task_uuid_by_id(db, id)
                    .await?
                    .ok_or(DbErr::RecordNotFound("Task not found".to_string()))?,
            ),
            None => None,
        };
        let status_id = ids::status_uuid_by_id(db, model.status_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Status not found".to_string()))?;
        let priority_id = ids::priority_uuid_by_id(db, model.priority_id)
            .await?
            .ok_or(DbErr::RecordNotFound("Priority not found".to_string()))?;
        let created_by = ids::user_uuid_by_id(db, model.created_by)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;

        let assignee_row_ids: Vec<i64> = task_assignee::Entity::find()
            .select_only()
            .column(task_assignee::Column::UserId)
            .filter(task_assignee::Column::TaskId.eq(model.id))
            .into_tuple()
            .all(db)
            .await?;
        let mut assignees = Vec::with_capacity(assignee_row_ids.len());
        for row_id in assignee_row_ids {
            if let Some(uuid) = ids::user_uuid_by_id(db, row_id).await? {
                assignees.push(uuid);
            }
        }

        Ok(Self {
            id: model.uuid,
            project_id,
            phase_id,
            milestone_id,
            parent_task_id,
            title: model.title,
            description: model.description,
            status_id,
            priority_id,
            start_date: model.start_date,
            end_date: model.end_date,
            assignees,
            created_by,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }

    async fn default_status_row<C: ConnectionTrait>(
        db: &C,
        project_row_id: i64,
    ) -> Result<i64, TaskError> {
        let row: Option<i64> = status::Entity::find()
            .select_only()
            .column(status::Column::Id)
            .filter(status::Column::ProjectId.eq(project_row_id))
            .order_by_asc(status::Column::SortOrder)
            .into_tuple()
            .one(db)
            .await?;
        row.ok_or(TaskError::StatusNotFound)
    }

    async fn default_priority_row<C: ConnectionTrait>(
        db: &C,
        project_row_id: i64,
    ) -> Result<i64, TaskError> {
        let row: Option<i64> = priority::Entity::find()
            .select_only()
            .column(priority::Column::Id)
            .filter(priority::Column::ProjectId.eq(project_row_id))
            .order_by_asc(priority::Column::SortOrder)
            .into_tuple()
            .one(db)
            .await?;
        row.ok_or(TaskError::PriorityNotFound)
    }

    async fn resolve_status_row<C: ConnectionTrait>(
        db: &C,
        project_row_id: i64,
        status_id: Uuid,
    ) -> Result<i64, TaskError> {
        let record = status::Entity::find()
            .filter(status::Column::Uuid.eq(status_id))
            .one(db)
            .await?
            .ok_or(TaskError::StatusNotFound)?;
        if record.project_id != project_row_id {
            return Err(TaskError::StatusNotFound);
        }
        Ok(record.id)
    }

    async fn resolve_priority_row<C: ConnectionTrait>(
        db: &C,
        project_row_id: i64,
        priority_id: Uuid,
    ) -> Result<i64, TaskError> {
        let record = priority::Entity::find()
            .filter(priority::Column::Uuid.eq(priority_id))
            .one(db)
            .await?
            .ok_or(TaskError::PriorityNotFound)?;
        if record.project_id != project_row_id {
            return Err(TaskError::PriorityNotFound);
        }
        Ok(record.id)
    }

    pub async fn create<C: ConnectionTrait>(
        db: &C,
        data: &CreateTask,
        task_id: Uuid,
        creator_user_id: Uuid,
    ) -> Result<Self, TaskError> {
        let project_row_id = ids::project_id_by_uuid(db, data.project_id)
            .await?
            .ok_or(TaskError::ProjectNotFound)?;
        let creator_row_id = ids::user_id_by_uuid(db, creator_user_id)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;

        let milestone_row = match data.milestone_id {
            Some(id) => Some(
                milestone::Entity::find()
                    .filter(milestone::Column::Uuid.eq(id))
                    .one(db)
                    .await?
                    .ok_or(TaskError::MilestoneNotFound)?,
            ),
            None => None,
        };

        let phase_row_id = match (data.phase_id, &milestone_row) {
            (Some(phase_id), Some(milestone)) => {
                let phase_row_id = ids::phase_id_by_uuid(db, phase_id)
                    .await?
                    .ok_or(TaskError::PhaseNotFound)?;
                if milestone.phase_id != phase_row_id {
                    return Err(TaskError::MilestonePhaseMismatch);
                }
                Some(phase_row_id)
            }
            (Some(phase_id), None) => Some(
                ids::phase_id_by_uuid(db, phase_id)
                    .await?
                    .ok_or(TaskError::PhaseNotFound)?,
            ),
            // A milestone-scoped task always belongs to its milestone's
            // phase as well.
            (None, Some(milestone)) => Some(milestone.phase_id),
            (None, None) => None,
        };

        if let Some(phase_row_id) = phase_row_id {
            let phase = phase::Entity::find_by_id(phase_row_id)
                .one(db)
                .await?
                .ok_or(TaskError::PhaseNotFound)?;
            if phase.project_id != project_row_id {
                return Err(TaskError::PhaseNotFound);
            }
        }

        let parent_row_id = match data.parent_task_id {
            Some(parent_id) => {
                let parent = task::Entity::find()
                    .filter(task::Column::Uuid.eq(parent_id))
                    .one(db)
                    .await?
                    .ok_or(TaskError::ParentTaskNotFound)?;
                if parent.project_id != project_row_id {
                    return Err(TaskError::ParentTaskProjectMismatch);
                }
                if parent.parent_task_id.is_some() {
                    return Err(TaskError::SubtaskDepthExceeded);
                }
                Some(parent.id)
            }
            None => None,
        };

        let status_row_id = match data.status_id {
            Some(id) => Self::resolve_status_row(db, project_row_id, id).await?,
            None => Self::default_status_row(db, project_row_id).await?,
        };
        let priority_row_id = match data.priority_id {
            Some(id) => Self::resolve_priority_row(db, project_row_id, id).await?,
            None => Self::default_priority_row(db, project_row_id).await?,
        };

        let now = Utc::now();
        let active = task::ActiveModel {
            uuid: Set(task_id),
            project_id: Set(project_row_id),
            phase_id: Set(phase_row_id),
            milestone_id: Set(milestone_row.as_ref().map(|m| m.id)),
            parent_task_id: Set(parent_row_id),
            title: Set(data.title.trim().to_string()),
            description: Set(data.description.clone()),
            status_id: Set(status_row_id),
            priority_id: Set(priority_row_id),
            start_date: Set(data.start_date),
            end_date: Set(data.end_date),
            created_by: Set(creator_row_id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let model = active.insert(db).await?;

        for assignee_id in &data.assignee_ids {
            let assignee_row_id = ids::user_id_by_uuid(db, *assignee_id)
                .await?
                .ok_or(TaskError::AssigneeNotFound(*assignee_id))?;
            let join = task_assignee::ActiveModel {
                task_id: Set(model.id),
                user_id: Set(assignee_row_id),
                created_at: Set(now),
                ..Default::default()
            };
            join.insert(db).await?;
        }

        Activity::record(
            db,
            model.id,
            creator_row_id,
            vec![ActivityToken::text("created this task")],
        )
        .await?;

        Self::from_model(db, model).await.map_err(TaskError::from)
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Self>, DbErr> {
        let record = task::Entity::find()
            .filter(task::Column::Uuid.eq(id))
            .one(db)
            .await?;
        match record {
            Some(model) => Ok(Some(Self::from_model(db, model).await?)),
            None => Ok(None),
        }
    }

    async fn scope_filter<C: ConnectionTrait>(
        db: &C,
        scope: TaskScope,
    ) -> Result<sea_orm::Select<task::Entity>, TaskError> {
        let query = match scope {
            TaskScope::Project(project_id) => {
                let row_id = ids::project_id_by_uuid(db, project_id)
                    .await?
                    .ok_or(TaskError::ProjectNotFound)?;
                task::Entity::find().filter(task::Column::ProjectId.eq(row_id))
            }
            TaskScope::Phase(phase_id) => {
                let row_id = ids::phase_id_by_uuid(db, phase_id)
                    .await?
                    .ok_or(TaskError::PhaseNotFound)?;
                task::Entity::find().filter(task::Column::PhaseId.eq(row_id))
            }
            TaskScope::Milestone(milestone_id) => {
                let row_id = ids::milestone_id_by_uuid(db, milestone_id)
                    .await?
                    .ok_or(TaskError::MilestoneNotFound)?;
                task::Entity::find().filter(task::Column::MilestoneId.eq(row_id))
            }
        };
        Ok(query)
    }

    pub async fn find_in_scope<C: ConnectionTrait>(
        db: &C,
        scope: TaskScope,
    ) -> Result<Vec<Self>, TaskError> {
        let models = Self::scope_filter(db, scope)
            .await?
            .order_by_desc(task::Column::CreatedAt)
            .all(db)
            .await?;

        let mut tasks = Vec::with_capacity(models.len());
        for model in models {
            tasks.push(Self::from_model(db, model).await?);
        }
        Ok(tasks)
    }

    pub async fn find_subtasks<C: ConnectionTrait>(
        db: &C,
        parent_task_id: Uuid,
    ) -> Result<Vec<Self>, TaskError> {
        let parent_row_id = ids::task_id_by_uuid(db, parent_task_id)
            .await?
            .ok_or(TaskError::TaskNotFound)?;
        let models = task::Entity::find()
            .filter(task::Column::ParentTaskId.eq(parent_row_id))
            .order_by_asc(task::Column::CreatedAt)
            .all(db)
            .await?;

        let mut tasks = Vec::with_capacity(models.len());
        for model in models {
            tasks.push(Self::from_model(db, model).await?);
        }
        Ok(tasks)
    }

    pub async fn update<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        payload: &UpdateTask,
        actor_user_id: Uuid,
    ) -> Result<Self, TaskError> {
        let record = task::Entity::find()
            .filter(task::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(TaskError::TaskNotFound)?;
        let actor_row_id = ids::user_id_by_uuid(db, actor_user_id)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;

        let task_row_id = record.id;
        let project_row_id = record.project_id;
        let end_date_changed =
            payload.end_date.is_some() && payload.end_date != record.end_date;

        let priority_row_id = match payload.priority_id {
            Some(priority_id) => {
                Some(Self::resolve_priority_row(db, project_row_id, priority_id).await?)
            }
            None => None,
        };
        let priority_changed = priority_row_id
            .map(|row_id| row_id != record.priority_id)
            .unwrap_or(false);

        let mut active: task::ActiveModel = record.into();
        if let Some(title) = payload.title.clone() {
            active.title = Set(title.trim().to_string());
        }
        if payload.description.is_some() {
            active.description = Set(payload.description.clone());
        }
        if let Some(row_id) = priority_row_id {
            active.priority_id = Set(row_id);
        }
        if payload.start_date.is_some() {
            active.start_date = Set(payload.start_date);
        }
        if payload.end_date.is_some() {
            active.end_date = Set(payload.end_date);
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(db).await?;

        if priority_changed {
            let priority_uuid = ids::priority_uuid_by_id(db, updated.priority_id)
                .await?
                .ok_or(TaskError::PriorityNotFound)?;
            Activity::record(
                db,
                task_row_id,
                actor_row_id,
                vec![
                    ActivityToken::text("set priority to"),
                    ActivityToken::Priority { id: priority_uuid },
                ],
            )
            .await?;
        }
        if end_date_changed
            && let Some(value) = updated.end_date
        {
            Activity::record(
                db,
                task_row_id,
                actor_row_id,
                vec![
                    ActivityToken::text("changed the due date to"),
                    ActivityToken::Date { value },
                ],
            )
            .await?;
        }

        Self::from_model(db, updated).await.map_err(TaskError::from)
    }

    pub async fn update_status<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        status_id: Uuid,
        actor_user_id: Uuid,
    ) -> Result<Self, TaskError> {
        let record = task::Entity::find()
            .filter(task::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(TaskError::TaskNotFound)?;
        let actor_row_id = ids::user_id_by_uuid(db, actor_user_id)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;

        let status_row_id = Self::resolve_status_row(db, record.project_id, status_id).await?;
        let changed = status_row_id != record.status_id;
        let task_row_id = record.id;

        let mut active: task::ActiveModel = record.into();
        active.status_id = Set(status_row_id);
        active.updated_at = Set(Utc::now());
        let updated = active.update(db).await?;

        if changed {
            Activity::record(
                db,
                task_row_id,
                actor_row_id,
                vec![
                    ActivityToken::text("set status to"),
                    ActivityToken::Status { id: status_id },
                ],
            )
            .await?;
        }

        Self::from_model(db, updated).await.map_err(TaskError::from)
    }

    /// Replaces the assignee set wholesale and records one activity entry
    /// naming the new set.
    pub async fn set_assignees<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        assignee_ids: &[Uuid],
        actor_user_id: Uuid,
    ) -> Result<Self, TaskError> {
        let record = task::Entity::find()
            .filter(task::Column::Uuid.eq(id))
            .one(db)
            .await?
            .ok_or(TaskError::TaskNotFound)?;
        let actor_row_id = ids::user_id_by_uuid(db, actor_user_id)
            .await?
            .ok_or(DbErr::RecordNotFound("User not found".to_string()))?;

        let mut assignee_row_ids = Vec::with_capacity(assignee_ids.len());
        for assignee_id in assignee_ids {
            let row_id = ids::user_id_by_uuid(db, *assignee_id)
                .await?
                .ok_or(TaskError::AssigneeNotFound(*assignee_id))?;
            assignee_row_ids.push(row_id);
        }

        task_assignee::Entity::delete_many()
            .filter(task_assignee::Column::TaskId.eq(record.id))
            .exec(db)
            .await?;
        let now = Utc::now();
        for row_id in &assignee_row_ids {
            let join = task_assignee::ActiveModel {
                task_id: Set(record.id),
                user_id: Set(*row_id),
                created_at: Set(now),
                ..Default::default()
            };
            join.insert(db).await?;
        }

        let task_row_id = record.id;
        let mut active: task::ActiveModel = record.into();
        active.updated_at = Set(now);
        let updated = active.update(db).await?;

        Activity::record(
            db,
            task_row_id,
            actor_row_id,
            vec![
                ActivityToken::text("changed assignees to"),
                ActivityToken::Users {
                    ids: assignee_ids.to_vec(),
                },
            ],
        )
        .await?;

        Self::from_model(db, updated).await.map_err(TaskError::from)
    }

    pub async fn delete<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<u64, DbErr> {
        let result = task::Entity::delete_many()
            .filter(task::Column::Uuid.eq(id))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }

    /// Label-resolved snapshots for the progress aggregator.
    pub async fn digests_in_scope<C: ConnectionTrait>(
        db: &C,
        scope: TaskScope,
    ) -> Result<Vec<TaskDigest>, TaskError> {
        let models = Self::scope_filter(db, scope).await?.all(db).await?;
        if models.is_empty() {
            return Ok(Vec::new());
        }

        let project_row_id = models[0].project_id;
        let labels: HashMap<i64, String> = status::Entity::find()
            .filter(status::Column::ProjectId.eq(project_row_id))
            .all(db)
            .await?
            .into_iter()
            .map(|model| (model.id, model.label))
            .collect();

        Ok(models
            .into_iter()
            .map(|model| TaskDigest {
                status_label: labels
                    .get(&model.status_id)
                    .cloned()
                    .unwrap_or_default(),
                end_date: model.end_date,
                updated_at: model.updated_at,
            })
            .collect())
    }

    /// Tasks in the scope that are not in the terminal `Done` status.
    /// The completion gate for phases and milestones.
    pub async fn count_unfinished_in_scope<C: ConnectionTrait>(
        db: &C,
        scope: TaskScope,
    ) -> Result<u64, TaskError> {
        let query = Self::scope_filter(db, scope).await?;
        let models = query.all(db).await?;
        if models.is_empty() {
            return Ok(0);
        }

        let project_row_id = models[0].project_id;
        let done_row_id: Option<i64> = status::Entity::find()
            .select_only()
            .column(status::Column::Id)
            .filter(status::Column::ProjectId.eq(project_row_id))
            .filter(status::Column::Label.eq(DONE_LABEL))
            .into_tuple()
            .one(db)
            .await?;
        let Some(done_row_id) = done_row_id else {
            return Ok(models.len() as u64);
        };

        Ok(models
            .iter()
            .filter(|model| model.status_id != done_row_id)
            .count() as u64)
    }

    /// Batch side effect behind the overdue sweeper: every task with a
    /// past end date and a non-terminal, non-overdue status gets the
    /// project's `Overdue` status. Best effort; readers derive overdue
    /// from the end date regardless.
    pub async fn mark_overdue_batch<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
        today: NaiveDate,
    ) -> Result<u64, TaskError> {
        let project_row_id = ids::project_id_by_uuid(db, project_id)
            .await?
            .ok_or(TaskError::ProjectNotFound)?;

        let done_row_id: Option<i64> = status::Entity::find()
            .select_only()
            .column(status::Column::Id)
            .filter(status::Column::ProjectId.eq(project_row_id))
            .filter(status::Column::Label.eq(DONE_LABEL))
            .into_tuple()
            .one(db)
            .await?;
        let overdue_row_id: Option<i64> = status::Entity::find()
            .select_only()
            .column(status::Column::Id)
            .filter(status::Column::ProjectId.eq(project_row_id))
            .filter(status::Column::Label.eq(OVERDUE_LABEL))
            .into_tuple()
            .one(db)
            .await?;
        let (Some(done_row_id), Some(overdue_row_id)) = (done_row_id, overdue_row_id) else {
            return Ok(0);
        };

        let result = task::Entity::update_many()
            .col_expr(task::Column::StatusId, Expr::value(overdue_row_id))
            .col_expr(task::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(task::Column::ProjectId.eq(project_row_id))
            .filter(task::Column::EndDate.lt(today))
            .filter(task::Column::StatusId.is_not_in([done_row_id, overdue_row_id]))
            .exec(db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn count_in_project<C: ConnectionTrait>(
        db: &C,
        project_id: Uuid,
    ) -> Result<u64, TaskError> {
        let project_row_id = ids::project_id_by_uuid(db, project_id)
            .await?
            .ok_or(TaskError::ProjectNotFound)?;
        Ok(task::Entity::find()
            .filter(task::Column::ProjectId.eq(project_row_id))
            .count(db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        phase::{CreatePhase, Phase},
        project::{CreateProject, Project},
        status::Status,
        user::{CreateUser, User},
    };
    use chrono::Duration;
    use sea_orm::Database;
    use sea_orm_migration::MigratorTrait;

    async fn setup() -> (sea_orm::DatabaseConnection, User, Project) {
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
        (db, user, project)
    }

    fn task_data(project_id: Uuid, title: &str) -> CreateTask {
        CreateTask {
            project_id,
            phase_id: None,
            milestone_id: None,
            parent_task_id: None,
            title: title.to_string(),
            description: None,
            status_id: None,
            priority_id: None,
            start_date: None,
            end_date: None,
            assignee_ids: Vec::new(),
        }
    }

    async fn status_by_label(
        db: &sea_orm::DatabaseConnection,
        project_id: Uuid,
        label: &str,
    ) -> Status {
        Status::find_by_project(db, project_id)
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.label == label)
            .unwrap()
    }

    #[tokio::test]
    async fn create_defaults_to_first_status_and_records_activity() {
        let (db, user, project) = setup().await;

        let task = Task::create(&db, &task_data(project.id, "Design"), Uuid::new_v4(), user.id)
            .await
            .unwrap();

        let not_started = status_by_label(&db, project.id, "Not Started").await;
        assert_eq!(task.status_id, not_started.id);

        let activities = Activity::find_by_task(&db, task.id).await.unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(
            activities[0].content,
            vec![ActivityToken::text("created this task")]
        );
    }

    #[tokio::test]
    async fn subtask_nesting_is_limited_to_one_level() {
        let (db, user, project) = setup().await;

        let parent = Task::create(&db, &task_data(project.id, "Parent"), Uuid::new_v4(), user.id)
            .await
            .unwrap();

        let mut child_data = task_data(project.id, "Child");
        child_data.parent_task_id = Some(parent.id);
        let child = Task::create(&db, &child_data, Uuid::new_v4(), user.id)
            .await
            .unwrap();

        let mut grandchild_data = task_data(project.id, "Grandchild");
        grandchild_data.parent_task_id = Some(child.id);
        let err = Task::create(&db, &grandchild_data, Uuid::new_v4(), user.id)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::SubtaskDepthExceeded));
    }

    #[tokio::test]
    async fn parent_from_another_project_is_rejected() {
        let (db, user, project) = setup().await;
        let other = Project::create(
            &db,
            &CreateProject {
                name: "Borealis".to_string(),
                description: None,
                category: None,
                code: "BOR".to_string(),
            },
            Uuid::new_v4(),
            user.id,
        )
        .await
        .unwrap();
        let foreign_parent =
            Task::create(&db, &task_data(other.id, "Elsewhere"), Uuid::new_v4(), user.id)
                .await
                .unwrap();

        let mut data = task_data(project.id, "Child");
        data.parent_task_id = Some(foreign_parent.id);
        let err = Task::create(&db, &data, Uuid::new_v4(), user.id)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::ParentTaskProjectMismatch));
    }

    #[tokio::test]
    async fn status_update_records_reference_token() {
        let (db, user, project) = setup().await;
        let task = Task::create(&db, &task_data(project.id, "Design"), Uuid::new_v4(), user.id)
            .await
            .unwrap();

        let in_progress = status_by_label(&db, project.id, "In Progress").await;
        let updated = Task::update_status(&db, task.id, in_progress.id, user.id)
            .await
            .unwrap();
        assert_eq!(updated.status_id, in_progress.id);

        let activities = Activity::find_by_task(&db, task.id).await.unwrap();
        assert_eq!(activities.len(), 2);
        assert_eq!(
            activities[1].content,
            vec![
                ActivityToken::text("set status to"),
                ActivityToken::Status { id: in_progress.id },
            ]
        );
    }

    #[tokio::test]
    async fn overdue_batch_skips_done_and_already_overdue() {
        let (db, user, project) = setup().await;
        let yesterday = Utc::now().date_naive() - Duration::days(1);

        let mut late = task_data(project.id, "Late");
        late.end_date = Some(yesterday);
        let late = Task::create(&db, &late, Uuid::new_v4(), user.id).await.unwrap();

        let mut finished = task_data(project.id, "Finished");
        finished.end_date = Some(yesterday);
        let finished = Task::create(&db, &finished, Uuid::new_v4(), user.id)
            .await
            .unwrap();
        let done = status_by_label(&db, project.id, DONE_LABEL).await;
        Task::update_status(&db, finished.id, done.id, user.id)
            .await
            .unwrap();

        let mut future = task_data(project.id, "Future");
        future.end_date = Some(Utc::now().date_naive() + Duration::days(3));
        Task::create(&db, &future, Uuid::new_v4(), user.id).await.unwrap();

        let affected = Task::mark_overdue_batch(&db, project.id, Utc::now().date_naive())
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let overdue = status_by_label(&db, project.id, OVERDUE_LABEL).await;
        let late = Task::find_by_id(&db, late.id).await.unwrap().unwrap();
        assert_eq!(late.status_id, overdue.id);

        // Re-running the sweep has nothing left to touch.
        let affected = Task::mark_overdue_batch(&db, project.id, Utc::now().date_naive())
            .await
            .unwrap();
        assert_eq!(affected, 0);
    }

    #[tokio::test]
    async fn unfinished_count_gates_on_done_label() {
        let (db, user, project) = setup().await;
        let phase = Phase::create(
            &db,
            &CreatePhase {
                project_id: project.id,
                label: "Planning".to_string(),
                phase_order: None,
                start_date: None,
                end_date: None,
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();

        let mut one = task_data(project.id, "One");
        one.phase_id = Some(phase.id);
        let one = Task::create(&db, &one, Uuid::new_v4(), user.id).await.unwrap();
        let mut two = task_data(project.id, "Two");
        two.phase_id = Some(phase.id);
        let two = Task::create(&db, &two, Uuid::new_v4(), user.id).await.unwrap();

        assert_eq!(
            Task::count_unfinished_in_scope(&db, TaskScope::Phase(phase.id))
                .await
                .unwrap(),
            2
        );

        let done = status_by_label(&db, project.id, DONE_LABEL).await;
        Task::update_status(&db, one.id, done.id, user.id).await.unwrap();
        Task::update_status(&db, two.id, done.id, user.id).await.unwrap();

        assert_eq!(
            Task::count_unfinished_in_scope(&db, TaskScope::Phase(phase.id))
                .await
                .unwrap(),
            0
        );
    }
}
