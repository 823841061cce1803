use std::collections::HashSet;

use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, put},
};
use chrono::{DateTime, Utc};
use db::models::{
    activity::{Activity, ActivityToken},
    comment::{Comment, CommentWithReplies},
    priority::Priority,
    project::{Project, ProjectError},
    status::Status,
    task::{CreateTask, Task, TaskScope, UpdateTask},
    user::User,
};
use serde::{Deserialize, Serialize};
use services::services::{
    access::Action,
    timeline::{self, RenderLookups, TimelineItem},
};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    AppState,
    error::ApiError,
    http::auth::CurrentUser,
    middleware::load_task_middleware,
    routes::{require_action, validate_description, validate_title},
};

#[derive(Debug, Deserialize)]
pub struct TaskQuery {
    pub project_id: Uuid,
    pub phase_id: Option<Uuid>,
    pub milestone_id: Option<Uuid>,
}

async fn parent_project(state: &AppState, task: &Task) -> Result<Project, ApiError> {
    Project::find_by_id(&state.db().pool, task.project_id)
        .await?
        .ok_or_else(|| ProjectError::ProjectNotFound.into())
}

pub async fn get_tasks(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Query(query): Query<TaskQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<Task>>>, ApiError> {
    let project = Project::find_by_id(&state.db().pool, query.project_id)
        .await?
        .ok_or(ProjectError::ProjectNotFound)?;
    require_action(&state, &project, &user, Action::ViewProject).await?;

    let pool = &state.db().pool;
    // Narrower scopes must belong to the project the access check ran
    // against.
    let scope = if let Some(milestone_id) = query.milestone_id {
        let milestone = db::models::milestone::Milestone::find_by_id(pool, milestone_id)
            .await?
            .ok_or(db::models::milestone::MilestoneError::MilestoneNotFound)?;
        let phase = db::models::phase::Phase::find_by_id(pool, milestone.phase_id)
            .await?
            .ok_or(db::models::phase::PhaseError::PhaseNotFound)?;
        if phase.project_id != project.id {
            return Err(ApiError::BadRequest(
                "Milestone does not belong to this project".to_string(),
            ));
        }
        TaskScope::Milestone(milestone_id)
    } else if let Some(phase_id) = query.phase_id {
        let phase = db::models::phase::Phase::find_by_id(pool, phase_id)
            .await?
            .ok_or(db::models::phase::PhaseError::PhaseNotFound)?;
        if phase.project_id != project.id {
            return Err(ApiError::BadRequest(
                "Phase does not belong to this project".to_string(),
            ));
        }
        TaskScope::Phase(phase_id)
    } else {
        TaskScope::Project(project.id)
    };
    let tasks = Task::find_in_scope(pool, scope).await?;

    // Denormalize overdue statuses in the background; the response does
    // not wait on it.
    state.sweeper().request_sweep(project.id);

    Ok(ResponseJson(ApiResponse::success(tasks)))
}

pub async fn create_task(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<CreateTask>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    let project = Project::find_by_id(&state.db().pool, payload.project_id)
        .await?
        .ok_or(ProjectError::ProjectNotFound)?;
    require_action(&state, &project, &user, Action::CreateTasks).await?;

    if project.closed {
        return Err(ApiError::Conflict(
            "Tasks cannot be added to a closed project".to_string(),
        ));
    }

    let title = validate_title("Task title", &payload.title)?;
    validate_description(payload.description.as_deref())?;
    state
        .lifecycle()
        .ensure_scope_open(&state.db().pool, &payload)
        .await?;

    tracing::debug!("Creating task '{}' in project {}", title, project.id);

    let task = Task::create(
        &state.db().pool,
        &CreateTask { title, ..payload },
        Uuid::new_v4(),
        user.id,
    )
    .await?;
    Ok(ResponseJson(ApiResponse::success(task)))
}

pub async fn get_task(
    State(state): State<AppState>,
    Extension(task): Extension<Task>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    let project = parent_project(&state, &task).await?;
    require_action(&state, &project, &user, Action::ViewProject).await?;
    Ok(ResponseJson(ApiResponse::success(task)))
}

pub async fn update_task(
    State(state): State<AppState>,
    Extension(task): Extension<Task>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<UpdateTask>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    let project = parent_project(&state, &task).await?;
    require_action(&state, &project, &user, Action::UpdateTasks).await?;
    if let Some(title) = payload.title.as_deref() {
        validate_title("Task title", title)?;
    }
    validate_description(payload.description.as_deref())?;

    let updated = Task::update(&state.db().pool, task.id, &payload, user.id).await?;
    Ok(ResponseJson(ApiResponse::success(updated)))
}

#[derive(Debug, Deserialize, TS)]
pub struct UpdateTaskStatusRequest {
    pub status_id: Uuid,
}

pub async fn update_task_status(
    State(state): State<AppState>,
    Extension(task): Extension<Task>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<UpdateTaskStatusRequest>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    let project = parent_project(&state, &task).await?;
    require_action(&state, &project, &user, Action::UpdateTasks).await?;

    let updated =
        Task::update_status(&state.db().pool, task.id, payload.status_id, user.id).await?;
    Ok(ResponseJson(ApiResponse::success(updated)))
}

#[derive(Debug, Deserialize, TS)]
pub struct UpdateTaskAssigneesRequest {
    pub assignee_ids: Vec<Uuid>,
}

pub async fn update_task_assignees(
    State(state): State<AppState>,
    Extension(task): Extension<Task>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<UpdateTaskAssigneesRequest>,
) -> Result<ResponseJson<ApiResponse<Task>>, ApiError> {
    let project = parent_project(&state, &task).await?;
    require_action(&state, &project, &user, Action::UpdateTasks).await?;

    let updated =
        Task::set_assignees(&state.db().pool, task.id, &payload.assignee_ids, user.id).await?;
    Ok(ResponseJson(ApiResponse::success(updated)))
}

pub async fn get_subtasks(
    State(state): State<AppState>,
    Extension(task): Extension<Task>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<Vec<Task>>>, ApiError> {
    let project = parent_project(&state, &task).await?;
    require_action(&state, &project, &user, Action::ViewProject).await?;
    let subtasks = Task::find_subtasks(&state.db().pool, task.id).await?;
    Ok(ResponseJson(ApiResponse::success(subtasks)))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Extension(task): Extension<Task>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let project = parent_project(&state, &task).await?;
    require_action(&state, &project, &user, Action::DeleteTasks).await?;

    let rows_affected = Task::delete(&state.db().pool, task.id).await?;
    if rows_affected == 0 {
        return Err(ApiError::NotFound("Task not found".to_string()));
    }
    Ok(ResponseJson(ApiResponse::success(())))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "lowercase")]
pub enum TimelineKind {
    Activity,
    Comment,
}

/// One merged feed entry. Exactly one of `activity`/`comment` is set,
/// per `kind`; activity entries carry their pre-rendered fragments.
#[derive(Debug, Serialize, TS)]
pub struct TimelineEntryView {
    pub id: Uuid,
    pub kind: TimelineKind,
    #[ts(type = "Date")]
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<Activity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<CommentWithReplies>,
}

fn referenced_user_ids(
    activities: &[Activity],
    comments: &[CommentWithReplies],
) -> Vec<Uuid> {
    let mut ids = HashSet::new();
    for activity in activities {
        ids.insert(activity.actor_id);
        for token in &activity.content {
            match token {
                ActivityToken::User { id } => {
                    ids.insert(*id);
                }
                ActivityToken::Users { ids: user_ids } => {
                    ids.extend(user_ids.iter().copied());
                }
                _ => {}
            }
        }
    }
    for comment in comments {
        ids.insert(comment.author_id);
        for reply in &comment.replies {
            ids.insert(reply.author_id);
        }
    }
    ids.into_iter().collect()
}

pub async fn get_task_timeline(
    State(state): State<AppState>,
    Extension(task): Extension<Task>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<Vec<TimelineEntryView>>>, ApiError> {
    let project = parent_project(&state, &task).await?;
    require_action(&state, &project, &user, Action::ViewProject).await?;

    let pool = &state.db().pool;
    let activities = Activity::find_by_task(pool, task.id).await?;
    let comments = Comment::find_threaded_by_task(pool, task.id).await?;

    let lookups = RenderLookups {
        users: User::find_map_by_ids(pool, &referenced_user_ids(&activities, &comments)).await?,
        statuses: Status::find_map_by_project(pool, project.id).await?,
        priorities: Priority::find_map_by_project(pool, project.id).await?,
    };

    let entries = timeline::merge_timeline(activities, comments)
        .into_iter()
        .map(|entry| match entry.item {
            TimelineItem::Activity(activity) => {
                let rendered = timeline::render_activity(&activity.content, &lookups);
                TimelineEntryView {
                    id: entry.id,
                    kind: TimelineKind::Activity,
                    created_at: entry.created_at,
                    activity: Some(activity),
                    rendered: Some(rendered),
                    comment: None,
                }
            }
            TimelineItem::Comment(comment) => TimelineEntryView {
                id: entry.id,
                kind: TimelineKind::Comment,
                created_at: entry.created_at,
                activity: None,
                rendered: None,
                comment: Some(comment),
            },
        })
        .collect();

    Ok(ResponseJson(ApiResponse::success(entries)))
}

pub fn router(state: &AppState) -> Router<AppState> {
    let task_id_router = Router::new()
        .route("/", get(get_task).put(update_task).delete(delete_task))
        .route("/status", put(update_task_status))
        .route("/assignees", put(update_task_assignees))
        .route("/subtasks", get(get_subtasks))
        .route("/timeline", get(get_task_timeline))
        .route(
            "/comments",
            get(super::comments::list_comments).post(super::comments::create_comment),
        )
        .layer(from_fn_with_state(
            state.clone(),
            load_task_middleware::<AppState>,
        ));

    let tasks_router = Router::new()
        .route("/", get(get_tasks).post(create_task))
        .nest("/{task_id}", task_id_router);

    Router::new().nest("/tasks", tasks_router)
}
