use axum::{
    Extension, Json, Router,
    extract::State,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::delete,
};
use db::{
    models::{
        comment::{Comment, CommentWithReplies, CreateComment},
        project::{Project, ProjectError},
        task::{Task, TaskError},
    },
    types::MemberRole,
};
use services::services::access::{self, Action};
use utils::response::ApiResponse;

use crate::{
    AppState,
    error::ApiError,
    http::auth::CurrentUser,
    middleware::load_comment_middleware,
    routes::{require_action, validate_description},
};

async fn project_of_comment(state: &AppState, comment: &Comment) -> Result<Project, ApiError> {
    let task = Task::find_by_id(&state.db().pool, comment.task_id)
        .await?
        .ok_or(TaskError::TaskNotFound)?;
    Project::find_by_id(&state.db().pool, task.project_id)
        .await?
        .ok_or_else(|| ProjectError::ProjectNotFound.into())
}

pub async fn list_comments(
    State(state): State<AppState>,
    Extension(task): Extension<Task>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<Vec<CommentWithReplies>>>, ApiError> {
    let project = Project::find_by_id(&state.db().pool, task.project_id)
        .await?
        .ok_or(ProjectError::ProjectNotFound)?;
    require_action(&state, &project, &user, Action::ViewProject).await?;

    let comments = Comment::find_threaded_by_task(&state.db().pool, task.id).await?;
    Ok(ResponseJson(ApiResponse::success(comments)))
}

pub async fn create_comment(
    State(state): State<AppState>,
    Extension(task): Extension<Task>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<CreateComment>,
) -> Result<ResponseJson<ApiResponse<Comment>>, ApiError> {
    let project = Project::find_by_id(&state.db().pool, task.project_id)
        .await?
        .ok_or(ProjectError::ProjectNotFound)?;
    require_action(&state, &project, &user, Action::Comment).await?;

    if payload.body.trim().is_empty() {
        return Err(ApiError::BadRequest("Comment cannot be empty".to_string()));
    }
    validate_description(Some(payload.body.as_str()))?;

    let comment = Comment::create(&state.db().pool, task.id, &payload, user.id).await?;
    Ok(ResponseJson(ApiResponse::success(comment)))
}

/// Authors delete their own comments; admins can moderate any.
pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(comment): Extension<Comment>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let project = project_of_comment(&state, &comment).await?;
    let membership = require_action(&state, &project, &user, Action::ViewProject).await?;

    if comment.author_id != user.id && !access::has_min_role(membership.role, MemberRole::Admin) {
        return Err(ApiError::Forbidden(
            "Only the author or an admin can delete a comment".to_string(),
        ));
    }

    let rows_affected = Comment::delete(&state.db().pool, comment.id).await?;
    if rows_affected == 0 {
        return Err(ApiError::NotFound("Comment not found".to_string()));
    }
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(state: &AppState) -> Router<AppState> {
    let comment_id_router = Router::new()
        .route("/", delete(delete_comment))
        .layer(from_fn_with_state(
            state.clone(),
            load_comment_middleware::<AppState>,
        ));

    Router::new().nest("/comments/{comment_id}", comment_id_router)
}
