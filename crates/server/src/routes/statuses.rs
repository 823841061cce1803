use axum::{
    Extension, Json,
    extract::State,
    response::Json as ResponseJson,
};
use db::models::{
    priority::Priority,
    project::Project,
    status::{CreateStatus, Status},
};
use services::services::access::Action;
use utils::response::ApiResponse;

use crate::{
    AppState,
    error::ApiError,
    http::auth::CurrentUser,
    routes::{require_action, validate_title},
};

pub async fn list_statuses(
    State(state): State<AppState>,
    Extension(project): Extension<Project>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<Vec<Status>>>, ApiError> {
    require_action(&state, &project, &user, Action::ViewProject).await?;
    let statuses = Status::find_by_project(&state.db().pool, project.id).await?;
    Ok(ResponseJson(ApiResponse::success(statuses)))
}

/// The picker variant: sentinel statuses are excluded, they are applied
/// by the completion flow and the overdue sweeper only.
pub async fn list_selectable_statuses(
    State(state): State<AppState>,
    Extension(project): Extension<Project>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<Vec<Status>>>, ApiError> {
    require_action(&state, &project, &user, Action::ViewProject).await?;
    let statuses = Status::find_selectable(&state.db().pool, project.id).await?;
    Ok(ResponseJson(ApiResponse::success(statuses)))
}

pub async fn create_status(
    State(state): State<AppState>,
    Extension(project): Extension<Project>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<CreateStatus>,
) -> Result<ResponseJson<ApiResponse<Status>>, ApiError> {
    require_action(&state, &project, &user, Action::ManageStatuses).await?;
    let label = validate_title("Status label", &payload.label)?;

    let status = Status::create(
        &state.db().pool,
        project.id,
        &CreateStatus {
            label,
            color: payload.color,
        },
    )
    .await?;
    Ok(ResponseJson(ApiResponse::success(status)))
}

pub async fn list_priorities(
    State(state): State<AppState>,
    Extension(project): Extension<Project>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<Vec<Priority>>>, ApiError> {
    require_action(&state, &project, &user, Action::ViewProject).await?;
    let priorities = Priority::find_by_project(&state.db().pool, project.id).await?;
    Ok(ResponseJson(ApiResponse::success(priorities)))
}
