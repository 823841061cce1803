use axum::{
    Extension, Json, Router,
    extract::State,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, post},
};
use chrono::{NaiveDate, Utc};
use db::models::{
    phase::{CreatePhase, Phase, UpdatePhase},
    project::{Project, ProjectError},
    task::{Task, TaskScope},
};
use serde::Deserialize;
use services::services::{
    access::Action,
    lifecycle::PhaseCompletion,
    progress::{self, TaskProgress},
};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    AppState,
    error::ApiError,
    http::auth::CurrentUser,
    middleware::load_phase_middleware,
    routes::{require_action, validate_title},
};

async fn parent_project(state: &AppState, phase: &Phase) -> Result<Project, ApiError> {
    Project::find_by_id(&state.db().pool, phase.project_id)
        .await?
        .ok_or_else(|| ProjectError::ProjectNotFound.into())
}

pub async fn list_phases(
    State(state): State<AppState>,
    Extension(project): Extension<Project>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<Vec<Phase>>>, ApiError> {
    require_action(&state, &project, &user, Action::ViewProject).await?;
    let phases = Phase::find_by_project(&state.db().pool, project.id).await?;
    Ok(ResponseJson(ApiResponse::success(phases)))
}

#[derive(Debug, Deserialize, TS)]
pub struct CreatePhaseRequest {
    pub label: String,
    pub phase_order: Option<i32>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

pub async fn create_phase(
    State(state): State<AppState>,
    Extension(project): Extension<Project>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<CreatePhaseRequest>,
) -> Result<ResponseJson<ApiResponse<Phase>>, ApiError> {
    require_action(&state, &project, &user, Action::ManagePhases).await?;
    let label = validate_title("Phase label", &payload.label)?;

    let phase = Phase::create(
        &state.db().pool,
        &CreatePhase {
            project_id: project.id,
            label,
            phase_order: payload.phase_order,
            start_date: payload.start_date,
            end_date: payload.end_date,
        },
        Uuid::new_v4(),
    )
    .await?;
    Ok(ResponseJson(ApiResponse::success(phase)))
}

pub async fn get_phase(
    State(state): State<AppState>,
    Extension(phase): Extension<Phase>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<Phase>>, ApiError> {
    let project = parent_project(&state, &phase).await?;
    require_action(&state, &project, &user, Action::ViewProject).await?;
    Ok(ResponseJson(ApiResponse::success(phase)))
}

pub async fn update_phase(
    State(state): State<AppState>,
    Extension(phase): Extension<Phase>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<UpdatePhase>,
) -> Result<ResponseJson<ApiResponse<Phase>>, ApiError> {
    let project = parent_project(&state, &phase).await?;
    require_action(&state, &project, &user, Action::ManagePhases).await?;
    if let Some(label) = payload.label.as_deref() {
        validate_title("Phase label", label)?;
    }

    let updated = Phase::update(&state.db().pool, phase.id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(updated)))
}

/// Completion gate plus cascade; rejected with a conflict while any
/// task in the phase is unfinished.
pub async fn complete_phase(
    State(state): State<AppState>,
    Extension(phase): Extension<Phase>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<PhaseCompletion>>, ApiError> {
    let project = parent_project(&state, &phase).await?;
    require_action(&state, &project, &user, Action::CompletePhases).await?;

    let completion = state
        .lifecycle()
        .complete_phase(&state.db().pool, phase.id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(completion)))
}

pub async fn get_phase_progress(
    State(state): State<AppState>,
    Extension(phase): Extension<Phase>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<TaskProgress>>, ApiError> {
    let project = parent_project(&state, &phase).await?;
    require_action(&state, &project, &user, Action::ViewProject).await?;

    let digests = Task::digests_in_scope(&state.db().pool, TaskScope::Phase(phase.id)).await?;
    Ok(ResponseJson(ApiResponse::success(progress::aggregate(
        &digests,
        Utc::now(),
    ))))
}

pub fn router(state: &AppState) -> Router<AppState> {
    // The phase list/create routes are registered by the projects
    // router; milestone list/create lives here for the same reason.
    let phase_id_router = Router::new()
        .route("/", get(get_phase).put(update_phase))
        .route("/complete", post(complete_phase))
        .route("/progress", get(get_phase_progress))
        .route(
            "/milestones",
            get(super::milestones::list_milestones).post(super::milestones::create_milestone),
        )
        .layer(from_fn_with_state(
            state.clone(),
            load_phase_middleware::<AppState>,
        ));

    Router::new().nest("/phases/{phase_id}", phase_id_router)
}
