use axum::{
    Extension, Json, Router,
    extract::State,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, post},
};
use chrono::NaiveDate;
use db::models::{
    milestone::{CreateMilestone, Milestone, UpdateMilestone},
    phase::{Phase, PhaseError},
    project::{Project, ProjectError},
};
use serde::Deserialize;
use services::services::access::Action;
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    AppState,
    error::ApiError,
    http::auth::CurrentUser,
    middleware::load_milestone_middleware,
    routes::{require_action, validate_title},
};

async fn project_of_phase(state: &AppState, phase: &Phase) -> Result<Project, ApiError> {
    Project::find_by_id(&state.db().pool, phase.project_id)
        .await?
        .ok_or_else(|| ProjectError::ProjectNotFound.into())
}

async fn project_of_milestone(
    state: &AppState,
    milestone: &Milestone,
) -> Result<Project, ApiError> {
    let phase = Phase::find_by_id(&state.db().pool, milestone.phase_id)
        .await?
        .ok_or(PhaseError::PhaseNotFound)?;
    project_of_phase(state, &phase).await
}

pub async fn list_milestones(
    State(state): State<AppState>,
    Extension(phase): Extension<Phase>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<Vec<Milestone>>>, ApiError> {
    let project = project_of_phase(&state, &phase).await?;
    require_action(&state, &project, &user, Action::ViewProject).await?;
    let milestones = Milestone::find_by_phase(&state.db().pool, phase.id).await?;
    Ok(ResponseJson(ApiResponse::success(milestones)))
}

#[derive(Debug, Deserialize, TS)]
pub struct CreateMilestoneRequest {
    pub label: String,
    pub milestone_order: Option<i32>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

pub async fn create_milestone(
    State(state): State<AppState>,
    Extension(phase): Extension<Phase>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<CreateMilestoneRequest>,
) -> Result<ResponseJson<ApiResponse<Milestone>>, ApiError> {
    let project = project_of_phase(&state, &phase).await?;
    require_action(&state, &project, &user, Action::ManagePhases).await?;
    let label = validate_title("Milestone label", &payload.label)?;

    let milestone = Milestone::create(
        &state.db().pool,
        &CreateMilestone {
            phase_id: phase.id,
            label,
            milestone_order: payload.milestone_order,
            start_date: payload.start_date,
            end_date: payload.end_date,
        },
        Uuid::new_v4(),
    )
    .await?;
    Ok(ResponseJson(ApiResponse::success(milestone)))
}

pub async fn get_milestone(
    State(state): State<AppState>,
    Extension(milestone): Extension<Milestone>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<Milestone>>, ApiError> {
    let project = project_of_milestone(&state, &milestone).await?;
    require_action(&state, &project, &user, Action::ViewProject).await?;
    Ok(ResponseJson(ApiResponse::success(milestone)))
}

pub async fn update_milestone(
    State(state): State<AppState>,
    Extension(milestone): Extension<Milestone>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<UpdateMilestone>,
) -> Result<ResponseJson<ApiResponse<Milestone>>, ApiError> {
    let project = project_of_milestone(&state, &milestone).await?;
    require_action(&state, &project, &user, Action::ManagePhases).await?;
    if let Some(label) = payload.label.as_deref() {
        validate_title("Milestone label", label)?;
    }

    let updated = Milestone::update(&state.db().pool, milestone.id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(updated)))
}

pub async fn complete_milestone(
    State(state): State<AppState>,
    Extension(milestone): Extension<Milestone>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<Milestone>>, ApiError> {
    let project = project_of_milestone(&state, &milestone).await?;
    require_action(&state, &project, &user, Action::CompletePhases).await?;

    let completed = state
        .lifecycle()
        .complete_milestone(&state.db().pool, milestone.id)
        .await?;
    Ok(ResponseJson(ApiResponse::success(completed)))
}

pub fn router(state: &AppState) -> Router<AppState> {
    let milestone_id_router = Router::new()
        .route("/", get(get_milestone).put(update_milestone))
        .route("/complete", post(complete_milestone))
        .layer(from_fn_with_state(
            state.clone(),
            load_milestone_middleware::<AppState>,
        ));

    Router::new().nest("/milestones/{id}", milestone_id_router)
}
