use axum::{
    Extension, Json, Router,
    extract::State,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{get, post},
};
use chrono::Utc;
use db::{
    TransactionTrait,
    models::{
        project::{CreateProject, Project, UpdateProject},
        task::{Task, TaskScope},
    },
    types::MemberRole,
};
use serde::Serialize;
use services::services::{
    access::{self, Action},
    progress::{self, TaskProgress},
};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    AppState,
    error::ApiError,
    http::auth::CurrentUser,
    middleware::load_project_middleware,
    routes::{require_action, validate_description, validate_title},
};

pub async fn get_projects(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<Vec<Project>>>, ApiError> {
    let projects = Project::find_for_user(&state.db().pool, user.id).await?;
    Ok(ResponseJson(ApiResponse::success(projects)))
}

pub async fn create_project(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<CreateProject>,
) -> Result<ResponseJson<ApiResponse<Project>>, ApiError> {
    let name = validate_title("Project name", &payload.name)?;
    let code = validate_title("Project code", &payload.code)?;
    validate_description(payload.description.as_deref())?;

    tracing::debug!("Creating project '{}'", name);

    let tx = state.db().pool.begin().await?;
    let project = Project::create(
        &tx,
        &CreateProject {
            name,
            code,
            ..payload
        },
        Uuid::new_v4(),
        user.id,
    )
    .await?;
    tx.commit().await?;

    Ok(ResponseJson(ApiResponse::success(project)))
}

pub async fn get_project(
    State(state): State<AppState>,
    Extension(project): Extension<Project>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<Project>>, ApiError> {
    require_action(&state, &project, &user, Action::ViewProject).await?;
    Ok(ResponseJson(ApiResponse::success(project)))
}

pub async fn update_project(
    State(state): State<AppState>,
    Extension(project): Extension<Project>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<UpdateProject>,
) -> Result<ResponseJson<ApiResponse<Project>>, ApiError> {
    require_action(&state, &project, &user, Action::ViewSettings).await?;
    if let Some(name) = payload.name.as_deref() {
        validate_title("Project name", name)?;
    }
    validate_description(payload.description.as_deref())?;

    let updated = Project::update(&state.db().pool, project.id, &payload).await?;
    Ok(ResponseJson(ApiResponse::success(updated)))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Extension(project): Extension<Project>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    require_action(&state, &project, &user, Action::DeleteProject).await?;

    let rows_affected = Project::delete(&state.db().pool, project.id).await?;
    if rows_affected == 0 {
        return Err(ApiError::NotFound("Project not found".to_string()));
    }
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn close_project(
    State(state): State<AppState>,
    Extension(project): Extension<Project>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<Project>>, ApiError> {
    require_action(&state, &project, &user, Action::CloseProject).await?;
    let closed = Project::set_closed(&state.db().pool, project.id, true).await?;
    Ok(ResponseJson(ApiResponse::success(closed)))
}

pub async fn reopen_project(
    State(state): State<AppState>,
    Extension(project): Extension<Project>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<Project>>, ApiError> {
    require_action(&state, &project, &user, Action::CloseProject).await?;
    let reopened = Project::set_closed(&state.db().pool, project.id, false).await?;
    Ok(ResponseJson(ApiResponse::success(reopened)))
}

/// What the current user may do in this project, so the UI can hide
/// controls it would otherwise have to grey out after a rejection.
#[derive(Debug, Serialize, TS)]
pub struct PermissionsResponse {
    pub role: MemberRole,
    pub synthesized: bool,
    pub actions: Vec<Action>,
}

pub async fn get_permissions(
    State(state): State<AppState>,
    Extension(project): Extension<Project>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<PermissionsResponse>>, ApiError> {
    let membership = require_action(&state, &project, &user, Action::ViewProject).await?;
    Ok(ResponseJson(ApiResponse::success(PermissionsResponse {
        role: membership.role,
        synthesized: membership.synthesized,
        actions: access::allowed_actions(membership.role).to_vec(),
    })))
}

pub async fn get_project_progress(
    State(state): State<AppState>,
    Extension(project): Extension<Project>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<TaskProgress>>, ApiError> {
    require_action(&state, &project, &user, Action::ViewProject).await?;
    let digests =
        Task::digests_in_scope(&state.db().pool, TaskScope::Project(project.id)).await?;
    Ok(ResponseJson(ApiResponse::success(progress::aggregate(
        &digests,
        Utc::now(),
    ))))
}

pub fn router(state: &AppState) -> Router<AppState> {
    // Everything under /projects/{id} shares one nested router (and the
    // one project loader), including the phase/member/catalog routes
    // from the sibling modules.
    let project_id_router = Router::new()
        .route(
            "/",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/close", post(close_project))
        .route("/reopen", post(reopen_project))
        .route("/permissions", get(get_permissions))
        .route("/progress", get(get_project_progress))
        .route(
            "/phases",
            get(super::phases::list_phases).post(super::phases::create_phase),
        )
        .route(
            "/members",
            get(super::members::list_members).post(super::members::invite_member),
        )
        .route(
            "/statuses",
            get(super::statuses::list_statuses).post(super::statuses::create_status),
        )
        .route(
            "/statuses/selectable",
            get(super::statuses::list_selectable_statuses),
        )
        .route("/priorities", get(super::statuses::list_priorities))
        .layer(from_fn_with_state(
            state.clone(),
            load_project_middleware::<AppState>,
        ));

    let projects_router = Router::new()
        .route("/", get(get_projects).post(create_project))
        .nest("/{id}", project_id_router);

    Router::new().nest("/projects", projects_router)
}

#[cfg(test)]
mod tests {
    use axum::{body::to_bytes, http::StatusCode, response::IntoResponse};

    use super::*;
    use crate::test_support::{seed_user, test_state};

    fn payload(name: &str, code: &str) -> CreateProject {
        CreateProject {
            name: name.to_string(),
            description: None,
            category: None,
            code: code.to_string(),
        }
    }

    #[tokio::test]
    async fn create_project_rejects_blank_names() {
        let state = test_state().await;
        let user = seed_user(&state, "ada@example.com").await;

        let err = create_project(
            State(state),
            Extension(CurrentUser(user)),
            Json(payload("   ", "APL")),
        )
        .await
        .unwrap_err();

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json.get("success").and_then(|v| v.as_bool()), Some(false));
    }

    #[tokio::test]
    async fn duplicate_project_code_returns_conflict() {
        let state = test_state().await;
        let user = seed_user(&state, "ada@example.com").await;

        create_project(
            State(state.clone()),
            Extension(CurrentUser(user.clone())),
            Json(payload("Apollo", "APL")),
        )
        .await
        .unwrap();

        let err = create_project(
            State(state),
            Extension(CurrentUser(user)),
            Json(payload("Apollo II", "APL")),
        )
        .await
        .unwrap_err();

        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn non_members_cannot_see_a_project() {
        let state = test_state().await;
        let owner = seed_user(&state, "ada@example.com").await;
        let outsider = seed_user(&state, "mallory@example.com").await;

        let created = create_project(
            State(state.clone()),
            Extension(CurrentUser(owner)),
            Json(payload("Apollo", "APL")),
        )
        .await
        .unwrap()
        .0
        .data
        .unwrap();

        let err = get_project(
            State(state),
            Extension(created),
            Extension(CurrentUser(outsider)),
        )
        .await
        .unwrap_err();

        assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    }
}
