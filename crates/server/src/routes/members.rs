use axum::{
    Extension, Json, Router,
    extract::State,
    middleware::from_fn_with_state,
    response::Json as ResponseJson,
    routing::{post, put},
};
use db::{
    models::{
        project::{Project, ProjectError},
        project_member::{MemberError, ProjectMember},
        user::{CreateUser, User},
    },
    types::MemberRole,
};
use serde::{Deserialize, Serialize};
use services::services::{access::Action, notify};
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    AppState,
    error::ApiError,
    http::auth::CurrentUser,
    middleware::load_member_middleware,
    routes::{require_action, validate_email},
};

/// Membership row joined with the member's user record for display.
#[derive(Debug, Serialize, TS)]
pub struct MemberWithUser {
    #[serde(flatten)]
    #[ts(flatten)]
    pub member: ProjectMember,
    pub user: User,
}

async fn with_user(state: &AppState, member: ProjectMember) -> Result<MemberWithUser, ApiError> {
    let user = User::find_by_id(&state.db().pool, member.user_id)
        .await?
        .ok_or(MemberError::UserNotFound)?;
    Ok(MemberWithUser { member, user })
}

pub async fn list_members(
    State(state): State<AppState>,
    Extension(project): Extension<Project>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<Vec<MemberWithUser>>>, ApiError> {
    require_action(&state, &project, &user, Action::ViewProject).await?;

    let members = ProjectMember::find_by_project(&state.db().pool, project.id).await?;
    let mut result = Vec::with_capacity(members.len());
    for member in members {
        result.push(with_user(&state, member).await?);
    }
    Ok(ResponseJson(ApiResponse::success(result)))
}

#[derive(Debug, Deserialize, TS)]
pub struct InviteMemberRequest {
    pub email: String,
    pub role: MemberRole,
}

/// Invites a user by email. Unknown addresses get a placeholder user
/// row so the invitation can be claimed once they sign in. The email
/// itself is fire-and-forget.
pub async fn invite_member(
    State(state): State<AppState>,
    Extension(project): Extension<Project>,
    Extension(CurrentUser(inviter)): Extension<CurrentUser>,
    Json(payload): Json<InviteMemberRequest>,
) -> Result<ResponseJson<ApiResponse<MemberWithUser>>, ApiError> {
    require_action(&state, &project, &inviter, Action::ManageMembers).await?;
    let email = validate_email(&payload.email)?;

    let pool = &state.db().pool;
    let invitee = match User::find_by_email(pool, &email).await? {
        Some(user) => user,
        None => {
            let username = email
                .split('@')
                .next()
                .unwrap_or(email.as_str())
                .to_string();
            User::create(pool, &CreateUser { username, email: email.clone() }, Uuid::new_v4())
                .await?
        }
    };

    let member = ProjectMember::invite(pool, project.id, invitee.id, payload.role).await?;

    notify::spawn_invitation(
        state.notifier(),
        email,
        project.name.clone(),
        inviter.username.clone(),
    );

    with_user(&state, member).await.map(|member| ResponseJson(ApiResponse::success(member)))
}

async fn parent_project(state: &AppState, member: &ProjectMember) -> Result<Project, ApiError> {
    Project::find_by_id(&state.db().pool, member.project_id)
        .await?
        .ok_or_else(|| ProjectError::ProjectNotFound.into())
}

#[derive(Debug, Deserialize, TS)]
pub struct UpdateMemberRoleRequest {
    pub role: MemberRole,
}

pub async fn update_member_role(
    State(state): State<AppState>,
    Extension(member): Extension<ProjectMember>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<UpdateMemberRoleRequest>,
) -> Result<ResponseJson<ApiResponse<MemberWithUser>>, ApiError> {
    let project = parent_project(&state, &member).await?;
    require_action(&state, &project, &user, Action::ManageMembers).await?;

    if member.user_id == project.created_by {
        return Err(ApiError::BadRequest(
            "The project creator is always an owner".to_string(),
        ));
    }

    let updated = ProjectMember::update_role(&state.db().pool, member.id, payload.role).await?;
    with_user(&state, updated).await.map(|member| ResponseJson(ApiResponse::success(member)))
}

pub async fn accept_invitation(
    State(state): State<AppState>,
    Extension(member): Extension<ProjectMember>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<MemberWithUser>>, ApiError> {
    let accepted = ProjectMember::accept(&state.db().pool, member.id, user.id).await?;
    with_user(&state, accepted).await.map(|member| ResponseJson(ApiResponse::success(member)))
}

pub async fn decline_invitation(
    State(state): State<AppState>,
    Extension(member): Extension<ProjectMember>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<MemberWithUser>>, ApiError> {
    let declined = ProjectMember::decline(&state.db().pool, member.id, user.id).await?;
    with_user(&state, declined).await.map(|member| ResponseJson(ApiResponse::success(member)))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Extension(member): Extension<ProjectMember>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let project = parent_project(&state, &member).await?;
    require_action(&state, &project, &user, Action::ManageMembers).await?;

    if member.user_id == project.created_by {
        return Err(ApiError::BadRequest(
            "The project creator cannot be removed".to_string(),
        ));
    }

    let rows_affected = ProjectMember::remove(&state.db().pool, member.id).await?;
    if rows_affected == 0 {
        return Err(ApiError::NotFound("Member not found".to_string()));
    }
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router(state: &AppState) -> Router<AppState> {
    let member_id_router = Router::new()
        .route("/", put(update_member_role).delete(remove_member))
        .route("/accept", post(accept_invitation))
        .route("/decline", post(decline_invitation))
        .layer(from_fn_with_state(
            state.clone(),
            load_member_middleware::<AppState>,
        ));

    Router::new().nest("/members/{member_id}", member_id_router)
}
