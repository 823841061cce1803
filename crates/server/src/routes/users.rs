use axum::{
    Extension, Json, Router,
    extract::State,
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::user::{CreateUser, User};
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{
    AppState,
    error::ApiError,
    http::auth::CurrentUser,
    routes::{validate_email, validate_title},
};

/// Provisioning hook for the external auth layer: registered outside the
/// session middleware so the auth provider can sync users before their
/// first authenticated request.
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<CreateUser>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    let username = validate_title("Username", &payload.username)?;
    let email = validate_email(&payload.email)?;

    if User::find_by_email(&state.db().pool, &email).await?.is_some() {
        return Err(ApiError::Conflict(
            "A user with this email already exists".to_string(),
        ));
    }

    let user = User::create(
        &state.db().pool,
        &CreateUser { username, email },
        Uuid::new_v4(),
    )
    .await?;
    Ok(ResponseJson(ApiResponse::success(user)))
}

pub async fn get_current_user(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ResponseJson<ApiResponse<User>> {
    ResponseJson(ApiResponse::success(user))
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/users", post(create_user))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/me", get(get_current_user))
}
