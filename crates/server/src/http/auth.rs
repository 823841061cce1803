use axum::{
    Json,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use db::models::user::User;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::AppState;

/// The authenticated user for the current request. Identity comes from
/// the fronting auth layer, which sets `X-User-Id` after validating the
/// session; this server only resolves the id against the user table.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

fn unauthorized() -> Response {
    let response = ApiResponse::<()>::error("Unauthorized");
    (axum::http::StatusCode::UNAUTHORIZED, Json(response)).into_response()
}

pub async fn require_session_user(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(user_id) = req
        .headers()
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
    else {
        tracing::warn!(
            path = %req.uri().path(),
            method = %req.method(),
            "Request without a valid X-User-Id header"
        );
        return unauthorized();
    };

    let user = match User::find_by_id(&state.db().pool, user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            tracing::warn!(%user_id, "Unknown session user");
            return unauthorized();
        }
        Err(err) => {
            tracing::error!(%user_id, error = %err, "Failed to load session user");
            return unauthorized();
        }
    };

    req.extensions_mut().insert(CurrentUser(user));
    next.run(req).await
}
