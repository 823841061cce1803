use axum::{Router, middleware::from_fn_with_state, routing::get};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{AppState, routes};

pub mod auth;

pub fn router(state: AppState) -> Router {
    let session_routes = Router::new()
        .merge(routes::users::router())
        .merge(routes::projects::router(&state))
        .merge(routes::phases::router(&state))
        .merge(routes::milestones::router(&state))
        .merge(routes::tasks::router(&state))
        .merge(routes::comments::router(&state))
        .merge(routes::members::router(&state))
        .layer(from_fn_with_state(
            state.clone(),
            auth::require_session_user,
        ));

    // User provisioning stays outside the session boundary; the auth
    // provider calls it before the user's first request.
    let api_routes = routes::users::public_router().merge(session_routes);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use tower::ServiceExt;

    use crate::test_support::{seed_user, test_state};

    #[tokio::test]
    async fn health_is_public() {
        let state = test_state().await;
        let app = super::router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn api_routes_require_a_session_user() {
        let state = test_state().await;
        let app = super::router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/projects")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json.get("success").and_then(|v| v.as_bool()), Some(false));
        assert_eq!(
            json.get("message").and_then(|v| v.as_str()),
            Some("Unauthorized")
        );
    }

    #[tokio::test]
    async fn unknown_session_user_is_rejected() {
        let state = test_state().await;
        let app = super::router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/projects")
                    .header("x-user-id", uuid::Uuid::new_v4().to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn known_session_user_reaches_the_api() {
        let state = test_state().await;
        let user = seed_user(&state, "ada@example.com").await;
        let app = super::router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/projects")
                    .header("x-user-id", user.id.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json.get("success").and_then(|v| v.as_bool()), Some(true));
    }

    #[tokio::test]
    async fn user_provisioning_is_public() {
        let state = test_state().await;
        let app = super::router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/users")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        r#"{"username":"grace","email":"grace@example.com"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
