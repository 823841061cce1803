use std::sync::Arc;

use db::{
    DBService,
    models::user::{CreateUser, User},
};
use services::services::notify::LogNotifier;
use uuid::Uuid;

use crate::AppState;

pub async fn test_state() -> AppState {
    let db = DBService::new_in_memory().await.expect("in-memory db");
    AppState::new(db, Arc::new(LogNotifier))
}

pub async fn seed_user(state: &AppState, email: &str) -> User {
    User::create(
        &state.db().pool,
        &CreateUser {
            username: email.split('@').next().unwrap().to_string(),
            email: email.to_string(),
        },
        Uuid::new_v4(),
    )
    .await
    .expect("seed user")
}
