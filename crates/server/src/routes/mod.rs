use db::models::{project::Project, user::User};
use services::services::{
    access::{self, Action},
    membership::{self, EffectiveMembership},
};

use crate::{AppState, error::ApiError};

pub mod comments;
pub mod health;
pub mod members;
pub mod milestones;
pub mod phases;
pub mod projects;
pub mod statuses;
pub mod tasks;
pub mod users;

pub(crate) const MAX_TITLE_LEN: usize = 200;
pub(crate) const MAX_DESCRIPTION_LEN: usize = 2000;

/// Validation runs before any remote write; failures surface inline as
/// 400s and never reach the store.
pub(crate) fn validate_title(field: &str, value: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest(format!("{field} cannot be empty")));
    }
    if trimmed.len() > MAX_TITLE_LEN {
        return Err(ApiError::BadRequest(format!(
            "{field} cannot exceed {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn validate_description(value: Option<&str>) -> Result<(), ApiError> {
    if let Some(description) = value
        && description.len() > MAX_DESCRIPTION_LEN
    {
        return Err(ApiError::BadRequest(format!(
            "Description cannot exceed {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(())
}

pub(crate) fn validate_email(value: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    let valid = trimmed
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(ApiError::BadRequest(format!(
            "'{trimmed}' is not a valid email address"
        )));
    }
    Ok(trimmed.to_ascii_lowercase())
}

/// Resolves the current user's effective membership and checks the
/// capability table for the requested action.
pub(crate) async fn require_action(
    state: &AppState,
    project: &Project,
    user: &User,
    action: Action,
) -> Result<EffectiveMembership, ApiError> {
    let resolved = membership::effective_membership(&state.db().pool, project, user.id)
        .await?
        .ok_or_else(|| {
            ApiError::Forbidden("You are not a member of this project".to_string())
        })?;

    if !access::can(resolved.role, action) {
        return Err(ApiError::Forbidden(
            "Your role does not allow this action".to_string(),
        ));
    }
    Ok(resolved)
}
