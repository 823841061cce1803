use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use db::{
    DbErr,
    models::{
        activity::ActivityError, comment::CommentError, milestone::MilestoneError,
        phase::PhaseError, priority::PriorityError, project::ProjectError,
        project_member::MemberError, status::StatusError, task::TaskError, user::UserError,
    },
};
use services::services::lifecycle::LifecycleError;
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error(transparent)]
    Phase(#[from] PhaseError),
    #[error(transparent)]
    Milestone(#[from] MilestoneError),
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Status(#[from] StatusError),
    #[error(transparent)]
    Priority(#[from] PriorityError),
    #[error(transparent)]
    Comment(#[from] CommentError),
    #[error(transparent)]
    Member(#[from] MemberError),
    #[error(transparent)]
    Activity(#[from] ActivityError),
    #[error(transparent)]
    User(#[from] UserError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl From<&'static str> for ApiError {
    fn from(msg: &'static str) -> Self {
        ApiError::BadRequest(msg.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status_code, error_type) = match &self {
            ApiError::Project(err) => match err {
                ProjectError::ProjectNotFound => (StatusCode::NOT_FOUND, "ProjectError"),
                ProjectError::DuplicateCode => (StatusCode::CONFLICT, "ProjectError"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "ProjectError"),
            },
            ApiError::Phase(err) => match err {
                PhaseError::PhaseNotFound | PhaseError::ProjectNotFound => {
                    (StatusCode::NOT_FOUND, "PhaseError")
                }
                PhaseError::DuplicateOrder(_) => (StatusCode::CONFLICT, "PhaseError"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "PhaseError"),
            },
            ApiError::Milestone(err) => match err {
                MilestoneError::MilestoneNotFound | MilestoneError::PhaseNotFound => {
                    (StatusCode::NOT_FOUND, "MilestoneError")
                }
                MilestoneError::DuplicateOrder(_) => (StatusCode::CONFLICT, "MilestoneError"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "MilestoneError"),
            },
            ApiError::Task(err) => match err {
                TaskError::TaskNotFound
                | TaskError::ProjectNotFound
                | TaskError::PhaseNotFound
                | TaskError::MilestoneNotFound => (StatusCode::NOT_FOUND, "TaskError"),
                TaskError::StatusNotFound
                | TaskError::PriorityNotFound
                | TaskError::ParentTaskNotFound
                | TaskError::ParentTaskProjectMismatch
                | TaskError::SubtaskDepthExceeded
                | TaskError::MilestonePhaseMismatch
                | TaskError::AssigneeNotFound(_) => (StatusCode::BAD_REQUEST, "TaskError"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "TaskError"),
            },
            ApiError::Status(err) => match err {
                StatusError::StatusNotFound | StatusError::ProjectNotFound => {
                    (StatusCode::NOT_FOUND, "StatusError")
                }
                StatusError::ReservedLabel(_) => (StatusCode::BAD_REQUEST, "StatusError"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "StatusError"),
            },
            ApiError::Priority(err) => match err {
                PriorityError::PriorityNotFound | PriorityError::ProjectNotFound => {
                    (StatusCode::NOT_FOUND, "PriorityError")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "PriorityError"),
            },
            ApiError::Comment(err) => match err {
                CommentError::CommentNotFound | CommentError::TaskNotFound => {
                    (StatusCode::NOT_FOUND, "CommentError")
                }
                CommentError::NestedReply | CommentError::ParentTaskMismatch => {
                    (StatusCode::BAD_REQUEST, "CommentError")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "CommentError"),
            },
            ApiError::Member(err) => match err {
                MemberError::MemberNotFound
                | MemberError::ProjectNotFound
                | MemberError::UserNotFound => (StatusCode::NOT_FOUND, "MemberError"),
                MemberError::AlreadyMember => (StatusCode::CONFLICT, "MemberError"),
                MemberError::InviteNotPending => (StatusCode::CONFLICT, "MemberError"),
                MemberError::NotInvitee => (StatusCode::FORBIDDEN, "MemberError"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "MemberError"),
            },
            ApiError::Activity(err) => match err {
                ActivityError::TaskNotFound => (StatusCode::NOT_FOUND, "ActivityError"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "ActivityError"),
            },
            ApiError::User(err) => match err {
                UserError::UserNotFound => (StatusCode::NOT_FOUND, "UserError"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "UserError"),
            },
            // Lifecycle guards are blocking errors the user resolves by
            // finishing work, so they surface as conflicts.
            ApiError::Lifecycle(err) => match err {
                LifecycleError::PhaseNotFound | LifecycleError::MilestoneNotFound => {
                    (StatusCode::NOT_FOUND, "LifecycleError")
                }
                LifecycleError::UnfinishedTasks { .. }
                | LifecycleError::InvalidState(_)
                | LifecycleError::ScopeClosed(_) => (StatusCode::CONFLICT, "LifecycleError"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "LifecycleError"),
            },
            ApiError::Database(db_err) => match db_err {
                DbErr::RecordNotFound(_) => (StatusCode::NOT_FOUND, "DatabaseError"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "DatabaseError"),
            },
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NotFound"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalError"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BadRequest"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "ConflictError"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "ForbiddenError"),
        };

        let error_message = match &self {
            ApiError::Unauthorized => "Unauthorized. Please sign in again.".to_string(),
            ApiError::NotFound(msg)
            | ApiError::Internal(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Conflict(msg)
            | ApiError::Forbidden(msg) => msg.clone(),
            ApiError::Lifecycle(err) => err.to_string(),
            _ => format!("{}: {}", error_type, self),
        };

        if status_code.is_server_error() {
            tracing::error!(
                status = %status_code,
                error_type,
                error = %self,
                "API request failed"
            );
        }
        let response = ApiResponse::<()>::error(&error_message);
        (status_code, Json(response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::types::ProgressState;

    #[test]
    fn api_error_maps_to_expected_http_statuses() {
        assert_eq!(
            ApiError::BadRequest("bad".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden("nope".to_string())
                .into_response()
                .status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFound("missing".to_string())
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("conflict".to_string())
                .into_response()
                .status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn domain_errors_map_to_expected_http_statuses() {
        assert_eq!(
            ApiError::from(ProjectError::ProjectNotFound)
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(PhaseError::DuplicateOrder(2))
                .into_response()
                .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(TaskError::SubtaskDepthExceeded)
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(LifecycleError::UnfinishedTasks { remaining: 2 })
                .into_response()
                .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(LifecycleError::InvalidState(ProgressState::Done))
                .into_response()
                .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(MemberError::AlreadyMember)
                .into_response()
                .status(),
            StatusCode::CONFLICT
        );
    }
}
