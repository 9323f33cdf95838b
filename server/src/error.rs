//! HTTP-facing error type. Every variant maps to a status code and a
//! machine-readable code in the body: `{"error": "<CODE>"}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::auth::jwt::TokenError;
use crate::chat::ChatError;
use crate::db::models::CollaborationStatus;
use crate::db::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("collaboration request not found")]
    CollaborationRequestNotFound,
    #[error("collaboration request is {0}, not pending")]
    CollaborationRequestIsNotPending(CollaborationStatus),
    #[error("user not authorized")]
    UserNotAuthorized,
    #[error("chat not found")]
    ChatNotFound,
    #[error("idea not found")]
    IdeaNotFound,
    #[error("project not found")]
    ProjectNotFound,
    #[error("user not found")]
    UserNotFound,
    #[error("the project owner cannot be removed")]
    CannotRemoveOwner,
    #[error("a pending collaboration request already exists")]
    PendingRequestAlreadyExists,
    #[error("cannot request collaboration on own idea")]
    OwnIdea,
    #[error("no pending collaboration request")]
    PendingRequestNotFound,
    #[error("invalid feedback")]
    InvalidFeedback,
    #[error("invalid content")]
    InvalidContent,
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] TokenError),
    #[error(transparent)]
    Store(StoreError),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::CollaborationRequestNotFound => "COLLABORATION_REQUEST_NOT_FOUND",
            ApiError::CollaborationRequestIsNotPending(_) => "COLLABORATION_REQUEST_IS_NOT_PENDING",
            ApiError::UserNotAuthorized => "USER_NOT_AUTHORIZED",
            ApiError::ChatNotFound => "CHAT_NOT_FOUND",
            ApiError::IdeaNotFound => "IDEA_NOT_FOUND",
            ApiError::ProjectNotFound => "PROJECT_NOT_FOUND",
            ApiError::UserNotFound => "USER_NOT_FOUND",
            ApiError::CannotRemoveOwner => "YOU_CANNOT_REMOVE_THE_OWNER",
            ApiError::PendingRequestAlreadyExists => "PENDING_COLLABORATION_REQUEST_ALREADY_EXISTS",
            ApiError::OwnIdea => "YOU_CANNOT_REQUEST_COLLABORATION_FOR_YOUR_OWN_IDEA",
            ApiError::PendingRequestNotFound => "PENDING_COLLABORATION_REQUEST_NOT_FOUND",
            ApiError::InvalidFeedback => "INVALID_FEEDBACK",
            ApiError::InvalidContent => "INVALID_CONTENT",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Store(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::CollaborationRequestNotFound
            | ApiError::ChatNotFound
            | ApiError::IdeaNotFound
            | ApiError::ProjectNotFound
            | ApiError::UserNotFound
            | ApiError::PendingRequestNotFound => StatusCode::NOT_FOUND,
            ApiError::CollaborationRequestIsNotPending(_)
            | ApiError::PendingRequestAlreadyExists => StatusCode::CONFLICT,
            ApiError::UserNotAuthorized => StatusCode::FORBIDDEN,
            ApiError::CannotRemoveOwner
            | ApiError::OwnIdea
            | ApiError::InvalidFeedback
            | ApiError::InvalidContent => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ChatNotFound(_) => ApiError::ChatNotFound,
            StoreError::ProjectNotFound(_) => ApiError::ProjectNotFound,
            other => ApiError::Store(other),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::NotMember(_) => ApiError::UserNotAuthorized,
            ChatError::InvalidContent => ApiError::InvalidContent,
            ChatError::Store(store) => ApiError::from(store),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, code = self.code(), "Request rejected");
        }

        let body = match &self {
            ApiError::CollaborationRequestIsNotPending(current) => {
                json!({ "error": self.code(), "status": current })
            }
            _ => json!({ "error": self.code() }),
        };
        (status, Json(body)).into_response()
    }
}
