//! REST endpoints for collaboration requests and the author's decision.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::models::{CollaborationRequest, CollaborationStatus};
use crate::db::{collaboration, ideas};
use crate::error::ApiError;
use crate::state::AppState;

/// Accepted request message length, in characters.
const MESSAGE_LENGTH: std::ops::RangeInclusive<usize> = 3..=255;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequestBody {
    pub idea_id: Uuid,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionBody {
    pub collaboration_request_id: Uuid,
    pub status: CollaborationStatus,
    pub feedback: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestQuery {
    pub collaboration_request_id: Uuid,
}

fn valid_message(message: &str) -> bool {
    MESSAGE_LENGTH.contains(&message.chars().count()) && !message.contains(['{', '}'])
}

/// POST /api/v1/collaboration-request
/// A user asks to collaborate on someone else's idea.
pub async fn create_request(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateRequestBody>,
) -> Result<(StatusCode, Json<CollaborationRequest>), ApiError> {
    if !valid_message(&body.message) {
        return Err(ApiError::InvalidContent);
    }
    let requester_id = user.profile_id();

    let request = state
        .db
        .transaction(move |tx| {
            if collaboration::find_pending(tx, body.idea_id, requester_id)?.is_some() {
                return Err(ApiError::PendingRequestAlreadyExists);
            }
            let idea = ideas::find_idea(tx, body.idea_id)?.ok_or(ApiError::IdeaNotFound)?;
            if idea.author_id == requester_id {
                return Err(ApiError::OwnIdea);
            }
            Ok(collaboration::insert_request(
                tx,
                idea.id,
                requester_id,
                &body.message,
            )?)
        })
        .await?;

    tracing::info!(
        request_id = %request.id,
        idea_id = %request.idea_id,
        requester_id = %requester_id,
        "Collaboration requested"
    );
    Ok((StatusCode::CREATED, Json(request)))
}

/// GET /api/v1/collaboration-requests?collaborationRequestId=
/// Visible to the requester and to the idea's author.
pub async fn get_request(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<RequestQuery>,
) -> Result<Json<CollaborationRequest>, ApiError> {
    let caller = user.profile_id();
    let request_id = query.collaboration_request_id;

    let request = state
        .db
        .run(move |conn| {
            let request = collaboration::find_request(conn, request_id)?
                .ok_or(ApiError::CollaborationRequestNotFound)?;
            if request.requester_id != caller {
                let idea =
                    ideas::find_idea(conn, request.idea_id)?.ok_or(ApiError::IdeaNotFound)?;
                if idea.author_id != caller {
                    return Err(ApiError::UserNotAuthorized);
                }
            }
            Ok(request)
        })
        .await?;
    Ok(Json(request))
}

/// PATCH /api/v1/collaboration-approval
/// The idea's author approves or rejects a pending request.
pub async fn decide_request(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<DecisionBody>,
) -> Result<StatusCode, ApiError> {
    state
        .collaboration
        .decide(
            user.profile_id(),
            body.collaboration_request_id,
            body.status,
            &body.feedback,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
