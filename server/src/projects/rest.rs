//! Project membership management.

use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::{chats, projects};
use crate::error::ApiError;
use crate::state::AppState;

/// DELETE /api/v1/project/{project_id}/member/{member_id}
/// The owner removes a member from the project and from its chat room.
/// Open chat sessions of that member are refused on their next send.
pub async fn remove_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path((project_id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    let caller = user.profile_id();
    let chat_id = state
        .db
        .transaction(move |tx| {
            let project = projects::find_project(tx, project_id)?.ok_or(ApiError::ProjectNotFound)?;
            if project.owner_id != caller {
                return Err(ApiError::UserNotAuthorized);
            }
            if member_id == project.owner_id {
                return Err(ApiError::CannotRemoveOwner);
            }
            if !projects::remove_project_member(tx, project_id, member_id)? {
                return Err(ApiError::UserNotFound);
            }
            if let Some(chat_id) = project.chat_id {
                chats::remove_member(tx, chat_id, member_id)?;
            }
            Ok(project.chat_id)
        })
        .await?;

    tracing::info!(
        project_id = %project_id,
        member_id = %member_id,
        chat_id = ?chat_id,
        "Project member removed"
    );
    Ok(StatusCode::NO_CONTENT)
}
