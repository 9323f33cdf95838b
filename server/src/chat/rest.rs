//! REST endpoints for chat rooms.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::chats::{self, NewChat};
use crate::db::models::{Chat, ChatMessage};
use crate::db::{collaboration, ideas};
use crate::error::ApiError;
use crate::state::AppState;

/// Default page size for the chat list.
const DEFAULT_QUANTITY: u32 = 10;
/// Maximum page size for the chat list.
const MAX_QUANTITY: u32 = 100;

// --- Request / Response types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub idea_id: Option<Uuid>,
    pub collaboration_request_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub members: Vec<Uuid>,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
}

impl ChatResponse {
    fn new(chat: Chat, mut members: Vec<Uuid>, messages: Vec<ChatMessage>) -> Self {
        members.sort();
        Self {
            id: chat.id,
            owner_id: chat.owner_id,
            idea_id: chat.idea_id,
            collaboration_request_id: chat.collaboration_request_id,
            project_id: chat.project_id,
            members,
            messages,
            created_at: chat.created_at,
        }
    }
}

/// A room in the caller's chat list: members but no transcript.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub idea_id: Option<Uuid>,
    pub collaboration_request_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub members: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ChatListQuery {
    pub page: Option<u32>,
    pub quantity: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPage {
    pub total: i64,
    pub pages: i64,
    pub page: u32,
    pub next_page: Option<u32>,
    pub data: Vec<ChatSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartChatRequest {
    pub idea_id: Uuid,
    pub requester_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub chat_id: Uuid,
    pub content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub chat_id: Uuid,
    pub message: ChatMessage,
}

// --- Handlers ---

/// GET /api/v1/chat?page=&quantity=
/// Rooms the caller owns or belongs to, newest first.
pub async fn list_chats(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ChatListQuery>,
) -> Result<Json<ChatPage>, ApiError> {
    let page = query.page.unwrap_or(0);
    let quantity = query
        .quantity
        .unwrap_or(DEFAULT_QUANTITY)
        .clamp(1, MAX_QUANTITY);
    let caller = user.profile_id();

    let (data, total) = state
        .db
        .run(move |conn| {
            let (rooms, total) = chats::chats_for(conn, caller, page, quantity)?;
            let mut data = Vec::with_capacity(rooms.len());
            for chat in rooms {
                let mut members: Vec<Uuid> =
                    chats::chat_members(conn, chat.id)?.into_iter().collect();
                members.sort();
                data.push(ChatSummary {
                    id: chat.id,
                    owner_id: chat.owner_id,
                    idea_id: chat.idea_id,
                    collaboration_request_id: chat.collaboration_request_id,
                    project_id: chat.project_id,
                    members,
                    created_at: chat.created_at,
                });
            }
            Ok::<_, ApiError>((data, total))
        })
        .await?;

    let pages = (total + i64::from(quantity) - 1) / i64::from(quantity);
    let next_page = page.saturating_add(1);
    Ok(Json(ChatPage {
        total,
        pages,
        page,
        next_page: (i64::from(next_page) < pages).then_some(next_page),
        data,
    }))
}

/// GET /api/v1/chat/{chat_id}
/// Room details with member ids and transcript. Members only.
pub async fn get_chat(
    State(state): State<AppState>,
    user: AuthUser,
    Path(chat_id): Path<Uuid>,
) -> Result<Json<ChatResponse>, ApiError> {
    let caller = user.profile_id();
    let response = state
        .db
        .run(move |conn| {
            let chat = chats::find_chat(conn, chat_id)?.ok_or(ApiError::ChatNotFound)?;
            let members = chats::chat_members(conn, chat_id)?;
            if !members.contains(&caller) {
                return Err(ApiError::UserNotAuthorized);
            }
            let messages = chats::transcript(conn, chat_id)?;
            Ok(ChatResponse::new(chat, members.into_iter().collect(), messages))
        })
        .await?;
    Ok(Json(response))
}

/// POST /api/v1/chat/start
/// The idea's author opens a chat with a requester whose request is pending.
/// A chat reserved earlier for the same request is discarded first.
pub async fn start_chat(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<StartChatRequest>,
) -> Result<(StatusCode, Json<ChatResponse>), ApiError> {
    let caller = user.profile_id();
    let response = state
        .db
        .transaction(move |tx| {
            let request = collaboration::find_pending(tx, body.idea_id, body.requester_id)?
                .ok_or(ApiError::PendingRequestNotFound)?;
            let idea = ideas::find_idea(tx, body.idea_id)?.ok_or(ApiError::IdeaNotFound)?;
            if idea.author_id != caller {
                return Err(ApiError::UserNotAuthorized);
            }

            if let Some(stale) = request.chat_id {
                chats::delete_chat(tx, stale)?;
            }
            let members = vec![caller, body.requester_id];
            let chat = chats::insert_chat(
                tx,
                &NewChat {
                    owner_id: Some(caller),
                    idea_id: Some(idea.id),
                    collaboration_request_id: Some(request.id),
                    project_id: None,
                },
                &members,
            )?;
            collaboration::set_chat(tx, request.id, Some(chat.id))?;
            Ok(ChatResponse::new(chat, members, Vec::new()))
        })
        .await?;

    tracing::info!(
        chat_id = %response.id,
        owner_id = %caller,
        "Collaboration chat reserved"
    );
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/v1/chat/send-message
/// Same path as a WebSocket `send_message`: membership check, persist, broadcast.
pub async fn send_message(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<SendMessageResponse>), ApiError> {
    let message = state
        .chat
        .post(user.profile_id(), body.chat_id, &body.content)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            chat_id: body.chat_id,
            message,
        }),
    ))
}
