//! REST endpoints for a user's stored notifications.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::models::Notification;
use crate::db::notifications;
use crate::error::ApiError;
use crate::state::AppState;

/// Default page size for the notification list.
const DEFAULT_QUANTITY: u32 = 10;
/// Maximum page size for the notification list.
const MAX_QUANTITY: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub quantity: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    pub total: i64,
    pub pages: i64,
    pub page: u32,
    pub next_page: Option<u32>,
    pub unread_count: i64,
    pub data: Vec<Notification>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub count: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadNotificationsRequest {
    #[serde(default)]
    pub notification_ids: Option<Vec<Uuid>>,
}

/// GET /api/v1/notification?page=&quantity=
/// Newest first, with the caller's unread count.
pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<NotificationPage>, ApiError> {
    let page = query.page.unwrap_or(0);
    let quantity = query
        .quantity
        .unwrap_or(DEFAULT_QUANTITY)
        .clamp(1, MAX_QUANTITY);
    let user_id = user.profile_id();

    let (data, total, unread_count) = state
        .db
        .run(move |conn| {
            let (data, total) = notifications::list_page(conn, user_id, page, quantity)?;
            let unread = notifications::unread_count(conn, user_id)?;
            Ok::<_, ApiError>((data, total, unread))
        })
        .await?;

    let pages = (total + i64::from(quantity) - 1) / i64::from(quantity);
    let next_page = page.saturating_add(1);
    Ok(Json(NotificationPage {
        total,
        pages,
        page,
        next_page: (i64::from(next_page) < pages).then_some(next_page),
        unread_count,
        data,
    }))
}

/// GET /api/v1/notification/unread-count
pub async fn unread_count(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<UnreadCount>, ApiError> {
    let user_id = user.profile_id();
    let count = state
        .db
        .run(move |conn| notifications::unread_count(conn, user_id))
        .await?;
    Ok(Json(UnreadCount { count }))
}

/// PATCH /api/v1/notification/read
/// Marks the listed notifications read, or all unread ones when no ids are given.
pub async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<ReadNotificationsRequest>,
) -> Result<StatusCode, ApiError> {
    let user_id = user.profile_id();
    let ids = body.notification_ids.unwrap_or_default();
    let updated = state
        .db
        .run(move |conn| notifications::mark_read(conn, user_id, &ids))
        .await?;
    tracing::debug!(recipient_id = %user_id, updated = updated, "Notifications marked read");
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/notification
pub async fn delete_all(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<StatusCode, ApiError> {
    let user_id = user.profile_id();
    state
        .db
        .run(move |conn| notifications::delete_all(conn, user_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
