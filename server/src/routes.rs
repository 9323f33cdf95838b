use axum::{
    extract::State,
    middleware,
    routing::{delete, get, patch, post},
    Router,
};

use crate::chat::handler::{self as chat_ws, CHAT_WS_ROUTE};
use crate::chat::rest as chat_rest;
use crate::collaboration::rest as collaboration_rest;
use crate::notifications::rest as notification_rest;
use crate::notifications::stream::{self as notification_stream, NOTIFICATION_STREAM_ROUTE};
use crate::projects::rest as project_rest;
use crate::state::AppState;

/// Inject the token verifier into request extensions so the AuthUser extractor can find it.
async fn inject_verifier(
    State(state): State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut().insert(state.verifier.clone());
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    // Long-lived transports authenticate from the handshake query, not the AuthUser extractor
    let realtime_routes = Router::new()
        .route(CHAT_WS_ROUTE, get(chat_ws::chat_upgrade))
        .route(
            NOTIFICATION_STREAM_ROUTE,
            get(notification_stream::stream_notifications),
        );

    // Note: /api/v1/chat/start and /api/v1/chat/send-message are static and win over /{chat_id}.
    let chat_routes = Router::new()
        .route("/api/v1/chat", get(chat_rest::list_chats))
        .route("/api/v1/chat/start", post(chat_rest::start_chat))
        .route("/api/v1/chat/send-message", post(chat_rest::send_message))
        .route("/api/v1/chat/{chat_id}", get(chat_rest::get_chat));

    let notification_routes = Router::new()
        .route(
            "/api/v1/notification",
            get(notification_rest::list_notifications).delete(notification_rest::delete_all),
        )
        .route(
            "/api/v1/notification/unread-count",
            get(notification_rest::unread_count),
        )
        .route("/api/v1/notification/read", patch(notification_rest::mark_read));

    let collaboration_routes = Router::new()
        .route(
            "/api/v1/collaboration-request",
            post(collaboration_rest::create_request),
        )
        .route(
            "/api/v1/collaboration-requests",
            get(collaboration_rest::get_request),
        )
        .route(
            "/api/v1/collaboration-approval",
            patch(collaboration_rest::decide_request),
        );

    let project_routes = Router::new().route(
        "/api/v1/project/{project_id}/member/{member_id}",
        delete(project_rest::remove_member),
    );

    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(realtime_routes)
        .merge(chat_routes)
        .merge(notification_routes)
        .merge(collaboration_routes)
        .merge(project_routes)
        .merge(health)
        .layer(middleware::from_fn_with_state(state.clone(), inject_verifier))
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> &'static str {
    "ok"
}
