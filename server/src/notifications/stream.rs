//! Server-sent event stream of a user's notifications.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderName},
    response::{
        sse::{Event as SseEvent, Sse},
        IntoResponse, Response,
    },
};
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use tokio::sync::mpsc;

use crate::realtime::{Event, Frame, Registration, Session};
use crate::state::AppState;

pub const NOTIFICATION_STREAM_ROUTE: &str = "/api/v1/notification/stream";

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Fallback for EventSource clients, which cannot set headers.
    pub token: Option<String>,
}

fn to_sse(event: &Event) -> SseEvent {
    SseEvent::default()
        .event(event.name)
        .data(event.data.to_string())
}

fn error_event(kind: &str, message: &str) -> SseEvent {
    SseEvent::default()
        .event("error")
        .data(json!({ "type": kind, "message": message }).to_string())
}

/// GET /api/v1/notification/stream
/// Token from `Authorization: Bearer` or `?token=`. A failed handshake gets a
/// single `error` event and the stream ends.
pub async fn stream_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> Response {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
        .or(query.token);

    let verified = match token {
        Some(token) => state
            .verifier
            .verify_for(&token, "GET", NOTIFICATION_STREAM_ROUTE)
            .map_err(|e| e.to_string()),
        None => Err("missing token".to_string()),
    };

    let verified = match verified {
        Ok(verified) => verified,
        Err(reason) => {
            tracing::warn!(reason = %reason, "Notification stream rejected");
            let rejected = stream::once(async move {
                Ok::<_, Infallible>(error_event("UNAUTHORIZED", &reason))
            });
            return sse_response(rejected);
        }
    };

    let user_id = verified.recipient_id;
    let (session, rx) =
        Session::channel(user_id, None, state.realtime.settings().session_buffer);
    let registration = state.realtime.notifications.registry().register(session);
    tracing::info!(
        recipient_id = %user_id,
        session_id = %registration.session().id(),
        "Notification stream connected"
    );

    let connected = SseEvent::default()
        .event("connected")
        .data(json!({ "userId": user_id }).to_string());
    let events = stream::once(async move { Ok::<_, Infallible>(connected) })
        .chain(frames(rx, registration));
    sse_response(events)
}

/// Turn session frames into SSE events. The stream owns the registration,
/// so dropping the response body (client gone) unregisters the session.
/// It ends after a close frame, or once the session is retired elsewhere
/// (evicted after a failed write).
fn frames(
    rx: mpsc::Receiver<Frame>,
    registration: Registration,
) -> impl Stream<Item = Result<SseEvent, Infallible>> {
    stream::unfold(
        Some((rx, registration)),
        |state| async move {
            let (mut rx, registration) = state?;
            let next = tokio::select! {
                biased;
                _ = registration.session().retired() => None,
                frame = rx.recv() => Some(frame),
            };
            let Some(frame) = next else {
                tracing::info!(
                    recipient_id = %registration.session().recipient_id(),
                    "Notification stream retired"
                );
                return Some((Ok(error_event("SESSION_ENDED", "session evicted")), None));
            };
            let frame = frame?;
            let (event, next) = match frame {
                Frame::Event(event) => (to_sse(&event), Some((rx, registration))),
                Frame::Heartbeat => (
                    SseEvent::default().comment("heartbeat"),
                    Some((rx, registration)),
                ),
                Frame::Close { reason, .. } => (error_event("SHUTDOWN", reason), None),
            };
            Some((Ok(event), next))
        },
    )
}

fn sse_response<S>(events: S) -> Response
where
    S: Stream<Item = Result<SseEvent, Infallible>> + Send + 'static,
{
    (
        [
            (header::CONNECTION, "keep-alive"),
            (X_ACCEL_BUFFERING, "no"),
        ],
        Sse::new(events),
    )
        .into_response()
}
