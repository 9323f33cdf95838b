use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::controller::{ChatError, ChatRooms};
use super::protocol::{self, ClientCommand};
use crate::realtime::{Event, Frame, Session};
use crate::state::AppState;

pub const CHAT_WS_ROUTE: &str = "/api/v1/chat/ws";

/// Close code sent after a rejected handshake (policy violation).
const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Close code sent once the session has left its registry.
const CLOSE_NORMAL: u16 = 1000;

/// How long the writer may take to flush its close frame before it is aborted.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Handshake parameters. Both are optional here so that a missing value
/// still gets an error frame rather than a bare 400.
#[derive(Debug, Deserialize)]
pub struct ChatHandshake {
    pub token: Option<String>,
    #[serde(rename = "roomId")]
    pub room_id: Option<String>,
}

/// GET /api/v1/chat/ws?token=JWT&roomId=UUID
/// Authenticates the token and room membership before binding a session.
/// On failure, upgrades, sends a JOIN_CHAT_ERROR frame and closes.
pub async fn chat_upgrade(
    State(state): State<AppState>,
    Query(params): Query<ChatHandshake>,
    ws: WebSocketUpgrade,
) -> Response {
    match authenticate(&state, &params).await {
        Ok((user_id, room_id)) => {
            // Join only once the socket exists so the session always has a writer
            ws.on_upgrade(move |socket| async move {
                match state.chat.join(user_id, room_id).await {
                    Ok((session, rx)) => {
                        run_session(socket, state.chat.clone(), session, rx).await
                    }
                    Err(e) => reject(socket, &e.to_string()).await,
                }
            })
        }
        Err(reason) => ws.on_upgrade(move |socket| async move { reject(socket, &reason).await }),
    }
}

async fn authenticate(state: &AppState, params: &ChatHandshake) -> Result<(Uuid, Uuid), String> {
    let token = params.token.as_deref().ok_or("missing token")?;
    let room_id = params
        .room_id
        .as_deref()
        .and_then(|raw| Uuid::parse_str(raw).ok())
        .ok_or("missing or malformed roomId")?;

    let verified = state
        .verifier
        .verify_for(token, "GET", CHAT_WS_ROUTE)
        .map_err(|e| e.to_string())?;
    Ok((verified.recipient_id, room_id))
}

/// Send the handshake error frame, then close.
async fn reject(mut socket: WebSocket, reason: &str) {
    tracing::warn!(reason = reason, "Chat handshake rejected");
    let frame = protocol::error(protocol::JOIN_CHAT_ERROR, "UNAUTHORIZED");
    if let Ok(text) = serde_json::to_string(&frame) {
        let _ = socket.send(Message::Text(text.into())).await;
    }
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: CLOSE_POLICY_VIOLATION,
            reason: "UNAUTHORIZED".into(),
        })))
        .await;
}

/// One task per bound connection: a writer task drains the session channel
/// into the socket while this task reads client commands.
///
/// The connection ends when the client goes away or when the session is
/// retired from under it, e.g. evicted after a failed write.
async fn run_session(
    socket: WebSocket,
    rooms: Arc<ChatRooms>,
    session: Arc<Session>,
    rx: mpsc::Receiver<Frame>,
) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let mut writer_handle = tokio::spawn(writer_task(ws_sender, rx, session.clone()));
    let user_id = session.recipient_id();

    loop {
        let next = tokio::select! {
            _ = session.retired() => {
                tracing::info!(
                    recipient_id = %user_id,
                    session_id = %session.id(),
                    "Chat session retired, closing socket"
                );
                break;
            }
            next = ws_receiver.next() => next,
        };
        match next {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => match protocol::parse_command(text.as_str()) {
                    Ok(ClientCommand::SendMessage { content }) => {
                        send_message(&rooms, &session, &content).await;
                    }
                    Ok(ClientCommand::LeaveChat) => {
                        tracing::debug!(recipient_id = %user_id, "Client left chat");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(
                            recipient_id = %user_id,
                            error = %e,
                            "Malformed chat command"
                        );
                        let event = protocol::error(protocol::SEND_MESSAGE_ERROR, "INVALID_COMMAND");
                        reply(&rooms, &session, event).await;
                    }
                },
                Message::Close(frame) => {
                    tracing::info!(
                        recipient_id = %user_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
                // Pings are answered by the socket; pongs need no handling.
                Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {}
            },
            Some(Err(e)) => {
                tracing::warn!(recipient_id = %user_id, error = %e, "WebSocket receive error");
                break;
            }
            None => {
                tracing::info!(recipient_id = %user_id, "WebSocket stream ended");
                break;
            }
        }
    }

    // Leaving retires the session, which makes the writer send its close frame.
    rooms.leave(&session).await;
    if tokio::time::timeout(CLOSE_GRACE, &mut writer_handle)
        .await
        .is_err()
    {
        writer_handle.abort();
    }
}

async fn send_message(rooms: &ChatRooms, session: &Arc<Session>, content: &str) {
    let Some(room_id) = session.room_id() else {
        return;
    };
    if let Err(e) = rooms.post(session.recipient_id(), room_id, content).await {
        if matches!(e, ChatError::Store(_)) {
            tracing::warn!(room_id = %room_id, error = %e, "Chat message not stored");
        }
        let event = protocol::error(protocol::SEND_MESSAGE_ERROR, e.code());
        reply(rooms, session, event).await;
    }
}

/// Write a frame to this session only.
async fn reply(rooms: &ChatRooms, session: &Arc<Session>, event: Event) {
    rooms
        .dispatcher()
        .write_all(std::slice::from_ref(session), Frame::Event(Arc::new(event)))
        .await;
}

/// Writer task: forwards session frames to the WebSocket sink until the
/// channel closes, a close frame goes out, or the session is retired.
async fn writer_task(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Frame>,
    session: Arc<Session>,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = session.retired() => Frame::Close {
                code: CLOSE_NORMAL,
                reason: "session ended",
            },
            frame = rx.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        let msg = match frame {
            Frame::Event(event) => match serde_json::to_string(event.as_ref()) {
                Ok(text) => Message::Text(text.into()),
                Err(e) => {
                    tracing::warn!(event = event.name, error = %e, "Dropping unserializable frame");
                    continue;
                }
            },
            Frame::Heartbeat => Message::Ping(Vec::new().into()),
            Frame::Close { code, reason } => {
                let _ = ws_sender
                    .send(Message::Close(Some(CloseFrame {
                        code,
                        reason: reason.into(),
                    })))
                    .await;
                break;
            }
        };
        if ws_sender.send(msg).await.is_err() {
            // Broken socket; dropping rx makes the next write fail and evict the session
            break;
        }
    }
}
