//! Shared helpers: a real server on a random port plus token and seed helpers.
#![allow(dead_code)]

use futures_util::StreamExt;
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use ideaforge_server::auth::{TokenVerifier, ValidRoute};
use ideaforge_server::db::models::Idea;
use ideaforge_server::db::{chats, collaboration, ideas, Database};
use ideaforge_server::realtime::RealtimeSettings;
use ideaforge_server::state::AppState;

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const FRAME_TIMEOUT: Duration = Duration::from_secs(3);

pub struct TestServer {
    pub base_url: String,
    pub addr: SocketAddr,
    pub state: AppState,
    pub client: reqwest::Client,
    verifier: TokenVerifier,
    _data_dir: TempDir,
}

/// Start the server on a random port with a fresh data directory.
pub async fn start_test_server() -> TestServer {
    let data_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_path = data_dir.path().to_str().unwrap().to_string();

    let db = Database::open(&data_path).expect("Failed to open DB");
    let secret = ideaforge_server::auth::jwt::load_or_generate_jwt_secret(&data_path)
        .expect("Failed to generate JWT secret");

    let settings = RealtimeSettings {
        write_timeout: Duration::from_millis(500),
        ..RealtimeSettings::default()
    };
    let state = AppState::new(db, TokenVerifier::new(&secret), settings);
    let app = ideaforge_server::routes::build_router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestServer {
        base_url: format!("http://{}", addr),
        addr,
        state,
        client: reqwest::Client::new(),
        verifier: TokenVerifier::new(&secret),
        _data_dir: data_dir,
    }
}

impl TestServer {
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn token_for(&self, user: Uuid) -> String {
        self.verifier
            .issue("test-user", user, None, 3600)
            .expect("Failed to issue token")
    }

    pub fn restricted_token(&self, user: Uuid, method: &str, route: &str) -> String {
        self.verifier
            .issue("test-user", user, Some(vec![ValidRoute::new(method, route)]), 3600)
            .expect("Failed to issue token")
    }

    pub async fn seed_idea(&self, author: Uuid, title: &str) -> Idea {
        let title = title.to_string();
        self.db()
            .run(move |conn| ideas::insert_idea(conn, author, &title))
            .await
            .expect("Failed to seed idea")
    }

    pub async fn seed_request(&self, idea_id: Uuid, requester: Uuid) -> Uuid {
        self.db()
            .run(move |conn| {
                collaboration::insert_request(conn, idea_id, requester, "I would like to help")
            })
            .await
            .expect("Failed to seed request")
            .id
    }

    pub async fn seed_chat(&self, members: &[Uuid]) -> Uuid {
        let members = members.to_vec();
        self.db()
            .run(move |conn| {
                chats::insert_chat(
                    conn,
                    &chats::NewChat {
                        owner_id: members.first().copied(),
                        ..chats::NewChat::default()
                    },
                    &members,
                )
            })
            .await
            .expect("Failed to seed chat")
            .id
    }

    pub async fn chat_members(&self, chat_id: Uuid) -> Vec<Uuid> {
        let mut members: Vec<Uuid> = self
            .db()
            .run(move |conn| chats::chat_members(conn, chat_id))
            .await
            .expect("Failed to load members")
            .into_iter()
            .collect();
        members.sort();
        members
    }

    pub async fn message_count(&self, chat_id: Uuid) -> i64 {
        self.db()
            .run(move |conn| chats::message_count(conn, chat_id))
            .await
            .expect("Failed to count messages")
    }

    pub async fn connect_chat(&self, token: &str, room_id: Uuid) -> Ws {
        let url = format!(
            "ws://{}/api/v1/chat/ws?token={}&roomId={}",
            self.addr, token, room_id
        );
        let (ws, _) = tokio_tungstenite::connect_async(&url)
            .await
            .expect("WebSocket handshake failed");
        ws
    }

    /// Open the notification stream with a bearer token.
    pub async fn open_stream(&self, token: &str) -> SseStream {
        let response = self
            .client
            .get(self.url("/api/v1/notification/stream"))
            .bearer_auth(token)
            .send()
            .await
            .expect("Stream request failed");
        SseStream::new(response)
    }
}

/// Next text frame as JSON, skipping pings.
pub async fn next_event(ws: &mut Ws) -> Value {
    loop {
        let msg = tokio::time::timeout(FRAME_TIMEOUT, ws.next())
            .await
            .expect("Timed out waiting for a chat frame")
            .expect("WebSocket stream ended")
            .expect("WebSocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("Unexpected WebSocket message: {:?}", other),
        }
    }
}

/// Next frame that is not text, ping or pong; used to observe server closes.
pub async fn next_close_code(ws: &mut Ws) -> Option<u16> {
    loop {
        let msg = tokio::time::timeout(FRAME_TIMEOUT, ws.next())
            .await
            .expect("Timed out waiting for close")?;
        match msg {
            Ok(Message::Close(frame)) => return frame.map(|f| u16::from(f.code)),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(other) => panic!("Expected close, got {:?}", other),
            Err(_) => return None,
        }
    }
}

/// Assert no text frame arrives within a short window.
pub async fn assert_quiet(ws: &mut Ws) {
    loop {
        match tokio::time::timeout(Duration::from_millis(300), ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => continue,
            Ok(other) => panic!("Expected no frame, got {:?}", other),
        }
    }
}

/// Minimal SSE reader over a streaming response body.
pub struct SseStream {
    pub response: reqwest::Response,
    buffer: String,
}

impl SseStream {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            buffer: String::new(),
        }
    }

    /// Next named event as `(name, data)`. Comment-only blocks are skipped.
    /// Returns `None` once the body ends.
    pub async fn next_event(&mut self) -> Option<(String, Value)> {
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let block: String = self.buffer.drain(..end + 2).collect();
                let mut name = None;
                let mut data = String::new();
                for line in block.lines() {
                    if let Some(value) = line.strip_prefix("event:") {
                        name = Some(value.trim().to_string());
                    } else if let Some(value) = line.strip_prefix("data:") {
                        data.push_str(value.trim_start());
                    }
                }
                match name {
                    Some(name) => return Some((name, serde_json::from_str(&data).unwrap())),
                    None => continue,
                }
            }

            let chunk = tokio::time::timeout(FRAME_TIMEOUT, self.response.chunk())
                .await
                .expect("Timed out waiting for an SSE event")
                .expect("SSE body error")?;
            self.buffer.push_str(std::str::from_utf8(&chunk).unwrap());
        }
    }
}
