//! Integration tests for the chat WebSocket: handshake, fan-out, leave and revocation.

mod common;

use common::{assert_quiet, next_close_code, next_event, start_test_server};
use futures_util::SinkExt;
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use ideaforge_server::db::models::CollaborationStatus;

fn send_command(content: &str) -> Message {
    Message::Text(
        json!({ "event": "send_message", "data": { "content": content } })
            .to_string()
            .into(),
    )
}

#[tokio::test]
async fn test_members_receive_each_others_messages() {
    let server = start_test_server().await;
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let room = server.seed_chat(&[alice, bob]).await;

    let mut alice_ws = server.connect_chat(&server.token_for(alice), room).await;
    let joined = next_event(&mut alice_ws).await;
    assert_eq!(joined["event"], "user_joined");
    assert_eq!(joined["data"]["userProfileId"], alice.to_string());

    let mut bob_ws = server.connect_chat(&server.token_for(bob), room).await;
    // The joiner hears its own join, and so does everyone already in the room
    for ws in [&mut alice_ws, &mut bob_ws] {
        let joined = next_event(ws).await;
        assert_eq!(joined["event"], "user_joined");
        assert_eq!(joined["data"]["userProfileId"], bob.to_string());
        assert_eq!(joined["data"]["chatId"], room.to_string());
    }

    alice_ws.send(send_command("  hello bob  ")).await.unwrap();
    for ws in [&mut alice_ws, &mut bob_ws] {
        let message = next_event(ws).await;
        assert_eq!(message["event"], "new_message");
        assert_eq!(message["data"]["chatId"], room.to_string());
        assert_eq!(message["data"]["message"]["senderId"], alice.to_string());
        assert_eq!(message["data"]["message"]["content"], "hello bob");
    }
    assert_eq!(server.message_count(room).await, 1);
}

#[tokio::test]
async fn test_invalid_token_gets_join_error_and_close() {
    let server = start_test_server().await;
    let room = server.seed_chat(&[Uuid::new_v4()]).await;

    let mut ws = server.connect_chat("not-a-jwt", room).await;
    let frame = next_event(&mut ws).await;
    assert_eq!(frame["event"], "error");
    assert_eq!(frame["data"]["type"], "JOIN_CHAT_ERROR");
    assert_eq!(frame["data"]["message"], "UNAUTHORIZED");
    assert_eq!(next_close_code(&mut ws).await, Some(1008));
}

#[tokio::test]
async fn test_non_member_cannot_join() {
    let server = start_test_server().await;
    let member = Uuid::new_v4();
    let outsider = Uuid::new_v4();
    let room = server.seed_chat(&[member]).await;

    let mut member_ws = server.connect_chat(&server.token_for(member), room).await;
    next_event(&mut member_ws).await;

    let mut ws = server.connect_chat(&server.token_for(outsider), room).await;
    let frame = next_event(&mut ws).await;
    assert_eq!(frame["data"]["type"], "JOIN_CHAT_ERROR");
    assert_eq!(next_close_code(&mut ws).await, Some(1008));

    // The room never hears about the rejected outsider
    assert_quiet(&mut member_ws).await;
}

#[tokio::test]
async fn test_token_scoped_to_another_route_cannot_join() {
    let server = start_test_server().await;
    let member = Uuid::new_v4();
    let room = server.seed_chat(&[member]).await;
    let token = server.restricted_token(member, "GET", "/api/v1/notification/stream");

    let mut ws = server.connect_chat(&token, room).await;
    let frame = next_event(&mut ws).await;
    assert_eq!(frame["data"]["type"], "JOIN_CHAT_ERROR");
}

#[tokio::test]
async fn test_leave_announces_to_remaining_members() {
    let server = start_test_server().await;
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let room = server.seed_chat(&[alice, bob]).await;

    let mut alice_ws = server.connect_chat(&server.token_for(alice), room).await;
    next_event(&mut alice_ws).await;
    let mut bob_ws = server.connect_chat(&server.token_for(bob), room).await;
    next_event(&mut alice_ws).await;
    next_event(&mut bob_ws).await;

    bob_ws
        .send(Message::Text(json!({ "event": "leave_chat" }).to_string().into()))
        .await
        .unwrap();

    let left = next_event(&mut alice_ws).await;
    assert_eq!(left["event"], "user_left");
    assert_eq!(left["data"]["userProfileId"], bob.to_string());
}

#[tokio::test]
async fn test_malformed_and_empty_messages_get_error_frames() {
    let server = start_test_server().await;
    let alice = Uuid::new_v4();
    let room = server.seed_chat(&[alice]).await;

    let mut ws = server.connect_chat(&server.token_for(alice), room).await;
    next_event(&mut ws).await;

    ws.send(Message::Text("{\"event\":\"dance\"}".into())).await.unwrap();
    let frame = next_event(&mut ws).await;
    assert_eq!(frame["data"]["type"], "SEND_MESSAGE_ERROR");
    assert_eq!(frame["data"]["message"], "INVALID_COMMAND");

    ws.send(send_command("   ")).await.unwrap();
    let frame = next_event(&mut ws).await;
    assert_eq!(frame["data"]["type"], "SEND_MESSAGE_ERROR");
    assert_eq!(frame["data"]["message"], "INVALID_CONTENT");

    // The session survives both errors
    ws.send(send_command("still here")).await.unwrap();
    assert_eq!(next_event(&mut ws).await["event"], "new_message");
    assert_eq!(server.message_count(room).await, 1);
}

#[tokio::test]
async fn test_removed_member_is_refused_on_next_send() {
    let server = start_test_server().await;
    let (author, requester) = (Uuid::new_v4(), Uuid::new_v4());
    let idea = server.seed_idea(author, "Community fridge map").await;
    let request = server.seed_request(idea.id, requester).await;
    let decided = server
        .state
        .collaboration
        .decide(author, request, CollaborationStatus::Approved, "welcome")
        .await
        .unwrap();
    let project = decided.project.unwrap().id;
    let room = decided.chat.unwrap().id;

    let mut ws = server.connect_chat(&server.token_for(requester), room).await;
    next_event(&mut ws).await;
    ws.send(send_command("first")).await.unwrap();
    assert_eq!(next_event(&mut ws).await["event"], "new_message");

    let resp = server
        .client
        .delete(server.url(&format!(
            "/api/v1/project/{}/member/{}",
            project, requester
        )))
        .bearer_auth(server.token_for(author))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    ws.send(send_command("second")).await.unwrap();
    let frame = next_event(&mut ws).await;
    assert_eq!(frame["event"], "error");
    assert_eq!(frame["data"]["type"], "SEND_MESSAGE_ERROR");
    assert_eq!(frame["data"]["message"], "USER_NOT_AUTHORIZED");
    assert_eq!(server.message_count(room).await, 1);
}

#[tokio::test]
async fn test_rest_send_reaches_live_sessions() {
    let server = start_test_server().await;
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let room = server.seed_chat(&[alice, bob]).await;

    let mut bob_ws = server.connect_chat(&server.token_for(bob), room).await;
    next_event(&mut bob_ws).await;

    let resp = server
        .client
        .post(server.url("/api/v1/chat/send-message"))
        .bearer_auth(server.token_for(alice))
        .json(&json!({ "chatId": room, "content": "from the web app" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let message = next_event(&mut bob_ws).await;
    assert_eq!(message["event"], "new_message");
    assert_eq!(message["data"]["message"]["content"], "from the web app");

    let chat: serde_json::Value = server
        .client
        .get(server.url(&format!("/api/v1/chat/{}", room)))
        .bearer_auth(server.token_for(bob))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(chat["messages"].as_array().unwrap().len(), 1);
    assert_eq!(chat["members"].as_array().unwrap().len(), 2);

    let outsider = server
        .client
        .get(server.url(&format!("/api/v1/chat/{}", room)))
        .bearer_auth(server.token_for(Uuid::new_v4()))
        .send()
        .await
        .unwrap();
    assert_eq!(outsider.status(), 403);
}

#[tokio::test]
async fn test_disconnected_member_gets_nothing_further() {
    let server = start_test_server().await;
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let room = server.seed_chat(&[alice, bob]).await;

    let mut alice_ws = server.connect_chat(&server.token_for(alice), room).await;
    next_event(&mut alice_ws).await;
    let mut bob_ws = server.connect_chat(&server.token_for(bob), room).await;
    next_event(&mut alice_ws).await;
    next_event(&mut bob_ws).await;

    alice_ws.send(send_command("hi")).await.unwrap();
    assert_eq!(next_event(&mut alice_ws).await["data"]["message"]["content"], "hi");
    assert_eq!(next_event(&mut bob_ws).await["data"]["message"]["content"], "hi");

    bob_ws.close(None).await.unwrap();
    let left = next_event(&mut alice_ws).await;
    assert_eq!(left["event"], "user_left");
    assert_eq!(
        server.state.realtime.chat.registry().snapshot(&bob).len(),
        0
    );

    alice_ws.send(send_command("still there?")).await.unwrap();
    let second = next_event(&mut alice_ws).await;
    assert_eq!(second["data"]["message"]["content"], "still there?");
    assert_eq!(server.message_count(room).await, 2);
}

#[tokio::test]
async fn test_evicted_session_socket_is_closed() {
    let server = start_test_server().await;
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let room = server.seed_chat(&[alice, bob]).await;

    let mut alice_ws = server.connect_chat(&server.token_for(alice), room).await;
    next_event(&mut alice_ws).await;
    let mut bob_ws = server.connect_chat(&server.token_for(bob), room).await;
    next_event(&mut alice_ws).await;
    next_event(&mut bob_ws).await;

    // Same removal a failed or timed-out write performs.
    let registry = server.state.realtime.chat.registry();
    let sessions = registry.snapshot(&bob);
    assert_eq!(sessions.len(), 1);
    assert!(registry.remove(&sessions[0]));

    assert_eq!(next_close_code(&mut bob_ws).await, Some(1000));
    let left = next_event(&mut alice_ws).await;
    assert_eq!(left["event"], "user_left");
    assert_eq!(left["data"]["userProfileId"], bob.to_string());

    alice_ws.send(send_command("alone now")).await.unwrap();
    assert_eq!(next_event(&mut alice_ws).await["data"]["message"]["content"], "alone now");
    assert!(!registry.is_live(&bob));
}

#[tokio::test]
async fn test_chat_list_pages_callers_rooms() {
    let server = start_test_server().await;
    let (alice, bob, carol) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let mut alices = Vec::new();
    for _ in 0..3 {
        alices.push(server.seed_chat(&[alice, bob]).await);
    }
    server.seed_chat(&[bob, carol]).await;

    let list = |user: Uuid, page: u32| {
        server
            .client
            .get(server.url("/api/v1/chat"))
            .query(&[("page", page), ("quantity", 2)])
            .bearer_auth(server.token_for(user))
            .send()
    };

    let first: serde_json::Value = list(alice, 0).await.unwrap().json().await.unwrap();
    assert_eq!(first["total"], 3);
    assert_eq!(first["pages"], 2);
    assert_eq!(first["nextPage"], 1);
    assert_eq!(first["data"].as_array().unwrap().len(), 2);

    let second: serde_json::Value = list(alice, 1).await.unwrap().json().await.unwrap();
    assert!(second["nextPage"].is_null());
    assert_eq!(second["data"].as_array().unwrap().len(), 1);

    let mut seen: Vec<String> = first["data"]
        .as_array()
        .unwrap()
        .iter()
        .chain(second["data"].as_array().unwrap())
        .map(|chat| {
            assert_eq!(chat["members"].as_array().unwrap().len(), 2);
            chat["id"].as_str().unwrap().to_string()
        })
        .collect();
    seen.sort();
    let mut expected: Vec<String> = alices.iter().map(Uuid::to_string).collect();
    expected.sort();
    assert_eq!(seen, expected);

    let bobs: serde_json::Value = list(bob, 0).await.unwrap().json().await.unwrap();
    assert_eq!(bobs["total"], 4);

    let stranger: serde_json::Value = list(Uuid::new_v4(), 0).await.unwrap().json().await.unwrap();
    assert_eq!(stranger["total"], 0);
    assert!(stranger["data"].as_array().unwrap().is_empty());

    let anonymous = server.client.get(server.url("/api/v1/chat")).send().await.unwrap();
    assert_eq!(anonymous.status(), 401);
}
