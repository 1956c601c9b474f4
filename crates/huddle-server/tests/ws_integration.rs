//! End-to-end tests over real WebSocket connections.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use huddle_auth::StaticTokenVerifier;
use huddle_core::{Identity, UserId};
use huddle_server::{start, ServerConfig};
use huddle_store::{Database, MessageRepo};

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Boot a test server with known tokens and return the WS URL + repo.
async fn boot_server() -> (String, Arc<MessageRepo>) {
    let repo = Arc::new(MessageRepo::new(Database::in_memory().unwrap()));
    let verifier = Arc::new(
        StaticTokenVerifier::new()
            .insert("tok-u1", Identity::new(UserId::from_raw("u1"), "ada"))
            .insert("tok-u2", Identity::new(UserId::from_raw("u2"), "grace")),
    );

    let config = ServerConfig {
        port: 0, // auto-assign
        ..Default::default()
    };
    let handle = start(config, repo.clone(), verifier).await.unwrap();
    let ws_url = format!("ws://127.0.0.1:{}/ws", handle.port);
    (ws_url, repo)
}

async fn connect(url: &str, token: &str) -> WsStream {
    let (ws, _) = connect_async(format!("{url}?token={token}")).await.unwrap();
    ws
}

/// Read the next text message as JSON.
async fn read_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream closed")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Connect with a valid token and consume the ready frame.
async fn connect_ready(url: &str, token: &str) -> WsStream {
    let mut ws = connect(url, token).await;
    let ready = read_json(&mut ws).await;
    assert_eq!(ready["type"], "ready");
    ws
}

async fn send_frame(ws: &mut WsStream, frame: Value) {
    ws.send(Message::text(frame.to_string())).await.unwrap();
}

#[tokio::test]
async fn ready_frame_carries_identity() {
    let (url, _repo) = boot_server().await;
    let mut ws = connect(&url, "tok-u1").await;

    let ready = read_json(&mut ws).await;
    assert_eq!(ready["type"], "ready");
    assert_eq!(ready["user_id"], "u1");
    assert_eq!(ready["username"], "ada");
}

#[tokio::test]
async fn direct_message_is_persisted_then_delivered() {
    let (url, repo) = boot_server().await;
    let mut receiver = connect_ready(&url, "tok-u1").await;
    let mut sender = connect_ready(&url, "tok-u2").await;

    send_frame(
        &mut sender,
        json!({"type": "message.send", "recipient": "u1", "payload": "hi"}),
    )
    .await;

    let msg = read_json(&mut receiver).await;
    assert_eq!(msg["type"], "message");
    assert_eq!(msg["sender"], "u2");
    assert_eq!(msg["sender_name"], "grace");
    assert_eq!(msg["payload"], "hi");
    assert!(msg["created_at"].is_string());
    assert_eq!(repo.count().unwrap(), 1);
}

#[tokio::test]
async fn offline_recipient_message_is_stored_without_error() {
    let (url, repo) = boot_server().await;
    let mut sender = connect_ready(&url, "tok-u2").await;

    send_frame(
        &mut sender,
        json!({"type": "message.send", "recipient": "u1", "payload": "see you later"}),
    )
    .await;

    // No error frame comes back
    let nothing = timeout(Duration::from_millis(300), sender.next()).await;
    assert!(nothing.is_err(), "expected silence, got {nothing:?}");

    let pending = repo.undelivered_for(&UserId::from_raw("u1")).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].payload, "see you later");
}

#[tokio::test]
async fn reconnect_receives_offline_backlog() {
    let (url, repo) = boot_server().await;
    let mut sender = connect_ready(&url, "tok-u2").await;

    send_frame(
        &mut sender,
        json!({"type": "message.send", "recipient": "u1", "payload": "while you were out"}),
    )
    .await;

    // Wait for persistence before the recipient shows up
    timeout(TIMEOUT, async {
        while repo.count().unwrap() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let mut receiver = connect_ready(&url, "tok-u1").await;
    let msg = read_json(&mut receiver).await;
    assert_eq!(msg["payload"], "while you were out");

    // Backlog is marked delivered
    timeout(TIMEOUT, async {
        while !repo.undelivered_for(&UserId::from_raw("u1")).unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn fan_out_to_both_devices() {
    let (url, _repo) = boot_server().await;
    let mut device_a = connect_ready(&url, "tok-u1").await;
    let mut device_b = connect_ready(&url, "tok-u1").await;
    let mut sender = connect_ready(&url, "tok-u2").await;

    send_frame(
        &mut sender,
        json!({"type": "message.send", "recipient": "u1", "payload": "both of you"}),
    )
    .await;

    assert_eq!(read_json(&mut device_a).await["payload"], "both of you");
    assert_eq!(read_json(&mut device_b).await["payload"], "both of you");
}

#[tokio::test]
async fn disconnected_device_does_not_affect_the_other() {
    let (url, _repo) = boot_server().await;
    let device_a = connect_ready(&url, "tok-u1").await;
    let mut device_b = connect_ready(&url, "tok-u1").await;
    let mut sender = connect_ready(&url, "tok-u2").await;

    drop(device_a);
    // Let the server notice the disconnect
    tokio::time::sleep(Duration::from_millis(100)).await;

    send_frame(
        &mut sender,
        json!({"type": "message.send", "recipient": "u1", "payload": "still here"}),
    )
    .await;

    assert_eq!(read_json(&mut device_b).await["payload"], "still here");
}

#[tokio::test]
async fn invalid_credential_gets_one_rejection_then_close() {
    let (url, _repo) = boot_server().await;
    let mut ws = connect(&url, "tok-bogus").await;

    let rejection = read_json(&mut ws).await;
    assert_eq!(rejection["type"], "error");
    assert_eq!(rejection["kind"], "invalid_credential");

    // Connection closes; no further frames
    let end = timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                None | Some(Ok(Message::Close(_))) => break,
                Some(Ok(Message::Text(other))) => panic!("unexpected frame: {other}"),
                Some(Ok(_)) => continue,
                Some(Err(_)) => break,
            }
        }
    })
    .await;
    assert!(end.is_ok(), "connection did not close");
}

#[tokio::test]
async fn missing_credential_is_rejected_before_verification() {
    let (url, _repo) = boot_server().await;
    let (mut ws, _) = connect_async(url).await.unwrap();

    let rejection = read_json(&mut ws).await;
    assert_eq!(rejection["type"], "error");
    assert_eq!(rejection["kind"], "missing_credential");
}

#[tokio::test]
async fn rejected_connection_never_appears_in_presence() {
    let (url, _repo) = boot_server().await;
    let mut ws = connect(&url, "tok-bogus").await;
    let _ = read_json(&mut ws).await;

    let health_url = url.replace("ws://", "http://").replace("/ws", "/health");
    let body: Value = reqwest::get(&health_url).await.unwrap().json().await.unwrap();
    assert_eq!(body["connections"], 0);
    assert_eq!(body["identities"], 0);
}

#[tokio::test]
async fn malformed_frame_keeps_connection_open() {
    let (url, _repo) = boot_server().await;
    let mut ws = connect_ready(&url, "tok-u2").await;

    ws.send(Message::text("not valid json")).await.unwrap();
    let err = read_json(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["kind"], "malformed_message");

    // Connection is still usable for valid traffic
    send_frame(
        &mut ws,
        json!({"type": "message.send", "recipient": "u1", "payload": "still works"}),
    )
    .await;
    let nothing = timeout(Duration::from_millis(300), ws.next()).await;
    assert!(nothing.is_err(), "expected no error frame, got {nothing:?}");
}

#[tokio::test]
async fn oversize_payload_is_rejected_on_the_error_channel() {
    let (url, repo) = boot_server().await;
    let mut ws = connect_ready(&url, "tok-u2").await;

    let payload = "x".repeat(128 * 1024);
    send_frame(
        &mut ws,
        json!({"type": "message.send", "recipient": "u1", "payload": payload}),
    )
    .await;

    let err = read_json(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["kind"], "payload_too_large");
    assert_eq!(repo.count().unwrap(), 0);
}

#[tokio::test]
async fn room_send_reaches_joined_members() {
    let (url, _repo) = boot_server().await;
    let mut member = connect_ready(&url, "tok-u1").await;
    let mut sender = connect_ready(&url, "tok-u2").await;

    send_frame(&mut member, json!({"type": "room.join", "room": "room_general"})).await;
    send_frame(&mut sender, json!({"type": "room.join", "room": "room_general"})).await;
    // Joins are fire-and-forget; give them a beat to land
    tokio::time::sleep(Duration::from_millis(100)).await;

    send_frame(
        &mut sender,
        json!({"type": "room.send", "room": "room_general", "payload": "hello room"}),
    )
    .await;

    let msg = read_json(&mut member).await;
    assert_eq!(msg["type"], "message");
    assert_eq!(msg["room"], "room_general");
    assert_eq!(msg["payload"], "hello room");

    // The originating connection does not hear its own message
    let nothing = timeout(Duration::from_millis(300), sender.next()).await;
    assert!(nothing.is_err());
}

#[tokio::test]
async fn messages_arrive_in_send_order() {
    let (url, _repo) = boot_server().await;
    let mut receiver = connect_ready(&url, "tok-u1").await;
    let mut sender = connect_ready(&url, "tok-u2").await;

    for i in 0..10 {
        send_frame(
            &mut sender,
            json!({"type": "message.send", "recipient": "u1", "payload": format!("m{i}")}),
        )
        .await;
    }

    for i in 0..10 {
        let msg = read_json(&mut receiver).await;
        assert_eq!(msg["payload"], format!("m{i}"), "out of order at {i}");
    }
}

#[tokio::test]
async fn health_reports_live_connections() {
    let (url, _repo) = boot_server().await;
    let _ws = connect_ready(&url, "tok-u1").await;

    let health_url = url.replace("ws://", "http://").replace("/ws", "/health");
    let body: Value = reqwest::get(&health_url).await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["connections"], 1);
    assert_eq!(body["identities"], 1);
}
