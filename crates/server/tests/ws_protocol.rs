//! End-to-end tests of the status socket against the real binary.

mod common;

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use common::TestServer;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(server: &TestServer) -> Socket {
    let (socket, _) = connect_async(server.ws_url())
        .await
        .expect("Failed to connect");
    socket
}

/// Next text frame as JSON.
async fn next_json(socket: &mut Socket) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("No message within 5s")
            .expect("Socket closed")
            .expect("Receive error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).expect("Invalid JSON");
        }
    }
}

async fn send(socket: &mut Socket, text: &str) {
    socket
        .send(Message::text(text.to_string()))
        .await
        .expect("Failed to send");
}

fn is_snapshot(value: &Value) -> bool {
    value.get("error").is_none()
        && ["SmartMatch", "Parascript", "RoyalMail"]
            .iter()
            .all(|p| value.get(p).is_some())
}

#[tokio::test]
async fn test_snapshot_pushed_on_connect() {
    let server = TestServer::start().await;
    let mut socket = connect(&server).await;

    let first = next_json(&mut socket).await;
    assert!(is_snapshot(&first), "{first}");
    assert_eq!(first["RoyalMail"]["status"], "Ready");

    server.stop().await;
}

#[tokio::test]
async fn test_bad_messages_get_error_replies_and_connection_survives() {
    let server = TestServer::start().await;
    let mut socket = connect(&server).await;
    next_json(&mut socket).await;

    send(&mut socket, r#"{"provider": "RoyalMail", "action": "explode"}"#).await;
    let reply = next_json(&mut socket).await;
    assert_eq!(reply["error"], "unknown action: explode");

    send(&mut socket, r#"{"provider": "Here", "action": "start"}"#).await;
    let reply = next_json(&mut socket).await;
    assert_eq!(reply["error"], "unknown provider: Here");

    send(&mut socket, "not json at all").await;
    let reply = next_json(&mut socket).await;
    assert!(reply["error"].as_str().unwrap().starts_with("malformed command"));

    // SmartMatch has no config section
    send(&mut socket, r#"{"provider": "SmartMatch", "action": "start"}"#).await;
    let reply = next_json(&mut socket).await;
    assert_eq!(reply["error"], "provider SmartMatch is disabled");

    // Same connection still serves valid commands
    send(&mut socket, r#"{"provider": "RoyalMail", "action": "status"}"#).await;
    let reply = next_json(&mut socket).await;
    assert!(is_snapshot(&reply), "{reply}");

    server.stop().await;
}

#[tokio::test]
async fn test_status_query_allowed_for_disabled_provider() {
    let server = TestServer::start().await;
    let mut socket = connect(&server).await;
    next_json(&mut socket).await;

    send(&mut socket, r#"{"provider": "Parascript", "action": "status"}"#).await;
    let reply = next_json(&mut socket).await;
    assert!(is_snapshot(&reply), "{reply}");
    assert_eq!(reply["Parascript"]["status"], "Ready");

    server.stop().await;
}

#[tokio::test]
async fn test_start_with_nothing_to_build_replies_with_snapshot() {
    let server = TestServer::start().await;
    let mut socket = connect(&server).await;
    next_json(&mut socket).await;

    send(&mut socket, r#"{"provider": "RoyalMail", "action": "start"}"#).await;
    let reply = next_json(&mut socket).await;
    assert!(is_snapshot(&reply), "{reply}");

    // The attempt finds no ready bundle and settles back in Ready
    let mut settled = false;
    for _ in 0..10 {
        let pushed = next_json(&mut socket).await;
        if pushed["RoyalMail"]["status"] == "Ready" {
            settled = true;
            break;
        }
    }
    assert!(settled);

    server.stop().await;
}

#[tokio::test]
async fn test_every_connection_receives_changes() {
    let server = TestServer::start().await;
    let mut watcher = connect(&server).await;
    let mut commander = connect(&server).await;
    next_json(&mut watcher).await;
    next_json(&mut commander).await;

    send(&mut commander, r#"{"provider": "RoyalMail", "action": "start"}"#).await;

    // The watcher sent nothing but still sees the state change
    let pushed = next_json(&mut watcher).await;
    assert!(is_snapshot(&pushed), "{pushed}");

    server.stop().await;
}

#[tokio::test]
async fn test_cancel_when_idle_is_harmless() {
    let server = TestServer::start().await;
    let mut socket = connect(&server).await;
    next_json(&mut socket).await;

    send(&mut socket, r#"{"provider": "RoyalMail", "action": "CANCEL"}"#).await;
    let reply = next_json(&mut socket).await;
    assert!(is_snapshot(&reply), "{reply}");
    assert_eq!(reply["RoyalMail"]["status"], "Ready");

    server.stop().await;
}
