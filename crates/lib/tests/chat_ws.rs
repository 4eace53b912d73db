//! Integration test: the chat widget over the gateway WebSocket, backed by a scripted adapter.

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use veth::chat::{ChatAdapter, ScriptedAdapter, APOLOGY_MESSAGE, ERROR_NOTICE};
use veth::config::Config;
use veth::copy::CopyWriter;
use veth::gateway::{self, GatewayState};

type Ws = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn start(adapter: Arc<dyn ChatAdapter>) -> String {
    let state = GatewayState::new(Config::default(), adapter, CopyWriter::new(None, "chat", "copy"));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, gateway::router(state)).await;
    });
    format!("ws://{}/ws", addr)
}

async fn next_json(ws: &mut Ws) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("frame within 5s")
            .expect("socket open")
            .expect("frame");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("json frame");
        }
    }
}

async fn request(ws: &mut Ws, id: &str, method: &str, params: serde_json::Value) {
    let req = serde_json::json!({ "type": "req", "id": id, "method": method, "params": params });
    ws.send(Message::Text(req.to_string())).await.expect("send");
}

/// Read frames until `event` arrives; returns everything read, in order.
async fn read_until_event(ws: &mut Ws, event: &str) -> Vec<serde_json::Value> {
    let mut frames = Vec::new();
    loop {
        let frame = next_json(ws).await;
        let done = frame["type"] == "event" && frame["event"] == event;
        frames.push(frame);
        if done {
            return frames;
        }
    }
}

fn response<'a>(frames: &'a [serde_json::Value], id: &str) -> &'a serde_json::Value {
    frames
        .iter()
        .find(|f| f["type"] == "res" && f["id"] == id)
        .expect("response frame")
}

#[tokio::test]
async fn connection_opens_with_greeting_snapshot() {
    let url = start(Arc::new(ScriptedAdapter::new(["hi"]))).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.expect("connect");

    let hello = next_json(&mut ws).await;
    assert_eq!(hello["event"], "chat.snapshot");
    let turns = hello["payload"]["turns"].as_array().unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0]["role"], "model");
    assert_eq!(hello["payload"]["phase"], "idle");
    assert_eq!(hello["payload"]["open"], true);
}

#[tokio::test]
async fn send_streams_fragments_then_completes() {
    let url = start(Arc::new(ScriptedAdapter::new(["We build ", "platforms."]))).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.expect("connect");
    next_json(&mut ws).await;

    request(&mut ws, "1", "chat.send", serde_json::json!({ "message": "What do you do?" })).await;
    let frames = read_until_event(&mut ws, "chat.completed").await;

    assert_eq!(response(&frames, "1")["payload"]["accepted"], true);
    let events: Vec<&str> = frames
        .iter()
        .filter(|f| f["type"] == "event")
        .map(|f| f["event"].as_str().unwrap_or(""))
        .collect();
    assert_eq!(
        events,
        vec![
            "chat.turn",
            "chat.placeholder",
            "chat.fragment",
            "chat.fragment",
            "chat.completed"
        ]
    );
    let last = frames.last().unwrap();
    assert_eq!(last["payload"]["text"], "We build platforms.");

    request(&mut ws, "2", "chat.history", serde_json::Value::Null).await;
    let res = next_json(&mut ws).await;
    assert_eq!(res["id"], "2");
    let turns = res["payload"]["turns"].as_array().unwrap();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[1]["text"], "What do you do?");
    assert_eq!(turns[2]["text"], "We build platforms.");
}

#[tokio::test]
async fn second_send_while_streaming_is_rejected() {
    let adapter = Arc::new(
        ScriptedAdapter::new(["slow ", "reply"]).with_delay(Duration::from_millis(50)),
    );
    let url = start(adapter.clone()).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.expect("connect");
    next_json(&mut ws).await;

    request(&mut ws, "1", "chat.send", serde_json::json!({ "message": "first" })).await;
    request(&mut ws, "2", "chat.send", serde_json::json!({ "message": "second" })).await;
    request(&mut ws, "3", "chat.send", serde_json::json!({ "message": "   " })).await;
    let frames = read_until_event(&mut ws, "chat.completed").await;

    assert_eq!(response(&frames, "1")["ok"], true);
    assert_eq!(response(&frames, "2")["ok"], false);
    assert_eq!(response(&frames, "2")["error"], "reply in progress");
    assert_eq!(response(&frames, "3")["error"], "empty message");
    assert_eq!(adapter.calls(), 1);
}

#[tokio::test]
async fn failed_reply_sends_apology_and_ack_clears_it() {
    let adapter = Arc::new(ScriptedAdapter::new(["Hel"]).fail_with("connection reset"));
    let url = start(adapter).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.expect("connect");
    next_json(&mut ws).await;

    request(&mut ws, "1", "chat.send", serde_json::json!({ "message": "hi" })).await;
    let frames = read_until_event(&mut ws, "chat.failed").await;
    let failed = frames.last().unwrap();
    assert_eq!(failed["payload"]["text"], APOLOGY_MESSAGE);
    assert_eq!(failed["payload"]["notice"], ERROR_NOTICE);

    request(&mut ws, "2", "chat.ack", serde_json::Value::Null).await;
    let res = next_json(&mut ws).await;
    assert_eq!(res["id"], "2");
    assert_eq!(res["payload"]["phase"], "idle");
}

#[tokio::test]
async fn each_connection_has_its_own_conversation() {
    let url = start(Arc::new(ScriptedAdapter::new(["ok"]))).await;
    let (mut first, _) = tokio_tungstenite::connect_async(&url).await.expect("connect");
    next_json(&mut first).await;
    request(&mut first, "1", "chat.send", serde_json::json!({ "message": "hello" })).await;
    read_until_event(&mut first, "chat.completed").await;

    let (mut second, _) = tokio_tungstenite::connect_async(&url).await.expect("connect");
    let hello = next_json(&mut second).await;
    assert_eq!(hello["payload"]["turns"].as_array().unwrap().len(), 1);
}

/// Every frame that arrives within `window`.
async fn drain_for(ws: &mut Ws, window: Duration) -> Vec<serde_json::Value> {
    let deadline = tokio::time::Instant::now() + window;
    let mut frames = Vec::new();
    while let Ok(Some(Ok(msg))) = tokio::time::timeout_at(deadline, ws.next()).await {
        if let Message::Text(text) = msg {
            frames.push(serde_json::from_str(&text).expect("json frame"));
        }
    }
    frames
}

#[tokio::test]
async fn dismissed_widget_gets_no_reply_frames_but_history_fills() {
    let adapter = Arc::new(
        ScriptedAdapter::new(["quiet ", "reply"]).with_delay(Duration::from_millis(50)),
    );
    let url = start(adapter).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.expect("connect");
    next_json(&mut ws).await;

    request(&mut ws, "1", "chat.send", serde_json::json!({ "message": "hello" })).await;
    request(&mut ws, "2", "chat.dismiss", serde_json::Value::Null).await;
    let frames = drain_for(&mut ws, Duration::from_millis(400)).await;

    assert_eq!(response(&frames, "2")["payload"]["open"], false);
    assert!(!frames.iter().any(|f| {
        f["event"] == "chat.fragment" || f["event"] == "chat.completed"
    }));

    request(&mut ws, "3", "chat.history", serde_json::Value::Null).await;
    let res = next_json(&mut ws).await;
    assert_eq!(res["id"], "3");
    assert_eq!(res["payload"]["open"], false);
    assert_eq!(res["payload"]["phase"], "idle");
    let turns = res["payload"]["turns"].as_array().unwrap();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[2]["text"], "quiet reply");

    request(&mut ws, "4", "chat.open", serde_json::Value::Null).await;
    let res = next_json(&mut ws).await;
    assert_eq!(res["id"], "4");
    assert_eq!(res["payload"]["open"], true);
}
