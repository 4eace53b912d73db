//! Gateway HTTP + WebSocket server (single port).
//!
//! Every WebSocket connection is one chat widget: it owns its own [`ChatController`], created on
//! connect and dropped on disconnect. Nothing is shared between connections except the adapter.

use crate::chat::{ChatAdapter, ChatController, ChatEvent, GeminiChatAdapter, Reject};
use crate::config::{self, Config};
use crate::copy::{CopyRequest, CopyText, CopyWriter};
use crate::gateway::protocol::{ChatSendParams, WsEvent, WsRequest, WsResponse};
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::mpsc;

const PROTOCOL_VERSION: u32 = 1;

const SHUTDOWN_EVENT_JSON: &str = r#"{"type":"event","event":"shutdown","payload":{}}"#;

/// Shared state for the gateway (config, reply adapter, copy writer).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// Source of chat replies for every connection.
    pub adapter: Arc<dyn ChatAdapter>,
    pub copy_writer: CopyWriter,
    /// Broadcasts events to connected clients (e.g. shutdown). Subscribers receive JSON event frames.
    pub event_tx: broadcast::Sender<String>,
}

impl GatewayState {
    pub fn new(config: Config, adapter: Arc<dyn ChatAdapter>, copy_writer: CopyWriter) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            config: Arc::new(config),
            adapter,
            copy_writer,
            event_tx,
        }
    }

    /// State backed by Gemini for both chat and copy, as configured.
    pub fn from_config(config: Config) -> Self {
        let adapter = Arc::new(GeminiChatAdapter::from_config(&config));
        let copy_writer = CopyWriter::from_config(&config);
        Self::new(config, adapter, copy_writer)
    }

    /// Fresh widget for one connection.
    fn new_controller(&self) -> ChatController {
        ChatController::new(self.adapter.clone(), config::resolve_greeting(&self.config))
            .with_history_limit(self.config.chat.history_limit)
            .with_fragment_timeout(config::resolve_request_timeout(&self.config))
    }
}

/// HTTP routes: `GET /` health, `POST /api/copy`, `GET /ws` chat widget.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/api/copy", post(copy_http))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// Run the gateway server; binds to config.gateway.bind:config.gateway.port.
/// Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let state = GatewayState::from_config(config);
    if config::resolve_api_key(&state.config).is_none() {
        log::warn!("no gemini api key configured; chat replies will be the offline message");
    }
    let event_tx = state.event_tx.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(event_tx))
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Broadcasts a shutdown event to WebSocket clients so their loops end.
async fn shutdown_signal(event_tx: broadcast::Sender<String>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, broadcasting shutdown and draining connections");

    let _ = event_tx.send(SHUTDOWN_EVENT_JSON.to_string());
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "protocol": PROTOCOL_VERSION,
        "port": state.config.gateway.port,
    }))
}

/// POST /api/copy: body is a tagged [`CopyRequest`]; always answers with text (generated or fallback).
async fn copy_http(
    State(state): State<GatewayState>,
    Json(request): Json<CopyRequest>,
) -> Json<CopyText> {
    Json(state.copy_writer.generate(&request).await)
}

/// GET /ws upgrades to WebSocket and opens a chat widget for the connection.
async fn ws_handler(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Event frame for a controller update.
fn chat_event_frame(event: &ChatEvent) -> String {
    let name = match event {
        ChatEvent::UserTurn { .. } => "chat.turn",
        ChatEvent::PlaceholderOpened { .. } => "chat.placeholder",
        ChatEvent::Fragment { .. } => "chat.fragment",
        ChatEvent::Completed { .. } => "chat.completed",
        ChatEvent::Failed { .. } => "chat.failed",
    };
    WsEvent::new(name, serde_json::to_value(event).unwrap_or(json!({}))).to_json()
}

async fn handle_socket(mut socket: WebSocket, state: GatewayState) {
    let conn_id = uuid::Uuid::new_v4();
    let controller = Arc::new(state.new_controller());
    let mut event_rx = state.event_tx.subscribe();
    // Frames produced by reply tasks; the socket loop is the only writer.
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<String>();
    log::debug!("ws {}: chat widget opened", conn_id);

    let snapshot = controller.snapshot().await;
    let hello = WsEvent::new(
        "chat.snapshot",
        serde_json::to_value(&snapshot).unwrap_or(json!({})),
    );
    if socket.send(Message::Text(hello.to_json())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            biased;

            event = event_rx.recv() => {
                match event {
                    Ok(text) => {
                        let is_shutdown = text == SHUTDOWN_EVENT_JSON;
                        let _ = socket.send(Message::Text(text)).await;
                        if is_shutdown {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::debug!("ws client lagged {} broadcast messages", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            Some(frame) = frame_rx.recv() => {
                if socket.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                let Message::Text(text) = msg else { continue };
                let Ok(req): Result<WsRequest, _> = serde_json::from_str(&text) else { continue };

                if req.typ != "req" {
                    continue;
                }

                let res = match req.method.as_str() {
                    "health" => WsResponse::ok(
                        &req.id,
                        json!({ "runtime": "running", "protocol": PROTOCOL_VERSION }),
                    ),
                    "chat.history" => {
                        let snapshot = controller.snapshot().await;
                        WsResponse::ok(&req.id, serde_json::to_value(&snapshot).unwrap_or(json!({})))
                    }
                    "chat.open" => {
                        controller.open().await;
                        WsResponse::ok(&req.id, json!({ "open": true }))
                    }
                    "chat.dismiss" => {
                        controller.dismiss().await;
                        WsResponse::ok(&req.id, json!({ "open": false }))
                    }
                    "chat.ack" => {
                        controller.acknowledge_error().await;
                        WsResponse::ok(&req.id, json!({ "phase": controller.phase().await }))
                    }
                    "chat.send" => {
                        match serde_json::from_value::<ChatSendParams>(req.params.clone()) {
                            Err(_) => WsResponse::err(&req.id, "invalid chat.send params"),
                            Ok(params) => match controller.begin(&params.message).await {
                                Err(Reject::Empty) => WsResponse::err(&req.id, "empty message"),
                                Err(Reject::InFlight) => WsResponse::err(&req.id, "reply in progress"),
                                Ok(cycle) => {
                                    let controller = controller.clone();
                                    let frame_tx = frame_tx.clone();
                                    tokio::spawn(async move {
                                        let mut forward = |e: &ChatEvent| {
                                            // Receiver gone means the socket closed; the log still completes.
                                            let _ = frame_tx.send(chat_event_frame(e));
                                        };
                                        controller.drive(cycle, Some(&mut forward)).await;
                                    });
                                    WsResponse::ok(&req.id, json!({ "accepted": true }))
                                }
                            },
                        }
                    }
                    _ => WsResponse::err(&req.id, format!("unknown method: {}", req.method)),
                };
                let _ = socket
                    .send(Message::Text(serde_json::to_string(&res).unwrap_or_default()))
                    .await;
            }
        }
    }

    log::debug!("ws {}: chat widget closed", conn_id);
}
