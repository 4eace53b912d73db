//! Gateway: HTTP + WebSocket front for the chat widget and copy generation.
//!
//! Single port serves HTTP and WebSocket. Each WebSocket connection is one chat widget; requests
//! are `req`/`res` frames and controller updates arrive as `event` frames.

mod protocol;
mod server;

pub use protocol::{ChatSendParams, WsEvent, WsRequest, WsResponse};
pub use server::{router, run_gateway, GatewayState};
