//! Gateway WebSocket protocol types (requests, responses, events).

use serde::{Deserialize, Serialize};

/// Wire request: `{ "type": "req", "id", "method", "params" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsRequest {
    #[serde(rename = "type")]
    pub typ: String,
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Wire response: `{ "type": "res", "id", "ok", "payload" or "error" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsResponse {
    #[serde(rename = "type")]
    pub typ: String,
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Server-pushed event: `{ "type": "event", "event", "payload" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEvent {
    #[serde(rename = "type")]
    pub typ: String,
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Params for WS method "chat.send": the user's message for the connection's chat widget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSendParams {
    pub message: String,
}

impl WsResponse {
    pub fn ok(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            typ: "res".to_string(),
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            typ: "res".to_string(),
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(error.into()),
        }
    }
}

impl WsEvent {
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            typ: "event".to_string(),
            event: event.into(),
            payload,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_params_default_to_null() {
        let req: WsRequest =
            serde_json::from_str(r#"{"type":"req","id":"7","method":"health"}"#).unwrap();
        assert_eq!(req.method, "health");
        assert!(req.params.is_null());
    }

    #[test]
    fn error_response_omits_payload() {
        let v = serde_json::to_value(WsResponse::err("1", "reply in progress")).unwrap();
        assert_eq!(v["type"], "res");
        assert_eq!(v["ok"], false);
        assert!(v.get("payload").is_none());
        assert_eq!(v["error"], "reply in progress");
    }
}
