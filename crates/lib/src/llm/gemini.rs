//! Gemini API client (https://generativelanguage.googleapis.com/v1beta by default).
//! Supports one-shot generation and streaming generation (SSE, `alt=sse`).

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

/// Client for the Gemini `generateContent` family of endpoints.
#[derive(Clone)]
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, thiserror::Error)]
pub enum GeminiError {
    #[error("gemini request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("gemini api error: {0}")]
    Api(String),
    #[error("gemini returned an unreadable response: {0}")]
    Malformed(String),
    #[error("gemini blocked the prompt: {0}")]
    Blocked(String),
}

/// One message in a Gemini conversation. `role` is "user" or "model"; omitted for system instructions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// A content part. Only text parts are produced or consumed here; other kinds deserialize with `text: None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Content {
    pub fn new(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            parts: vec![Part {
                text: Some(text.into()),
            }],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new("user", text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::new("model", text)
    }

    fn system(text: impl Into<String>) -> Self {
        Self {
            role: None,
            parts: vec![Part {
                text: Some(text.into()),
            }],
        }
    }

    /// Concatenated text of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect()
    }
}

/// Request body shared by `generateContent` and `streamGenerateContent`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

impl GenerateRequest {
    /// Single-turn request with one user prompt.
    pub fn prompt(text: impl Into<String>) -> Self {
        Self {
            contents: vec![Content::user(text)],
            system_instruction: None,
        }
    }

    /// Multi-turn request: prior contents followed by the new user message.
    pub fn conversation(history: Vec<Content>, message: impl Into<String>) -> Self {
        let mut contents = history;
        contents.push(Content::user(message));
        Self {
            contents,
            system_instruction: None,
        }
    }

    pub fn with_system_instruction(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.system_instruction = if text.trim().is_empty() {
            None
        } else {
            Some(Content::system(text))
        };
        self
    }
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| crate::config::DEFAULT_GEMINI_BASE_URL.to_string());
        Self {
            base_url,
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(
        &self,
        url: &str,
        request: &GenerateRequest,
    ) -> Result<reqwest::Response, GeminiError> {
        let res = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(GeminiError::Api(format!(
                "{} {}",
                status,
                api_error_message(&body)
            )));
        }
        Ok(res)
    }

    /// POST /models/{model}:generateContent: one-shot generation; returns the first candidate's text.
    pub async fn generate(
        &self,
        model: &str,
        request: &GenerateRequest,
    ) -> Result<String, GeminiError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let res = self.post(&url, request).await?;
        let body = res.text().await?;
        let data: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| GeminiError::Malformed(format!("{}: {}", e, body)))?;
        data.into_text()
    }

    /// POST /models/{model}:streamGenerateContent?alt=sse. Calls on_chunk for every text delta in arrival order;
    /// returns the accumulated text. Any unreadable event or embedded error fails the whole call.
    pub async fn stream_generate(
        &self,
        model: &str,
        request: &GenerateRequest,
        on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<String, GeminiError> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, model
        );
        let res = self.post(&url, request).await?;
        let mut stream = res.bytes_stream();
        let mut decoder = SseDecoder::default();
        let mut content = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(GeminiError::Request)?;
            for data in decoder.push(&chunk) {
                apply_stream_event(&data, &mut content, on_chunk)?;
            }
        }
        if let Some(data) = decoder.finish() {
            apply_stream_event(&data, &mut content, on_chunk)?;
        }
        Ok(content)
    }
}

fn apply_stream_event(
    data: &str,
    content: &mut String,
    on_chunk: &mut (dyn for<'a> FnMut(&'a str) + Send),
) -> Result<(), GeminiError> {
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(());
    }
    let event: GenerateResponse = serde_json::from_str(data)
        .map_err(|e| GeminiError::Malformed(format!("{}: {}", e, data)))?;
    let text = event.into_text()?;
    if !text.is_empty() {
        on_chunk(&text);
        content.push_str(&text);
    }
    Ok(())
}

/// Pull `error.message` out of an error body; falls back to the raw body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<GenerateResponse>(body)
        .ok()
        .and_then(|r| r.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.trim().to_string())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl GenerateResponse {
    fn into_text(self) -> Result<String, GeminiError> {
        if let Some(err) = self.error {
            let msg = err
                .message
                .or(err.status)
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(GeminiError::Api(msg));
        }
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(GeminiError::Blocked(reason));
        }
        Ok(self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.text())
            .unwrap_or_default())
    }
}

/// Incremental server-sent-events decoder. Feeds raw body bytes, yields the `data` payload of each complete event.
/// Accepts `\n` and `\r\n` line endings; multi-line data is joined with `\n`.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
    data: String,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(i) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..i).collect();
            self.buffer.drain(..1);
            let line = String::from_utf8_lossy(&line_bytes);
            if let Some(event) = self.feed_line(line.trim_end_matches('\r')) {
                events.push(event);
            }
        }
        events
    }

    fn feed_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            if self.data.is_empty() {
                return None;
            }
            return Some(std::mem::take(&mut self.data));
        }
        // Comments, event names and ids carry nothing we use.
        if let Some(rest) = line.strip_prefix("data:") {
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            if !self.data.is_empty() {
                self.data.push('\n');
            }
            self.data.push_str(rest);
        }
        None
    }

    /// Flush a trailing event that was not terminated by a blank line.
    fn finish(&mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).into_owned();
            if let Some(event) = self.feed_line(line.trim_end_matches('\r')) {
                return Some(event);
            }
        }
        if self.data.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.data))
        }
    }
}
