//! Chat session adapter: turns prior turns plus a new message into a lazy stream of reply fragments.
//!
//! Every reply is produced by a task writing into a channel; the caller reads the other end as a
//! [`FragmentStream`]. The stream is single-pass and finite; retrying means calling the adapter again.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::Stream;
use tokio::sync::mpsc;

use super::turn::HistoryEntry;
use crate::config::{self, Config};
use crate::llm::{Content, GeminiClient, GeminiError, GenerateRequest};

/// Sole fragment of every reply when no API key is configured.
pub const OFFLINE_MESSAGE: &str =
    "I am currently offline. Please configure the API Key to enable my intelligence.";

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error(transparent)]
    Remote(#[from] GeminiError),
    #[error("no reply fragment within {0:?}")]
    Timeout(Duration),
    #[error("reply stream ended without completing")]
    Disconnected,
    #[error("{0}")]
    Scripted(String),
}

enum Frame {
    Fragment(String),
    Failed(ChatError),
    Done,
}

/// Producer half of a [`FragmentStream`].
pub struct FragmentSender {
    tx: mpsc::UnboundedSender<Frame>,
}

impl FragmentSender {
    /// Queue one fragment. Returns false when the reader is gone.
    pub fn send(&self, fragment: impl Into<String>) -> bool {
        self.tx.send(Frame::Fragment(fragment.into())).is_ok()
    }

    /// End the stream with an error.
    pub fn fail(self, err: ChatError) {
        let _ = self.tx.send(Frame::Failed(err));
    }

    /// End the stream normally. Dropping the sender without calling this reads as [`ChatError::Disconnected`].
    pub fn finish(self) {
        let _ = self.tx.send(Frame::Done);
    }
}

/// Consumer half: yields `Ok(fragment)` items, then ends with `None` on completion or with one `Err` on failure.
pub struct FragmentStream {
    rx: mpsc::UnboundedReceiver<Frame>,
    done: bool,
}

impl FragmentStream {
    pub fn channel() -> (FragmentSender, FragmentStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (FragmentSender { tx }, FragmentStream { rx, done: false })
    }

    /// A stream that yields exactly one fragment and completes.
    pub fn once(fragment: impl Into<String>) -> Self {
        let (tx, stream) = Self::channel();
        tx.send(fragment);
        tx.finish();
        stream
    }
}

impl Stream for FragmentStream {
    type Item = Result<String, ChatError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Frame::Fragment(s))) => Poll::Ready(Some(Ok(s))),
            Poll::Ready(Some(Frame::Failed(e))) => {
                self.done = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(Some(Frame::Done)) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(Some(Err(ChatError::Disconnected)))
            }
        }
    }
}

/// Source of assistant replies. Implementations must not touch shared state; the controller owns the log.
/// Called from within a tokio runtime; implementations may spawn the producer task.
pub trait ChatAdapter: Send + Sync {
    fn stream_reply(&self, history: Vec<HistoryEntry>, message: String) -> FragmentStream;
}

/// Adapter backed by Gemini streaming generation.
#[derive(Clone)]
pub struct GeminiChatAdapter {
    client: Option<GeminiClient>,
    model: String,
    persona: String,
}

impl GeminiChatAdapter {
    /// `client` is None when no credential is available; every reply is then [`OFFLINE_MESSAGE`].
    pub fn new(
        client: Option<GeminiClient>,
        model: impl Into<String>,
        persona: impl Into<String>,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            persona: persona.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::from_config_with_env(config, |name| std::env::var(name).ok())
    }

    /// Like [`from_config`](Self::from_config), reading credential variables through `env`.
    pub fn from_config_with_env(config: &Config, env: impl Fn(&str) -> Option<String>) -> Self {
        let client = config::resolve_api_key_with(config, env)
            .map(|key| GeminiClient::new(key, Some(config::resolve_base_url(config))));
        Self::new(
            client,
            config::resolve_chat_model(config),
            config::resolve_persona(config),
        )
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl ChatAdapter for GeminiChatAdapter {
    fn stream_reply(&self, history: Vec<HistoryEntry>, message: String) -> FragmentStream {
        let Some(client) = self.client.clone() else {
            log::debug!("chat: no api key configured, replying offline");
            return FragmentStream::once(OFFLINE_MESSAGE);
        };
        let contents: Vec<Content> = history.iter().map(Content::from).collect();
        let request = GenerateRequest::conversation(contents, message)
            .with_system_instruction(self.persona.clone());
        let model = self.model.clone();
        let (tx, stream) = FragmentStream::channel();
        log::debug!(
            "chat: streaming reply from {} with {} prior turn(s)",
            model,
            history.len()
        );
        tokio::spawn(async move {
            let mut forward = |s: &str| {
                tx.send(s);
            };
            let result = client.stream_generate(&model, &request, &mut forward).await;
            match result {
                Ok(text) => {
                    log::debug!("chat: reply complete ({} bytes)", text.len());
                    tx.finish();
                }
                Err(e) => {
                    log::warn!("chat: reply stream failed: {}", e);
                    tx.fail(ChatError::Remote(e));
                }
            }
        });
        stream
    }
}
