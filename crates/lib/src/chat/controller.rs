//! Chat widget controller: drives one request/response cycle at a time against a [`ChatAdapter`]
//! and keeps the conversation log in step with what the user sees.
//!
//! Phases: `Idle -> Sending -> Streaming* -> Idle`, or `... -> Failed` until the next submission.
//! The in-flight check and the transition to `Sending` happen under one lock before anything is
//! awaited, so a second submission on a shared controller is rejected rather than interleaved.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::Mutex;

use super::adapter::{ChatAdapter, ChatError, FragmentStream, GeminiChatAdapter};
use super::conversation::ConversationLog;
use super::turn::Turn;
use crate::config::{self, Config};

/// Text of the assistant turn when a reply fails, whatever arrived before the failure.
pub const APOLOGY_MESSAGE: &str =
    "I encountered a disturbance in the digital field. Please try again.";

/// User-visible notice recorded alongside a failed reply.
pub const ERROR_NOTICE: &str = "The assistant could not complete its reply. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Sending,
    Streaming,
    Failed,
}

impl Phase {
    pub fn is_in_flight(self) -> bool {
        matches!(self, Phase::Sending | Phase::Streaming)
    }
}

/// Why a submission was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reject {
    Empty,
    InFlight,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Rejected(Reject),
    Completed { reply: String },
    Failed { notice: String },
}

/// Rendering updates, delivered only while the widget is open.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ChatEvent {
    UserTurn { turn: Turn },
    PlaceholderOpened { turn: Turn },
    /// `text` is everything received so far, `fragment` the newest piece.
    Fragment { fragment: String, text: String },
    Completed { text: String },
    Failed { text: String, notice: String },
}

/// Point-in-time view of the widget for rendering from scratch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSnapshot {
    pub turns: Vec<Turn>,
    pub phase: Phase,
    pub error_notice: Option<String>,
    pub open: bool,
}

struct Widget {
    log: ConversationLog,
    phase: Phase,
    draft: String,
    error_notice: Option<String>,
    open: bool,
}

impl Widget {
    /// Close the open reply as failed: apology text, notice, `Failed`.
    fn fail_reply(&mut self) {
        if self.log.has_open_placeholder() {
            if let Err(e) = self.log.update_placeholder(APOLOGY_MESSAGE) {
                log::warn!("chat: cannot write apology: {}", e);
            }
            if let Err(e) = self.log.close_placeholder() {
                log::warn!("chat: cannot close reply: {}", e);
            }
        }
        self.error_notice = Some(ERROR_NOTICE.to_string());
        self.phase = Phase::Failed;
    }
}

/// A claimed cycle: the turns already appended and the reply stream to consume.
///
/// Dropping a cycle before [`ChatController::drive`] settles it fails the reply, so an abandoned
/// cycle never leaves the widget in flight or the placeholder open.
pub struct Cycle {
    user_turn: Turn,
    placeholder: Turn,
    stream: FragmentStream,
    guard: CycleGuard,
}

struct CycleGuard {
    widget: Arc<Mutex<Widget>>,
    settled: bool,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        log::warn!("chat: reply abandoned before it finished");
        match self.widget.try_lock() {
            Ok(mut w) => w.fail_reply(),
            Err(_) => {
                // Lock is busy; finish from a task if a runtime is around.
                let widget = self.widget.clone();
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(async move {
                        widget.lock().await.fail_reply();
                    });
                }
            }
        }
    }
}

pub struct ChatController {
    adapter: Arc<dyn ChatAdapter>,
    history_limit: Option<usize>,
    fragment_timeout: Option<Duration>,
    widget: Arc<Mutex<Widget>>,
}

pub type EventSink<'a> = Option<&'a mut (dyn FnMut(&ChatEvent) + Send)>;

fn emit(on_event: &mut EventSink<'_>, open: bool, event: ChatEvent) {
    if !open {
        return;
    }
    if let Some(cb) = on_event.as_mut() {
        cb(&event);
    }
}

impl ChatController {
    pub fn new(adapter: Arc<dyn ChatAdapter>, greeting: impl Into<String>) -> Self {
        Self {
            adapter,
            history_limit: None,
            fragment_timeout: None,
            widget: Arc::new(Mutex::new(Widget {
                log: ConversationLog::with_greeting(greeting),
                phase: Phase::Idle,
                draft: String::new(),
                error_notice: None,
                open: true,
            })),
        }
    }

    /// Controller backed by Gemini with greeting, persona, history cap and timeout taken from config.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(GeminiChatAdapter::from_config(config)),
            config::resolve_greeting(config),
        )
        .with_history_limit(config.chat.history_limit)
        .with_fragment_timeout(config::resolve_request_timeout(config))
    }

    pub fn with_history_limit(mut self, limit: Option<usize>) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_fragment_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fragment_timeout = timeout;
        self
    }

    pub async fn transcript(&self) -> Vec<Turn> {
        self.widget.lock().await.log.turns().to_vec()
    }

    pub async fn phase(&self) -> Phase {
        self.widget.lock().await.phase
    }

    pub async fn error_notice(&self) -> Option<String> {
        self.widget.lock().await.error_notice.clone()
    }

    pub async fn snapshot(&self) -> ChatSnapshot {
        let w = self.widget.lock().await;
        ChatSnapshot {
            turns: w.log.turns().to_vec(),
            phase: w.phase,
            error_notice: w.error_notice.clone(),
            open: w.open,
        }
    }

    pub async fn is_open(&self) -> bool {
        self.widget.lock().await.open
    }

    pub async fn open(&self) {
        self.widget.lock().await.open = true;
    }

    /// Hide the widget. A reply in progress keeps running and keeps updating the log, but emits no events.
    pub async fn dismiss(&self) {
        self.widget.lock().await.open = false;
    }

    pub async fn set_draft(&self, text: impl Into<String>) {
        self.widget.lock().await.draft = text.into();
    }

    pub async fn draft(&self) -> String {
        self.widget.lock().await.draft.clone()
    }

    /// Clear a failure notice and return to `Idle`. No effect in any other phase.
    pub async fn acknowledge_error(&self) {
        let mut w = self.widget.lock().await;
        if w.phase == Phase::Failed {
            w.phase = Phase::Idle;
            w.error_notice = None;
        }
    }

    /// Submit the current draft.
    pub async fn submit_draft(&self, on_event: EventSink<'_>) -> SubmitOutcome {
        let draft = self.draft().await;
        self.submit(&draft, on_event).await
    }

    /// Run one request/response cycle for `input`. Empty input, or input while another cycle is in flight,
    /// is rejected without touching the log.
    pub async fn submit(&self, input: &str, on_event: EventSink<'_>) -> SubmitOutcome {
        match self.begin(input).await {
            Ok(cycle) => self.drive(cycle, on_event).await,
            Err(reason) => SubmitOutcome::Rejected(reason),
        }
    }

    /// First half of [`submit`](Self::submit): check and claim the in-flight slot, append the user turn and
    /// the empty placeholder, and ask the adapter for the reply stream. Nothing is awaited between the
    /// check and the claim.
    pub async fn begin(&self, input: &str) -> Result<Cycle, Reject> {
        let (history, user_turn, placeholder) = {
            let mut w = self.widget.lock().await;
            if input.trim().is_empty() {
                return Err(Reject::Empty);
            }
            if w.phase.is_in_flight() {
                log::debug!("chat: submission ignored, reply in progress");
                return Err(Reject::InFlight);
            }
            let history = w.log.history(self.history_limit);
            let user_turn = Turn::user(input);
            if let Err(e) = w.log.append(user_turn.clone()) {
                log::warn!("chat: cannot append user turn: {}", e);
                return Err(Reject::InFlight);
            }
            if let Err(e) = w.log.open_placeholder() {
                log::warn!("chat: cannot open reply: {}", e);
                return Err(Reject::InFlight);
            }
            let placeholder = w.log.last().cloned().unwrap_or_else(|| Turn::model(""));
            w.draft.clear();
            w.error_notice = None;
            w.phase = Phase::Sending;
            (history, user_turn, placeholder)
        };
        let stream = self.adapter.stream_reply(history, input.to_string());
        Ok(Cycle {
            user_turn,
            placeholder,
            stream,
            guard: CycleGuard {
                widget: self.widget.clone(),
                settled: false,
            },
        })
    }

    /// Second half of [`submit`](Self::submit): consume the reply stream into the placeholder, then close it
    /// as completed or failed. If this future is dropped early the reply is failed on drop.
    pub async fn drive(&self, cycle: Cycle, mut on_event: EventSink<'_>) -> SubmitOutcome {
        let Cycle {
            user_turn,
            placeholder,
            mut stream,
            mut guard,
        } = cycle;
        let open = self.is_open().await;
        emit(&mut on_event, open, ChatEvent::UserTurn { turn: user_turn });
        emit(
            &mut on_event,
            open,
            ChatEvent::PlaceholderOpened { turn: placeholder },
        );

        let mut reply = String::new();
        let failure = loop {
            let next = match self.fragment_timeout {
                Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
                    Ok(item) => item,
                    Err(_) => Some(Err(ChatError::Timeout(limit))),
                },
                None => stream.next().await,
            };
            match next {
                None => break None,
                Some(Err(e)) => break Some(e),
                Some(Ok(fragment)) => {
                    reply.push_str(&fragment);
                    let open = {
                        let mut w = self.widget.lock().await;
                        w.phase = Phase::Streaming;
                        if let Err(e) = w.log.update_placeholder(reply.clone()) {
                            log::warn!("chat: cannot update reply: {}", e);
                        }
                        w.open
                    };
                    emit(
                        &mut on_event,
                        open,
                        ChatEvent::Fragment {
                            fragment,
                            text: reply.clone(),
                        },
                    );
                }
            }
        };

        let mut w = self.widget.lock().await;
        match failure {
            None => {
                if let Err(e) = w.log.close_placeholder() {
                    log::warn!("chat: cannot close reply: {}", e);
                }
                w.phase = Phase::Idle;
                guard.settled = true;
                let open = w.open;
                drop(w);
                log::debug!("chat: reply completed ({} bytes)", reply.len());
                emit(
                    &mut on_event,
                    open,
                    ChatEvent::Completed {
                        text: reply.clone(),
                    },
                );
                SubmitOutcome::Completed { reply }
            }
            Some(e) => {
                log::warn!("chat: reply failed after {} bytes: {}", reply.len(), e);
                w.fail_reply();
                guard.settled = true;
                let open = w.open;
                drop(w);
                emit(
                    &mut on_event,
                    open,
                    ChatEvent::Failed {
                        text: APOLOGY_MESSAGE.to_string(),
                        notice: ERROR_NOTICE.to_string(),
                    },
                );
                SubmitOutcome::Failed {
                    notice: ERROR_NOTICE.to_string(),
                }
            }
        }
    }
}
