//! Streaming chat: conversation log, reply adapters, and the widget controller.

mod adapter;
mod controller;
mod conversation;
mod scripted;
mod turn;

pub use adapter::{
    ChatAdapter, ChatError, FragmentSender, FragmentStream, GeminiChatAdapter, OFFLINE_MESSAGE,
};
pub use controller::{
    ChatController, ChatEvent, ChatSnapshot, Cycle, EventSink, Phase, Reject, SubmitOutcome, APOLOGY_MESSAGE,
    ERROR_NOTICE,
};
pub use conversation::{ConversationLog, LogError};
pub use scripted::{ScriptedAdapter, ScriptedCall};
pub use turn::{HistoryEntry, Role, Turn};
