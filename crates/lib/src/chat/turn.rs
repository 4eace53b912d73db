use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a turn. The assistant is "model" on the wire, as the remote API names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            created_at: Utc::now(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

/// A prior turn as it is sent back to the model (no timestamp).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub text: String,
}

impl From<&Turn> for HistoryEntry {
    fn from(t: &Turn) -> Self {
        Self {
            role: t.role,
            text: t.text.clone(),
        }
    }
}

impl From<&HistoryEntry> for crate::llm::Content {
    fn from(h: &HistoryEntry) -> Self {
        crate::llm::Content::new(h.role.as_str(), h.text.clone())
    }
}
