//! Append-only conversation log for one widget lifetime.
//!
//! The only mutation besides append is rewriting the text of the open placeholder
//! (the assistant turn currently being streamed). Once closed it is frozen.

use super::turn::{HistoryEntry, Turn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogError {
    #[error("an assistant reply is still open")]
    PlaceholderOpen,
    #[error("no assistant reply is open")]
    NoOpenPlaceholder,
}

#[derive(Debug, Clone)]
pub struct ConversationLog {
    turns: Vec<Turn>,
    placeholder_open: bool,
}

impl ConversationLog {
    /// New log seeded with one assistant greeting.
    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::model(greeting)],
            placeholder_open: false,
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn has_open_placeholder(&self) -> bool {
        self.placeholder_open
    }

    /// Append a finished turn.
    pub fn append(&mut self, turn: Turn) -> Result<(), LogError> {
        if self.placeholder_open {
            return Err(LogError::PlaceholderOpen);
        }
        self.turns.push(turn);
        Ok(())
    }

    /// Append an empty assistant turn that stays writable until [`close_placeholder`](Self::close_placeholder).
    pub fn open_placeholder(&mut self) -> Result<(), LogError> {
        self.append(Turn::model(String::new()))?;
        self.placeholder_open = true;
        Ok(())
    }

    /// Overwrite the open placeholder's text.
    pub fn update_placeholder(&mut self, text: impl Into<String>) -> Result<(), LogError> {
        if !self.placeholder_open {
            return Err(LogError::NoOpenPlaceholder);
        }
        match self.turns.last_mut() {
            Some(turn) => {
                turn.text = text.into();
                Ok(())
            }
            None => Err(LogError::NoOpenPlaceholder),
        }
    }

    pub fn close_placeholder(&mut self) -> Result<(), LogError> {
        if !self.placeholder_open {
            return Err(LogError::NoOpenPlaceholder);
        }
        self.placeholder_open = false;
        Ok(())
    }

    /// Turns to send back to the model: every closed turn, or only the most recent `limit` of them.
    pub fn history(&self, limit: Option<usize>) -> Vec<HistoryEntry> {
        let closed = if self.placeholder_open {
            &self.turns[..self.turns.len() - 1]
        } else {
            &self.turns[..]
        };
        let start = match limit {
            Some(n) => closed.len().saturating_sub(n),
            None => 0,
        };
        closed[start..].iter().map(HistoryEntry::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Role;

    #[test]
    fn starts_with_greeting() {
        let log = ConversationLog::with_greeting("Hello.");
        assert_eq!(log.len(), 1);
        assert_eq!(log.turns()[0].role, Role::Model);
        assert_eq!(log.turns()[0].text, "Hello.");
        assert!(!log.has_open_placeholder());
    }

    #[test]
    fn placeholder_is_writable_only_while_open() {
        let mut log = ConversationLog::with_greeting("Hello.");
        assert_eq!(log.update_placeholder("x"), Err(LogError::NoOpenPlaceholder));

        log.append(Turn::user("hi")).unwrap();
        log.open_placeholder().unwrap();
        log.update_placeholder("par").unwrap();
        log.update_placeholder("partial").unwrap();
        assert_eq!(log.last().unwrap().text, "partial");

        log.close_placeholder().unwrap();
        assert_eq!(log.update_placeholder("late"), Err(LogError::NoOpenPlaceholder));
        assert_eq!(log.last().unwrap().text, "partial");
        assert_eq!(log.close_placeholder(), Err(LogError::NoOpenPlaceholder));
    }

    #[test]
    fn append_rejected_while_placeholder_open() {
        let mut log = ConversationLog::with_greeting("Hello.");
        log.open_placeholder().unwrap();
        assert_eq!(log.append(Turn::user("hi")), Err(LogError::PlaceholderOpen));
        assert_eq!(log.open_placeholder(), Err(LogError::PlaceholderOpen));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn history_skips_open_placeholder_and_honours_limit() {
        let mut log = ConversationLog::with_greeting("Hello.");
        log.append(Turn::user("one")).unwrap();
        log.append(Turn::model("two")).unwrap();
        log.append(Turn::user("three")).unwrap();
        log.open_placeholder().unwrap();

        let all = log.history(None);
        assert_eq!(all.len(), 4);
        assert_eq!(all[3].text, "three");

        let recent = log.history(Some(2));
        assert_eq!(
            recent.iter().map(|h| h.text.as_str()).collect::<Vec<_>>(),
            vec!["two", "three"]
        );
        assert_eq!(log.history(Some(10)).len(), 4);
        assert!(log.history(Some(0)).is_empty());
    }
}
