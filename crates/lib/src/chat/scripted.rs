//! Adapter that replays a fixed reply. Used by tests and local demos where no network is wanted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::adapter::{ChatAdapter, ChatError, FragmentStream};
use super::turn::HistoryEntry;

/// One recorded call: the history and message the adapter was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedCall {
    pub history: Vec<HistoryEntry>,
    pub message: String,
}

pub struct ScriptedAdapter {
    fragments: Vec<String>,
    failure: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    recorded: Mutex<Vec<ScriptedCall>>,
}

impl ScriptedAdapter {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            failure: None,
            delay: None,
            calls: AtomicUsize::new(0),
            recorded: Mutex::new(Vec::new()),
        }
    }

    /// After the fragments, end the stream with this error instead of completing.
    pub fn fail_with(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Produce fragments from a spawned task, sleeping before each one.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn recorded(&self) -> Vec<ScriptedCall> {
        self.recorded
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }
}

impl ChatAdapter for ScriptedAdapter {
    fn stream_reply(&self, history: Vec<HistoryEntry>, message: String) -> FragmentStream {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut g) = self.recorded.lock() {
            g.push(ScriptedCall { history, message });
        }
        let (tx, stream) = FragmentStream::channel();
        let fragments = self.fragments.clone();
        let failure = self.failure.clone();
        let finish = move |tx: super::adapter::FragmentSender| match failure {
            Some(msg) => tx.fail(ChatError::Scripted(msg)),
            None => tx.finish(),
        };
        match self.delay {
            None => {
                for f in fragments {
                    tx.send(f);
                }
                finish(tx);
            }
            Some(delay) => {
                tokio::spawn(async move {
                    for f in fragments {
                        tokio::time::sleep(delay).await;
                        if !tx.send(f) {
                            return;
                        }
                    }
                    tokio::time::sleep(delay).await;
                    finish(tx);
                });
            }
        }
        stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn replays_fragments_and_records_call() {
        let adapter = ScriptedAdapter::new(["a", "b"]);
        let out: Vec<String> = adapter
            .stream_reply(Vec::new(), "q".to_string())
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(out, vec!["a", "b"]);
        assert_eq!(adapter.calls(), 1);
        assert_eq!(adapter.recorded()[0].message, "q");
    }

    #[tokio::test]
    async fn delayed_failure_arrives_after_fragments() {
        let adapter = ScriptedAdapter::new(["Hello"])
            .fail_with("lost connection")
            .with_delay(Duration::from_millis(5));
        let items: Vec<_> = adapter.stream_reply(Vec::new(), "q".into()).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "Hello");
        assert!(matches!(&items[1], Err(ChatError::Scripted(m)) if m == "lost connection"));
    }
}
