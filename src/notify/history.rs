//! Bounded chat/gift history
//!
//! Entries are kept per scope (global, or one session) in FIFO ring buffers so
//! newly joined connections can be replayed recent activity. Nothing here is
//! persisted.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::session::entry::unix_millis;
use crate::session::SessionId;

/// What a chat entry carries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ChatKind {
    /// Chat text
    Chat { text: String },
    /// Virtual gift identifier
    Gift { gift_id: String },
    /// Notice generated by the relay (joins, leaves)
    System { text: String },
}

/// One chat, gift or system entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub author: String,
    #[serde(flatten)]
    pub kind: ChatKind,
    pub timestamp_ms: u64,
}

impl ChatEntry {
    pub fn chat(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self::now(author.into(), ChatKind::Chat { text: text.into() })
    }

    pub fn gift(author: impl Into<String>, gift_id: impl Into<String>) -> Self {
        Self::now(
            author.into(),
            ChatKind::Gift {
                gift_id: gift_id.into(),
            },
        )
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::now(String::new(), ChatKind::System { text: text.into() })
    }

    fn now(author: String, kind: ChatKind) -> Self {
        Self {
            author,
            kind,
            timestamp_ms: unix_millis(),
        }
    }

    pub fn is_gift(&self) -> bool {
        matches!(self.kind, ChatKind::Gift { .. })
    }
}

/// Ring buffers of recent entries keyed by scope (`None` = global)
#[derive(Debug)]
pub struct ChatHistory {
    capacity: usize,
    scopes: HashMap<Option<SessionId>, VecDeque<ChatEntry>>,
}

impl ChatHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            scopes: HashMap::new(),
        }
    }

    /// Append an entry, evicting the oldest once the scope is at capacity
    pub fn push(&mut self, scope: Option<SessionId>, entry: ChatEntry) {
        if self.capacity == 0 {
            return;
        }

        let ring = self
            .scopes
            .entry(scope)
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));
        while ring.len() >= self.capacity {
            ring.pop_front();
        }
        ring.push_back(entry);
    }

    /// Entries for a scope, oldest first
    pub fn entries(&self, scope: &Option<SessionId>) -> Vec<ChatEntry> {
        self.scopes
            .get(scope)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop a session's ring
    pub fn remove_session(&mut self, id: &SessionId) {
        self.scopes.remove(&Some(id.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_eviction() {
        let mut history = ChatHistory::new(3);

        for i in 0..5 {
            history.push(None, ChatEntry::chat("a", format!("msg {}", i)));
        }

        let texts: Vec<String> = history
            .entries(&None)
            .into_iter()
            .map(|e| match e.kind {
                ChatKind::Chat { text } => text,
                other => panic!("unexpected kind: {:?}", other),
            })
            .collect();
        assert_eq!(texts, vec!["msg 2", "msg 3", "msg 4"]);
    }

    #[test]
    fn test_scopes_are_separate() {
        let mut history = ChatHistory::new(10);
        let session = Some(SessionId::from("1-a"));

        history.push(None, ChatEntry::chat("a", "global"));
        history.push(session.clone(), ChatEntry::gift("b", "rose"));

        assert_eq!(history.entries(&None).len(), 1);
        assert!(history.entries(&session)[0].is_gift());

        history.remove_session(&SessionId::from("1-a"));
        assert!(history.entries(&session).is_empty());
        assert_eq!(history.entries(&None).len(), 1);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut history = ChatHistory::new(0);
        history.push(None, ChatEntry::system("hello"));
        assert!(history.entries(&None).is_empty());
    }

    #[test]
    fn test_entry_wire_format() {
        let entry = ChatEntry::gift("fan", "rose");
        let json: serde_json::Value = serde_json::to_value(&entry).unwrap();

        assert_eq!(json["kind"], "gift");
        assert_eq!(json["gift_id"], "rose");
        assert_eq!(json["author"], "fan");

        let back: ChatEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }
}
