//! Session identifiers

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a live session
///
/// Generated as `<sequence>-<random token>`; the sequence is monotonic for the
/// life of the process so ids are never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap an existing id string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Allocates session ids
#[derive(Debug)]
pub(crate) struct SessionIdGenerator {
    next_seq: AtomicU64,
}

impl SessionIdGenerator {
    pub(crate) fn new() -> Self {
        Self {
            next_seq: AtomicU64::new(1),
        }
    }

    /// Next id and its sequence number
    pub(crate) fn next(&self) -> (u64, SessionId) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let token = Uuid::new_v4().simple().to_string();
        (seq, SessionId(format!("{}-{}", seq, &token[..12])))
    }

    /// Number of ids handed out so far
    pub(crate) fn issued(&self) -> u64 {
        self.next_seq.load(Ordering::Relaxed) - 1
    }
}
