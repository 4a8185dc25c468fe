use std::sync::Arc;

use async_trait::async_trait;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use super::Author;
use super::ChatError;

/// One prior turn in the shape the backend expects. The same shape is
/// snapshotted into a pending request so an interrupted send can be replayed
/// verbatim after a remount.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
}

impl HistoryEntry {
    pub fn new(author: Author, content: &str) -> HistoryEntry {
        return HistoryEntry {
            kind: author.history_tag().to_string(),
            content: content.to_string(),
        };
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    pub timestamp: i64,
}

#[async_trait]
pub trait Backend {
    /// Cheap probe used by the offline monitor to decide when to lift the
    /// connection banner.
    async fn health_check(&self) -> Result<(), ChatError>;

    /// Sends one user message plus the prior conversation and resolves with
    /// the full reply. Failures come back as a `ChatError` so the caller can
    /// render the right bubble and decide whether the request stays pending.
    async fn send_message(
        &self,
        message: &str,
        history: &[HistoryEntry],
    ) -> Result<ChatReply, ChatError>;
}

pub type BackendBox = Arc<dyn Backend + Send + Sync>;
