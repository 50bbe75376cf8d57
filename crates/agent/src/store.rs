//! In-process conversation store.
//!
//! One transcript per conversation id, each behind its own async lock so
//! turns on the same conversation run one after another while different
//! conversations proceed in parallel.

use retrievalbot_core::message::{Conversation, ConversationId, Message};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

pub type SharedConversation = Arc<Mutex<Conversation>>;

/// Transcripts keyed by conversation id.
///
/// Entries are never evicted: memory grows with the number of distinct
/// conversations seen since start-up and only a restart frees it. Repeat
/// turns on a known id reuse its entry.
// TODO: evict conversations idle past a configurable TTL once the gateway
// runs long enough for this to matter.
#[derive(Default)]
pub struct ConversationStore {
    conversations: Mutex<HashMap<ConversationId, SharedConversation>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create(&self, id: &ConversationId) -> SharedConversation {
        let mut conversations = self.conversations.lock().await;
        conversations
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Conversation::with_id(id.clone()))))
            .clone()
    }

    /// A copy of a conversation's messages, if it exists.
    pub async fn snapshot(&self, id: &ConversationId) -> Option<Vec<Message>> {
        let shared = self.conversations.lock().await.get(id).cloned()?;
        let conversation = shared.lock().await;
        Some(conversation.messages().to_vec())
    }

    pub async fn len(&self) -> usize {
        self.conversations.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
