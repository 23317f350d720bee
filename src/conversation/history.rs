//! Per-conversation message history.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::info;

use crate::llm::Message;

/// Ordered messages of one conversation. Index 0 is always the system
/// message.
#[derive(Debug, Clone)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    pub fn new(system_message: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_message)],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Keep the system message plus the most recent `max_len` messages.
    /// Returns how many messages were dropped.
    pub fn trim(&mut self, max_len: usize) -> usize {
        let excess = self.messages.len().saturating_sub(max_len + 1);
        if excess > 0 {
            self.messages.drain(1..=excess);
        }
        excess
    }

    /// Roll back to the first `len` messages, keeping at least the system
    /// message.
    pub fn truncate(&mut self, len: usize) {
        self.messages.truncate(len.max(1));
    }
}

/// Conversation histories keyed by conversation id.
///
/// Each history sits behind its own async mutex; a turn holds it for its
/// whole duration, so turns on one key run one at a time while different
/// keys proceed independently.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    conversations: Arc<RwLock<HashMap<String, Arc<Mutex<History>>>>>,
    system_message: Arc<str>,
}

impl ConversationStore {
    pub fn new(system_message: impl Into<String>) -> Self {
        Self {
            conversations: Arc::new(RwLock::new(HashMap::new())),
            system_message: Arc::from(system_message.into()),
        }
    }

    /// The history for `key`, created on first use.
    pub fn get_or_create(&self, key: &str) -> Arc<Mutex<History>> {
        if let Some(history) = self.conversations.read().get(key) {
            return Arc::clone(history);
        }

        let mut conversations = self.conversations.write();
        Arc::clone(conversations.entry(key.to_string()).or_insert_with(|| {
            info!(conversation_id = %key, "Initialized message history");
            Arc::new(Mutex::new(History::new(self.system_message.as_ref())))
        }))
    }

    /// Copy of a conversation's messages, waiting for any running turn.
    pub async fn messages(&self, key: &str) -> Option<Vec<Message>> {
        let history = self.conversations.read().get(key).cloned()?;
        let history = history.lock().await;
        Some(history.messages().to_vec())
    }

    pub fn len(&self) -> usize {
        self.conversations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MessageRole;

    fn contents(history: &History) -> Vec<&str> {
        history
            .messages()
            .iter()
            .map(|m| m.content.as_deref().unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_trim_keeps_system_and_recent() {
        let mut history = History::new("system");
        for text in ["u1", "a1", "u2", "a2", "u3"] {
            history.push(Message::user(text));
        }

        assert_eq!(history.trim(2), 3);
        assert_eq!(contents(&history), ["system", "a2", "u3"]);
        assert_eq!(history.messages()[0].role, MessageRole::System);

        assert_eq!(history.trim(2), 0);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_trim_to_zero_and_truncate_floor() {
        let mut history = History::new("system");
        history.push(Message::user("u1"));
        history.trim(0);
        assert_eq!(contents(&history), ["system"]);

        history.push(Message::user("u2"));
        history.truncate(0);
        assert_eq!(contents(&history), ["system"]);
    }

    #[tokio::test]
    async fn test_store_creates_lazily_and_shares_handles() {
        let store = ConversationStore::new("be brief");
        assert!(store.is_empty());
        assert!(store.messages("c1").await.is_none());

        let first = store.get_or_create("c1");
        first.lock().await.push(Message::user("hello"));
        let second = store.get_or_create("c1");
        assert!(Arc::ptr_eq(&first, &second));

        let messages = store.messages("c1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content.as_deref(), Some("be brief"));
        assert_eq!(store.len(), 1);
    }
}
