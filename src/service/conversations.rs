//! Conversation registry
//!
//! Resolves one conversation per unordered user pair and tracks its
//! newest message.

use std::sync::Arc;

use super::validate_id;
use crate::data::{Conversation, ConversationOverview, Database};
use crate::error::AppError;

pub struct ConversationRegistry {
    db: Arc<Database>,
}

impl ConversationRegistry {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Conversation for the pair, created on first use
    ///
    /// Lookup ignores argument order; a new row stores the order given.
    pub async fn get_or_create(&self, user_a: &str, user_b: &str) -> Result<Conversation, AppError> {
        validate_id("user_id", user_a)?;
        validate_id("user_id", user_b)?;
        self.db.get_or_create_conversation(user_a, user_b).await
    }

    /// Point the conversation at `message_id`
    ///
    /// Best-effort: failures are logged and swallowed.
    pub async fn update_last_message(&self, conversation_id: &str, message_id: &str) {
        match self
            .db
            .update_conversation_last_message(conversation_id, message_id)
            .await
        {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                conversation_id,
                message_id,
                "Conversation disappeared before last message update"
            ),
            Err(error) => tracing::warn!(
                conversation_id,
                message_id,
                error = %error,
                "Failed to update conversation last message"
            ),
        }
    }

    /// Resolve the pair's conversation and record `message_id` on it
    ///
    /// Best-effort, like [`Self::update_last_message`].
    pub async fn record_message(&self, sender_id: &str, receiver_id: &str, message_id: &str) {
        match self.get_or_create(sender_id, receiver_id).await {
            Ok(conversation) => self.update_last_message(&conversation.id, message_id).await,
            Err(error) => tracing::warn!(
                sender_id,
                receiver_id,
                message_id,
                error = %error,
                "Failed to resolve conversation"
            ),
        }
    }

    /// Conversations of `user_id`, most recently active first
    pub async fn conversations_for(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationOverview>, AppError> {
        validate_id("user_id", user_id)?;
        self.db.get_conversations_for_user(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn registry() -> ConversationRegistry {
        let db = Arc::new(Database::connect_in_memory().await.unwrap());
        ConversationRegistry::new(db)
    }

    #[tokio::test]
    async fn same_conversation_regardless_of_order() {
        let registry = registry().await;

        let first = registry.get_or_create("alice", "bob").await.unwrap();
        let second = registry.get_or_create("bob", "alice").await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.user1_id, "alice");
        assert_eq!(second.user2_id, "bob");
    }

    #[tokio::test]
    async fn distinct_pairs_get_distinct_conversations() {
        let registry = registry().await;

        let ab = registry.get_or_create("alice", "bob").await.unwrap();
        let ac = registry.get_or_create("alice", "carol").await.unwrap();
        assert_ne!(ab.id, ac.id);

        let listed = registry.conversations_for("alice").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(registry.conversations_for("bob").await.unwrap().len() == 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_use_yields_one_conversation() {
        // file-backed so each task can hold its own pooled connection
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db = Database::connect(&temp_dir.path().join("race.db")).await.unwrap();
        let registry = Arc::new(ConversationRegistry::new(Arc::new(db)));
        let barrier = Arc::new(tokio::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    if i % 2 == 0 {
                        registry.get_or_create("alice", "bob").await
                    } else {
                        registry.get_or_create("bob", "alice").await
                    }
                })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(registry.conversations_for("alice").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn last_message_update_on_missing_conversation_is_swallowed() {
        let registry = registry().await;
        registry
            .update_last_message("01HZZZZZZZZZZZZZZZZZZZZZZZ", "01HZZZZZZZZZZZZZZZZZZZZZZY")
            .await;
    }
}
