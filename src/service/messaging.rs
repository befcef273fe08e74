//! Messaging service
//!
//! Persists direct messages, keeps the conversation registry current and
//! pushes live events through the [`ClientRegistry`].

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use super::fanout::{ClientRegistry, MessageEvent, Subscription};
use super::{ConversationRegistry, validate_id};
use crate::config::ReadReceiptScope;
use crate::data::{DEFAULT_MESSAGE_TYPE, Database, EntityId, Message};
use crate::error::AppError;
use crate::metrics::{MESSAGES_READ_TOTAL, MESSAGES_SENT_TOTAL};

pub const MAX_CONTENT_LEN: usize = 4000;
pub const MAX_MESSAGE_TYPE_LEN: usize = 20;
pub const DEFAULT_PAGE_LIMIT: i64 = 50;
pub const MAX_PAGE_LIMIT: i64 = 100;
/// Most message ids one mark-as-read call may name
pub const MAX_READ_BATCH: usize = 1000;

/// One page of a pair's message history
#[derive(Debug, Clone, Serialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub total: i64,
}

pub struct MessagingService {
    db: Arc<Database>,
    conversations: Arc<ConversationRegistry>,
    clients: Arc<ClientRegistry>,
    read_receipts: ReadReceiptScope,
}

impl MessagingService {
    pub fn new(
        db: Arc<Database>,
        conversations: Arc<ConversationRegistry>,
        clients: Arc<ClientRegistry>,
        read_receipts: ReadReceiptScope,
    ) -> Self {
        Self {
            db,
            conversations,
            clients,
            read_receipts,
        }
    }

    /// Persist a message and notify both participants
    ///
    /// The message is durable once this returns; conversation bookkeeping
    /// and live delivery are best-effort.
    pub async fn send_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        content: &str,
        message_type: Option<&str>,
    ) -> Result<Message, AppError> {
        validate_id("sender_id", sender_id)?;
        validate_id("receiver_id", receiver_id)?;

        if content.trim().is_empty() {
            return Err(AppError::Validation("content is required".to_string()));
        }
        if content.chars().count() > MAX_CONTENT_LEN {
            return Err(AppError::Validation(format!(
                "content must be at most {MAX_CONTENT_LEN} characters"
            )));
        }

        let message_type = match message_type.map(str::trim) {
            None | Some("") => DEFAULT_MESSAGE_TYPE,
            Some(kind) if kind.chars().count() > MAX_MESSAGE_TYPE_LEN => {
                return Err(AppError::Validation(format!(
                    "message_type must be at most {MAX_MESSAGE_TYPE_LEN} characters"
                )));
            }
            Some(kind) => kind,
        };

        let now = Utc::now();
        let message = Message {
            id: EntityId::new().0,
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            content: content.to_string(),
            message_type: message_type.to_string(),
            is_read: false,
            created_at: now,
            updated_at: now,
        };

        self.db.insert_message(&message).await?;
        MESSAGES_SENT_TOTAL.inc();

        self.conversations
            .record_message(sender_id, receiver_id, &message.id)
            .await;

        let delivered = self.clients.publish(
            &[receiver_id, sender_id],
            &MessageEvent::new_message(message.clone()),
        );

        tracing::debug!(
            message_id = %message.id,
            sender_id,
            receiver_id,
            delivered,
            "Message sent"
        );

        Ok(message)
    }

    /// Open the live event stream for `user_id`
    pub fn stream_messages(&self, user_id: &str) -> Result<Subscription, AppError> {
        validate_id("user_id", user_id)?;
        Ok(self.clients.register(user_id))
    }

    /// Mark messages addressed to `reader_id` as read
    ///
    /// Ids the reader does not receive are ignored. Returns how many rows
    /// changed.
    pub async fn mark_as_read(
        &self,
        message_ids: &[String],
        reader_id: &str,
    ) -> Result<usize, AppError> {
        validate_id("reader_id", reader_id)?;
        if message_ids.len() > MAX_READ_BATCH {
            return Err(AppError::Validation(format!(
                "at most {MAX_READ_BATCH} message ids may be marked at once"
            )));
        }
        for id in message_ids {
            validate_id("message_id", id)?;
        }

        let flipped = self.db.mark_messages_read(message_ids, reader_id).await?;
        if flipped.is_empty() {
            return Ok(0);
        }
        MESSAGES_READ_TOTAL.inc_by(flipped.len() as u64);

        match self.read_receipts {
            ReadReceiptScope::Senders => {
                let mut by_sender: BTreeMap<&str, Vec<Message>> = BTreeMap::new();
                for row in &flipped {
                    by_sender
                        .entry(row.sender_id.as_str())
                        .or_default()
                        .push(row.clone());
                }
                for (sender_id, read) in by_sender {
                    self.clients
                        .publish(&[sender_id], &MessageEvent::messages_read(reader_id, &read));
                }
            }
            ReadReceiptScope::Broadcast => {
                self.clients
                    .broadcast_except(reader_id, &MessageEvent::messages_read(reader_id, &flipped));
            }
        }

        tracing::debug!(reader_id, updated = flipped.len(), "Messages marked as read");

        Ok(flipped.len())
    }

    /// Message history between `user_id` and `friend_id`, newest first
    pub async fn get_messages(
        &self,
        user_id: &str,
        friend_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<MessagePage, AppError> {
        validate_id("user_id", user_id)?;
        validate_id("friend_id", friend_id)?;

        let limit = limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT);
        let offset = offset.unwrap_or(0);
        if offset < 0 {
            return Err(AppError::Validation("offset must not be negative".to_string()));
        }

        let messages = self
            .db
            .get_messages_between(user_id, friend_id, limit, offset)
            .await?;
        let total = self.db.count_messages_between(user_id, friend_id).await?;

        Ok(MessagePage { messages, total })
    }
}
