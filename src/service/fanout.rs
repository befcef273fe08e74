//! Live event fanout
//!
//! Keeps one bounded outbound queue per connected user. Publishing never
//! blocks: a full queue drops the event for that recipient. Delivery is
//! at-most-once; the message history stays the source of truth.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::data::Message;
use crate::metrics::{FANOUT_EVENTS_TOTAL, STREAMS_ACTIVE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    NewMessage,
    MessagesRead,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewMessage => "new_message",
            Self::MessagesRead => "messages_read",
        }
    }
}

/// Messages a reader has just marked as read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub reader_id: String,
    pub message_ids: Vec<String>,
}

/// Event pushed to a connected client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<ReadReceipt>,
}

impl MessageEvent {
    pub fn new_message(message: Message) -> Self {
        Self {
            event_type: EventType::NewMessage,
            message: Some(message),
            receipt: None,
        }
    }

    /// Receipt for `read`, carrying the newest of the read messages
    pub fn messages_read(reader_id: &str, read: &[Message]) -> Self {
        Self {
            event_type: EventType::MessagesRead,
            message: read.iter().max_by_key(|message| message.created_at).cloned(),
            receipt: Some(ReadReceipt {
                reader_id: reader_id.to_string(),
                message_ids: read.iter().map(|message| message.id.clone()).collect(),
            }),
        }
    }
}

struct ClientSlot {
    connection_id: u64,
    sender: mpsc::Sender<MessageEvent>,
}

/// Registry of connected clients
///
/// Registration and removal take the write lock; publishing takes the
/// read lock only for the lookup and a non-blocking `try_send`.
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, ClientSlot>>,
    capacity: usize,
    next_connection_id: AtomicU64,
}

impl ClientRegistry {
    /// Create a registry whose per-user queues hold `capacity` events
    pub fn new(capacity: usize) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            next_connection_id: AtomicU64::new(1),
        }
    }

    /// Register a connection for `user_id`
    ///
    /// Replaces any previous connection for the same user; the replaced
    /// subscription ends once its buffered events are drained.
    pub fn register(self: &Arc<Self>, user_id: &str) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let connection_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);

        let replaced = {
            let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
            clients.insert(
                user_id.to_string(),
                ClientSlot {
                    connection_id,
                    sender,
                },
            )
        };

        match replaced {
            Some(previous) => tracing::info!(
                user_id,
                connection_id,
                replaced_connection_id = previous.connection_id,
                "Client stream replaced"
            ),
            None => {
                STREAMS_ACTIVE.inc();
                tracing::info!(user_id, connection_id, "Client stream registered");
            }
        }

        Subscription {
            user_id: user_id.to_string(),
            connection_id,
            receiver,
            registry: Arc::downgrade(self),
        }
    }

    /// Remove the user's queue if it still belongs to `connection_id`
    pub fn unregister(&self, user_id: &str, connection_id: u64) -> bool {
        let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
        let owned = clients
            .get(user_id)
            .is_some_and(|slot| slot.connection_id == connection_id);

        if owned {
            clients.remove(user_id);
            STREAMS_ACTIVE.dec();
            tracing::info!(user_id, connection_id, "Client stream unregistered");
        }

        owned
    }

    pub fn is_connected(&self, user_id: &str) -> bool {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(user_id)
    }

    pub fn connected_count(&self) -> usize {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Offer `event` to each listed user that is connected
    ///
    /// Returns how many queues accepted it. Duplicate ids are offered once.
    pub fn publish(&self, user_ids: &[&str], event: &MessageEvent) -> usize {
        let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);
        let mut delivered = 0;

        for (index, user_id) in user_ids.iter().enumerate() {
            if user_ids[..index].contains(user_id) {
                continue;
            }
            if let Some(slot) = clients.get(*user_id) {
                if offer(user_id, slot, event) {
                    delivered += 1;
                }
            }
        }

        delivered
    }

    /// Offer `event` to every connected user except `excluded_user_id`
    pub fn broadcast_except(&self, excluded_user_id: &str, event: &MessageEvent) -> usize {
        let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);

        clients
            .iter()
            .filter(|(user_id, _)| user_id.as_str() != excluded_user_id)
            .filter(|(user_id, slot)| offer(user_id, slot, event))
            .count()
    }
}

fn offer(user_id: &str, slot: &ClientSlot, event: &MessageEvent) -> bool {
    let event_type = event.event_type.as_str();
    match slot.sender.try_send(event.clone()) {
        Ok(()) => {
            FANOUT_EVENTS_TOTAL
                .with_label_values(&[event_type, "delivered"])
                .inc();
            true
        }
        Err(TrySendError::Full(_)) => {
            FANOUT_EVENTS_TOTAL
                .with_label_values(&[event_type, "dropped"])
                .inc();
            tracing::warn!(user_id, event_type, "Client event queue is full; event dropped");
            false
        }
        Err(TrySendError::Closed(_)) => {
            FANOUT_EVENTS_TOTAL
                .with_label_values(&[event_type, "closed"])
                .inc();
            tracing::debug!(user_id, event_type, "Client stream closed before delivery");
            false
        }
    }
}

/// One live connection's view of its queue
///
/// Yields events until the queue is replaced or the subscription is
/// dropped; dropping it removes the queue from the registry.
pub struct Subscription {
    user_id: String,
    connection_id: u64,
    receiver: mpsc::Receiver<MessageEvent>,
    registry: Weak<ClientRegistry>,
}

impl Subscription {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Next event, or `None` once the queue has been closed
    pub async fn recv(&mut self) -> Option<MessageEvent> {
        self.receiver.recv().await
    }
}

impl Stream for Subscription {
    type Item = MessageEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(&self.user_id, self.connection_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(content: &str) -> Message {
        let now = Utc::now();
        Message {
            id: crate::data::EntityId::new().0,
            sender_id: "alice".to_string(),
            receiver_id: "bob".to_string(),
            content: content.to_string(),
            message_type: "text".to_string(),
            is_read: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn publish_reaches_registered_users_only() {
        let registry = Arc::new(ClientRegistry::new(4));
        let mut bob = registry.register("bob");

        let delivered = registry.publish(&["bob", "carol"], &MessageEvent::new_message(message("hi")));
        assert_eq!(delivered, 1);

        let event = bob.recv().await.unwrap();
        assert_eq!(event.event_type, EventType::NewMessage);
        assert_eq!(event.message.unwrap().content, "hi");
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let registry = Arc::new(ClientRegistry::new(2));
        let mut bob = registry.register("bob");

        let event = MessageEvent::new_message(message("x"));
        assert_eq!(registry.publish(&["bob"], &event), 1);
        assert_eq!(registry.publish(&["bob"], &event), 1);
        assert_eq!(registry.publish(&["bob"], &event), 0);

        assert!(bob.recv().await.is_some());
        assert!(bob.recv().await.is_some());
        assert!(bob.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn duplicate_recipients_receive_one_copy() {
        let registry = Arc::new(ClientRegistry::new(4));
        let mut alice = registry.register("alice");

        let delivered = registry.publish(&["alice", "alice"], &MessageEvent::new_message(message("self")));
        assert_eq!(delivered, 1);
        assert!(alice.recv().await.is_some());
        assert!(alice.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropping_subscription_unregisters() {
        let registry = Arc::new(ClientRegistry::new(4));
        let bob = registry.register("bob");
        assert!(registry.is_connected("bob"));

        drop(bob);
        assert!(!registry.is_connected("bob"));
        assert_eq!(registry.connected_count(), 0);
    }

    #[tokio::test]
    async fn new_connection_replaces_old_one() {
        let registry = Arc::new(ClientRegistry::new(4));
        let mut first = registry.register("bob");
        let mut second = registry.register("bob");
        assert_ne!(first.connection_id(), second.connection_id());

        // the replaced queue is closed
        assert!(first.recv().await.is_none());

        // ending the old subscription must not remove the new queue
        drop(first);
        assert!(registry.is_connected("bob"));

        registry.publish(&["bob"], &MessageEvent::new_message(message("again")));
        assert!(second.recv().await.is_some());
    }

    #[tokio::test]
    async fn broadcast_skips_the_excluded_user() {
        let registry = Arc::new(ClientRegistry::new(4));
        let mut alice = registry.register("alice");
        let mut carol = registry.register("carol");
        let mut bob = registry.register("bob");

        let event = MessageEvent::messages_read("bob", &[message("m1")]);
        assert_eq!(registry.broadcast_except("bob", &event), 2);

        assert_eq!(alice.recv().await.unwrap().event_type, EventType::MessagesRead);
        assert_eq!(carol.recv().await.unwrap().event_type, EventType::MessagesRead);
        assert!(bob.receiver.try_recv().is_err());
    }

    #[test]
    fn event_serializes_with_snake_case_type() {
        let read = message("m1");
        let event = MessageEvent::messages_read("bob", &[read.clone()]);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "messages_read");
        assert_eq!(json["receipt"]["reader_id"], "bob");
        assert_eq!(json["receipt"]["message_ids"][0], read.id.as_str());
        assert_eq!(json["message"]["receiver_id"], "bob");
    }
}
