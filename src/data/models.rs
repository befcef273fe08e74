//! Data models
//!
//! Rust structs representing database rows and ephemeral feed items.
//! Generated IDs use ULID, timestamps use chrono.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

/// Order two user ids so an unordered pair has one canonical form
pub fn sorted_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

// =============================================================================
// User (owned by the user service)
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Friend Graph
// =============================================================================

/// Friend request lifecycle state
///
/// `Accepted` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum FriendRequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl FriendRequestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FriendRequest {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub status: FriendRequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Receiver's answer to a pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendAction {
    Accept,
    Reject,
}

/// Friend edge joined with the friend's user record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FriendSummary {
    pub friend_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    /// When the friendship was created
    pub created_at: DateTime<Utc>,
}

impl FriendSummary {
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}").trim().to_string(),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => self.friend_id.clone(),
        }
    }
}

// =============================================================================
// Messaging
// =============================================================================

/// Direct message between two users
///
/// Immutable once written except for `is_read`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub message_type: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Default message type when the caller gives none
pub const DEFAULT_MESSAGE_TYPE: &str = "text";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: String,
    pub user1_id: String,
    pub user2_id: String,
    pub last_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Conversation seen from one participant, with the other side's details
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ConversationOverview {
    pub id: String,
    pub user1_id: String,
    pub user2_id: String,
    pub last_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub friend_id: String,
    pub friend_first_name: Option<String>,
    pub friend_last_name: Option<String>,
    pub friend_email: Option<String>,
    pub last_message_content: Option<String>,
    pub last_message_sender_id: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    /// Messages from the other side not yet read by the viewer
    pub unread_count: i64,
}

impl ConversationOverview {
    pub fn friend_name(&self) -> String {
        match (&self.friend_first_name, &self.friend_last_name) {
            (Some(first), Some(last)) => format!("{first} {last}").trim().to_string(),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => self.friend_id.clone(),
        }
    }
}

// =============================================================================
// Feed
// =============================================================================

/// Ephemeral friends' activity item, computed per request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedItem {
    pub user_id: String,
    pub user_name: String,
    pub activity_type: String,
    pub activity_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
