//! Data Transfer Objects for the social API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::{ConversationOverview, FeedItem, FriendAction, FriendRequest, FriendSummary, Message};

// =============================================================================
// Messages
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    pub receiver_id: String,
    pub content: String,
    #[serde(default)]
    pub message_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendMessageResponse {
    pub message: Message,
    pub success: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageHistoryParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkAsReadRequest {
    pub message_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarkAsReadResponse {
    pub success: bool,
    pub updated: usize,
}

// =============================================================================
// Conversations
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct LastMessageResponse {
    pub id: String,
    pub sender_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationResponse {
    pub id: String,
    pub user1_id: String,
    pub user2_id: String,
    pub friend_id: String,
    pub friend_name: String,
    pub friend_email: Option<String>,
    pub last_message: Option<LastMessageResponse>,
    pub unread_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ConversationOverview> for ConversationResponse {
    fn from(overview: ConversationOverview) -> Self {
        let friend_name = overview.friend_name();
        let last_message = match (
            overview.last_message_id,
            overview.last_message_sender_id,
            overview.last_message_content,
            overview.last_message_at,
        ) {
            (Some(id), Some(sender_id), Some(content), Some(created_at)) => {
                Some(LastMessageResponse {
                    id,
                    sender_id,
                    content,
                    created_at,
                })
            }
            _ => None,
        };

        Self {
            id: overview.id,
            user1_id: overview.user1_id,
            user2_id: overview.user2_id,
            friend_id: overview.friend_id,
            friend_name,
            friend_email: overview.friend_email,
            last_message,
            unread_count: overview.unread_count,
            created_at: overview.created_at,
            updated_at: overview.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<ConversationResponse>,
}

// =============================================================================
// Friends
// =============================================================================

/// Body of `POST /api/friends`; exactly one target field is required
#[derive(Debug, Clone, Deserialize)]
pub struct CreateFriendRequest {
    #[serde(default)]
    pub receiver_id: Option<String>,
    #[serde(default)]
    pub friend_email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RespondFriendRequest {
    pub action: FriendAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct FriendRequestResponse {
    pub friend: FriendRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingRequestsResponse {
    pub requests: Vec<FriendRequest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FriendResponse {
    pub friend_id: String,
    pub friend_name: String,
    pub friend_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<FriendSummary> for FriendResponse {
    fn from(summary: FriendSummary) -> Self {
        Self {
            friend_name: summary.display_name(),
            friend_id: summary.friend_id,
            friend_email: summary.email,
            created_at: summary.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FriendsResponse {
    pub friends: Vec<FriendResponse>,
}

// =============================================================================
// Feed
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct FeedParams {
    pub utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedResponse {
    pub feed_items: Vec<FeedItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overview() -> ConversationOverview {
        let now = Utc::now();
        ConversationOverview {
            id: "c1".to_string(),
            user1_id: "alice".to_string(),
            user2_id: "bob".to_string(),
            last_message_id: None,
            created_at: now,
            updated_at: now,
            friend_id: "bob".to_string(),
            friend_first_name: Some("Bob".to_string()),
            friend_last_name: Some("Smith".to_string()),
            friend_email: Some("bob@example.com".to_string()),
            last_message_content: None,
            last_message_sender_id: None,
            last_message_at: None,
            unread_count: 0,
        }
    }

    #[test]
    fn conversation_without_messages_has_no_last_message() {
        let response = ConversationResponse::from(overview());
        assert_eq!(response.friend_name, "Bob Smith");
        assert!(response.last_message.is_none());
    }

    #[test]
    fn conversation_carries_last_message() {
        let now = Utc::now();
        let response = ConversationResponse::from(ConversationOverview {
            last_message_id: Some("m1".to_string()),
            last_message_sender_id: Some("bob".to_string()),
            last_message_content: Some("hey".to_string()),
            last_message_at: Some(now),
            unread_count: 1,
            ..overview()
        });

        let last = response.last_message.unwrap();
        assert_eq!(last.content, "hey");
        assert_eq!(response.unread_count, 1);
    }

    #[test]
    fn respond_action_is_lowercase() {
        let body: RespondFriendRequest = serde_json::from_str(r#"{"action":"reject"}"#).unwrap();
        assert_eq!(body.action, FriendAction::Reject);
        assert!(serde_json::from_str::<RespondFriendRequest>(r#"{"action":"block"}"#).is_err());
    }
}
