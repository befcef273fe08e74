//! Friend graph service
//!
//! Owns the friend request lifecycle (`pending` → `accepted` | `rejected`)
//! and the symmetric friend edges written on acceptance.

use std::sync::Arc;

use chrono::Utc;

use super::validate_id;
use crate::data::{
    Database, EntityId, FriendAction, FriendRequest, FriendRequestStatus, FriendSummary,
};
use crate::error::{AppError, ConflictKind};
use crate::metrics::FRIEND_REQUESTS_TOTAL;

/// Friend graph service
pub struct FriendService {
    db: Arc<Database>,
}

impl FriendService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Send a friend request from `sender_id` to `receiver_id`
    ///
    /// # Errors
    /// - `Conflict(SelfRequest)` when both ids are equal
    /// - `NotFound` when the receiver does not exist
    /// - `Conflict(AlreadyFriends)` when an edge links the pair
    /// - `Conflict(DuplicateRequest)` when a pending request exists either way
    pub async fn create_friend_request(
        &self,
        sender_id: &str,
        receiver_id: &str,
    ) -> Result<FriendRequest, AppError> {
        validate_id("sender_id", sender_id)?;
        validate_id("receiver_id", receiver_id)?;

        if sender_id == receiver_id {
            return Err(AppError::Conflict(ConflictKind::SelfRequest));
        }

        if self.db.get_user(receiver_id).await?.is_none() {
            return Err(AppError::NotFound);
        }

        if self.db.are_friends(sender_id, receiver_id).await? {
            return Err(AppError::Conflict(ConflictKind::AlreadyFriends));
        }

        if self
            .db
            .find_pending_request_between(sender_id, receiver_id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(ConflictKind::DuplicateRequest));
        }

        let now = Utc::now();
        let request = FriendRequest {
            id: EntityId::new().0,
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            status: FriendRequestStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_friend_request(&request).await?;

        FRIEND_REQUESTS_TOTAL.with_label_values(&["created"]).inc();
        tracing::info!(
            request_id = %request.id,
            sender_id,
            receiver_id,
            "Friend request created"
        );

        Ok(request)
    }

    /// Send a friend request to the user registered under `email`
    pub async fn create_friend_request_by_email(
        &self,
        sender_id: &str,
        email: &str,
    ) -> Result<FriendRequest, AppError> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(AppError::Validation("friend_email is malformed".to_string()));
        }

        let receiver = self
            .db
            .get_user_by_email(email)
            .await?
            .ok_or(AppError::NotFound)?;

        self.create_friend_request(sender_id, &receiver.id).await
    }

    /// Accept or reject a request addressed to `responder_id`
    ///
    /// Anyone other than the receiver sees `NotFound`, exactly as for an
    /// unknown id.
    pub async fn respond_to_friend_request(
        &self,
        request_id: &str,
        responder_id: &str,
        action: FriendAction,
    ) -> Result<FriendRequest, AppError> {
        validate_id("request_id", request_id)?;
        validate_id("responder_id", responder_id)?;

        let request = self
            .db
            .get_friend_request_for_receiver(request_id, responder_id)
            .await?
            .ok_or(AppError::NotFound)?;

        if request.status.is_terminal() {
            return Err(AppError::Conflict(ConflictKind::NotPending));
        }

        match action {
            FriendAction::Reject => {
                if !self
                    .db
                    .reject_friend_request(request_id, responder_id)
                    .await?
                {
                    // answered concurrently
                    return Err(AppError::Conflict(ConflictKind::NotPending));
                }

                FRIEND_REQUESTS_TOTAL.with_label_values(&["rejected"]).inc();
                tracing::info!(request_id, responder_id, "Friend request rejected");

                self.db
                    .get_friend_request(request_id)
                    .await?
                    .ok_or(AppError::NotFound)
            }
            FriendAction::Accept => {
                let accepted = match self
                    .db
                    .accept_friend_request(request_id, responder_id)
                    .await
                {
                    Ok(Some(accepted)) => accepted,
                    Ok(None) => return Err(AppError::Conflict(ConflictKind::NotPending)),
                    Err(error) => {
                        FRIEND_REQUESTS_TOTAL
                            .with_label_values(&["accept_failed"])
                            .inc();
                        tracing::error!(
                            request_id,
                            responder_id,
                            error = %error,
                            "Friend request accept rolled back"
                        );
                        return Err(error);
                    }
                };

                FRIEND_REQUESTS_TOTAL.with_label_values(&["accepted"]).inc();
                tracing::info!(
                    request_id,
                    sender_id = %accepted.sender_id,
                    receiver_id = %accepted.receiver_id,
                    "Friend request accepted"
                );

                Ok(accepted)
            }
        }
    }

    /// Accepted friends of `user_id`
    pub async fn get_friends(&self, user_id: &str) -> Result<Vec<FriendSummary>, AppError> {
        validate_id("user_id", user_id)?;
        self.db.get_friends(user_id).await
    }

    /// Pending requests the user sent or received
    pub async fn pending_requests(&self, user_id: &str) -> Result<Vec<FriendRequest>, AppError> {
        validate_id("user_id", user_id)?;
        self.db.get_pending_requests(user_id).await
    }
}
