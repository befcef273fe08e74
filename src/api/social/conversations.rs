//! Conversations endpoints

use axum::{extract::State, response::Json};

use crate::api::dto::{ConversationResponse, ConversationsResponse};
use crate::{AppState, auth::CurrentUser, error::AppError};

/// GET /api/conversations - Conversations of the caller
///
/// Most recently active first, each with the other participant and the
/// caller's unread count.
pub async fn get_conversations(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<ConversationsResponse>, AppError> {
    let conversations = state
        .conversations
        .conversations_for(&user_id)
        .await?
        .into_iter()
        .map(ConversationResponse::from)
        .collect();

    Ok(Json(ConversationsResponse { conversations }))
}
