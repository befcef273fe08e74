//! Direct message endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};

use crate::api::dto::{
    MarkAsReadRequest, MarkAsReadResponse, MessageHistoryParams, SendMessageRequest,
    SendMessageResponse,
};
use crate::service::MessagePage;
use crate::{AppState, auth::CurrentUser, error::AppError};

/// POST /api/messages - Send a direct message
pub async fn send_message(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<SendMessageResponse>), AppError> {
    let message = state
        .messaging
        .send_message(
            &user_id,
            &req.receiver_id,
            &req.content,
            req.message_type.as_deref(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            message,
            success: true,
        }),
    ))
}

/// GET /api/messages/:friend_id - Message history with a friend
///
/// Newest first. `limit` defaults to 50 and is clamped to 100.
pub async fn get_messages(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(friend_id): Path<String>,
    Query(params): Query<MessageHistoryParams>,
) -> Result<Json<MessagePage>, AppError> {
    let page = state
        .messaging
        .get_messages(&user_id, &friend_id, params.limit, params.offset)
        .await?;

    Ok(Json(page))
}

/// PUT /api/messages/read - Mark received messages as read
pub async fn mark_as_read(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<MarkAsReadRequest>,
) -> Result<Json<MarkAsReadResponse>, AppError> {
    let updated = state
        .messaging
        .mark_as_read(&req.message_ids, &user_id)
        .await?;

    Ok(Json(MarkAsReadResponse {
        success: true,
        updated,
    }))
}
