//! Friend graph endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use crate::api::dto::{
    CreateFriendRequest, FriendRequestResponse, FriendResponse, FriendsResponse,
    PendingRequestsResponse, RespondFriendRequest,
};
use crate::data::FriendAction;
use crate::{AppState, auth::CurrentUser, error::AppError};

/// POST /api/friends - Send a friend request
///
/// Target by `receiver_id` or by `friend_email`.
pub async fn create_friend_request(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(req): Json<CreateFriendRequest>,
) -> Result<(StatusCode, Json<FriendRequestResponse>), AppError> {
    let request = match (req.receiver_id.as_deref(), req.friend_email.as_deref()) {
        (Some(receiver_id), None) => {
            state
                .friends
                .create_friend_request(&user_id, receiver_id)
                .await?
        }
        (None, Some(email)) => {
            state
                .friends
                .create_friend_request_by_email(&user_id, email)
                .await?
        }
        _ => {
            return Err(AppError::Validation(
                "exactly one of receiver_id or friend_email is required".to_string(),
            ));
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(FriendRequestResponse {
            friend: request,
            message: None,
        }),
    ))
}

/// GET /api/friends - Accepted friends of the caller
pub async fn get_friends(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<FriendsResponse>, AppError> {
    let friends = state
        .friends
        .get_friends(&user_id)
        .await?
        .into_iter()
        .map(FriendResponse::from)
        .collect();

    Ok(Json(FriendsResponse { friends }))
}

/// GET /api/friends/requests - Pending requests sent or received
pub async fn pending_requests(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<PendingRequestsResponse>, AppError> {
    let requests = state.friends.pending_requests(&user_id).await?;
    Ok(Json(PendingRequestsResponse { requests }))
}

async fn respond(
    state: &AppState,
    user_id: &str,
    request_id: &str,
    action: FriendAction,
) -> Result<Json<FriendRequestResponse>, AppError> {
    let request = state
        .friends
        .respond_to_friend_request(request_id, user_id, action)
        .await?;

    let message = match action {
        FriendAction::Accept => "Friend request accepted",
        FriendAction::Reject => "Friend request rejected",
    };

    Ok(Json(FriendRequestResponse {
        friend: request,
        message: Some(message.to_string()),
    }))
}

/// PUT /api/friends/requests/:id - Accept or reject by `{"action"}`
pub async fn respond_to_request(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(request_id): Path<String>,
    Json(req): Json<RespondFriendRequest>,
) -> Result<Json<FriendRequestResponse>, AppError> {
    respond(&state, &user_id, &request_id, req.action).await
}

/// PUT /api/friends/requests/:id/accept
pub async fn accept_request(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(request_id): Path<String>,
) -> Result<Json<FriendRequestResponse>, AppError> {
    respond(&state, &user_id, &request_id, FriendAction::Accept).await
}

/// PUT /api/friends/requests/:id/reject
pub async fn reject_request(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(request_id): Path<String>,
) -> Result<Json<FriendRequestResponse>, AppError> {
    respond(&state, &user_id, &request_id, FriendAction::Reject).await
}
