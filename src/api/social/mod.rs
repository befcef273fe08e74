//! Social API endpoints
//!
//! Messaging, friends and the friends' activity feed. Every route needs
//! a caller identity.

use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::AppState;
use crate::auth::require_identity;

pub mod conversations;
pub mod feed;
pub mod friends;
pub mod messages;
pub mod streaming;

/// Create the social API router, mounted under `/api`
pub fn social_api_router(state: AppState) -> Router<AppState> {
    Router::new()
        // Messaging
        .route("/messages", post(messages::send_message))
        .route("/messages/read", put(messages::mark_as_read))
        .route("/messages/stream", get(streaming::stream_messages))
        .route("/messages/:friend_id", get(messages::get_messages))
        .route("/conversations", get(conversations::get_conversations))
        // Friends
        .route(
            "/friends",
            post(friends::create_friend_request).get(friends::get_friends),
        )
        .route("/friends/requests", get(friends::pending_requests))
        .route("/friends/requests/:id", put(friends::respond_to_request))
        .route("/friends/requests/:id/accept", put(friends::accept_request))
        .route("/friends/requests/:id/reject", put(friends::reject_request))
        // Feed
        .route("/feed", get(feed::get_feed))
        .layer(middleware::from_fn_with_state(state, require_identity))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::config::tests::valid_config;
    use crate::data::Database;
    use crate::{AppState, build_router};

    async fn router() -> axum::Router {
        let db = Database::connect_in_memory().await.unwrap();
        let state = AppState::with_database(valid_config(), db).unwrap();
        build_router(state)
    }

    #[tokio::test]
    async fn identity_header_is_required() {
        let response = router()
            .await
            .oneshot(Request::get("/api/friends").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn identified_caller_reaches_handlers() {
        let response = router()
            .await
            .oneshot(
                Request::get("/api/feed")
                    .header("x-user-id", "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn out_of_range_feed_offset_is_rejected() {
        let response = router()
            .await
            .oneshot(
                Request::get("/api/feed?utc_offset_minutes=900")
                    .header("x-user-id", "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn most_negative_feed_offset_is_rejected() {
        let response = router()
            .await
            .oneshot(
                Request::get("/api/feed?utc_offset_minutes=-2147483648")
                    .header("x-user-id", "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
