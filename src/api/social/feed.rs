//! Friends' activity feed endpoint

use axum::{
    extract::{Query, State},
    response::Json,
};
use chrono::FixedOffset;

use crate::api::dto::{FeedParams, FeedResponse};
use crate::config::MAX_UTC_OFFSET_MINUTES;
use crate::{AppState, auth::CurrentUser, error::AppError};

/// GET /api/feed - Goal-met items for the caller's friends
///
/// `utc_offset_minutes` selects the caller's day; the configured offset
/// applies when absent.
pub async fn get_feed(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(params): Query<FeedParams>,
) -> Result<Json<FeedResponse>, AppError> {
    let offset = match params.utc_offset_minutes {
        None => None,
        Some(minutes) if minutes.unsigned_abs() <= MAX_UTC_OFFSET_MINUTES.unsigned_abs() => {
            FixedOffset::east_opt(minutes * 60)
        }
        Some(_) => {
            return Err(AppError::Validation(
                "utc_offset_minutes is out of range".to_string(),
            ));
        }
    };

    let feed_items = state.feed.friends_activity_feed(&user_id, offset).await?;

    Ok(Json(FeedResponse { feed_items }))
}
