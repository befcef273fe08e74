//! Streaming API endpoint
//!
//! Pushes live message events via Server-Sent Events (SSE)

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use tokio_stream::StreamExt as _;

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::service::MessageEvent;

fn to_sse_event(event: MessageEvent) -> Option<Event> {
    match Event::default()
        .event(event.event_type.as_str())
        .json_data(&event)
    {
        Ok(sse_event) => Some(sse_event),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode stream event");
            None
        }
    }
}

/// GET /api/messages/stream
/// Stream `new_message` and `messages_read` events for the caller
///
/// Opening a second stream for the same user closes the first one.
pub async fn stream_messages(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let subscription = state.messaging.stream_messages(&user_id)?;
    tracing::debug!(
        user_id = subscription.user_id(),
        connection_id = subscription.connection_id(),
        "Message stream opened"
    );

    let stream = subscription.filter_map(to_sse_event).map(Ok);

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
