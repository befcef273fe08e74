//! Service layer
//!
//! Contains business logic separated from HTTP handlers.
//! Services orchestrate the database and the live client registry.

mod conversations;
mod fanout;
mod feed;
mod friends;
mod messaging;

pub use conversations::ConversationRegistry;
pub use fanout::{ClientRegistry, EventType, MessageEvent, ReadReceipt, Subscription};
pub use feed::{
    ActivityCheck, ActivityStore, DayWindow, FeedAggregator, HydrationGoalCheck, StepGoalCheck,
};
pub use friends::FriendService;
pub use messaging::{MessagePage, MessagingService};

use crate::error::AppError;

/// Longest user or entity id accepted from callers
pub const MAX_ID_LEN: usize = 128;

/// Check an externally supplied identifier
///
/// Ids are opaque, but must be non-empty, bounded, and free of
/// whitespace and control characters.
pub fn validate_id(field: &str, value: &str) -> Result<(), AppError> {
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    if value.len() > MAX_ID_LEN {
        return Err(AppError::Validation(format!(
            "{field} must be at most {MAX_ID_LEN} bytes"
        )));
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(AppError::Validation(format!("{field} is malformed")));
    }
    Ok(())
}
