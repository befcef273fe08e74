//! API layer
//!
//! HTTP handlers for:
//! - Social API (messages, conversations, friends, feed)
//! - Message stream (SSE)
//! - Metrics (Prometheus)

mod dto;
pub mod metrics;
mod social;

pub use dto::*;

pub use metrics::metrics_router;
pub use social::social_api_router;
