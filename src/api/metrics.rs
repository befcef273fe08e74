//! Prometheus metrics endpoint
//!
//! Exposes messaging, friend graph and feed metrics in Prometheus text format.

use axum::{
    Router,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{Encoder, TextEncoder};

use crate::metrics::REGISTRY;

fn render_metrics() -> Result<String, prometheus::Error> {
    TextEncoder::new().encode_to_string(&REGISTRY.gather())
}

/// GET /metrics
async fn metrics_handler() -> Response {
    match render_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, TextEncoder::new().format_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

/// Create metrics router
///
/// Exposes the `/metrics` endpoint without identity checks.
pub fn metrics_router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route("/metrics", get(metrics_handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{MESSAGES_SENT_TOTAL, init_metrics};

    #[test]
    fn rendered_metrics_include_registered_counters() {
        init_metrics();
        MESSAGES_SENT_TOTAL.inc();

        let body = render_metrics().unwrap();
        assert!(body.contains("summer_social_messages_sent_total"));
    }
}
