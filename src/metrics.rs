//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Messaging Metrics
    pub static ref MESSAGES_SENT_TOTAL: IntCounter = IntCounter::new(
        "summer_social_messages_sent_total",
        "Total number of messages persisted"
    ).expect("metric can be created");
    pub static ref MESSAGES_READ_TOTAL: IntCounter = IntCounter::new(
        "summer_social_messages_read_total",
        "Total number of messages flipped to read"
    ).expect("metric can be created");
    pub static ref FANOUT_EVENTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("summer_social_fanout_events_total", "Live events offered to connected clients"),
        &["event_type", "outcome"]
    ).expect("metric can be created");
    pub static ref STREAMS_ACTIVE: IntGauge = IntGauge::new(
        "summer_social_streams_active",
        "Current number of registered streaming connections"
    ).expect("metric can be created");

    // Friend Graph Metrics
    pub static ref FRIEND_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("summer_social_friend_requests_total", "Friend request lifecycle transitions"),
        &["transition"]
    ).expect("metric can be created");

    // Feed Metrics
    pub static ref FEED_ITEMS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("summer_social_feed_items_total", "Feed items emitted"),
        &["activity_type"]
    ).expect("metric can be created");
    pub static ref FEED_CHECK_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("summer_social_feed_check_failures_total", "Per-friend feed checks that failed and were skipped"),
        &["activity_type"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("summer_social_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
///
/// Safe to call more than once; later registrations are ignored.
pub fn init_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(MESSAGES_SENT_TOTAL.clone()),
        Box::new(MESSAGES_READ_TOTAL.clone()),
        Box::new(FANOUT_EVENTS_TOTAL.clone()),
        Box::new(STREAMS_ACTIVE.clone()),
        Box::new(FRIEND_REQUESTS_TOTAL.clone()),
        Box::new(FEED_ITEMS_TOTAL.clone()),
        Box::new(FEED_CHECK_FAILURES_TOTAL.clone()),
        Box::new(ERRORS_TOTAL.clone()),
    ];

    for collector in collectors {
        if let Err(error) = REGISTRY.register(collector) {
            tracing::debug!(%error, "Metric already registered");
        }
    }

    tracing::info!("Metrics registry initialized");
}
