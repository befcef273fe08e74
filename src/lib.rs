//! Summer Social - friend graph and real-time messaging service
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - Messages, conversations, friends, feed                   │
//! │  - SSE message stream                                       │
//! │  - Metrics (Prometheus)                                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Friend graph state machine                               │
//! │  - Conversation registry                                    │
//! │  - Message fanout (client registry)                         │
//! │  - Feed aggregator                                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx)                                            │
//! │  - Read-only user and activity stores                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers
//! - `service`: Business logic layer
//! - `data`: Database layer
//! - `auth`: Caller identity extraction
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus instruments

pub mod api;
pub mod auth;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod service;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// Cloned for each request; every member is reference counted.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// Connected message streams
    pub clients: Arc<service::ClientRegistry>,

    pub friends: Arc<service::FriendService>,
    pub conversations: Arc<service::ConversationRegistry>,
    pub messaging: Arc<service::MessagingService>,
    pub feed: Arc<service::FeedAggregator>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite database (migrations applied)
    /// 2. Wire services around the shared database and client registry
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let db = data::Database::connect(&config.database.path).await?;
        tracing::info!(path = %config.database.path.display(), "Database connected");

        Self::with_database(config, db)
    }

    /// Build state around an already connected database
    pub fn with_database(
        config: config::AppConfig,
        db: data::Database,
    ) -> Result<Self, error::AppError> {
        config.validate()?;

        let db = Arc::new(db);
        let clients = Arc::new(service::ClientRegistry::new(
            config.messaging.queue_capacity,
        ));
        let friends = Arc::new(service::FriendService::new(db.clone()));
        let conversations = Arc::new(service::ConversationRegistry::new(db.clone()));
        let messaging = Arc::new(service::MessagingService::new(
            db.clone(),
            conversations.clone(),
            clients.clone(),
            config.messaging.read_receipts,
        ));
        let feed = Arc::new(service::FeedAggregator::from_config(
            &config.feed,
            friends.clone(),
            db.clone(),
        )?);

        tracing::info!(
            queue_capacity = config.messaging.queue_capacity,
            read_receipts = ?config.messaging.read_receipts,
            feed_utc_offset_minutes = config.feed.utc_offset_minutes,
            "Application state initialized successfully"
        );

        Ok(Self {
            config: Arc::new(config),
            db,
            clients,
            friends,
            conversations,
            messaging,
            feed,
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use tower_http::trace::TraceLayer;

    let cors_layer = build_cors_layer(&state.config.server);

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest("/api", api::social_api_router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(state)
        .merge(api::metrics_router())
}

fn build_cors_layer(server: &config::ServerConfig) -> tower_http::cors::CorsLayer {
    use axum::http::HeaderValue;
    use tower_http::cors::{Any, CorsLayer};

    if server.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = server
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::error!(%error, origin = %origin, "Ignoring unparsable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "healthy" }))
}
