//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub messaging: MessagingConfig,
    pub feed: FeedConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8083)
    pub port: u16,
    /// Origins allowed for browser clients; empty allows any
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Caller identity configuration
///
/// Identity is verified upstream; this service only reads it.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Header carrying the verified caller id (e.g., "x-user-id")
    pub identity_header: String,
}

/// Who receives `messages_read` events
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReadReceiptScope {
    /// Only the senders of the messages that were flipped
    #[default]
    Senders,
    /// Every other connected client
    Broadcast,
}

/// Live messaging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MessagingConfig {
    /// Per-connection outbound event queue capacity
    pub queue_capacity: usize,
    /// Delivery scope of read receipts
    #[serde(default)]
    pub read_receipts: ReadReceiptScope,
}

/// Friends' activity feed configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Daily hydration goal in millilitres
    pub water_goal_ml: f64,
    /// Daily step goal
    pub step_goal: i64,
    /// Emit step goal items alongside hydration
    #[serde(default)]
    pub step_check_enabled: bool,
    /// Default reference offset for "today" when the request gives none
    pub utc_offset_minutes: i32,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

/// Largest UTC offset accepted for the feed day window (14 hours)
pub const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (SUMMER_SOCIAL__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8083)?
            .set_default("database.path", "data/social.db")?
            .set_default("auth.identity_header", "x-user-id")?
            .set_default("messaging.queue_capacity", 100)?
            .set_default("messaging.read_receipts", "senders")?
            .set_default("feed.water_goal_ml", 2000.0)?
            .set_default("feed.step_goal", 10000)?
            .set_default("feed.step_check_enabled", false)?
            .set_default("feed.utc_offset_minutes", 0)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("SUMMER_SOCIAL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        if self.auth.identity_header.trim().is_empty() {
            return Err(AppError::Config(
                "auth.identity_header must not be empty".to_string(),
            ));
        }

        if axum::http::HeaderName::from_bytes(self.auth.identity_header.as_bytes()).is_err() {
            return Err(AppError::Config(format!(
                "auth.identity_header is not a valid header name: {}",
                self.auth.identity_header
            )));
        }

        if self.messaging.queue_capacity == 0 {
            return Err(AppError::Config(
                "messaging.queue_capacity must be greater than 0".to_string(),
            ));
        }

        if !(self.feed.water_goal_ml > 0.0) {
            return Err(AppError::Config(
                "feed.water_goal_ml must be greater than 0".to_string(),
            ));
        }

        if self.feed.step_goal <= 0 {
            return Err(AppError::Config(
                "feed.step_goal must be greater than 0".to_string(),
            ));
        }

        if self.feed.utc_offset_minutes.unsigned_abs() > MAX_UTC_OFFSET_MINUTES.unsigned_abs() {
            return Err(AppError::Config(format!(
                "feed.utc_offset_minutes must be within ±{}",
                MAX_UTC_OFFSET_MINUTES
            )));
        }

        Ok(())
    }
}
