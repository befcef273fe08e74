//! Data layer module
//!
//! Handles all data persistence:
//! - SQLite database operations (friend graph, conversations, messages)
//! - Read-only access to the user and activity stores

mod database;
mod models;

pub use database::Database;
pub use models::*;
