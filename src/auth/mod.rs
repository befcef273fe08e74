//! Caller identity
//!
//! Authentication happens upstream; this module only reads the verified
//! user id the gateway forwards in a request header.

mod middleware;

pub use middleware::{CurrentUser, require_identity};
