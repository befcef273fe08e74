//! Identity middleware
//!
//! Protects routes that need a caller identity.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, State},
    http::{HeaderMap, Request, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::AppState;
use crate::error::AppError;
use crate::service::validate_id;

fn extract_identity(headers: &HeaderMap, header_name: &str) -> Result<CurrentUser, AppError> {
    let user_id = headers
        .get(header_name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .ok_or(AppError::Unauthorized)?;

    validate_id("user_id", user_id).map_err(|_| AppError::Unauthorized)?;

    Ok(CurrentUser(user_id.to_owned()))
}

/// Middleware to require a caller identity
///
/// Rejects the request with 401 when the identity header is missing or
/// malformed, otherwise stores the caller in request extensions.
///
/// # Usage
/// ```ignore
/// let protected_routes = Router::new()
///     .route("/api/friends", ...)
///     .layer(middleware::from_fn_with_state(state, require_identity));
/// ```
pub async fn require_identity(
    State(state): State<AppState>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let caller = extract_identity(request.headers(), &state.config.auth.identity_header)?;
    tracing::trace!(user_id = %caller.0, "Caller identified");

    request.extensions_mut().insert(caller);

    Ok(next.run(request).await)
}

/// Extractor for the calling user's id
///
/// # Usage
/// ```ignore
/// async fn handler(CurrentUser(user_id): CurrentUser) -> impl IntoResponse {
///     format!("Hello, {user_id}")
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(caller) = parts.extensions.get::<CurrentUser>().cloned() {
            return Ok(caller);
        }

        let state = AppState::from_ref(state);
        let caller = extract_identity(&parts.headers, &state.config.auth.identity_header)?;
        parts.extensions.insert(caller.clone());

        Ok(caller)
    }
}
