//! Axum Middleware for API-Key Authentication
//!
//! Every request under `/api/v1` must carry the configured service key in
//! the `Authorization` header, verbatim. Returns 401 otherwise, including
//! when the header is missing. An unset key accepts nothing.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::ServiceKey;
use crate::error::ApiError;

// ============================================================================
// MIDDLEWARE STATE
// ============================================================================

/// Shared state for the authentication middleware.
#[derive(Debug, Clone)]
pub struct AuthMiddlewareState {
    api_key: ServiceKey,
}

impl AuthMiddlewareState {
    pub fn new(api_key: ServiceKey) -> Self {
        Self { api_key }
    }

    fn accepts(&self, presented: Option<&str>) -> bool {
        !self.api_key.is_empty()
            && presented
                .is_some_and(|value| keys_match(value.as_bytes(), self.api_key.expose().as_bytes()))
    }
}

/// Compare without short-circuiting on the first differing byte.
fn keys_match(presented: &[u8], expected: &[u8]) -> bool {
    presented.len() == expected.len()
        && presented
            .iter()
            .zip(expected)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

// ============================================================================
// MIDDLEWARE FUNCTION
// ============================================================================

/// Axum middleware for API-key authentication.
///
/// ```ignore
/// use axum::{middleware, Router};
///
/// let auth_state = AuthMiddlewareState::new(config.api_key.clone());
/// let app = Router::new()
///     .route("/download/:object_id/:object_type", get(download))
///     .layer(middleware::from_fn_with_state(auth_state, auth_middleware));
/// ```
pub async fn auth_middleware(
    State(state): State<AuthMiddlewareState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthMiddlewareError> {
    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    if !state.accepts(presented) {
        tracing::debug!(
            path = %request.uri().path(),
            has_header = presented.is_some(),
            "Rejected request with invalid API key"
        );
        return Err(AuthMiddlewareError(ApiError::unauthorized(
            "Authentication required: provide a valid key in the Authorization header",
        )));
    }

    Ok(next.run(request).await)
}

// ============================================================================
// ERROR TYPE
// ============================================================================

/// Error returned by the authentication middleware.
#[derive(Debug)]
pub struct AuthMiddlewareError(pub ApiError);

impl IntoResponse for AuthMiddlewareError {
    fn into_response(self) -> Response {
        self.0.into_response()
    }
}
