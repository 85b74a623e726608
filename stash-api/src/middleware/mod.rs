//! Middleware modules for the Stash API
//!
//! - `auth`: API-key authentication for `/api/v1`
//!
//! Request tracing and metrics live in `telemetry::middleware` and wrap the
//! whole router, so rejected requests are still observed:
//!
//! ```ignore
//! Router::new()
//!     .merge(api.route_layer(middleware::from_fn_with_state(auth_state, auth_middleware)))
//!     .layer(middleware::from_fn(observability_middleware))
//! ```

mod auth;

pub use auth::{auth_middleware, AuthMiddlewareError, AuthMiddlewareState};
