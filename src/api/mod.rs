//! API layer
//!
//! HTTP handlers for:
//! - Login options and password login (JSON)
//! - Session probe
//! - Metrics (Prometheus)

mod auth_info;
mod dto;
pub mod metrics;
mod session;

use axum::{
    Router, middleware,
    routing::{get, post},
};

pub use dto::*;
pub use metrics::metrics_router;

use crate::AppState;
use crate::auth::require_auth;

/// Create the JSON API router, mounted under `/api`
///
/// Routes:
/// - GET /api/auth-info - Available login methods (public)
/// - POST /api/login - Password login (public)
/// - GET /api/me - Current user (requires session)
pub fn api_router(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        .route("/me", get(session::me))
        .route_layer(middleware::from_fn_with_state(state, require_auth));

    Router::new()
        .route("/auth-info", get(auth_info::auth_info))
        .route("/login", post(session::login))
        .merge(protected)
}
