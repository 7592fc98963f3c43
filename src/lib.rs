//! Yardgate - password and OAuth2/OIDC login in front of a web app
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      HTTP Layer (Axum)                       │
//! │  - /api: auth-info, password login, session probe           │
//! │  - /auth: OAuth begin / callback / logout                   │
//! │  - /health, /metrics                                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Auth Core                              │
//! │  - Signed cookie sessions, HMAC state tokens                │
//! │  - Password hashes (SHA-512 crypt, Argon2)                  │
//! │  - Providers (GitHub, OIDC with lazy discovery), allowlist  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: JSON handlers and the metrics endpoint
//! - `auth`: Sessions, state tokens, providers, middleware
//! - `config`: Configuration management
//! - `error`: Error types
//! - `metrics`: Prometheus registry

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;

use std::sync::Arc;
use std::time::Duration;

use auth::{DiscoveryRetry, OAuthStateManager, ProviderRegistry, SessionManager};

/// Timeout applied to every identity provider request
const PROVIDER_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Largest request body accepted (login payloads are tiny)
const MAX_REQUEST_BODY_BYTES: usize = 16 * 1024;

/// Application state shared across all handlers
///
/// Cheap to clone; everything behind it is immutable apart from the
/// per-provider discovery cache.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Session cookie issuer / validator
    pub sessions: Arc<SessionManager>,

    /// OAuth anti-CSRF state tokens
    pub oauth_state: Arc<OAuthStateManager>,

    /// Configured identity providers
    pub providers: Arc<ProviderRegistry>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Build the provider HTTP client
    /// 2. Build session and state managers from the session secret
    /// 3. Register OAuth providers (OIDC discovery is deferred to first use)
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built or a provider is misconfigured
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let http_client = auth::provider::build_http_client(PROVIDER_HTTP_TIMEOUT)
            .map_err(|e| error::AppError::Internal(e.into()))?;

        let secure = config.server.cookie_secure;
        let sessions = SessionManager::new(
            &config.auth.session_secret,
            config.auth.session_cookie_name.clone(),
            secure,
        );
        let oauth_state = OAuthStateManager::new(&config.auth.session_secret, secure);

        let providers = ProviderRegistry::from_config(
            &config.auth.oauth,
            &http_client,
            DiscoveryRetry::from_secs(config.auth.discovery_retry_secs),
        )
        .map_err(|e| error::AppError::Config(e.to_string()))?;

        tracing::info!(
            users = config.auth.users.len(),
            providers = config.auth.oauth.len(),
            "Application state initialized successfully"
        );

        Ok(Self {
            config: Arc::new(config),
            sessions: Arc::new(sessions),
            oauth_state: Arc::new(oauth_state),
            providers: Arc::new(providers),
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::{Router, middleware};
    use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(auth::auth_router())
        .nest("/api", api::api_router(state.clone()))
        .fallback(not_found)
        .layer(middleware::from_fn(metrics::track_http))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(api::metrics_router())
}

async fn health_check() -> &'static str {
    "OK"
}

async fn not_found() -> error::AppError {
    error::AppError::NotFound
}
