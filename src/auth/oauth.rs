//! OAuth login flow
//!
//! Implements the OAuth 2.0 authorization code flow for every configured
//! provider. Browser-facing: every outcome is a 307 redirect, failures land on
//! `/?error=<code>`.

use axum::{
    Router,
    extract::{Path, Query, State, rejection::QueryRejection},
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use super::allowlist::is_allowed;
use crate::AppState;
use crate::metrics::record_login;

/// Create authentication router
///
/// Routes:
/// - GET /auth/logout - Clear the session
/// - GET /auth/:provider - Redirect to the provider
/// - GET /auth/:provider/callback - OAuth callback
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/auth/logout", get(logout))
        .route("/auth/:provider", get(begin))
        .route("/auth/:provider/callback", get(callback))
}

/// Error codes surfaced to the frontend as `/?error=<code>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoginFailure {
    UnknownProvider,
    OAuthFailed,
    AccessDenied,
    SessionFailed,
}

impl LoginFailure {
    fn code(self) -> &'static str {
        match self {
            LoginFailure::UnknownProvider => "unknown_provider",
            LoginFailure::OAuthFailed => "oauth_failed",
            LoginFailure::AccessDenied => "access_denied",
            LoginFailure::SessionFailed => "session_failed",
        }
    }

    fn outcome(self) -> &'static str {
        match self {
            LoginFailure::AccessDenied => "denied",
            _ => "failed",
        }
    }

    fn redirect(self) -> Redirect {
        record_login("oauth", self.outcome());
        Redirect::temporary(&format!("/?error={}", self.code()))
    }
}

// =============================================================================
// Begin
// =============================================================================

/// GET /auth/:provider
///
/// # Steps
/// 1. Look up the provider
/// 2. Generate the signed state and store it in a cookie
/// 3. Redirect to the provider's authorization endpoint
async fn begin(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    jar: CookieJar,
) -> Response {
    let Some(entry) = state.providers.get(&slug) else {
        tracing::warn!(provider = %slug, "Login requested for unknown provider");
        return LoginFailure::UnknownProvider.redirect().into_response();
    };

    let (jar, token) = match state.oauth_state.generate(jar) {
        Ok(generated) => generated,
        Err(error) => {
            tracing::error!(provider = %slug, %error, "Failed to generate OAuth state");
            return LoginFailure::OAuthFailed.redirect().into_response();
        }
    };

    match entry.provider.auth_code_url(&token).await {
        Ok(url) => {
            tracing::debug!(provider = %slug, "Redirecting to provider");
            (jar, Redirect::temporary(url.as_str())).into_response()
        }
        Err(error) => {
            tracing::error!(provider = %slug, %error, "Failed to build authorization URL");
            LoginFailure::OAuthFailed.redirect().into_response()
        }
    }
}

// =============================================================================
// Callback
// =============================================================================

/// Query parameters the provider sends back
#[derive(Debug, Default, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    /// Set instead of `code` when the user declined or the provider failed
    error: Option<String>,
    error_description: Option<String>,
}

/// GET /auth/:provider/callback
///
/// # Steps
/// 1. Verify the anti-CSRF state (the state cookie is cleared either way,
///    including when the query itself does not parse)
/// 2. Exchange the code for an access token
/// 3. Fetch the user from the provider
/// 4. Check the provider's allowlist
/// 5. Create the session and redirect home
async fn callback(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    query: Result<Query<CallbackQuery>, QueryRejection>,
    jar: CookieJar,
) -> Response {
    let Some(entry) = state.providers.get(&slug) else {
        tracing::warn!(provider = %slug, "Callback for unknown provider");
        return LoginFailure::UnknownProvider.redirect().into_response();
    };

    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            tracing::warn!(provider = %slug, reason = %rejection.body_text(), "Malformed callback query");
            let jar = state.oauth_state.discard(jar);
            return (jar, LoginFailure::OAuthFailed.redirect()).into_response();
        }
    };

    let (jar, verified) = state
        .oauth_state
        .validate(jar, query.state.as_deref().unwrap_or_default());
    if let Err(reason) = verified {
        tracing::warn!(provider = %slug, %reason, "OAuth state rejected");
        return (jar, LoginFailure::OAuthFailed.redirect()).into_response();
    }

    if let Some(error) = query.error.as_deref() {
        tracing::warn!(
            provider = %slug,
            error,
            description = query.error_description.as_deref().unwrap_or_default(),
            "Provider returned an error"
        );
        return (jar, LoginFailure::OAuthFailed.redirect()).into_response();
    }

    let Some(code) = query.code.as_deref().filter(|code| !code.is_empty()) else {
        tracing::warn!(provider = %slug, "Callback without authorization code");
        return (jar, LoginFailure::OAuthFailed.redirect()).into_response();
    };

    let token = match entry.provider.exchange(code).await {
        Ok(token) => token,
        Err(error) => {
            tracing::error!(provider = %slug, %error, "OAuth token exchange failed");
            return (jar, LoginFailure::OAuthFailed.redirect()).into_response();
        }
    };

    let user = match entry.provider.user_info(&token).await {
        Ok(user) => user,
        Err(error) => {
            tracing::error!(provider = %slug, %error, "Fetching OAuth user failed");
            return (jar, LoginFailure::OAuthFailed.redirect()).into_response();
        }
    };

    if !is_allowed(&entry.config, &user) {
        tracing::warn!(
            provider = %slug,
            username = %user.username,
            "OAuth user not in allowlist"
        );
        return (jar, LoginFailure::AccessDenied.redirect()).into_response();
    }

    let user_id = if user.username.is_empty() {
        user.id.as_str()
    } else {
        user.username.as_str()
    };

    match state.sessions.create_session(jar.clone(), user_id) {
        Ok(jar) => {
            tracing::info!(provider = %slug, user_id, "OAuth login succeeded");
            record_login("oauth", "success");
            (jar, Redirect::temporary("/")).into_response()
        }
        Err(error) => {
            tracing::error!(provider = %slug, %error, "Failed to create session");
            (jar, LoginFailure::SessionFailed.redirect()).into_response()
        }
    }
}

// =============================================================================
// Logout
// =============================================================================

/// GET /auth/logout
///
/// Expires the session cookie and redirects home.
async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let jar = match state.sessions.clear_session(jar.clone()) {
        Ok(jar) => jar,
        Err(reason) => {
            tracing::debug!(%reason, "Logging out an unreadable session");
            state.sessions.expire_cookie(jar)
        }
    };
    (jar, Redirect::temporary("/"))
}
