//! Authentication middleware
//!
//! Protects routes that require authentication.

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{Request, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;

use crate::AppState;
use crate::error::AppError;

/// Identity of the caller, inserted into request extensions by [`require_auth`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// Middleware to require a valid session cookie
///
/// On success the user id is added to request extensions as
/// [`AuthenticatedUser`]. On failure the session cookie is expired and the
/// request is answered with `401 {"error":"unauthorized"}` without reaching
/// the inner handler.
///
/// # Usage
/// ```ignore
/// let protected_routes = Router::new()
///     .route("/api/me", get(me))
///     .layer(middleware::from_fn_with_state(state, require_auth));
/// ```
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    match state.sessions.validate_session(&jar) {
        Ok(user_id) => {
            request.extensions_mut().insert(AuthenticatedUser(user_id));
            next.run(request).await
        }
        Err(reason) => {
            tracing::debug!(%reason, path = %request.uri().path(), "Rejecting unauthenticated request");
            let jar = state.sessions.expire_cookie(jar);
            (jar, AppError::Unauthorized).into_response()
        }
    }
}

/// Extractor for the authenticated user
///
/// Only meaningful behind [`require_auth`].
///
/// # Usage
/// ```ignore
/// async fn handler(CurrentUser(user_id): CurrentUser) -> impl IntoResponse {
///     format!("Hello, {user_id}")
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .map(|user| CurrentUser(user.0.clone()))
            .ok_or(AppError::Unauthorized)
    }
}
