//! Password login and session probe

use axum::{
    extract::{State, rejection::JsonRejection},
    response::{IntoResponse, Json},
};
use axum_extra::extract::CookieJar;

use super::dto::{LoginRequest, UserResponse};
use crate::AppState;
use crate::auth::{CurrentUser, authenticate};
use crate::error::AppError;
use crate::metrics::record_login;

/// POST /api/login
///
/// Verifies `user_id`/`password` against the configured users and sets the
/// session cookie. Unknown user and wrong password are indistinguishable.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = body.map_err(|e| AppError::Validation(e.body_text()))?;

    let user = match authenticate(&state.config.auth.users, &request.user_id, &request.password) {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(user_id = %request.user_id, "Password login failed");
            record_login("password", "failed");
            return Err(e.into());
        }
    };

    let jar = state.sessions.create_session(jar, &user.id)?;
    tracing::info!(user_id = %user.id, "Password login succeeded");
    record_login("password", "success");

    Ok((
        jar,
        Json(UserResponse {
            user_id: user.id.clone(),
        }),
    ))
}

/// GET /api/me
///
/// Returns the session's user. Sits behind `require_auth`.
pub async fn me(CurrentUser(user_id): CurrentUser) -> Json<UserResponse> {
    Json(UserResponse { user_id })
}
