//! Login options advertised to the frontend

use axum::{extract::State, response::Json};

use super::dto::{AuthInfoResponse, OAuthProviderInfo};
use crate::AppState;

/// GET /api/auth-info
///
/// Public. Lists the login methods in configuration order.
pub async fn auth_info(State(state): State<AppState>) -> Json<AuthInfoResponse> {
    let oauth_providers = state
        .providers
        .iter()
        .map(|entry| OAuthProviderInfo {
            name: entry.slug().to_string(),
            display_name: entry.provider.name().to_string(),
            url: format!("/auth/{}", entry.slug()),
        })
        .collect();

    Json(AuthInfoResponse {
        password_enabled: !state.config.auth.users.is_empty(),
        oauth_providers,
    })
}
