//! Request and response bodies of the JSON API

use serde::{Deserialize, Serialize};

/// POST /api/login body
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub user_id: String,
    pub password: String,
}

/// Identity of the logged-in user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserResponse {
    pub user_id: String,
}

/// GET /api/auth-info response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthInfoResponse {
    pub password_enabled: bool,
    pub oauth_providers: Vec<OAuthProviderInfo>,
}

/// One login button
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthProviderInfo {
    /// Route slug, e.g. `github`
    pub name: String,
    /// e.g. `GitHub`
    pub display_name: String,
    /// Where the browser starts the flow, e.g. `/auth/github`
    pub url: String,
}
