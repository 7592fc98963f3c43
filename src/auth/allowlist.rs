//! Allowlist enforcement for OAuth identities

use crate::auth::provider::OAuthUserInfo;
use crate::config::OAuthProviderConfig;

/// Whether an authenticated identity may log in through this provider.
///
/// With neither `allowed_users` nor `allowed_orgs` configured everyone is
/// allowed. Otherwise the username must be listed, or one of the user's orgs
/// must be.
pub fn is_allowed(config: &OAuthProviderConfig, info: &OAuthUserInfo) -> bool {
    if config.allowed_users.is_empty() && config.allowed_orgs.is_empty() {
        return true;
    }

    config.allowed_users.iter().any(|user| *user == info.username)
        || info
            .orgs
            .iter()
            .any(|org| config.allowed_orgs.contains(org))
}
