//! Authentication
//!
//! Handles:
//! - Password login against configured users
//! - OAuth2 / OIDC login (GitHub, Google, generic OIDC)
//! - Signed cookie sessions and the anti-CSRF state cookie
//! - Authentication middleware

mod allowlist;
mod middleware;
mod oauth;
mod password;
pub mod provider;
pub mod session;
pub mod state;

pub use allowlist::is_allowed;
pub use middleware::{AuthenticatedUser, CurrentUser, require_auth};
pub use oauth::auth_router;
pub use password::{CredentialError, authenticate, hash_password, verify_password};
pub use provider::{
    DiscoveryRetry, OAuthProvider, OAuthUserInfo, ProviderError, ProviderKind, ProviderRegistry,
};
pub use session::{SessionError, SessionManager};
pub use state::{OAuthStateManager, StateError};
