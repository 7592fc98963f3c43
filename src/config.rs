//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use std::collections::HashSet;

use serde::Deserialize;

use crate::auth::ProviderKind;

/// Minimum recommended session secret length in bytes
pub const MIN_SESSION_SECRET_BYTES: usize = 32;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Set the `Secure` attribute on every cookie (enable behind HTTPS)
    #[serde(default)]
    pub cookie_secure: bool,
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for session cookies and OAuth state tokens
    #[serde(default)]
    pub session_secret: String,
    /// Name of the session cookie
    #[serde(default = "default_session_cookie_name")]
    pub session_cookie_name: String,
    /// Seconds to wait before retrying a failed OIDC discovery.
    ///
    /// `0` keeps a failed discovery for the lifetime of the provider.
    #[serde(default = "default_discovery_retry_secs")]
    pub discovery_retry_secs: u64,
    /// Static password credentials
    #[serde(default)]
    pub users: Vec<UserCredential>,
    /// OAuth/OIDC providers
    #[serde(default)]
    pub oauth: Vec<OAuthProviderConfig>,
}

/// A user allowed to log in with a password
#[derive(Debug, Clone, Deserialize)]
pub struct UserCredential {
    pub id: String,
    /// Self-describing salted hash (`$6$...` or `$argon2id$...`)
    pub password_hash: String,
}

/// Settings for a single OAuth/OIDC provider
#[derive(Debug, Clone, Deserialize, Default)]
pub struct OAuthProviderConfig {
    /// Provider kind, also used as the route slug: github, google, oidc
    pub provider: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub redirect_url: String,
    /// Overrides the provider's default scopes when non-empty
    #[serde(default)]
    pub scopes: Vec<String>,
    /// OIDC issuer (required for `oidc`)
    #[serde(default)]
    pub issuer_url: Option<String>,
    /// GitHub Enterprise base URL (e.g. https://github.example.com)
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub allowed_users: Vec<String>,
    #[serde(default)]
    pub allowed_orgs: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

fn default_session_cookie_name() -> String {
    "yardgate_session".to_string()
}

fn default_discovery_retry_secs() -> u64 {
    60
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (YARDGATE_*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.cookie_secure", false)?
            .set_default("auth.session_cookie_name", default_session_cookie_name())?
            .set_default("auth.discovery_retry_secs", default_discovery_retry_secs())?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (YARDGATE_*)
            .add_source(
                Environment::with_prefix("YARDGATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let mut app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.ensure_session_secret();
        app_config.validate()?;
        Ok(app_config)
    }

    /// Fill in a random secret when none is configured.
    ///
    /// Sessions then do not survive a restart.
    pub fn ensure_session_secret(&mut self) {
        if !self.auth.session_secret.is_empty() {
            return;
        }

        tracing::warn!(
            "auth.session_secret is not set; generating a random secret. \
             Sessions will not persist across server restarts."
        );
        self.auth.session_secret = generate_secret();
    }

    pub fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        if self.auth.session_secret.is_empty() {
            return Err(AppError::Config(
                "auth.session_secret must not be empty".to_string(),
            ));
        }

        if self.auth.session_secret.len() < MIN_SESSION_SECRET_BYTES {
            tracing::warn!(
                length = self.auth.session_secret.len(),
                recommended = MIN_SESSION_SECRET_BYTES,
                "auth.session_secret is shorter than recommended"
            );
        }

        if self.auth.session_cookie_name.trim().is_empty() {
            return Err(AppError::Config(
                "auth.session_cookie_name must not be empty".to_string(),
            ));
        }

        let mut seen_users = HashSet::new();
        for (i, user) in self.auth.users.iter().enumerate() {
            if user.id.is_empty() {
                return Err(AppError::Config(format!("auth.users[{i}]: id is required")));
            }
            if !seen_users.insert(user.id.as_str()) {
                return Err(AppError::Config(format!(
                    "auth.users[{i}]: duplicate id {:?}",
                    user.id
                )));
            }
        }

        let mut seen_providers = HashSet::new();
        for (i, provider) in self.auth.oauth.iter().enumerate() {
            let kind: ProviderKind = provider
                .provider
                .parse()
                .map_err(|e| AppError::Config(format!("auth.oauth[{i}]: {e}")))?;
            if provider.client_id.is_empty() {
                return Err(AppError::Config(format!(
                    "auth.oauth[{i}]: client_id is required"
                )));
            }
            if provider.client_secret.is_empty() {
                return Err(AppError::Config(format!(
                    "auth.oauth[{i}]: client_secret is required"
                )));
            }
            if kind == ProviderKind::Oidc
                && provider.issuer_url.as_deref().is_none_or(str::is_empty)
            {
                return Err(AppError::Config(format!(
                    "auth.oauth[{i}]: issuer_url is required for oidc"
                )));
            }
            if !seen_providers.insert(provider.provider.as_str()) {
                return Err(AppError::Config(format!(
                    "auth.oauth[{i}]: duplicate provider {:?}",
                    provider.provider
                )));
            }
        }

        Ok(())
    }
}

fn generate_secret() -> String {
    use rand::RngCore;

    let mut bytes = [0_u8; MIN_SESSION_SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
