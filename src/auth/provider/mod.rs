//! OAuth2 / OIDC identity providers
//!
//! A provider is one of a closed set of variants behind a single capability
//! surface: build the authorization URL, exchange the code, fetch the user.
//! Adding a provider kind means adding a variant here, not touching callers.
//!
//! All network calls are plain futures. Dropping one (client went away,
//! request timed out) aborts the in-flight request to the provider.

mod discovery;
mod github;
mod oidc;

use std::str::FromStr;
use std::time::Duration;

use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

pub use discovery::{Discovery, DiscoveryDocument, DiscoveryRetry};
pub use github::{GitHubEndpoints, GitHubProvider};
pub use oidc::{GOOGLE_ISSUER_URL, OidcProvider};

use crate::config::OAuthProviderConfig;

/// Upper bound on how much of a provider's error body ends up in logs
const MAX_ERROR_BODY_BYTES: usize = 512;

/// Largest provider response read into memory
const MAX_RESPONSE_BODY_BYTES: usize = 1024 * 1024;

/// Supported provider kinds, named as in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    GitHub,
    Google,
    Oidc,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(ProviderKind::GitHub),
            "google" => Ok(ProviderKind::Google),
            "oidc" => Ok(ProviderKind::Oidc),
            other => Err(format!("unsupported oauth provider: {other:?}")),
        }
    }
}

/// Failure talking to an identity provider
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("requesting {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("response from {endpoint} exceeds {limit} bytes")]
    BodyTooLarge { endpoint: String, limit: usize },

    #[error("decoding response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("token endpoint rejected the code: {0}")]
    TokenRejected(String),

    #[error("OIDC discovery failed: {0}")]
    Discovery(String),

    #[error("invalid provider URL {url:?}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("{0}")]
    Config(String),
}

/// Access token returned by a successful code exchange
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Normalized identity, whatever the provider
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OAuthUserInfo {
    pub id: String,
    pub username: String,
    pub email: String,
    /// Only filled in when the provider has `allowed_orgs` configured
    pub orgs: Vec<String>,
}

/// An identity provider
pub enum OAuthProvider {
    GitHub(GitHubProvider),
    Oidc(OidcProvider),
}

impl OAuthProvider {
    /// Build the provider described by `config`.
    pub fn from_config(
        config: &OAuthProviderConfig,
        http: reqwest::Client,
        retry: DiscoveryRetry,
    ) -> Result<Self, ProviderError> {
        let kind = ProviderKind::from_str(&config.provider).map_err(ProviderError::Config)?;
        Ok(match kind {
            ProviderKind::GitHub => OAuthProvider::GitHub(GitHubProvider::new(config, http)),
            ProviderKind::Google => OAuthProvider::Oidc(OidcProvider::new(
                config,
                kind,
                GOOGLE_ISSUER_URL,
                http,
                retry,
            )),
            ProviderKind::Oidc => {
                let issuer = config
                    .issuer_url
                    .as_deref()
                    .filter(|issuer| !issuer.is_empty())
                    .ok_or_else(|| {
                        ProviderError::Config("issuer_url is required for oidc".to_string())
                    })?;
                OAuthProvider::Oidc(OidcProvider::new(config, kind, issuer, http, retry))
            }
        })
    }

    /// URL to send the browser to, carrying `state`.
    pub async fn auth_code_url(&self, state: &str) -> Result<Url, ProviderError> {
        match self {
            OAuthProvider::GitHub(p) => p.auth_code_url(state),
            OAuthProvider::Oidc(p) => p.auth_code_url(state).await,
        }
    }

    /// Exchange an authorization code for an access token.
    pub async fn exchange(&self, code: &str) -> Result<AccessToken, ProviderError> {
        match self {
            OAuthProvider::GitHub(p) => p.exchange(code).await,
            OAuthProvider::Oidc(p) => p.exchange(code).await,
        }
    }

    /// Fetch the identity behind `token`.
    pub async fn user_info(&self, token: &AccessToken) -> Result<OAuthUserInfo, ProviderError> {
        match self {
            OAuthProvider::GitHub(p) => p.user_info(token).await,
            OAuthProvider::Oidc(p) => p.user_info(token).await,
        }
    }

    /// Human readable provider name ("GitHub", "Google", "OIDC")
    pub fn name(&self) -> &str {
        match self {
            OAuthProvider::GitHub(p) => p.name(),
            OAuthProvider::Oidc(p) => p.name(),
        }
    }
}

/// A configured provider together with the settings it was built from
pub struct RegisteredProvider {
    pub provider: OAuthProvider,
    pub config: OAuthProviderConfig,
}

impl RegisteredProvider {
    /// Route slug (`/auth/{slug}`)
    pub fn slug(&self) -> &str {
        &self.config.provider
    }
}

/// Providers available to this process, keyed by slug
///
/// Built once at startup and handed to handlers through `AppState`.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<RegisteredProvider>,
}

impl ProviderRegistry {
    pub fn from_config(
        configs: &[OAuthProviderConfig],
        http: &reqwest::Client,
        retry: DiscoveryRetry,
    ) -> Result<Self, ProviderError> {
        let mut providers = Vec::with_capacity(configs.len());
        for config in configs {
            let provider = OAuthProvider::from_config(config, http.clone(), retry)?;
            tracing::info!(
                provider = %config.provider,
                name = %provider.name(),
                "OAuth provider registered"
            );
            providers.push(RegisteredProvider {
                provider,
                config: config.clone(),
            });
        }
        Ok(Self { providers })
    }

    pub fn get(&self, slug: &str) -> Option<&RegisteredProvider> {
        self.providers.iter().find(|p| p.slug() == slug)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredProvider> {
        self.providers.iter()
    }
}

/// How the client authenticates at the token endpoint
#[derive(Debug, Clone, Copy)]
enum ClientAuth {
    /// `client_secret_basic`
    Basic,
    /// `client_secret_post`
    Post,
}

/// Client settings shared by every provider variant
#[derive(Clone)]
struct OAuthClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_url: String,
    scopes: Vec<String>,
}

impl OAuthClient {
    fn new(config: &OAuthProviderConfig, http: reqwest::Client, default_scopes: &[&str]) -> Self {
        let scopes = if config.scopes.is_empty() {
            default_scopes.iter().map(ToString::to_string).collect()
        } else {
            config.scopes.clone()
        };

        Self {
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_url: config.redirect_url.clone(),
            scopes,
        }
    }

    fn auth_code_url(&self, authorize_endpoint: &str, state: &str) -> Result<Url, ProviderError> {
        let mut params = vec![
            ("client_id", self.client_id.as_str()),
            ("response_type", "code"),
            ("state", state),
        ];
        if !self.redirect_url.is_empty() {
            params.push(("redirect_uri", self.redirect_url.as_str()));
        }
        let scope = self.scopes.join(" ");
        if !scope.is_empty() {
            params.push(("scope", scope.as_str()));
        }

        Url::parse_with_params(authorize_endpoint, &params).map_err(|e| ProviderError::InvalidUrl {
            url: authorize_endpoint.to_string(),
            message: e.to_string(),
        })
    }

    async fn exchange(
        &self,
        token_endpoint: &str,
        code: &str,
        auth: ClientAuth,
    ) -> Result<AccessToken, ProviderError> {
        #[derive(Deserialize)]
        struct TokenResponse {
            #[serde(default)]
            access_token: Option<String>,
            #[serde(default)]
            token_type: Option<String>,
            #[serde(default)]
            scope: Option<String>,
            #[serde(default)]
            error: Option<String>,
            #[serde(default)]
            error_description: Option<String>,
        }

        let mut form = vec![("grant_type", "authorization_code"), ("code", code)];
        if !self.redirect_url.is_empty() {
            form.push(("redirect_uri", self.redirect_url.as_str()));
        }

        let request = self
            .http
            .post(token_endpoint)
            .header(ACCEPT, "application/json");
        let request = match auth {
            ClientAuth::Basic => request
                .basic_auth(&self.client_id, Some(&self.client_secret))
                .form(&form),
            ClientAuth::Post => {
                form.push(("client_id", self.client_id.as_str()));
                form.push(("client_secret", self.client_secret.as_str()));
                request.form(&form)
            }
        };

        // GitHub reports bad codes with a 200 and an `error` field.
        let response: TokenResponse = fetch_json(request, token_endpoint).await?;
        if let Some(error) = response.error {
            let detail = match response.error_description {
                Some(description) => format!("{error}: {description}"),
                None => error,
            };
            return Err(ProviderError::TokenRejected(detail));
        }

        match response.access_token {
            Some(access_token) if !access_token.is_empty() => Ok(AccessToken {
                access_token,
                token_type: response.token_type,
                scope: response.scope,
            }),
            _ => Err(ProviderError::TokenRejected(
                "response carried no access_token".to_string(),
            )),
        }
    }
}

/// Send `request` and decode a JSON body, treating any non-2xx status as an error.
async fn fetch_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    endpoint: &str,
) -> Result<T, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::Transport {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;

    let status = response.status();
    let body = read_body(response, endpoint).await?;

    if !status.is_success() {
        return Err(ProviderError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body: truncate_body(&String::from_utf8_lossy(&body)),
        });
    }

    serde_json::from_slice(&body).map_err(|e| ProviderError::Decode {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })
}

/// Read the body chunk by chunk, giving up once it passes `MAX_RESPONSE_BODY_BYTES`.
async fn read_body(mut response: reqwest::Response, endpoint: &str) -> Result<Vec<u8>, ProviderError> {
    let too_large = || ProviderError::BodyTooLarge {
        endpoint: endpoint.to_string(),
        limit: MAX_RESPONSE_BODY_BYTES,
    };

    if response
        .content_length()
        .is_some_and(|len| len > MAX_RESPONSE_BODY_BYTES as u64)
    {
        return Err(too_large());
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| ProviderError::Transport {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?
    {
        if body.len() + chunk.len() > MAX_RESPONSE_BODY_BYTES {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_BYTES {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_BYTES;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// Build the HTTP client used for every provider call.
pub fn build_http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("yardgate/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_parses_known_names() {
        assert_eq!("github".parse(), Ok(ProviderKind::GitHub));
        assert_eq!("google".parse(), Ok(ProviderKind::Google));
        assert_eq!("oidc".parse(), Ok(ProviderKind::Oidc));
        assert!("gitlab".parse::<ProviderKind>().is_err());
        assert!("GitHub".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn truncate_body_keeps_short_bodies() {
        assert_eq!(truncate_body("oops"), "oops");
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let long = "é".repeat(MAX_ERROR_BODY_BYTES);
        let truncated = truncate_body(&long);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= MAX_ERROR_BODY_BYTES + 3);
    }

    #[test]
    fn registry_resolves_by_slug() {
        let http = reqwest::Client::new();
        let configs = vec![
            OAuthProviderConfig {
                provider: "github".to_string(),
                client_id: "gh-id".to_string(),
                client_secret: "gh-secret".to_string(),
                ..Default::default()
            },
            OAuthProviderConfig {
                provider: "google".to_string(),
                client_id: "g-id".to_string(),
                client_secret: "g-secret".to_string(),
                ..Default::default()
            },
        ];
        let registry =
            ProviderRegistry::from_config(&configs, &http, DiscoveryRetry::Never).expect("registry");

        let github = registry.get("github").expect("github registered");
        assert_eq!(github.config.client_id, "gh-id");
        assert_eq!(github.provider.name(), "GitHub");
        assert_eq!(registry.get("google").expect("google").provider.name(), "Google");
        assert!(registry.get("oidc").is_none());
        assert_eq!(registry.iter().count(), 2);
    }

    #[test]
    fn oidc_without_issuer_is_a_config_error() {
        let config = OAuthProviderConfig {
            provider: "oidc".to_string(),
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            ..Default::default()
        };
        let result =
            OAuthProvider::from_config(&config, reqwest::Client::new(), DiscoveryRetry::Never);
        assert!(matches!(result, Err(ProviderError::Config(_))));
    }

    #[tokio::test]
    async fn non_success_status_carries_code_and_body() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/thing"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .mount(&server)
            .await;

        let endpoint = format!("{}/thing", server.uri());
        let result: Result<serde_json::Value, _> =
            fetch_json(reqwest::Client::new().get(&endpoint), &endpoint).await;

        assert_eq!(
            result,
            Err(ProviderError::Status {
                endpoint,
                status: 503,
                body: "upstream down".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn oversized_response_is_refused() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/huge"))
            .respond_with(
                ResponseTemplate::new(200).set_body_bytes(vec![b' '; MAX_RESPONSE_BODY_BYTES + 1]),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/fits"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                "{}{{}}",
                " ".repeat(MAX_RESPONSE_BODY_BYTES - 2)
            )))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let endpoint = format!("{}/huge", server.uri());
        let result: Result<serde_json::Value, _> = fetch_json(http.get(&endpoint), &endpoint).await;
        assert_eq!(
            result,
            Err(ProviderError::BodyTooLarge {
                endpoint,
                limit: MAX_RESPONSE_BODY_BYTES,
            })
        );

        let endpoint = format!("{}/fits", server.uri());
        let result: Result<serde_json::Value, _> = fetch_json(http.get(&endpoint), &endpoint).await;
        assert_eq!(result, Ok(serde_json::json!({})));
    }
}
