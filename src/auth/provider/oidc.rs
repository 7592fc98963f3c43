//! Generic OpenID Connect providers (Google included)

use serde::Deserialize;
use url::Url;

use super::{
    AccessToken, ClientAuth, Discovery, DiscoveryRetry, OAuthClient, OAuthUserInfo, ProviderError,
    ProviderKind, fetch_json,
};
use crate::config::OAuthProviderConfig;

pub const GOOGLE_ISSUER_URL: &str = "https://accounts.google.com";

const DEFAULT_SCOPES: &[&str] = &["openid", "profile", "email"];

#[derive(Debug, Deserialize)]
struct UserInfoClaims {
    sub: String,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

pub struct OidcProvider {
    kind: ProviderKind,
    client: OAuthClient,
    discovery: Discovery,
}

impl OidcProvider {
    pub fn new(
        config: &OAuthProviderConfig,
        kind: ProviderKind,
        issuer_url: &str,
        http: reqwest::Client,
        retry: DiscoveryRetry,
    ) -> Self {
        Self {
            kind,
            client: OAuthClient::new(config, http.clone(), DEFAULT_SCOPES),
            discovery: Discovery::new(config.provider.clone(), issuer_url, http, retry),
        }
    }

    pub fn name(&self) -> &str {
        match self.kind {
            ProviderKind::Google => "Google",
            _ => "OIDC",
        }
    }

    pub(super) async fn auth_code_url(&self, state: &str) -> Result<Url, ProviderError> {
        let document = self.discovery.resolve().await?;
        self.client
            .auth_code_url(&document.authorization_endpoint, state)
    }

    pub(super) async fn exchange(&self, code: &str) -> Result<AccessToken, ProviderError> {
        let document = self.discovery.resolve().await?;
        self.client
            .exchange(&document.token_endpoint, code, ClientAuth::Basic)
            .await
    }

    pub(super) async fn user_info(&self, token: &AccessToken) -> Result<OAuthUserInfo, ProviderError> {
        let document = self.discovery.resolve().await?;
        let endpoint = &document.userinfo_endpoint;
        let claims: UserInfoClaims = fetch_json(
            self.client
                .http
                .get(endpoint)
                .bearer_auth(&token.access_token),
            endpoint,
        )
        .await?;

        let email = claims.email.unwrap_or_default();
        let username = [claims.preferred_username, Some(email.clone()), claims.name]
            .into_iter()
            .flatten()
            .find(|candidate| !candidate.is_empty())
            .unwrap_or_else(|| claims.sub.clone());

        Ok(OAuthUserInfo {
            id: claims.sub,
            username,
            email,
            orgs: Vec::new(),
        })
    }
}
