//! GitHub and GitHub Enterprise

use reqwest::header::ACCEPT;
use serde::Deserialize;
use url::Url;

use super::{AccessToken, ClientAuth, OAuthClient, OAuthUserInfo, ProviderError, fetch_json};
use crate::config::OAuthProviderConfig;

const GITHUB_WEB_URL: &str = "https://github.com";
const GITHUB_API_URL: &str = "https://api.github.com";
const GITHUB_MEDIA_TYPE: &str = "application/vnd.github+json";

/// Scopes requested when none are configured
const DEFAULT_SCOPES: &[&str] = &["read:user", "read:org"];

/// Endpoints for github.com or an Enterprise host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubEndpoints {
    pub authorize: String,
    pub token: String,
    pub user: String,
    pub orgs: String,
}

impl GitHubEndpoints {
    /// `base_url` selects GitHub Enterprise (`{base}/api/v3` for the API).
    pub fn new(base_url: Option<&str>) -> Self {
        match base_url.map(|base| base.trim_end_matches('/')) {
            Some(base) if !base.is_empty() => Self {
                authorize: format!("{base}/login/oauth/authorize"),
                token: format!("{base}/login/oauth/access_token"),
                user: format!("{base}/api/v3/user"),
                orgs: format!("{base}/api/v3/user/orgs"),
            },
            _ => Self {
                authorize: format!("{GITHUB_WEB_URL}/login/oauth/authorize"),
                token: format!("{GITHUB_WEB_URL}/login/oauth/access_token"),
                user: format!("{GITHUB_API_URL}/user"),
                orgs: format!("{GITHUB_API_URL}/user/orgs"),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
    id: i64,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubOrg {
    login: String,
}

pub struct GitHubProvider {
    client: OAuthClient,
    endpoints: GitHubEndpoints,
    fetch_orgs: bool,
}

impl GitHubProvider {
    pub fn new(config: &OAuthProviderConfig, http: reqwest::Client) -> Self {
        Self {
            client: OAuthClient::new(config, http, DEFAULT_SCOPES),
            endpoints: GitHubEndpoints::new(config.base_url.as_deref()),
            fetch_orgs: !config.allowed_orgs.is_empty(),
        }
    }

    pub fn name(&self) -> &str {
        "GitHub"
    }

    pub(super) fn auth_code_url(&self, state: &str) -> Result<Url, ProviderError> {
        self.client.auth_code_url(&self.endpoints.authorize, state)
    }

    pub(super) async fn exchange(&self, code: &str) -> Result<AccessToken, ProviderError> {
        self.client
            .exchange(&self.endpoints.token, code, ClientAuth::Post)
            .await
    }

    pub(super) async fn user_info(&self, token: &AccessToken) -> Result<OAuthUserInfo, ProviderError> {
        let user: GitHubUser = fetch_json(
            self.api_get(&self.endpoints.user, token),
            &self.endpoints.user,
        )
        .await?;

        // Org membership is only worth a round trip when something checks it.
        let orgs = if self.fetch_orgs {
            let orgs: Vec<GitHubOrg> = fetch_json(
                self.api_get(&self.endpoints.orgs, token)
                    .query(&[("per_page", "100")]),
                &self.endpoints.orgs,
            )
            .await?;
            orgs.into_iter().map(|org| org.login).collect()
        } else {
            Vec::new()
        };

        Ok(OAuthUserInfo {
            id: user.id.to_string(),
            username: user.login,
            email: user.email.unwrap_or_default(),
            orgs,
        })
    }

    fn api_get(&self, url: &str, token: &AccessToken) -> reqwest::RequestBuilder {
        self.client
            .http
            .get(url)
            .bearer_auth(&token.access_token)
            .header(ACCEPT, GITHUB_MEDIA_TYPE)
    }
}
