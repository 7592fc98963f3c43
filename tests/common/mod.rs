//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::collections::HashMap;

use axum::{
    Form, Json, Router,
    extract::Query,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use tokio::net::TcpListener;
use yardgate::{AppState, config};

pub const TEST_USER: &str = "admin";
pub const TEST_PASSWORD: &str = "password123";
pub const TEST_SECRET: &str = "test-secret-key-that-is-32-bytes-long!!";
pub const SESSION_COOKIE: &str = "yardgate_session";
pub const STATE_COOKIE: &str = "yardgate_oauth_state";

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    /// Does not follow redirects, so 307s can be inspected
    pub client: reqwest::Client,
}

impl TestServer {
    /// Server with one password user and no OAuth providers
    pub async fn new() -> Self {
        Self::with_config(|_| test_config()).await
    }

    /// Bind a port, build the config for that address, then serve.
    ///
    /// The closure receives the server's base URL so OAuth redirect URLs can
    /// point back at it.
    pub async fn with_config(build: impl FnOnce(&str) -> config::AppConfig) -> Self {
        yardgate::metrics::init_metrics();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());

        let config = build(&addr);
        config.validate().expect("test config is valid");

        let state = AppState::new(config).expect("app state");
        let app = yardgate::build_router(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        Self {
            addr,
            state,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Log in with the test password user and return the session cookie value.
    pub async fn password_session(&self) -> String {
        let response = self
            .client
            .post(self.url("/api/login"))
            .json(&serde_json::json!({"user_id": TEST_USER, "password": TEST_PASSWORD}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        set_cookie(&response, SESSION_COOKIE).expect("session cookie")
    }
}

/// Configuration used by most tests
pub fn test_config() -> config::AppConfig {
    config::AppConfig {
        server: config::ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cookie_secure: false,
        },
        auth: config::AuthConfig {
            session_secret: TEST_SECRET.to_string(),
            session_cookie_name: SESSION_COOKIE.to_string(),
            discovery_retry_secs: 0,
            users: vec![config::UserCredential {
                id: TEST_USER.to_string(),
                password_hash: yardgate::auth::hash_password(TEST_PASSWORD).unwrap(),
            }],
            oauth: Vec::new(),
        },
        logging: config::LoggingConfig {
            level: "info".to_string(),
            format: "pretty".to_string(),
        },
    }
}

/// GitHub provider settings pointing at `fake` as an Enterprise host
pub fn github_provider(fake: &FakeGitHub, server_addr: &str) -> config::OAuthProviderConfig {
    config::OAuthProviderConfig {
        provider: "github".to_string(),
        client_id: FakeGitHub::CLIENT_ID.to_string(),
        client_secret: FakeGitHub::CLIENT_SECRET.to_string(),
        redirect_url: format!("{server_addr}/auth/github/callback"),
        base_url: Some(fake.base_url.clone()),
        ..Default::default()
    }
}

/// Value of the `name` cookie set by `response`, if any (empty when removed)
pub fn set_cookie(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|header| {
            let pair = header.split(';').next()?;
            let (cookie_name, value) = pair.split_once('=')?;
            (cookie_name.trim() == name).then(|| value.trim().to_string())
        })
}

/// Raw Set-Cookie header for `name`, attributes included
pub fn set_cookie_header(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|header| header.starts_with(&format!("{name}=")))
        .map(ToString::to_string)
}

pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .expect("location header")
        .to_string()
}

/// A minimal GitHub Enterprise stand-in
///
/// Authorizes every request as `dummyuser` (id 12345, member of
/// `dummy-org`) and bounces the browser straight back to the callback.
pub struct FakeGitHub {
    pub base_url: String,
}

impl FakeGitHub {
    pub const CLIENT_ID: &'static str = "fake-client-id";
    pub const CLIENT_SECRET: &'static str = "fake-client-secret";
    pub const CODE: &'static str = "fake-code";
    pub const TOKEN: &'static str = "fake-token";

    pub async fn start() -> Self {
        let app = Router::new()
            .route("/login/oauth/authorize", get(fake_authorize))
            .route("/login/oauth/access_token", post(fake_token))
            .route("/api/v3/user", get(fake_user))
            .route("/api/v3/user/orgs", get(fake_orgs));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url }
    }
}

async fn fake_authorize(Query(params): Query<HashMap<String, String>>) -> Response {
    let (Some(redirect_uri), Some(state)) = (params.get("redirect_uri"), params.get("state"))
    else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    if params.get("client_id").map(String::as_str) != Some(FakeGitHub::CLIENT_ID) {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let mut target = url::Url::parse(redirect_uri).unwrap();
    target
        .query_pairs_mut()
        .append_pair("code", FakeGitHub::CODE)
        .append_pair("state", state);
    Redirect::to(target.as_str()).into_response()
}

async fn fake_token(Form(form): Form<HashMap<String, String>>) -> Json<serde_json::Value> {
    let valid = form.get("code").map(String::as_str) == Some(FakeGitHub::CODE)
        && form.get("client_id").map(String::as_str) == Some(FakeGitHub::CLIENT_ID)
        && form.get("client_secret").map(String::as_str) == Some(FakeGitHub::CLIENT_SECRET);

    if valid {
        Json(serde_json::json!({
            "access_token": FakeGitHub::TOKEN,
            "token_type": "bearer",
            "scope": "read:user,read:org"
        }))
    } else {
        Json(serde_json::json!({
            "error": "bad_verification_code",
            "error_description": "The code passed is incorrect or expired."
        }))
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == format!("Bearer {}", FakeGitHub::TOKEN))
}

async fn fake_user(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(serde_json::json!({
        "login": "dummyuser",
        "id": 12345,
        "email": "dummy@example.com"
    }))
    .into_response()
}

async fn fake_orgs(headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(serde_json::json!([{"login": "dummy-org"}])).into_response()
}
