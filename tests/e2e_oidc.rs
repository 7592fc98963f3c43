//! E2E tests for OIDC providers and lazy discovery

mod common;

use common::{STATE_COOKIE, TestServer, location, set_cookie, test_config};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use yardgate::config::OAuthProviderConfig;

fn oidc_provider(issuer: &MockServer, server_addr: &str) -> OAuthProviderConfig {
    OAuthProviderConfig {
        provider: "oidc".to_string(),
        client_id: "oidc-client".to_string(),
        client_secret: "oidc-secret".to_string(),
        redirect_url: format!("{server_addr}/auth/oidc/callback"),
        issuer_url: Some(issuer.uri()),
        ..Default::default()
    }
}

async fn oidc_server(issuer: &MockServer) -> TestServer {
    TestServer::with_config(|addr| {
        let mut config = test_config();
        config.auth.oauth.push(oidc_provider(issuer, addr));
        config
    })
    .await
}

fn discovery_document(issuer: &MockServer) -> serde_json::Value {
    let uri = issuer.uri();
    serde_json::json!({
        "issuer": uri,
        "authorization_endpoint": format!("{uri}/authorize"),
        "token_endpoint": format!("{uri}/token"),
        "userinfo_endpoint": format!("{uri}/userinfo"),
    })
}

#[tokio::test]
async fn test_startup_does_not_touch_the_issuer() {
    let issuer = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(discovery_document(&issuer)))
        .expect(0)
        .mount(&issuer)
        .await;

    let server = oidc_server(&issuer).await;
    let response = server
        .client
        .get(server.url("/api/auth-info"))
        .send()
        .await
        .expect("auth-info");
    let body: serde_json::Value = response.json().await.expect("json");
    assert_eq!(body["oauth_providers"][0]["display_name"], "OIDC");
}

#[tokio::test]
async fn test_concurrent_first_logins_share_one_discovery() {
    let issuer = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(discovery_document(&issuer))
                .set_delay(std::time::Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&issuer)
        .await;

    let server = oidc_server(&issuer).await;

    let requests = (0..6).map(|_| server.client.get(server.url("/auth/oidc")).send());
    let responses = futures::future::join_all(requests).await;

    for response in responses {
        let response = response.expect("begin");
        assert_eq!(response.status(), 307);
        assert!(location(&response).starts_with(&format!("{}/authorize?", issuer.uri())));
        assert!(set_cookie(&response, STATE_COOKIE).is_some());
    }
}

#[tokio::test]
async fn test_full_oidc_login() {
    let issuer = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(discovery_document(&issuer)))
        .expect(1)
        .mount(&issuer)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "oidc-access-token",
            "token_type": "Bearer"
        })))
        .mount(&issuer)
        .await;
    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "sub": "248289761001",
            "preferred_username": "jane",
            "email": "jane@example.com"
        })))
        .mount(&issuer)
        .await;

    let server = oidc_server(&issuer).await;

    let begin = server
        .client
        .get(server.url("/auth/oidc"))
        .send()
        .await
        .expect("begin");
    let state = set_cookie(&begin, STATE_COOKIE).expect("state cookie");

    let callback = server
        .client
        .get(server.url(&format!("/auth/oidc/callback?code=abc&state={state}")))
        .header("cookie", format!("{STATE_COOKIE}={state}"))
        .send()
        .await
        .expect("callback");
    assert_eq!(location(&callback), "/");

    let session = set_cookie(&callback, common::SESSION_COOKIE).expect("session cookie");
    let me: serde_json::Value = server
        .client
        .get(server.url("/api/me"))
        .header("cookie", format!("{}={session}", common::SESSION_COOKIE))
        .send()
        .await
        .expect("me")
        .json()
        .await
        .expect("json");
    assert_eq!(me, serde_json::json!({"user_id": "jane"}));
}

#[tokio::test]
async fn test_discovery_failure_fails_login_without_state_cookie() {
    let issuer = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&issuer)
        .await;

    // discovery_retry_secs = 0 in the test config: the failure sticks.
    let server = oidc_server(&issuer).await;

    for _ in 0..2 {
        let response = server
            .client
            .get(server.url("/auth/oidc"))
            .send()
            .await
            .expect("begin");
        assert_eq!(response.status(), 307);
        assert_eq!(location(&response), "/?error=oauth_failed");
        assert!(set_cookie(&response, STATE_COOKIE).is_none());
    }
}
