//! Lazy OpenID Connect discovery
//!
//! The discovery document is fetched on first use, not at startup, so an
//! unreachable issuer does not keep the server from booting. Resolution is
//! shared: concurrent callers wait on the same fetch instead of each issuing
//! their own.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;

use super::{ProviderError, fetch_json};
use crate::metrics::OIDC_DISCOVERY_TOTAL;

/// What to do after a discovery attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryRetry {
    /// The failure is permanent for this process
    Never,
    /// Try again once this much time has passed since the failure
    After(Duration),
}

impl DiscoveryRetry {
    /// `0` means never retry.
    pub fn from_secs(secs: u64) -> Self {
        if secs == 0 {
            DiscoveryRetry::Never
        } else {
            DiscoveryRetry::After(Duration::from_secs(secs))
        }
    }

    fn may_retry(&self, failed_at: Instant) -> bool {
        match self {
            DiscoveryRetry::Never => false,
            DiscoveryRetry::After(delay) => failed_at.elapsed() >= *delay,
        }
    }
}

/// The subset of `/.well-known/openid-configuration` we use
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DiscoveryDocument {
    #[serde(default)]
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub userinfo_endpoint: String,
}

/// Resolution progress.
///
/// "Resolving" is not a variant: it is whoever holds the mutex while in
/// `Unresolved`. If that holder is dropped mid-fetch the state is untouched
/// and the next caller starts over.
enum DiscoveryState {
    Unresolved,
    Resolved(Arc<DiscoveryDocument>),
    Failed { error: ProviderError, at: Instant },
}

pub struct Discovery {
    label: String,
    url: String,
    http: reqwest::Client,
    retry: DiscoveryRetry,
    state: Mutex<DiscoveryState>,
}

impl Discovery {
    /// `label` names the provider in logs and metrics.
    pub fn new(
        label: impl Into<String>,
        issuer_url: &str,
        http: reqwest::Client,
        retry: DiscoveryRetry,
    ) -> Self {
        Self {
            label: label.into(),
            url: format!(
                "{}/.well-known/openid-configuration",
                issuer_url.trim_end_matches('/')
            ),
            http,
            retry,
            state: Mutex::new(DiscoveryState::Unresolved),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Return the discovery document, fetching it if needed.
    pub async fn resolve(&self) -> Result<Arc<DiscoveryDocument>, ProviderError> {
        let mut state = self.state.lock().await;

        match &*state {
            DiscoveryState::Resolved(document) => return Ok(Arc::clone(document)),
            DiscoveryState::Failed { error, at } if !self.retry.may_retry(*at) => {
                return Err(error.clone());
            }
            _ => {}
        }

        // The lock stays held across the fetch; other callers queue on it.
        match self.fetch().await {
            Ok(document) => {
                tracing::info!(provider = %self.label, issuer = %document.issuer, "OIDC discovery resolved");
                OIDC_DISCOVERY_TOTAL
                    .with_label_values(&[self.label.as_str(), "success"])
                    .inc();
                let document = Arc::new(document);
                *state = DiscoveryState::Resolved(Arc::clone(&document));
                Ok(document)
            }
            Err(error) => {
                tracing::warn!(provider = %self.label, url = %self.url, error = %error, "OIDC discovery failed");
                OIDC_DISCOVERY_TOTAL
                    .with_label_values(&[self.label.as_str(), "failure"])
                    .inc();
                *state = DiscoveryState::Failed {
                    error: error.clone(),
                    at: Instant::now(),
                };
                Err(error)
            }
        }
    }

    async fn fetch(&self) -> Result<DiscoveryDocument, ProviderError> {
        let document: DiscoveryDocument = fetch_json(self.http.get(&self.url), &self.url)
            .await
            .map_err(|e| ProviderError::Discovery(e.to_string()))?;

        if document.authorization_endpoint.is_empty() || document.token_endpoint.is_empty() {
            return Err(ProviderError::Discovery(format!(
                "{} lacks authorization or token endpoint",
                self.url
            )));
        }
        if document.userinfo_endpoint.is_empty() {
            return Err(ProviderError::Discovery(format!(
                "{} lacks userinfo_endpoint",
                self.url
            )));
        }

        Ok(document)
    }
}
