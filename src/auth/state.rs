//! OAuth `state` parameter handling
//!
//! The state token is `base64url(nonce || issued_at || hmac(nonce || issued_at))`,
//! set as a short-lived cookie and echoed back by the provider. A callback is
//! accepted only when the echoed value matches the cookie byte for byte, the
//! HMAC checks out under the current secret and the token is under ten
//! minutes old. The cookie is cleared on the first validation attempt.

use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const OAUTH_STATE_COOKIE_NAME: &str = "yardgate_oauth_state";
/// Maximum age of a state token
pub const STATE_TTL_SECS: i64 = 10 * 60;

const NONCE_LEN: usize = 16;
const TIMESTAMP_LEN: usize = 8;
const SIGNATURE_LEN: usize = 32;
const PAYLOAD_LEN: usize = NONCE_LEN + TIMESTAMP_LEN;
const TOKEN_LEN: usize = PAYLOAD_LEN + SIGNATURE_LEN;

/// Why an OAuth callback's `state` was refused
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("missing state cookie")]
    MissingCookie,
    #[error("state mismatch")]
    StateMismatch,
    #[error("invalid state encoding")]
    InvalidEncoding,
    #[error("invalid state length")]
    InvalidLength,
    #[error("invalid state signature")]
    InvalidSignature,
    #[error("state expired")]
    Expired,
    #[error("state key rejected: {0}")]
    InvalidKey(String),
}

/// Generates and validates HMAC-signed OAuth state tokens.
pub struct OAuthStateManager {
    secret: Vec<u8>,
    secure: bool,
}

impl OAuthStateManager {
    pub fn new(secret: &str, secure: bool) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            secure,
        }
    }

    /// Create a state token and add the matching cookie to the jar.
    pub fn generate(&self, jar: CookieJar) -> Result<(CookieJar, String), StateError> {
        let token = self.generate_at(Utc::now().timestamp())?;
        let cookie = Cookie::build((OAUTH_STATE_COOKIE_NAME, token.clone()))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(STATE_TTL_SECS))
            .build();
        Ok((jar.add(cookie), token))
    }

    /// Check the callback's `state` against the cookie.
    ///
    /// The returned jar always carries the clearing cookie, whatever the outcome,
    /// so a token can be presented at most once.
    pub fn validate(&self, jar: CookieJar, state: &str) -> (CookieJar, Result<(), StateError>) {
        let Some(cookie_value) = jar
            .get(OAUTH_STATE_COOKIE_NAME)
            .map(|cookie| cookie.value().to_owned())
        else {
            return (jar, Err(StateError::MissingCookie));
        };

        let jar = self.discard(jar);

        if state != cookie_value {
            return (jar, Err(StateError::StateMismatch));
        }

        let result = self.verify_token(state, Utc::now().timestamp());
        (jar, result)
    }

    /// Expire the state cookie without looking at it.
    pub fn discard(&self, jar: CookieJar) -> CookieJar {
        jar.add(self.removal_cookie())
    }

    fn generate_at(&self, issued_at: i64) -> Result<String, StateError> {
        let mut raw = [0_u8; TOKEN_LEN];
        rand::thread_rng().fill_bytes(&mut raw[..NONCE_LEN]);
        raw[NONCE_LEN..PAYLOAD_LEN].copy_from_slice(&(issued_at.max(0) as u64).to_be_bytes());

        let signature = self.mac()?.chain_update(&raw[..PAYLOAD_LEN]).finalize();
        raw[PAYLOAD_LEN..].copy_from_slice(&signature.into_bytes());

        Ok(URL_SAFE_NO_PAD.encode(raw))
    }

    /// Decode and check a token's signature and age as of `now` (unix seconds).
    fn verify_token(&self, token: &str, now: i64) -> Result<(), StateError> {
        let raw = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| StateError::InvalidEncoding)?;
        if raw.len() != TOKEN_LEN {
            return Err(StateError::InvalidLength);
        }

        let (payload, signature) = raw.split_at(PAYLOAD_LEN);
        self.mac()?
            .chain_update(payload)
            .verify_slice(signature)
            .map_err(|_| StateError::InvalidSignature)?;

        let mut timestamp = [0_u8; TIMESTAMP_LEN];
        timestamp.copy_from_slice(&payload[NONCE_LEN..]);
        let issued_at = i64::try_from(u64::from_be_bytes(timestamp))
            .map_err(|_| StateError::InvalidEncoding)?;

        if now.saturating_sub(issued_at) > STATE_TTL_SECS {
            return Err(StateError::Expired);
        }

        Ok(())
    }

    fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::build((OAUTH_STATE_COOKIE_NAME, ""))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .build();
        cookie.make_removal();
        cookie
    }

    fn mac(&self) -> Result<HmacSha256, StateError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| StateError::InvalidKey(e.to_string()))
    }
}
