//! Session management
//!
//! Uses HMAC-signed tokens stored in cookies.
//! No server-side session storage needed.

use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Fixed session lifetime from issuance
pub const SESSION_TTL_SECS: i64 = 24 * 60 * 60;

/// Why a session cookie was not accepted (or could not be issued)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("no session cookie")]
    NoSession,
    #[error("malformed session cookie")]
    Malformed,
    #[error("invalid session signature")]
    InvalidSignature,
    #[error("session expired")]
    Expired,
    #[error("session has an empty identity")]
    EmptyIdentity,
    #[error("encoding session: {0}")]
    Encoding(String),
}

/// Signed cookie payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPayload {
    pub user_id: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expires at (unix seconds)
    pub exp: i64,
}

/// Issues and validates session cookies.
///
/// Stateless apart from the secret; share it behind an `Arc`.
pub struct SessionManager {
    secret: Vec<u8>,
    cookie_name: String,
    secure: bool,
}

impl SessionManager {
    pub fn new(secret: &str, cookie_name: impl Into<String>, secure: bool) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            cookie_name: cookie_name.into(),
            secure,
        }
    }

    /// Add a signed session cookie for `user_id` to the jar.
    pub fn create_session(&self, jar: CookieJar, user_id: &str) -> Result<CookieJar, SessionError> {
        let token = self.sign_session(user_id, Utc::now())?;
        let cookie = Cookie::build((self.cookie_name.clone(), token))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(SESSION_TTL_SECS))
            .build();
        Ok(jar.add(cookie))
    }

    /// Read and verify the session cookie, returning the user id.
    pub fn validate_session(&self, jar: &CookieJar) -> Result<String, SessionError> {
        let cookie = jar.get(&self.cookie_name).ok_or(SessionError::NoSession)?;
        self.verify_token(cookie.value(), Utc::now())
            .map(|payload| payload.user_id)
    }

    /// Load the current session, then expire it.
    ///
    /// An absent cookie is fine; a cookie that fails to decode is an error
    /// and the jar is left untouched. Use [`expire_cookie`](Self::expire_cookie)
    /// to clear unconditionally.
    pub fn clear_session(&self, jar: CookieJar) -> Result<CookieJar, SessionError> {
        match self.validate_session(&jar) {
            Ok(_) | Err(SessionError::NoSession) => Ok(self.expire_cookie(jar)),
            Err(e) => Err(e),
        }
    }

    /// Write an expiring session cookie regardless of what the request carried.
    pub fn expire_cookie(&self, jar: CookieJar) -> CookieJar {
        let mut cookie = Cookie::build((self.cookie_name.clone(), ""))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .build();
        cookie.make_removal();
        jar.add(cookie)
    }

    /// Create a signed session token
    ///
    /// Token format: base64(payload).base64(hmac_sha256(base64(payload)))
    pub fn sign_session(&self, user_id: &str, now: DateTime<Utc>) -> Result<String, SessionError> {
        let payload = SessionPayload {
            user_id: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(SESSION_TTL_SECS)).timestamp(),
        };
        let json =
            serde_json::to_vec(&payload).map_err(|e| SessionError::Encoding(e.to_string()))?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(json);

        let signature = self.mac()?.chain_update(payload_b64.as_bytes()).finalize();
        let signature_b64 = URL_SAFE_NO_PAD.encode(signature.into_bytes());

        Ok(format!("{payload_b64}.{signature_b64}"))
    }

    /// Verify and decode a session token as of `now`.
    pub fn verify_token(&self, token: &str, now: DateTime<Utc>) -> Result<SessionPayload, SessionError> {
        let (payload_b64, signature_b64) =
            token.split_once('.').ok_or(SessionError::Malformed)?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| SessionError::Malformed)?;

        // Signature first: nothing in the payload is looked at before it checks out.
        self.mac()
            .map_err(|_| SessionError::InvalidSignature)?
            .chain_update(payload_b64.as_bytes())
            .verify_slice(&signature)
            .map_err(|_| SessionError::InvalidSignature)?;

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| SessionError::Malformed)?;
        let payload: SessionPayload =
            serde_json::from_slice(&payload_bytes).map_err(|_| SessionError::Malformed)?;

        if now.timestamp() > payload.exp {
            return Err(SessionError::Expired);
        }
        if payload.user_id.is_empty() {
            return Err(SessionError::EmptyIdentity);
        }

        Ok(payload)
    }

    fn mac(&self) -> Result<HmacSha256, SessionError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| SessionError::Encoding(e.to_string()))
    }
}
