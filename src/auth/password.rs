//! Password verification
//!
//! Stored hashes are self-describing: the prefix selects the algorithm.
//!
//! - `$6$...` SHA-512 crypt (what `genhash` produces)
//! - `$argon2id$...` / `$argon2i$...` / `$argon2d$...` Argon2 PHC strings

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use sha_crypt::{Sha512Params, sha512_check, sha512_simple};
use thiserror::Error;

/// Bad user id or password.
///
/// Carries no detail on purpose: callers must not learn which half was wrong.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid credentials")]
pub struct CredentialError;

/// Check a plaintext password against a stored hash.
///
/// Returns `false` for a mismatch and for any malformed or unsupported hash.
pub fn verify_password(password: &str, hash: &str) -> bool {
    if hash.starts_with("$6$") {
        return sha512_check(password, hash).is_ok();
    }

    if hash.starts_with("$argon2") {
        return match PasswordHash::new(hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        };
    }

    false
}

/// Produce a fresh salted SHA-512 crypt hash.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    sha512_simple(password, &Sha512Params::default())
        .map_err(|e| anyhow::anyhow!("hashing password: {e:?}"))
}

/// Look up `user_id` in `users` and verify its password.
pub fn authenticate<'a>(
    users: &'a [crate::config::UserCredential],
    user_id: &str,
    password: &str,
) -> Result<&'a crate::config::UserCredential, CredentialError> {
    users
        .iter()
        .find(|user| user.id == user_id)
        .filter(|user| verify_password(password, &user.password_hash))
        .ok_or(CredentialError)
}
