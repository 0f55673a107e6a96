//! Session tokens and the claims decoded from them.
//!
//! The token is `header.claims.signature`. Only the claims segment is read;
//! the signature is never checked here because verifying it needs the
//! server's secret. The server re-validates the token on every socket
//! connect, so a forged claims segment only misleads the local process.
//!
//! The claims segment is base64url. Servers strip the `=` padding, so it is
//! restored to a multiple of 4 before decoding.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Authenticated identity returned by the handshake. Times are Unix ms.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub handle: String,
    pub created_at: i64,
    pub expires_at: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid session token format")]
    InvalidFormat,
    #[error("session token claims are not base64url: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("session token claims are invalid: {0}")]
    Claims(#[from] serde_json::Error),
}

impl From<TokenError> for ClientError {
    fn from(err: TokenError) -> Self {
        Self::Protocol(err.to_string())
    }
}

#[derive(Deserialize)]
struct Claims {
    uid: String,
    han: String,
    exp: i64,
    #[serde(default)]
    iat: Option<i64>,
}

impl Session {
    /// Decode a freshly issued token. `created_at` is used when the token
    /// carries no `iat` claim.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenError`] if the token is not three non-empty
    /// segments, the claims are not base64url, or required claims are
    /// missing.
    pub fn from_token(token: &str, created_at: i64) -> Result<Self, TokenError> {
        let claims = decode_claims(token)?;
        Ok(Self {
            token: token.to_owned(),
            user_id: claims.uid,
            handle: claims.han,
            created_at: claims.iat.map_or(created_at, seconds_to_millis),
            expires_at: seconds_to_millis(claims.exp),
        })
    }

    /// Rebuild a session from a previously stored token.
    ///
    /// `created_at` comes from the `iat` claim, so restoring the same token
    /// twice yields equal sessions. A token without `iat` gets the current
    /// time instead; use [`Session::from_token`] with a stored timestamp when
    /// that must be stable.
    ///
    /// # Errors
    ///
    /// Same as [`Session::from_token`].
    pub fn restore(token: &str) -> Result<Self, TokenError> {
        Self::from_token(token, now_millis())
    }

    /// `true` once `now` (Unix ms) has reached the expiry.
    #[must_use]
    pub fn has_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    #[must_use]
    pub fn has_expired_now(&self) -> bool {
        self.has_expired(now_millis())
    }
}

fn decode_claims(token: &str) -> Result<Claims, TokenError> {
    let mut parts = token.split('.');
    let claims_b64 = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(c), Some(s), None) if !h.is_empty() && !c.is_empty() && !s.is_empty() => c,
        _ => return Err(TokenError::InvalidFormat),
    };

    let mut padded = claims_b64.trim_end_matches('=').to_owned();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }

    let bytes = base64::engine::general_purpose::URL_SAFE.decode(padded)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn seconds_to_millis(seconds: i64) -> i64 {
    seconds.saturating_mul(1000)
}

/// Wall-clock Unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
