//! Session handshake: exchange a credential for a session token over HTTP.
//!
//! ARCHITECTURE
//! ============
//! One POST to `/user/register` or `/user/login`, authorized with the
//! server key as HTTP Basic. The response body is a tagged union of either
//! `{"session": {"token": ...}}` or `{"error": {"code", "message"}}`.
//!
//! Outcomes:
//! - error union: mapped through [`map_wire_error`]; credential rejections
//!   become [`ClientError::Auth`], everything else [`ClientError::Server`].
//! - non-2xx without an error union: [`ClientError::Transport`] with the status.
//! - session: the token's claims are decoded into a [`Session`].
//! - anything else: [`ClientError::Protocol`].

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use envelopes::messages::WireError;

use crate::config::ClientConfig;
use crate::error::{ClientError, map_wire_error};
use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::session::{Session, now_millis};

/// Identity proof sent to the server. Serializes as `{"<kind>": ...}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Credential {
    Device(String),
    Custom(String),
    Email { email: String, password: String },
    Facebook(String),
    Google(String),
    Steam(String),
    GameCenter(GameCenterBundle),
}

/// Identity verification bundle issued by Game Center.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GameCenterBundle {
    pub player_id: String,
    pub bundle_id: String,
    pub timestamp: i64,
    pub salt: String,
    pub signature: String,
    pub public_key_url: String,
}

impl Credential {
    /// Tag used in logs. Never includes the secret itself.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Device(_) => "device",
            Self::Custom(_) => "custom",
            Self::Email { .. } => "email",
            Self::Facebook(_) => "facebook",
            Self::Google(_) => "google",
            Self::Steam(_) => "steam",
            Self::GameCenter(_) => "game_center",
        }
    }
}

/// Whether the handshake creates the account or expects it to exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMode {
    Register,
    Login,
}

impl AuthMode {
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Register => "/user/register",
            Self::Login => "/user/login",
        }
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Deserialize)]
struct AuthResponse {
    #[serde(default)]
    session: Option<SessionBody>,
    #[serde(default)]
    error: Option<WireError>,
}

#[derive(Deserialize)]
struct SessionBody {
    token: String,
}

// =============================================================================
// HANDSHAKE
// =============================================================================

/// Run the handshake against `config`'s server.
///
/// # Errors
///
/// See the module docs for how each response shape maps to a
/// [`ClientError`].
pub async fn authenticate(
    http: &dyn HttpTransport,
    config: &ClientConfig,
    credential: &Credential,
    mode: AuthMode,
) -> Result<Session, ClientError> {
    let request = build_request(config, credential, mode)?;
    let response = http.post(request).await?;
    let session = parse_response(&response, now_millis())?;
    info!(user_id = %session.user_id, credential = credential.kind(), ?mode, "session established");
    Ok(session)
}

fn build_request(
    config: &ClientConfig,
    credential: &Credential,
    mode: AuthMode,
) -> Result<HttpRequest, ClientError> {
    let body = serde_json::to_vec(credential).map_err(|e| ClientError::Protocol(e.to_string()))?;
    Ok(HttpRequest {
        url: format!("{}{}", config.http_base_url(), mode.path()),
        headers: vec![
            ("Authorization".to_owned(), config.basic_auth_header()),
            ("Accept-Language".to_owned(), config.lang.clone()),
            ("Content-Type".to_owned(), "application/json".to_owned()),
        ],
        body,
    })
}

fn parse_response(response: &HttpResponse, now: i64) -> Result<Session, ClientError> {
    let parsed = serde_json::from_slice::<AuthResponse>(&response.body).ok();

    if let Some(AuthResponse { error: Some(error), .. }) = &parsed {
        return Err(ClientError::from_handshake(map_wire_error(error.code, error.message.clone())));
    }

    if !response.is_success() {
        return Err(ClientError::Transport(format!("handshake failed with HTTP {}", response.status)));
    }

    match parsed {
        Some(AuthResponse { session: Some(body), .. }) => {
            Session::from_token(&body.token, now).map_err(|e| {
                warn!(error = %e, "handshake returned an undecodable session token");
                ClientError::from(e)
            })
        }
        _ => Err(ClientError::Protocol(
            "handshake response carried neither a session nor an error".to_owned(),
        )),
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
