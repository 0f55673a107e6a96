//! Error model: wire error mapping and the client error taxonomy.
//!
//! DESIGN
//! ======
//! The backend reports failures as `(code, message)`. [`map_wire_error`]
//! turns that into an [`ApiError`] with a typed [`ErrorCode`]; codes this
//! client does not know fall back to [`ErrorCode::Unknown`].
//!
//! Everything an engine call can fail with is a [`ClientError`]. Each variant
//! belongs to one [`ErrorKind`], and every error can be projected back into
//! the `{code, message}` model: local failures report `Unknown` with the raw
//! underlying text.
//!
//! `ClientError` is `Clone` so one failure can be fanned out to many waiters
//! (the disconnect drain). External error types are converted to text at the
//! boundary for that reason.

use std::fmt;

// =============================================================================
// ERROR CODES
// =============================================================================

/// Error codes the backend sends on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    RuntimeException,
    UnrecognizedPayload,
    MissingPayload,
    BadInput,
    AuthError,
    UserNotFound,
    UserRegisterInuse,
    UserLinkInuse,
    UserLinkProviderUnavailable,
    UserUnlinkDisallowed,
    UserHandleInuse,
    GroupNameInuse,
    StorageRejected,
    MatchNotFound,
    RuntimeFunctionNotFound,
    RuntimeFunctionException,
    /// Unmapped wire code, or a failure that never reached the server.
    Unknown,
}

impl ErrorCode {
    /// Map a numeric wire code. Never fails.
    #[must_use]
    pub fn from_wire(code: i32) -> Self {
        match code {
            0 => Self::RuntimeException,
            1 => Self::UnrecognizedPayload,
            2 => Self::MissingPayload,
            3 => Self::BadInput,
            4 => Self::AuthError,
            5 => Self::UserNotFound,
            6 => Self::UserRegisterInuse,
            7 => Self::UserLinkInuse,
            8 => Self::UserLinkProviderUnavailable,
            9 => Self::UserUnlinkDisallowed,
            10 => Self::UserHandleInuse,
            11 => Self::GroupNameInuse,
            12 => Self::StorageRejected,
            13 => Self::MatchNotFound,
            14 => Self::RuntimeFunctionNotFound,
            15 => Self::RuntimeFunctionException,
            _ => Self::Unknown,
        }
    }

    /// Grepable name, e.g. `"E_BAD_INPUT"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RuntimeException => "E_RUNTIME_EXCEPTION",
            Self::UnrecognizedPayload => "E_UNRECOGNIZED_PAYLOAD",
            Self::MissingPayload => "E_MISSING_PAYLOAD",
            Self::BadInput => "E_BAD_INPUT",
            Self::AuthError => "E_AUTH_ERROR",
            Self::UserNotFound => "E_USER_NOT_FOUND",
            Self::UserRegisterInuse => "E_USER_REGISTER_INUSE",
            Self::UserLinkInuse => "E_USER_LINK_INUSE",
            Self::UserLinkProviderUnavailable => "E_USER_LINK_PROVIDER_UNAVAILABLE",
            Self::UserUnlinkDisallowed => "E_USER_UNLINK_DISALLOWED",
            Self::UserHandleInuse => "E_USER_HANDLE_INUSE",
            Self::GroupNameInuse => "E_GROUP_NAME_INUSE",
            Self::StorageRejected => "E_STORAGE_REJECTED",
            Self::MatchNotFound => "E_MATCH_NOT_FOUND",
            Self::RuntimeFunctionNotFound => "E_RUNTIME_FUNCTION_NOT_FOUND",
            Self::RuntimeFunctionException => "E_RUNTIME_FUNCTION_EXCEPTION",
            Self::Unknown => "E_UNKNOWN",
        }
    }

    /// Codes that mean the credentials themselves were rejected.
    #[must_use]
    pub fn is_auth_rejection(self) -> bool {
        matches!(self, Self::AuthError | Self::UserNotFound | Self::UserRegisterInuse)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed `{code, message}` error as reported by the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Convert a wire error into its typed form.
#[must_use]
pub fn map_wire_error(code: i32, message: impl Into<String>) -> ApiError {
    ApiError { code: ErrorCode::from_wire(code), message: message.into() }
}

// =============================================================================
// CLIENT ERROR
// =============================================================================

/// Coarse category of a [`ClientError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// No server round-trip completed.
    Transport,
    /// Malformed or unexpected frame.
    Protocol,
    /// The backend answered with an error.
    Server,
    /// The backend rejected the credentials.
    Auth,
    /// A configured reply timeout elapsed.
    Timeout,
    /// Local configuration could not be parsed.
    Config,
}

/// Errors produced by engine operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Network or socket failure before any reply.
    #[error("transport error: {0}")]
    Transport(String),

    /// The socket is not connected.
    #[error("socket is not connected")]
    NotConnected,

    /// The connection closed while the operation was in flight.
    #[error("connection closed")]
    Closed,

    /// A frame or response could not be understood.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The backend returned an error.
    #[error("server error {0}")]
    Server(ApiError),

    /// The backend rejected the credentials during the handshake.
    #[error("authentication rejected {0}")]
    Auth(ApiError),

    /// No reply arrived within the configured reply timeout.
    #[error("timed out waiting for reply")]
    Timeout,

    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    Config(String),
}

impl ClientError {
    /// Category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::NotConnected | Self::Closed => ErrorKind::Transport,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Server(_) => ErrorKind::Server,
            Self::Auth(_) => ErrorKind::Auth,
            Self::Timeout => ErrorKind::Timeout,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Typed code; `Unknown` for failures that did not come from the server.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Server(api) | Self::Auth(api) => api.code,
            _ => ErrorCode::Unknown,
        }
    }

    /// Server message, or the raw local failure text.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Server(api) | Self::Auth(api) => api.message.clone(),
            Self::Transport(message) | Self::Protocol(message) | Self::Config(message) => {
                message.clone()
            }
            other => other.to_string(),
        }
    }

    /// Project into the `{code, message}` model.
    #[must_use]
    pub fn to_api_error(&self) -> ApiError {
        ApiError { code: self.code(), message: self.message() }
    }

    /// Classify a handshake error: credential rejections become [`ClientError::Auth`].
    #[must_use]
    pub fn from_handshake(api: ApiError) -> Self {
        if api.code.is_auth_rejection() {
            Self::Auth(api)
        } else {
            Self::Server(api)
        }
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
