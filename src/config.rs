//! Client configuration parsed from environment variables or built in code.

use std::time::Duration;

use base64::Engine;
use envelopes::WireFormat;

use crate::error::ClientError;

pub const DEFAULT_SERVER_KEY: &str = "defaultkey";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 7350;
pub const DEFAULT_LANG: &str = "en";
pub const DEFAULT_SOCKET_PATH: &str = "/api";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Shared key identifying this game to the server.
    pub server_key: String,
    pub host: String,
    pub port: u16,
    /// Use `https`/`wss` instead of `http`/`ws`.
    pub ssl: bool,
    /// Language tag sent as `Accept-Language` and on the socket URL.
    pub lang: String,
    pub socket_path: String,
    pub format: WireFormat,
    /// Whole-request timeout for HTTP calls.
    pub request_timeout: Duration,
    /// TCP/TLS connect timeout, also bounds the websocket handshake.
    pub connect_timeout: Duration,
    /// Give up on a correlated reply after this long. `None` waits until
    /// the reply arrives or the socket closes.
    pub reply_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_KEY)
    }
}

impl ClientConfig {
    #[must_use]
    pub fn new(server_key: impl Into<String>) -> Self {
        Self {
            server_key: server_key.into(),
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            ssl: false,
            lang: DEFAULT_LANG.to_owned(),
            socket_path: DEFAULT_SOCKET_PATH.to_owned(),
            format: WireFormat::Protobuf,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            reply_timeout: None,
        }
    }

    /// Build typed client config from environment variables.
    ///
    /// All optional:
    /// - `PLAYLINK_SERVER_KEY`: default `defaultkey`
    /// - `PLAYLINK_HOST` / `PLAYLINK_PORT`: default `127.0.0.1:7350`
    /// - `PLAYLINK_SSL`: `true` or `false` (default)
    /// - `PLAYLINK_LANG`: default `en`
    /// - `PLAYLINK_FORMAT`: `protobuf` (default) or `json`
    /// - `PLAYLINK_REQUEST_TIMEOUT_MS`: default 5000
    /// - `PLAYLINK_CONNECT_TIMEOUT_MS`: default 3000
    /// - `PLAYLINK_REPLY_TIMEOUT_MS`: unset means no reply timeout
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] for an unknown `PLAYLINK_SSL` or
    /// `PLAYLINK_FORMAT` value.
    pub fn from_env() -> Result<Self, ClientError> {
        let defaults = Self::default();

        let server_key = std::env::var("PLAYLINK_SERVER_KEY").unwrap_or(defaults.server_key);
        let host = std::env::var("PLAYLINK_HOST").unwrap_or(defaults.host);
        let port = env_parse("PLAYLINK_PORT", defaults.port);
        let ssl = parse_bool(std::env::var("PLAYLINK_SSL").ok().as_deref())?;
        let lang = std::env::var("PLAYLINK_LANG").unwrap_or(defaults.lang);
        let format = parse_format(std::env::var("PLAYLINK_FORMAT").ok().as_deref())?;
        let request_timeout = Duration::from_millis(env_parse(
            "PLAYLINK_REQUEST_TIMEOUT_MS",
            DEFAULT_REQUEST_TIMEOUT_MS,
        ));
        let connect_timeout = Duration::from_millis(env_parse(
            "PLAYLINK_CONNECT_TIMEOUT_MS",
            DEFAULT_CONNECT_TIMEOUT_MS,
        ));
        let reply_timeout = std::env::var("PLAYLINK_REPLY_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis);

        Ok(Self {
            server_key,
            host,
            port,
            ssl,
            lang,
            socket_path: defaults.socket_path,
            format,
            request_timeout,
            connect_timeout,
            reply_timeout,
        })
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    #[must_use]
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: WireFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, request: Duration, connect: Duration) -> Self {
        self.request_timeout = request;
        self.connect_timeout = connect;
        self
    }

    #[must_use]
    pub fn with_reply_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// `http(s)://host:port`, no trailing slash.
    #[must_use]
    pub fn http_base_url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }

    /// Socket target with the session token and language as percent-encoded
    /// query parameters.
    #[must_use]
    pub fn socket_url(&self, token: &str) -> String {
        let scheme = if self.ssl { "wss" } else { "ws" };
        let mut url = format!(
            "{scheme}://{}:{}{}?token={}&lang={}",
            self.host,
            self.port,
            self.socket_path,
            urlencoding::encode(token),
            urlencoding::encode(&self.lang)
        );
        if self.format == WireFormat::Json {
            url.push_str("&format=json");
        }
        url
    }

    /// `Basic base64(server_key + ":")`.
    #[must_use]
    pub fn basic_auth_header(&self) -> String {
        let encoded =
            base64::engine::general_purpose::STANDARD.encode(format!("{}:", self.server_key));
        format!("Basic {encoded}")
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_bool(raw: Option<&str>) -> Result<bool, ClientError> {
    match raw.unwrap_or("false") {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(ClientError::Config(format!("unknown PLAYLINK_SSL: {other}"))),
    }
}

fn parse_format(raw: Option<&str>) -> Result<WireFormat, ClientError> {
    match raw.unwrap_or("protobuf") {
        "protobuf" => Ok(WireFormat::Protobuf),
        "json" => Ok(WireFormat::Json),
        other => Err(ClientError::Config(format!(
            "unsupported PLAYLINK_FORMAT '{other}' (expected 'protobuf' or 'json')"
        ))),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
