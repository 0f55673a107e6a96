//! Client facade: binds config and transports, runs handshakes, and creates
//! sockets.

use std::sync::Arc;

use crate::auth::{self, AuthMode, Credential};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::http::{HttpTransport, ReqwestHttp};
use crate::session::Session;
use crate::socket::Socket;
use crate::transport::{Transport, WsTransport};

#[derive(Clone)]
pub struct Client {
    config: ClientConfig,
    http: Arc<dyn HttpTransport>,
    transport: Arc<dyn Transport>,
}

impl Client {
    /// Client using the default `reqwest` and websocket transports.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = ReqwestHttp::new(config.request_timeout, config.connect_timeout)?;
        Ok(Self::with_transports(config, Arc::new(http), Arc::new(WsTransport)))
    }

    #[must_use]
    pub fn with_transports(
        config: ClientConfig,
        http: Arc<dyn HttpTransport>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self { config, http, transport }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Exchange `credential` for a session.
    ///
    /// # Errors
    ///
    /// [`ClientError::Auth`] when the credentials are rejected, otherwise
    /// see [`auth::authenticate`].
    pub async fn authenticate(
        &self,
        credential: &Credential,
        mode: AuthMode,
    ) -> Result<Session, ClientError> {
        auth::authenticate(self.http.as_ref(), &self.config, credential, mode).await
    }

    /// # Errors
    ///
    /// See [`Client::authenticate`].
    pub async fn register(&self, credential: &Credential) -> Result<Session, ClientError> {
        self.authenticate(credential, AuthMode::Register).await
    }

    /// # Errors
    ///
    /// See [`Client::authenticate`].
    pub async fn login(&self, credential: &Credential) -> Result<Session, ClientError> {
        self.authenticate(credential, AuthMode::Login).await
    }

    /// New, independent, disconnected socket.
    #[must_use]
    pub fn socket(&self) -> Socket {
        Socket::new(self.config.clone(), Arc::clone(&self.transport))
    }
}
