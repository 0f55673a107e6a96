//! HTTP transport seam used by the session handshake.
//!
//! The handshake only ever needs "POST these bytes, give me the status and
//! body back", so the trait is that narrow. [`ReqwestHttp`] is the default;
//! tests swap in a scripted implementation.

use std::time::Duration;

use crate::error::ClientError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Async POST capability. Enables mocking in tests.
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send one POST request.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] when no HTTP response was received
    /// (DNS, connect, TLS, timeout). Any received status is an `Ok`.
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, ClientError>;
}

// =============================================================================
// REQWEST
// =============================================================================

pub struct ReqwestHttp {
    http: reqwest::Client,
}

impl ReqwestHttp {
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the HTTP client cannot be built.
    pub fn new(request_timeout: Duration, connect_timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestHttp {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        let mut builder = self.http.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .body(request.body)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(HttpResponse { status, body: body.to_vec() })
    }
}
