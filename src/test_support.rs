//! In-memory collaborators for unit tests: scripted HTTP, a scripted socket
//! peer, and a session token minter.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use envelopes::{Envelope, WireFormat};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::error::ClientError;
use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::transport::{Link, Transport, TransportEvent, WriteCommand};

// =============================================================================
// TOKENS
// =============================================================================

/// Unsigned token shaped like the server's, with `=` padding stripped.
pub fn mint_token(uid: &str, han: &str, exp: i64, iat: Option<i64>) -> String {
    let mut claims = serde_json::json!({"uid": uid, "han": han, "exp": exp});
    if let Some(iat) = iat {
        claims["iat"] = Value::from(iat);
    }
    mint_token_with_claims(&claims)
}

pub fn mint_token_with_claims(claims: &Value) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = engine.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = engine.encode(serde_json::to_vec(claims).expect("claims"));
    let signature = engine.encode(b"signature");
    format!("{header}.{claims}.{signature}")
}

// =============================================================================
// HTTP
// =============================================================================

#[derive(Default)]
pub struct FakeHttp {
    responses: Mutex<VecDeque<Result<HttpResponse, ClientError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeHttp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, status: u16, body: &Value) {
        self.respond_raw(status, serde_json::to_vec(body).expect("body"));
    }

    pub fn respond_raw(&self, status: u16, body: impl Into<Vec<u8>>) {
        self.responses
            .lock()
            .expect("lock")
            .push_back(Ok(HttpResponse { status, body: body.into() }));
    }

    pub fn fail(&self, err: ClientError) {
        self.responses.lock().expect("lock").push_back(Err(err));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("lock").clone()
    }
}

#[async_trait::async_trait]
impl HttpTransport for FakeHttp {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, ClientError> {
        self.requests.lock().expect("lock").push(request);
        self.responses
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Err(ClientError::Transport("no scripted response".to_owned())))
    }
}

// =============================================================================
// SOCKET
// =============================================================================

/// Transport whose every connection is handed to the test as a [`FakePeer`].
pub struct FakeTransport {
    format: WireFormat,
    peers: mpsc::UnboundedSender<FakePeer>,
    refuse: Mutex<Option<String>>,
    hold: Mutex<Option<oneshot::Receiver<()>>>,
}

pub struct FakePeers {
    rx: mpsc::UnboundedReceiver<FakePeer>,
}

impl FakePeers {
    pub async fn next(&mut self) -> FakePeer {
        tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("connect within 5s")
            .expect("transport alive")
    }
}

impl FakeTransport {
    pub fn new(format: WireFormat) -> (Arc<Self>, FakePeers) {
        let (peers, rx) = mpsc::unbounded_channel();
        let transport = Self { format, peers, refuse: Mutex::new(None), hold: Mutex::new(None) };
        (Arc::new(transport), FakePeers { rx })
    }

    /// Fail the next connect with `message`.
    pub fn refuse_next(&self, message: &str) {
        *self.refuse.lock().expect("lock") = Some(message.to_owned());
    }

    /// Park the next connect until the returned sender fires or is dropped.
    pub fn hold_next(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.hold.lock().expect("lock") = Some(rx);
        tx
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, url: &str, _timeout: Duration) -> Result<Link, ClientError> {
        let hold = self.hold.lock().expect("lock").take();
        if let Some(hold) = hold {
            let _ = hold.await;
        }
        if let Some(message) = self.refuse.lock().expect("lock").take() {
            return Err(ClientError::Transport(message));
        }

        let (writer, commands) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        let peer = FakePeer { url: url.to_owned(), format: self.format, commands, events };
        self.peers
            .send(peer)
            .map_err(|_| ClientError::Transport("test dropped its peers".to_owned()))?;
        Ok(Link { writer, events: events_rx })
    }
}

/// The server side of one fake connection.
pub struct FakePeer {
    pub url: String,
    format: WireFormat,
    commands: mpsc::UnboundedReceiver<WriteCommand>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl FakePeer {
    pub async fn next_command(&mut self) -> Option<WriteCommand> {
        tokio::time::timeout(Duration::from_secs(5), self.commands.recv())
            .await
            .expect("command within 5s")
    }

    /// Receive, ack, and decode the next frame.
    pub async fn next_envelope(&mut self) -> Envelope {
        match self.next_command().await {
            Some(WriteCommand::Frame { bytes, text, ack, .. }) => {
                assert_eq!(text, self.format.is_text());
                let _ = ack.send(Ok(()));
                envelopes::decode(&bytes, self.format).expect("decodable frame")
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    /// Receive the next frame and reject it with `message`.
    pub async fn reject_next(&mut self, message: &str) {
        match self.next_command().await {
            Some(WriteCommand::Frame { ack, .. }) => {
                let _ = ack.send(Err(message.to_owned()));
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    pub fn send(&self, envelope: &Envelope) {
        let bytes = envelopes::encode(envelope, self.format).expect("encodable envelope");
        self.send_raw(bytes);
    }

    pub fn send_raw(&self, bytes: Vec<u8>) {
        let _ = self.events.send(TransportEvent::Message(bytes));
    }

    pub fn close(&self, code: Option<u16>, reason: &str) {
        let _ = self.events.send(TransportEvent::Closed { code, reason: reason.to_owned() });
    }
}
