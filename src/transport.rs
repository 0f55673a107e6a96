//! Duplex socket transport seam.
//!
//! DESIGN
//! ======
//! A [`Transport`] opens one connection and hands back a [`Link`]: a command
//! channel in, an event channel out. The engine never touches sockets
//! directly, which keeps the connection manager testable with an in-memory
//! peer.
//!
//! [`WsTransport`] runs two tasks per connection:
//! - writer: drains [`WriteCommand`]s into the websocket sink and acks each
//!   frame once the sink accepted it
//! - reader: turns websocket messages into [`TransportEvent`]s and always
//!   finishes with exactly one `Closed`
//!
//! Dropping every `writer` sender closes the websocket.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error};

use crate::error::ClientError;

/// Outbound instruction for the transport writer.
#[derive(Debug)]
pub enum WriteCommand {
    Frame {
        bytes: Vec<u8>,
        /// Send as a text frame instead of binary.
        text: bool,
        /// Delivery hint for transports that distinguish reliable and
        /// unreliable channels. Websockets are always reliable.
        reliable: bool,
        /// Resolved once the frame was handed to the network, or with the
        /// failure text.
        ack: oneshot::Sender<Result<(), String>>,
    },
    Close,
}

/// Inbound event from the transport reader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Message(Vec<u8>),
    Error(String),
    /// Terminal. Nothing follows it.
    Closed { code: Option<u16>, reason: String },
}

/// An open connection.
#[derive(Debug)]
pub struct Link {
    pub writer: mpsc::UnboundedSender<WriteCommand>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens duplex connections. Enables mocking in tests.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Connect to `url`, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the connection cannot be
    /// opened in time.
    async fn connect(&self, url: &str, timeout: Duration) -> Result<Link, ClientError>;
}

// =============================================================================
// WEBSOCKET
// =============================================================================

#[derive(Clone, Copy, Debug, Default)]
pub struct WsTransport;

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &str, timeout: Duration) -> Result<Link, ClientError> {
        let (stream, _) = tokio::time::timeout(timeout, connect_async(url))
            .await
            .map_err(|_| ClientError::Transport(format!("connect timed out after {timeout:?}")))?
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let (sink, source) = stream.split();
        let (writer, commands) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();

        tokio::spawn(run_writer(sink, commands));
        tokio::spawn(run_reader(source, events_tx));

        Ok(Link { writer, events })
    }
}

async fn run_writer<S>(mut sink: S, mut commands: mpsc::UnboundedReceiver<WriteCommand>)
where
    S: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    while let Some(command) = commands.recv().await {
        match command {
            WriteCommand::Frame { bytes, text, ack, .. } => {
                let message = if text {
                    match String::from_utf8(bytes) {
                        Ok(text) => Message::text(text),
                        Err(e) => {
                            let _ = ack.send(Err(e.to_string()));
                            continue;
                        }
                    }
                } else {
                    Message::binary(bytes)
                };
                let result = sink.send(message).await.map_err(|e| e.to_string());
                let failed = result.is_err();
                let _ = ack.send(result);
                if failed {
                    break;
                }
            }
            WriteCommand::Close => break,
        }
    }

    debug!("ws writer closing");
    let _ = sink.send(Message::Close(None)).await;
    let _ = sink.close().await;
}

async fn run_reader<S>(mut source: S, events: mpsc::UnboundedSender<TransportEvent>)
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let closed = loop {
        let Some(message) = source.next().await else {
            break TransportEvent::Closed { code: None, reason: String::new() };
        };
        let event = match message {
            Ok(Message::Binary(bytes)) => TransportEvent::Message(bytes.to_vec()),
            Ok(Message::Text(text)) => TransportEvent::Message(text.as_str().as_bytes().to_vec()),
            Ok(Message::Close(frame)) => {
                break match frame {
                    Some(frame) => TransportEvent::Closed {
                        code: Some(u16::from(frame.code)),
                        reason: frame.reason.as_str().to_owned(),
                    },
                    None => TransportEvent::Closed { code: None, reason: String::new() },
                };
            }
            Ok(_) => continue,
            Err(e) => {
                error!(error = %e, "ws read failed");
                let reason = e.to_string();
                let _ = events.send(TransportEvent::Error(reason.clone()));
                break TransportEvent::Closed { code: None, reason };
            }
        };
        if events.send(event).is_err() {
            return;
        }
    };

    let _ = events.send(closed);
}
