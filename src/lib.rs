//! Realtime game-backend client engine.
//!
//! Two channels to the backend:
//! - an HTTP handshake that exchanges a [`Credential`] for a [`Session`];
//! - a duplex [`Socket`] carrying correlated requests, their replies, and
//!   server-pushed events, all interleaved.
//!
//! ```no_run
//! # async fn run() -> Result<(), playlink::ClientError> {
//! use playlink::{Client, ClientConfig, Credential};
//!
//! let client = Client::new(ClientConfig::default())?;
//! let session = client.register(&Credential::Device("device-1".to_owned())).await?;
//! let socket = client.socket();
//! socket.on_match_data(|data| println!("op {}", data.op_code));
//! socket.connect(&session).await?;
//! let reply = socket.rpc("echo", Some("hi".to_owned())).await?;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod correlator;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod session;
pub mod socket;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use auth::{AuthMode, Credential, GameCenterBundle};
pub use client::Client;
pub use config::ClientConfig;
pub use correlator::FromReply;
pub use dispatch::{Disconnect, SubscriptionId};
pub use envelopes::{Envelope, Payload, WireFormat, messages};
pub use error::{ApiError, ClientError, ErrorCode, ErrorKind, map_wire_error};
pub use session::Session;
pub use socket::{Socket, SocketStatus};
