//! Connection manager: one realtime socket and everything it owns.
//!
//! ARCHITECTURE
//! ============
//! A [`Socket`] owns its connection state, its [`Correlator`] and its
//! [`Dispatcher`]. Nothing is shared between sockets.
//!
//! ```text
//! caller ── send_correlated ──► Correlator.register ──► Transport writer
//!                                     ▲
//! Transport events ──► reader task ───┤ cid present
//!                                     └──► Dispatcher (no cid)
//! ```
//!
//! LIFECYCLE
//! =========
//! 1. `connect` moves Disconnected → Connecting, opens the transport, then
//!    Connecting → Connected and spawns the reader task.
//! 2. Frames with a cid resolve the matching pending request; others are
//!    push events.
//! 3. A close from either side moves Connected → Disconnected once per
//!    connection generation, drains every pending request with
//!    [`ClientError::Closed`], and notifies disconnect subscribers.
//!
//! DESIGN
//! ======
//! Every connect attempt gets a new generation number. The reader task only
//! closes the generation it was spawned for, so a late close event from an
//! old connection can never tear down a newer one.
//!
//! A correlated send registers its pending entry while holding the state
//! lock in the Connected state. The close path flips the state before it
//! drains, so no entry can be registered after the drain and left waiting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use envelopes::messages::{
    Logout, Match, MatchCreate, MatchData, MatchDataSend, MatchJoin, MatchLeave, MatchPresence,
    MatchmakeAdd, MatchmakeMatched, MatchmakeRemove, MatchmakeTicket, Notification, Rpc, Topic,
    TopicId, TopicJoin, TopicLeave, TopicMessage, TopicMessageAck, TopicMessageSend,
    TopicPresence, TopicTarget, UserPresence,
};
use envelopes::{Envelope, Payload};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::correlator::{Correlator, FromReply, Reply};
use crate::dispatch::{Disconnect, Dispatcher, SubscriptionId};
use crate::error::{ClientError, map_wire_error};
use crate::session::Session;
use crate::transport::{Transport, TransportEvent, WriteCommand};

/// Close code reported to disconnect subscribers for a local `disconnect`.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Connection state as seen by callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketStatus {
    Disconnected,
    Connecting,
    Connected,
}

enum ConnectionState {
    Disconnected,
    Connecting {
        generation: u64,
    },
    Connected {
        generation: u64,
        writer: mpsc::UnboundedSender<WriteCommand>,
        reader: JoinHandle<()>,
    },
}

struct SocketInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    state: Mutex<ConnectionState>,
    next_generation: AtomicU64,
    correlator: Correlator,
    dispatcher: Dispatcher,
}

/// A realtime connection. Cloning shares the same connection.
#[derive(Clone)]
pub struct Socket {
    inner: Arc<SocketInner>,
}

// =============================================================================
// LIFECYCLE
// =============================================================================

impl Socket {
    #[must_use]
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(SocketInner {
                config,
                transport,
                state: Mutex::new(ConnectionState::Disconnected),
                next_generation: AtomicU64::new(0),
                correlator: Correlator::new(),
                dispatcher: Dispatcher::new(),
            }),
        }
    }

    /// Open the connection, authenticated by `session`'s token.
    ///
    /// Connecting an already connected socket is a no-op.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Transport`] if another connect is in flight or the
    ///   transport fails to open.
    /// - [`ClientError::Closed`] if `disconnect` was called before the
    ///   transport finished opening.
    pub async fn connect(&self, session: &Session) -> Result<(), ClientError> {
        let generation = {
            let mut state = self.inner.lock_state();
            match *state {
                ConnectionState::Connected { .. } => return Ok(()),
                ConnectionState::Connecting { .. } => {
                    return Err(ClientError::Transport("connect already in progress".to_owned()));
                }
                ConnectionState::Disconnected => {}
            }
            let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
            *state = ConnectionState::Connecting { generation };
            generation
        };

        info!(user_id = %session.user_id, generation, "socket connecting");
        let url = self.inner.config.socket_url(&session.token);
        let link = match self.inner.transport.connect(&url, self.inner.config.connect_timeout).await
        {
            Ok(link) => link,
            Err(err) => {
                let mut state = self.inner.lock_state();
                if matches!(*state, ConnectionState::Connecting { generation: g } if g == generation)
                {
                    *state = ConnectionState::Disconnected;
                }
                error!(error = %err, "socket connect failed");
                return Err(err);
            }
        };

        let mut state = self.inner.lock_state();
        if !matches!(*state, ConnectionState::Connecting { generation: g } if g == generation) {
            let _ = link.writer.send(WriteCommand::Close);
            info!(generation, "connect abandoned, socket was disconnected");
            return Err(ClientError::Closed);
        }
        let reader = tokio::spawn(run_reader(Arc::downgrade(&self.inner), generation, link.events));
        *state = ConnectionState::Connected { generation, writer: link.writer, reader };
        drop(state);

        info!(user_id = %session.user_id, generation, "socket connected");
        Ok(())
    }

    /// Close the connection. Pending requests fail with [`ClientError::Closed`]
    /// and disconnect subscribers are notified before this returns.
    ///
    /// A no-op on a disconnected socket.
    pub async fn disconnect(&self) {
        let previous =
            std::mem::replace(&mut *self.inner.lock_state(), ConnectionState::Disconnected);
        match previous {
            ConnectionState::Disconnected => {}
            ConnectionState::Connecting { generation } => {
                info!(generation, "disconnect while connecting");
            }
            ConnectionState::Connected { writer, reader, .. } => {
                let _ = writer.send(WriteCommand::Close);
                drop(writer);
                reader.abort();
                self.inner.finish_close(&Disconnect {
                    code: Some(NORMAL_CLOSURE),
                    reason: "disconnected by client".to_owned(),
                });
                // Cancelled is the expected outcome.
                let _ = reader.await;
            }
        }
    }

    #[must_use]
    pub fn status(&self) -> SocketStatus {
        match *self.inner.lock_state() {
            ConnectionState::Disconnected => SocketStatus::Disconnected,
            ConnectionState::Connecting { .. } => SocketStatus::Connecting,
            ConnectionState::Connected { .. } => SocketStatus::Connected,
        }
    }

    /// Number of correlated requests still waiting for a reply.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.len()
    }

    /// Server clock in Unix ms, from the latest heartbeat.
    #[must_use]
    pub fn server_time(&self) -> i64 {
        self.inner.dispatcher.server_time().now()
    }
}

// =============================================================================
// SENDING
// =============================================================================

impl Socket {
    /// Send `payload` with a fresh correlation id and wait for the reply.
    ///
    /// `Ok(None)` is an empty acknowledgement.
    ///
    /// # Errors
    ///
    /// - [`ClientError::NotConnected`] when the socket is not connected.
    /// - [`ClientError::Transport`] if the frame could not be written.
    /// - [`ClientError::Server`] if the server replied with an error.
    /// - [`ClientError::Closed`] if the connection closed first.
    /// - [`ClientError::Timeout`] if a reply timeout is configured and elapsed.
    pub async fn send_correlated(&self, payload: Payload) -> Result<Option<Payload>, ClientError> {
        let (writer, cid, mut rx) = {
            let state = self.inner.lock_state();
            let ConnectionState::Connected { writer, .. } = &*state else {
                return Err(ClientError::NotConnected);
            };
            let (cid, rx) = self.inner.correlator.register();
            (writer.clone(), cid, rx)
        };

        let kind = payload.kind().to_owned();
        let envelope = Envelope::correlated(cid.clone(), payload);
        // The deadline covers the write ack as well as the reply.
        let exchange = async {
            if let Err(err) = self.inner.write(&writer, &envelope, true).await {
                warn!(%cid, %kind, error = %err, "request write failed");
                self.inner.correlator.resolve(&cid, Err(err));
            } else {
                debug!(%cid, %kind, "request sent");
            }
            (&mut rx).await
        };

        let reply = match self.inner.config.reply_timeout {
            Some(limit) => match tokio::time::timeout(limit, exchange).await {
                Ok(reply) => reply,
                Err(_) if self.inner.correlator.forget(&cid) => {
                    warn!(%cid, %kind, ?limit, "request timed out");
                    return Err(ClientError::Timeout);
                }
                // Resolved between the deadline and the removal.
                Err(_) => rx.await,
            },
            None => exchange.await,
        };

        reply.unwrap_or(Err(ClientError::Closed))
    }

    /// Correlated send whose reply is converted to `R`.
    ///
    /// # Errors
    ///
    /// Everything [`Socket::send_correlated`] returns, plus
    /// [`ClientError::Protocol`] if the reply is not an `R`.
    pub async fn send<R: FromReply>(&self, payload: Payload) -> Result<R, ClientError> {
        R::from_reply(self.send_correlated(payload).await?)
    }

    /// Fire-and-forget send. Resolves once the transport accepted the frame.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotConnected`] or [`ClientError::Transport`].
    pub async fn send_uncollated(&self, payload: Payload, reliable: bool) -> Result<(), ClientError> {
        let writer = self.inner.writer().ok_or(ClientError::NotConnected)?;
        self.inner.write(&writer, &Envelope::new(payload), reliable).await
    }
}

// =============================================================================
// TYPED REQUESTS
// =============================================================================

impl Socket {
    /// # Errors
    ///
    /// See [`Socket::send`].
    pub async fn topic_join(&self, target: TopicTarget) -> Result<Topic, ClientError> {
        self.send(Payload::TopicJoin(TopicJoin { target })).await
    }

    /// # Errors
    ///
    /// See [`Socket::send`].
    pub async fn topic_leave(&self, topic: TopicId) -> Result<(), ClientError> {
        self.send(Payload::TopicLeave(TopicLeave { topic })).await
    }

    /// # Errors
    ///
    /// See [`Socket::send`].
    pub async fn topic_message_send(
        &self,
        topic: TopicId,
        data: Value,
    ) -> Result<TopicMessageAck, ClientError> {
        self.send(Payload::TopicMessageSend(TopicMessageSend { topic, data })).await
    }

    /// # Errors
    ///
    /// See [`Socket::send`].
    pub async fn match_create(&self) -> Result<Match, ClientError> {
        self.send(Payload::MatchCreate(MatchCreate {})).await
    }

    /// Join by match id or by a matchmaker token.
    ///
    /// # Errors
    ///
    /// See [`Socket::send`].
    pub async fn match_join(&self, join: MatchJoin) -> Result<Match, ClientError> {
        self.send(Payload::MatchJoin(join)).await
    }

    /// # Errors
    ///
    /// See [`Socket::send`].
    pub async fn match_leave(&self, match_id: impl Into<String>) -> Result<(), ClientError> {
        self.send(Payload::MatchLeave(MatchLeave { match_id: match_id.into() })).await
    }

    /// Realtime match state. Uncollated; the server sends no reply.
    ///
    /// # Errors
    ///
    /// See [`Socket::send_uncollated`].
    pub async fn match_data_send(
        &self,
        match_id: impl Into<String>,
        op_code: i64,
        data: impl Into<String>,
        presences: Vec<UserPresence>,
        reliable: bool,
    ) -> Result<(), ClientError> {
        let payload = Payload::MatchDataSend(MatchDataSend {
            match_id: match_id.into(),
            op_code,
            data: data.into(),
            presences,
        });
        self.send_uncollated(payload, reliable).await
    }

    /// # Errors
    ///
    /// See [`Socket::send`].
    pub async fn matchmake_add(
        &self,
        required_count: u32,
        properties: Map<String, Value>,
    ) -> Result<MatchmakeTicket, ClientError> {
        self.send(Payload::MatchmakeAdd(MatchmakeAdd { required_count, properties })).await
    }

    /// # Errors
    ///
    /// See [`Socket::send`].
    pub async fn matchmake_remove(&self, ticket: impl Into<String>) -> Result<(), ClientError> {
        self.send(Payload::MatchmakeRemove(MatchmakeRemove { ticket: ticket.into() })).await
    }

    /// Call a server-side function.
    ///
    /// # Errors
    ///
    /// See [`Socket::send`].
    pub async fn rpc(
        &self,
        id: impl Into<String>,
        payload: Option<String>,
    ) -> Result<Rpc, ClientError> {
        self.send(Payload::Rpc(Rpc { id: id.into(), payload })).await
    }

    /// Invalidate the session server-side. Uncollated.
    ///
    /// # Errors
    ///
    /// See [`Socket::send_uncollated`].
    pub async fn logout(&self) -> Result<(), ClientError> {
        self.send_uncollated(Payload::Logout(Logout {}), true).await
    }
}

// =============================================================================
// SUBSCRIPTIONS
// =============================================================================

impl Socket {
    pub fn on_matchmake_matched(
        &self,
        handler: impl Fn(&MatchmakeMatched) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.dispatcher.on_matchmake_matched(handler)
    }

    pub fn on_match_data(
        &self,
        handler: impl Fn(&MatchData) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.dispatcher.on_match_data(handler)
    }

    pub fn on_match_presence(
        &self,
        handler: impl Fn(&MatchPresence) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.dispatcher.on_match_presence(handler)
    }

    pub fn on_topic_message(
        &self,
        handler: impl Fn(&TopicMessage) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.dispatcher.on_topic_message(handler)
    }

    pub fn on_topic_presence(
        &self,
        handler: impl Fn(&TopicPresence) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.dispatcher.on_topic_presence(handler)
    }

    pub fn on_notification(
        &self,
        handler: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.dispatcher.on_notification(handler)
    }

    pub fn on_disconnect(
        &self,
        handler: impl Fn(&Disconnect) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.dispatcher.on_disconnect(handler)
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.dispatcher.unsubscribe(id)
    }
}

// =============================================================================
// INNER
// =============================================================================

impl SocketInner {
    fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn writer(&self) -> Option<mpsc::UnboundedSender<WriteCommand>> {
        match &*self.lock_state() {
            ConnectionState::Connected { writer, .. } => Some(writer.clone()),
            _ => None,
        }
    }

    /// Encode and hand one envelope to the transport, waiting for its ack.
    async fn write(
        &self,
        writer: &mpsc::UnboundedSender<WriteCommand>,
        envelope: &Envelope,
        reliable: bool,
    ) -> Result<(), ClientError> {
        let bytes = envelopes::encode(envelope, self.config.format)
            .map_err(|e| ClientError::Protocol(e.to_string()))?;
        let (ack, acked) = oneshot::channel();
        writer
            .send(WriteCommand::Frame { bytes, text: self.config.format.is_text(), reliable, ack })
            .map_err(|_| ClientError::Transport("connection writer is gone".to_owned()))?;

        match acked.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(message)) => Err(ClientError::Transport(message)),
            Err(_) => Err(ClientError::Transport("write was never acknowledged".to_owned())),
        }
    }

    /// Route one inbound frame to its waiting request or to the dispatcher.
    fn handle_frame(&self, bytes: &[u8]) {
        let envelope = match envelopes::decode(bytes, self.config.format) {
            Ok(envelope) => envelope,
            Err(err) => {
                match err.cid() {
                    Some(cid) => {
                        let reply: Reply = Err(ClientError::Protocol(err.to_string()));
                        if !self.correlator.resolve(cid, reply) {
                            warn!(%cid, error = %err, "undecodable reply for unknown cid dropped");
                        }
                    }
                    None => warn!(error = %err, "dropping undecodable frame"),
                }
                return;
            }
        };

        let (cid, payload) = match (envelope.cid, envelope.payload) {
            // Heartbeats advance the server clock whatever their cid.
            (_, Some(heartbeat @ Payload::Heartbeat(_))) | (None, Some(heartbeat)) => {
                self.dispatcher.dispatch(heartbeat);
                return;
            }
            (None, None) => {
                debug!("ignoring empty frame");
                return;
            }
            (Some(cid), payload) => (cid, payload),
        };

        let reply: Reply = match payload {
            Some(Payload::Error(error)) => {
                Err(ClientError::Server(map_wire_error(error.code, error.message)))
            }
            other => Ok(other),
        };
        if self.correlator.resolve(&cid, reply) {
            debug!(%cid, "reply routed");
        } else {
            warn!(%cid, "reply for unknown cid dropped");
        }
    }

    /// Close `generation` if it is still the live connection.
    fn close_generation(&self, generation: u64, event: &Disconnect) {
        {
            let mut state = self.lock_state();
            if !matches!(*state, ConnectionState::Connected { generation: g, .. } if g == generation) {
                return;
            }
            *state = ConnectionState::Disconnected;
        }
        self.finish_close(event);
    }

    fn finish_close(&self, event: &Disconnect) {
        let drained = self.correlator.drain(&ClientError::Closed);
        info!(code = ?event.code, reason = %event.reason, drained, "socket disconnected");
        self.dispatcher.notify_disconnect(event);
    }
}

impl Drop for SocketInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let ConnectionState::Connected { reader, .. } = state {
            reader.abort();
        }
    }
}

async fn run_reader(
    inner: Weak<SocketInner>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        match event {
            TransportEvent::Message(bytes) => inner.handle_frame(&bytes),
            TransportEvent::Error(message) => error!(%message, generation, "transport error"),
            TransportEvent::Closed { code, reason } => {
                inner.close_generation(generation, &Disconnect { code, reason });
                return;
            }
        }
    }

    if let Some(inner) = inner.upgrade() {
        let event = Disconnect { code: None, reason: "transport ended".to_owned() };
        inner.close_generation(generation, &event);
    }
}

#[cfg(test)]
#[path = "socket_test.rs"]
mod tests;
