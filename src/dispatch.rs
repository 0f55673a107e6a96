//! Push-event dispatcher. Routes uncorrelated frames to subscribers.
//!
//! DESIGN
//! ======
//! One ordered subscriber list per event category. Handlers run
//! synchronously on the socket's receive task, in subscription order, with
//! no queueing. Each list is snapshotted before invocation, so a handler may
//! subscribe or unsubscribe (itself included) without deadlocking; the
//! change takes effect from the next event.
//!
//! Heartbeats only advance [`ServerTime`]. Live notification batches are
//! split and each notification is delivered on its own.
//!
//! TRADE-OFFS
//! ==========
//! A slow handler stalls the receive task and therefore every reply behind
//! it. Handlers that need to do real work should hand off to their own task.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use envelopes::Payload;
use envelopes::messages::{
    MatchData, MatchPresence, MatchmakeMatched, Notification, TopicMessage, TopicPresence,
};
use tracing::{debug, warn};

use crate::error::map_wire_error;
use crate::session::now_millis;

/// Handle returned by every `on_*` subscribe call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Why a connection ended, as reported by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Disconnect {
    /// Close code, absent when the connection dropped without a close frame.
    pub code: Option<u16>,
    pub reason: String,
}

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

// =============================================================================
// SUBSCRIBER LIST
// =============================================================================

struct Subscribers<T> {
    list: Mutex<Vec<(SubscriptionId, Handler<T>)>>,
}

impl<T> Default for Subscribers<T> {
    fn default() -> Self {
        Self { list: Mutex::new(Vec::new()) }
    }
}

impl<T> Subscribers<T> {
    fn add(&self, id: SubscriptionId, handler: Handler<T>) {
        self.list.lock().unwrap_or_else(PoisonError::into_inner).push((id, handler));
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        let mut list = self.list.lock().unwrap_or_else(PoisonError::into_inner);
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        list.len() != before
    }

    /// Invoke every handler. Returns how many ran.
    fn emit(&self, event: &T) -> usize {
        let snapshot: Vec<Handler<T>> = self
            .list
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in &snapshot {
            handler(event);
        }
        snapshot.len()
    }
}

// =============================================================================
// SERVER TIME
// =============================================================================

/// Latest server clock sample in Unix ms. Never moves backwards.
#[derive(Debug, Default)]
pub struct ServerTime {
    latest: AtomicI64,
}

impl ServerTime {
    pub fn observe(&self, timestamp: i64) {
        self.latest.fetch_max(timestamp, Ordering::AcqRel);
    }

    /// Server time from the last heartbeat, or local wall-clock time if no
    /// heartbeat has arrived yet.
    #[must_use]
    pub fn now(&self) -> i64 {
        match self.latest.load(Ordering::Acquire) {
            0 => now_millis(),
            latest => latest,
        }
    }
}

// =============================================================================
// DISPATCHER
// =============================================================================

#[derive(Default)]
pub struct Dispatcher {
    next_id: AtomicU64,
    server_time: ServerTime,
    matchmake_matched: Subscribers<MatchmakeMatched>,
    match_data: Subscribers<MatchData>,
    match_presence: Subscribers<MatchPresence>,
    topic_message: Subscribers<TopicMessage>,
    topic_presence: Subscribers<TopicPresence>,
    notification: Subscribers<Notification>,
    disconnect: Subscribers<Disconnect>,
}

macro_rules! subscribe_fn {
    ($(#[$meta:meta])* $name:ident, $field:ident, $ty:ty) => {
        $(#[$meta])*
        pub fn $name(&self, handler: impl Fn(&$ty) + Send + Sync + 'static) -> SubscriptionId {
            let id = self.next_subscription_id();
            self.$field.add(id, Arc::new(handler));
            id
        }
    };
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    subscribe_fn!(on_matchmake_matched, matchmake_matched, MatchmakeMatched);
    subscribe_fn!(on_match_data, match_data, MatchData);
    subscribe_fn!(on_match_presence, match_presence, MatchPresence);
    subscribe_fn!(on_topic_message, topic_message, TopicMessage);
    subscribe_fn!(on_topic_presence, topic_presence, TopicPresence);
    subscribe_fn!(
        /// Called once per notification, including each one of a live batch.
        on_notification,
        notification,
        Notification
    );
    subscribe_fn!(
        /// Called once per connection when it closes, from either side.
        on_disconnect,
        disconnect,
        Disconnect
    );

    /// Remove a subscription from whichever category holds it.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.matchmake_matched.remove(id)
            || self.match_data.remove(id)
            || self.match_presence.remove(id)
            || self.topic_message.remove(id)
            || self.topic_presence.remove(id)
            || self.notification.remove(id)
            || self.disconnect.remove(id)
    }

    #[must_use]
    pub fn server_time(&self) -> &ServerTime {
        &self.server_time
    }

    /// Route one uncorrelated payload.
    pub fn dispatch(&self, payload: Payload) {
        match payload {
            Payload::Heartbeat(heartbeat) => {
                self.server_time.observe(heartbeat.timestamp);
                debug!(timestamp = heartbeat.timestamp, "heartbeat");
            }
            Payload::MatchmakeMatched(event) => {
                deliver("matchmake_matched", &self.matchmake_matched, &event);
            }
            Payload::MatchData(event) => deliver("match_data", &self.match_data, &event),
            Payload::MatchPresence(event) => deliver("match_presence", &self.match_presence, &event),
            Payload::TopicMessage(event) => deliver("topic_message", &self.topic_message, &event),
            Payload::TopicPresence(event) => deliver("topic_presence", &self.topic_presence, &event),
            Payload::LiveNotifications(batch) => {
                for notification in &batch.notifications {
                    deliver("notification", &self.notification, notification);
                }
            }
            Payload::Error(error) => {
                let api = map_wire_error(error.code, error.message);
                warn!(code = %api.code, message = %api.message, "uncorrelated server error");
            }
            Payload::Unrecognized(kind) => {
                warn!(%kind, "dropping unrecognized push payload");
            }
            other => {
                warn!(kind = other.kind(), "dropping reply payload without cid");
            }
        }
    }

    /// Tell disconnect subscribers the connection ended.
    pub fn notify_disconnect(&self, event: &Disconnect) {
        self.disconnect.emit(event);
    }

    fn next_subscription_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

fn deliver<T>(category: &str, subscribers: &Subscribers<T>, event: &T) {
    if subscribers.emit(event) == 0 {
        debug!(%category, "no subscribers, push dropped");
    }
}

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod tests;
