//! Pending-request table keyed by correlation id.
//!
//! Each entry is a oneshot sender. Every path that consumes an entry
//! (reply, write failure, timeout, drain) removes it under the lock first,
//! so a request resolves at most once and the lock is never held while a
//! waiter wakes.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use envelopes::Payload;
use envelopes::messages::{Match, MatchmakeTicket, Rpc, Topic, TopicMessageAck};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::ClientError;

/// What a correlated request resolves to: `Ok(None)` is a bare ack.
pub type Reply = Result<Option<Payload>, ClientError>;

#[derive(Default)]
pub struct Correlator {
    pending: Mutex<HashMap<String, oneshot::Sender<Reply>>>,
}

impl Correlator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh correlation id and its waiter.
    pub fn register(&self) -> (String, oneshot::Receiver<Reply>) {
        let cid = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.lock().insert(cid.clone(), tx);
        (cid, rx)
    }

    /// Deliver `reply` to the waiter for `cid`. Returns `false` if no entry
    /// matched.
    pub fn resolve(&self, cid: &str, reply: Reply) -> bool {
        let Some(tx) = self.lock().remove(cid) else {
            return false;
        };
        // A dropped receiver means the caller gave up; the entry is gone either way.
        let _ = tx.send(reply);
        true
    }

    /// Remove `cid` without waking anyone.
    pub fn forget(&self, cid: &str) -> bool {
        self.lock().remove(cid).is_some()
    }

    /// Resolve every pending entry with `err`. Returns how many were pending.
    pub fn drain(&self, err: &ClientError) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(err.clone()));
        }
        count
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<Reply>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// TYPED REPLIES
// =============================================================================

/// Conversion from a raw correlated reply into the type a request expects.
pub trait FromReply: Sized {
    /// # Errors
    ///
    /// Returns [`ClientError::Protocol`] if the reply is a different variant.
    fn from_reply(reply: Option<Payload>) -> Result<Self, ClientError>;
}

impl FromReply for Option<Payload> {
    fn from_reply(reply: Option<Payload>) -> Result<Self, ClientError> {
        Ok(reply)
    }
}

impl FromReply for () {
    fn from_reply(reply: Option<Payload>) -> Result<Self, ClientError> {
        match reply {
            None => Ok(()),
            Some(other) => Err(unexpected("ack", &other)),
        }
    }
}

macro_rules! from_reply_variant {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl FromReply for $ty {
                fn from_reply(reply: Option<Payload>) -> Result<Self, ClientError> {
                    match reply {
                        Some(Payload::$variant(value)) => Ok(value),
                        Some(other) => Err(unexpected(stringify!($variant), &other)),
                        None => Err(ClientError::Protocol(format!(
                            "expected {} reply, got empty ack",
                            stringify!($variant)
                        ))),
                    }
                }
            }
        )*
    };
}

from_reply_variant! {
    Topic => Topic,
    TopicMessageAck => TopicMessageAck,
    Match => Match,
    MatchmakeTicket => MatchmakeTicket,
    Rpc => Rpc,
}

fn unexpected(expected: &str, got: &Payload) -> ClientError {
    ClientError::Protocol(format!("expected {expected} reply, got {}", got.kind()))
}

#[cfg(test)]
#[path = "correlator_test.rs"]
mod tests;
