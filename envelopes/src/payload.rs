//! The closed set of payload variants an envelope can carry.
//!
//! Every variant serializes under a snake_case tag (`"match_data"`,
//! `"topic_join"`, ...). Tags the client does not know decode to
//! [`Payload::Unrecognized`] instead of failing, so newer servers can add
//! variants without breaking older clients.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::CodecError;
use crate::messages::*;

/// Tagged union of everything that travels inside an [`crate::Envelope`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    // Requests.
    TopicJoin(TopicJoin),
    TopicLeave(TopicLeave),
    TopicMessageSend(TopicMessageSend),
    MatchCreate(MatchCreate),
    MatchJoin(MatchJoin),
    MatchLeave(MatchLeave),
    MatchDataSend(MatchDataSend),
    MatchmakeAdd(MatchmakeAdd),
    MatchmakeRemove(MatchmakeRemove),
    Logout(Logout),

    // Both directions.
    Rpc(Rpc),

    // Replies.
    Topic(Topic),
    TopicMessageAck(TopicMessageAck),
    Match(Match),
    MatchmakeTicket(MatchmakeTicket),

    // Push events.
    Heartbeat(Heartbeat),
    MatchmakeMatched(MatchmakeMatched),
    MatchData(MatchData),
    MatchPresence(MatchPresence),
    TopicMessage(TopicMessage),
    TopicPresence(TopicPresence),
    LiveNotifications(LiveNotifications),

    Error(WireError),

    /// A tag this client does not understand. Never produced by encoding.
    #[serde(skip)]
    Unrecognized(String),
}

/// Every tag [`Payload`] can decode.
pub const KINDS: &[&str] = &[
    "topic_join",
    "topic_leave",
    "topic_message_send",
    "match_create",
    "match_join",
    "match_leave",
    "match_data_send",
    "matchmake_add",
    "matchmake_remove",
    "logout",
    "rpc",
    "topic",
    "topic_message_ack",
    "match",
    "matchmake_ticket",
    "heartbeat",
    "matchmake_matched",
    "match_data",
    "match_presence",
    "topic_message",
    "topic_presence",
    "live_notifications",
    "error",
];

impl Payload {
    /// Wire tag of this variant.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::TopicJoin(_) => "topic_join",
            Self::TopicLeave(_) => "topic_leave",
            Self::TopicMessageSend(_) => "topic_message_send",
            Self::MatchCreate(_) => "match_create",
            Self::MatchJoin(_) => "match_join",
            Self::MatchLeave(_) => "match_leave",
            Self::MatchDataSend(_) => "match_data_send",
            Self::MatchmakeAdd(_) => "matchmake_add",
            Self::MatchmakeRemove(_) => "matchmake_remove",
            Self::Logout(_) => "logout",
            Self::Rpc(_) => "rpc",
            Self::Topic(_) => "topic",
            Self::TopicMessageAck(_) => "topic_message_ack",
            Self::Match(_) => "match",
            Self::MatchmakeTicket(_) => "matchmake_ticket",
            Self::Heartbeat(_) => "heartbeat",
            Self::MatchmakeMatched(_) => "matchmake_matched",
            Self::MatchData(_) => "match_data",
            Self::MatchPresence(_) => "match_presence",
            Self::TopicMessage(_) => "topic_message",
            Self::TopicPresence(_) => "topic_presence",
            Self::LiveNotifications(_) => "live_notifications",
            Self::Error(_) => "error",
            Self::Unrecognized(kind) => kind,
        }
    }

    /// Split into `(tag, body)` for the wire.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Payload`] if the body cannot be represented as JSON.
    pub fn to_parts(&self) -> Result<(String, Value), CodecError> {
        if let Self::Unrecognized(kind) = self {
            return Ok((kind.clone(), Value::Object(Map::new())));
        }

        let tagged = serde_json::to_value(self).map_err(|e| CodecError::Payload {
            kind: self.kind().to_owned(),
            message: e.to_string(),
        })?;
        let Value::Object(map) = tagged else {
            return Err(CodecError::Payload {
                kind: self.kind().to_owned(),
                message: "payload did not serialize to a tagged object".to_owned(),
            });
        };

        map.into_iter().next().ok_or_else(|| CodecError::Payload {
            kind: self.kind().to_owned(),
            message: "payload serialized without a tag".to_owned(),
        })
    }

    /// Rebuild a payload from its wire tag and body.
    ///
    /// Unknown tags yield [`Payload::Unrecognized`]; known tags with a body
    /// that does not match the schema are an error.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Payload`] when a known tag carries a malformed body.
    pub fn from_parts(kind: &str, body: Value) -> Result<Self, CodecError> {
        if !KINDS.contains(&kind) {
            return Ok(Self::Unrecognized(kind.to_owned()));
        }

        let body = if body.is_null() {
            Value::Object(Map::new())
        } else {
            body
        };
        let mut tagged = Map::new();
        tagged.insert(kind.to_owned(), body);

        serde_json::from_value(Value::Object(tagged)).map_err(|e| CodecError::Payload {
            kind: kind.to_owned(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
#[path = "payload_test.rs"]
mod tests;
