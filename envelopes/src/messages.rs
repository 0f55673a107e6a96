//! Message bodies carried inside [`crate::Payload`] variants.
//!
//! These are plain data records. The engine routes on the payload variant and
//! never looks inside them, so fields stay close to what the backend sends.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// SHARED
// =============================================================================

/// A user's presence inside a topic or match.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPresence {
    pub user_id: String,
    pub session_id: String,
    pub handle: String,
}

/// Kind of chat topic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicKind {
    Dm,
    Room,
    Group,
}

/// Server-assigned topic identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicId {
    pub kind: TopicKind,
    pub id: String,
}

/// What a client asks to join: another user, a named room, or a group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicTarget {
    UserId(String),
    Room(String),
    GroupId(String),
}

// =============================================================================
// REQUESTS
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicJoin {
    pub target: TopicTarget,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicLeave {
    pub topic: TopicId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopicMessageSend {
    pub topic: TopicId,
    /// Arbitrary JSON content of the message.
    pub data: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCreate {}

/// Join a match either by id or with a matchmaker token.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchJoin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchLeave {
    pub match_id: String,
}

/// Realtime match state sent to other participants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchDataSend {
    pub match_id: String,
    pub op_code: i64,
    /// Opaque application data, usually base64.
    pub data: String,
    /// Restrict delivery to these presences; empty means everyone.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub presences: Vec<UserPresence>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchmakeAdd {
    pub required_count: u32,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchmakeRemove {
    pub ticket: String,
}

/// Server-side function call. Used for both the request and the reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rpc {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Logout {}

// =============================================================================
// REPLIES
// =============================================================================

/// Reply to a topic join.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub topic: TopicId,
    #[serde(default)]
    pub presences: Vec<UserPresence>,
    #[serde(rename = "self", default)]
    pub self_presence: UserPresence,
}

/// Reply to a topic message send.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMessageAck {
    pub message_id: String,
    pub handle: String,
    pub created_at: i64,
    #[serde(default)]
    pub expires_at: i64,
}

/// Reply to a match create or join.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub match_id: String,
    #[serde(default)]
    pub presences: Vec<UserPresence>,
    #[serde(rename = "self", default)]
    pub self_presence: UserPresence,
}

/// Reply to a matchmake add.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchmakeTicket {
    pub ticket: String,
}

// =============================================================================
// PUSH EVENTS
// =============================================================================

/// Periodic server clock sample, milliseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub timestamp: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchmakeMatched {
    pub ticket: String,
    /// One-use token accepted by [`MatchJoin::token`].
    pub token: String,
    #[serde(default)]
    pub presences: Vec<UserPresence>,
    #[serde(rename = "self", default)]
    pub self_presence: UserPresence,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchData {
    pub match_id: String,
    pub presence: UserPresence,
    pub op_code: i64,
    pub data: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPresence {
    pub match_id: String,
    #[serde(default)]
    pub joins: Vec<UserPresence>,
    #[serde(default)]
    pub leaves: Vec<UserPresence>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TopicMessage {
    pub topic: TopicId,
    pub message_id: String,
    pub user_id: String,
    pub handle: String,
    pub created_at: i64,
    pub data: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicPresence {
    pub topic: TopicId,
    #[serde(default)]
    pub joins: Vec<UserPresence>,
    #[serde(default)]
    pub leaves: Vec<UserPresence>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub subject: String,
    #[serde(default)]
    pub content: Value,
    pub code: i64,
    #[serde(default)]
    pub sender_id: Option<String>,
    pub created_at: i64,
    #[serde(default)]
    pub persistent: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LiveNotifications {
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

// =============================================================================
// ERROR
// =============================================================================

/// Error reported by the backend. `code` is mapped client-side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub code: i32,
    pub message: String,
}
