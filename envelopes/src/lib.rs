//! Wire envelope model and codecs for the realtime socket.
//!
//! This crate owns the representation shared by the client engine, the CLI,
//! and the loopback test backend. One envelope travels per socket frame: an
//! optional correlation id plus at most one [`Payload`] variant.
//!
//! Two encodings are supported:
//! - protobuf (binary frames): `{cid, kind, body}` where `body` is a
//!   `google.protobuf.Value` holding the payload's JSON form;
//! - JSON (text frames): `{"cid": "...", "<kind>": {...}}`.

pub mod messages;
mod payload;

use prost::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use payload::{KINDS, Payload};

/// Error returned by the envelope codecs.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The raw bytes could not be decoded as a protobuf `WireEnvelope`.
    #[error("failed to decode protobuf envelope: {0}")]
    Decode(#[from] prost::DecodeError),
    /// The raw bytes are not a JSON document.
    #[error("failed to decode json envelope: {0}")]
    Json(#[from] serde_json::Error),
    /// A JSON envelope was valid JSON but not an object.
    #[error("json envelope must be an object")]
    NotAnObject,
    /// A JSON envelope carried more than one payload field.
    #[error("envelope carries {0} payload fields, expected at most one")]
    MultiplePayloads(usize),
    /// A known payload tag carried a body that does not match its schema.
    #[error("malformed `{kind}` payload: {message}")]
    Payload { kind: String, message: String },
    /// Same as [`CodecError::Payload`], inside an envelope that carried a
    /// correlation id, so the failure can still reach the waiting request.
    #[error("malformed `{kind}` reply to {cid}: {message}")]
    Reply { cid: String, kind: String, message: String },
}

impl CodecError {
    /// Correlation id of the envelope that failed, when it was readable.
    #[must_use]
    pub fn cid(&self) -> Option<&str> {
        match self {
            Self::Reply { cid, .. } => Some(cid),
            _ => None,
        }
    }
}

/// Encoding used on the socket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Binary frames carrying protobuf.
    #[default]
    Protobuf,
    /// Text frames carrying JSON.
    Json,
}

impl WireFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Protobuf => "protobuf",
            Self::Json => "json",
        }
    }

    /// Whether frames in this format travel as websocket text messages.
    #[must_use]
    pub fn is_text(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// A single message on the realtime socket.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Envelope {
    /// Correlation id linking a reply to the request that caused it.
    pub cid: Option<String>,
    /// The message body, if any. `None` with a `cid` is a bare acknowledgement.
    pub payload: Option<Payload>,
}

impl Envelope {
    /// Uncorrelated envelope, e.g. a push event or a fire-and-forget request.
    #[must_use]
    pub fn new(payload: Payload) -> Self {
        Self { cid: None, payload: Some(payload) }
    }

    /// Envelope stamped with a correlation id.
    #[must_use]
    pub fn correlated(cid: impl Into<String>, payload: Payload) -> Self {
        Self { cid: Some(cid.into()), payload: Some(payload) }
    }

    /// Empty reply acknowledging the request `cid`.
    #[must_use]
    pub fn ack(cid: impl Into<String>) -> Self {
        Self { cid: Some(cid.into()), payload: None }
    }

    /// No payload and no correlation id.
    #[must_use]
    pub fn is_bare_ack(&self) -> bool {
        self.cid.is_none() && self.payload.is_none()
    }
}

// =============================================================================
// CODEC
// =============================================================================

/// Encode an envelope in the given wire format.
///
/// # Errors
///
/// Returns [`CodecError::Payload`] if the payload cannot be represented as JSON.
pub fn encode(envelope: &Envelope, format: WireFormat) -> Result<Vec<u8>, CodecError> {
    match format {
        WireFormat::Protobuf => encode_protobuf(envelope),
        WireFormat::Json => encode_json(envelope),
    }
}

/// Decode an envelope in the given wire format.
///
/// # Errors
///
/// Returns a [`CodecError`] for malformed bytes or malformed known payloads.
pub fn decode(bytes: &[u8], format: WireFormat) -> Result<Envelope, CodecError> {
    match format {
        WireFormat::Protobuf => decode_protobuf(bytes),
        WireFormat::Json => decode_json(bytes),
    }
}

/// Encode an envelope into protobuf bytes.
///
/// # Errors
///
/// Returns [`CodecError::Payload`] if the payload cannot be represented as JSON.
pub fn encode_protobuf(envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
    let wire = envelope_to_wire(envelope)?;

    let mut out = Vec::with_capacity(wire.encoded_len());
    // Encoding into a growable Vec cannot run out of buffer space.
    wire.encode(&mut out).unwrap_or_default();
    Ok(out)
}

/// Decode protobuf bytes into an envelope.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed bytes and
/// [`CodecError::Payload`] for a known tag with a malformed body.
pub fn decode_protobuf(bytes: &[u8]) -> Result<Envelope, CodecError> {
    let wire = WireEnvelope::decode(bytes)?;
    wire_to_envelope(wire)
}

/// Encode an envelope as a JSON document.
///
/// # Errors
///
/// Returns [`CodecError::Payload`] if the payload cannot be represented as JSON.
pub fn encode_json(envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
    let mut map = Map::new();
    if let Some(cid) = &envelope.cid {
        map.insert("cid".to_owned(), Value::String(cid.clone()));
    }
    if let Some(payload) = &envelope.payload {
        let (kind, body) = payload.to_parts()?;
        map.insert(kind, body);
    }
    Ok(serde_json::to_vec(&Value::Object(map))?)
}

/// Decode a JSON document into an envelope.
///
/// # Errors
///
/// Returns a [`CodecError`] for invalid JSON, non-object documents, more than
/// one payload field, or a known tag with a malformed body.
pub fn decode_json(bytes: &[u8]) -> Result<Envelope, CodecError> {
    let Value::Object(mut map) = serde_json::from_slice::<Value>(bytes)? else {
        return Err(CodecError::NotAnObject);
    };

    let cid = match map.remove("cid") {
        Some(Value::String(cid)) => non_empty(cid),
        _ => None,
    };

    if map.len() > 1 {
        return Err(CodecError::MultiplePayloads(map.len()));
    }
    let payload = match map.into_iter().next() {
        Some((kind, body)) => {
            Some(Payload::from_parts(&kind, body).map_err(|e| with_cid(e, cid.as_deref()))?)
        }
        None => None,
    };

    Ok(Envelope { cid, payload })
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

fn envelope_to_wire(envelope: &Envelope) -> Result<WireEnvelope, CodecError> {
    let (kind, body) = match &envelope.payload {
        Some(payload) => {
            let (kind, body) = payload.to_parts()?;
            (kind, Some(json_to_proto_value(&body)))
        }
        None => (String::new(), None),
    };

    Ok(WireEnvelope { cid: envelope.cid.clone(), kind, body })
}

fn wire_to_envelope(wire: WireEnvelope) -> Result<Envelope, CodecError> {
    let cid = wire.cid.and_then(non_empty);
    let payload = if wire.kind.is_empty() {
        None
    } else {
        let body = wire
            .body
            .map_or(Value::Object(Map::new()), |v| proto_to_json_value(&v));
        Some(Payload::from_parts(&wire.kind, body).map_err(|e| with_cid(e, cid.as_deref()))?)
    };

    Ok(Envelope { cid, payload })
}

fn with_cid(err: CodecError, cid: Option<&str>) -> CodecError {
    match (err, cid) {
        (CodecError::Payload { kind, message }, Some(cid)) => {
            CodecError::Reply { cid: cid.to_owned(), kind, message }
        }
        (err, _) => err,
    }
}

fn json_to_proto_value(value: &Value) -> prost_types::Value {
    let kind = match value {
        Value::Null => {
            prost_types::value::Kind::NullValue(prost_types::NullValue::NullValue as i32)
        }
        Value::Bool(v) => prost_types::value::Kind::BoolValue(*v),
        Value::Number(v) => prost_types::value::Kind::NumberValue(v.as_f64().unwrap_or(0.0)),
        Value::String(v) => prost_types::value::Kind::StringValue(v.clone()),
        Value::Array(v) => prost_types::value::Kind::ListValue(prost_types::ListValue {
            values: v.iter().map(json_to_proto_value).collect(),
        }),
        Value::Object(v) => prost_types::value::Kind::StructValue(prost_types::Struct {
            fields: v
                .iter()
                .map(|(k, v)| (k.clone(), json_to_proto_value(v)))
                .collect(),
        }),
    };

    prost_types::Value { kind: Some(kind) }
}

fn proto_to_json_value(value: &prost_types::Value) -> Value {
    let Some(kind) = &value.kind else {
        return Value::Null;
    };

    match kind {
        prost_types::value::Kind::NullValue(_) => Value::Null,
        prost_types::value::Kind::NumberValue(v) => number_to_json(*v),
        prost_types::value::Kind::StringValue(v) => Value::String(v.clone()),
        prost_types::value::Kind::BoolValue(v) => Value::Bool(*v),
        prost_types::value::Kind::StructValue(v) => Value::Object(
            v.fields
                .iter()
                .map(|(k, v)| (k.clone(), proto_to_json_value(v)))
                .collect(),
        ),
        prost_types::value::Kind::ListValue(v) => {
            Value::Array(v.values.iter().map(proto_to_json_value).collect())
        }
    }
}

/// `google.protobuf.Value` only has doubles; integral values come back as
/// integers so integer fields (op codes, timestamps) deserialize.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn number_to_json(v: f64) -> Value {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;

    if v.is_finite() && v.fract() == 0.0 && v.abs() <= MAX_EXACT {
        return Value::Number(serde_json::Number::from(v as i64));
    }
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}

#[derive(Clone, PartialEq, Message)]
struct WireEnvelope {
    #[prost(string, optional, tag = "1")]
    cid: Option<String>,
    #[prost(string, tag = "2")]
    kind: String,
    #[prost(message, optional, tag = "3")]
    body: Option<prost_types::Value>,
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
