use super::messages::*;
use super::*;

fn match_data_envelope() -> Envelope {
    Envelope::new(Payload::MatchData(MatchData {
        match_id: "m-1".to_owned(),
        presence: UserPresence {
            user_id: "u-1".to_owned(),
            session_id: "s-1".to_owned(),
            handle: "ada".to_owned(),
        },
        op_code: 7,
        data: "AQID".to_owned(),
    }))
}

#[test]
fn protobuf_round_trip_preserves_correlated_rpc() {
    let envelope = Envelope::correlated(
        "cid-1",
        Payload::Rpc(Rpc { id: "echo".to_owned(), payload: Some("{}".to_owned()) }),
    );
    let bytes = encode_protobuf(&envelope).expect("encode");
    let decoded = decode_protobuf(&bytes).expect("decode");
    assert_eq!(decoded, envelope);
}

#[test]
fn protobuf_preserves_integer_fields() {
    let envelope = match_data_envelope();
    let decoded = decode_protobuf(&encode_protobuf(&envelope).expect("encode")).expect("decode");
    let Some(Payload::MatchData(data)) = decoded.payload else {
        panic!("expected match data");
    };
    assert_eq!(data.op_code, 7);
}

#[test]
fn protobuf_ack_has_no_payload() {
    let bytes = encode_protobuf(&Envelope::ack("cid-9")).expect("encode");
    let decoded = decode_protobuf(&bytes).expect("decode");
    assert_eq!(decoded.cid.as_deref(), Some("cid-9"));
    assert!(decoded.payload.is_none());
}

#[test]
fn protobuf_empty_cid_reads_as_absent() {
    let wire = WireEnvelope { cid: Some(String::new()), kind: String::new(), body: None };
    let mut bytes = Vec::new();
    wire.encode(&mut bytes).expect("encode");

    let decoded = decode_protobuf(&bytes).expect("decode");
    assert!(decoded.is_bare_ack());
}

#[test]
fn protobuf_rejects_malformed_bytes() {
    let err = decode_protobuf(&[0xff, 0x00, 0x01]).expect_err("bytes should fail");
    assert!(matches!(err, CodecError::Decode(_)));
}

#[test]
fn protobuf_unknown_kind_decodes_as_unrecognized() {
    let wire = WireEnvelope {
        cid: None,
        kind: "stream_data".to_owned(),
        body: Some(json_to_proto_value(&serde_json::json!({"x": 1}))),
    };
    let mut bytes = Vec::new();
    wire.encode(&mut bytes).expect("encode");

    let decoded = decode_protobuf(&bytes).expect("decode");
    assert_eq!(decoded.payload, Some(Payload::Unrecognized("stream_data".to_owned())));
}

#[test]
fn protobuf_known_kind_with_bad_body_is_error() {
    let wire = WireEnvelope {
        cid: Some("c".to_owned()),
        kind: "heartbeat".to_owned(),
        body: Some(json_to_proto_value(&serde_json::json!({"timestamp": "soon"}))),
    };
    let mut bytes = Vec::new();
    wire.encode(&mut bytes).expect("encode");

    let err = decode_protobuf(&bytes).expect_err("body should fail");
    assert!(matches!(err, CodecError::Reply { ref kind, .. } if kind == "heartbeat"));
    assert_eq!(err.cid(), Some("c"));
}

#[test]
fn uncorrelated_bad_body_has_no_cid() {
    let bytes = br#"{"match_data": {"op_code": "x"}}"#;
    let err = decode_json(bytes).expect_err("body should fail");
    assert!(matches!(err, CodecError::Payload { ref kind, .. } if kind == "match_data"));
    assert_eq!(err.cid(), None);
}

#[test]
fn protobuf_missing_body_defaults_to_empty_object() {
    let wire = WireEnvelope { cid: Some("c".to_owned()), kind: "match_create".to_owned(), body: None };
    let mut bytes = Vec::new();
    wire.encode(&mut bytes).expect("encode");

    let decoded = decode_protobuf(&bytes).expect("decode");
    assert_eq!(decoded.payload, Some(Payload::MatchCreate(MatchCreate {})));
}

#[test]
fn json_envelope_uses_kind_as_field_name() {
    let envelope = Envelope::correlated(
        "7",
        Payload::TopicJoin(TopicJoin { target: TopicTarget::Room("lobby".to_owned()) }),
    );
    let bytes = encode_json(&envelope).expect("encode");
    let value: Value = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(
        value,
        serde_json::json!({"cid": "7", "topic_join": {"target": {"room": "lobby"}}})
    );
}

#[test]
fn json_round_trip_preserves_push_event() {
    let envelope = match_data_envelope();
    let decoded = decode_json(&encode_json(&envelope).expect("encode")).expect("decode");
    assert_eq!(decoded, envelope);
}

#[test]
fn json_rejects_multiple_payloads() {
    let bytes = br#"{"cid":"1","heartbeat":{"timestamp":1},"logout":{}}"#;
    let err = decode_json(bytes).expect_err("two payloads");
    assert!(matches!(err, CodecError::MultiplePayloads(2)));
}

#[test]
fn json_rejects_non_object() {
    let err = decode_json(b"[1,2]").expect_err("array");
    assert!(matches!(err, CodecError::NotAnObject));
}

#[test]
fn json_error_payload_decodes() {
    let bytes = br#"{"cid":"3","error":{"code":13,"message":"Match not found"}}"#;
    let decoded = decode_json(bytes).expect("decode");
    assert_eq!(
        decoded.payload,
        Some(Payload::Error(WireError { code: 13, message: "Match not found".to_owned() }))
    );
}

#[test]
fn format_dispatch_matches_direct_codecs() {
    let envelope = Envelope::new(Payload::Heartbeat(Heartbeat { timestamp: 1_700_000_000_000 }));
    assert_eq!(
        encode(&envelope, WireFormat::Protobuf).expect("encode"),
        encode_protobuf(&envelope).expect("encode")
    );
    let text = encode(&envelope, WireFormat::Json).expect("encode");
    assert_eq!(decode(&text, WireFormat::Json).expect("decode"), envelope);
}

#[test]
fn non_integral_numbers_survive_protobuf() {
    let value = proto_to_json_value(&json_to_proto_value(&serde_json::json!({"ratio": 0.5})));
    assert_eq!(value, serde_json::json!({"ratio": 0.5}));
}

#[test]
fn nan_number_decodes_as_null() {
    let value = proto_to_json_value(&prost_types::Value {
        kind: Some(prost_types::value::Kind::NumberValue(f64::NAN)),
    });
    assert_eq!(value, Value::Null);
}

#[test]
fn wire_format_serializes_lowercase() {
    assert_eq!(serde_json::to_string(&WireFormat::Json).expect("serialize"), "\"json\"");
    assert_eq!(WireFormat::Protobuf.as_str(), "protobuf");
    assert!(WireFormat::Json.is_text());
    assert!(!WireFormat::Protobuf.is_text());
}
