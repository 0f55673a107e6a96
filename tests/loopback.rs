//! End-to-end tests with the default `reqwest` and websocket transports
//! against an in-process axum backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use base64::Engine;
use playlink::messages::{
    Match, MatchData, MatchmakeTicket, Rpc, TopicId, TopicKind, TopicMessage, UserPresence,
    WireError,
};
use playlink::{
    Client, ClientConfig, ClientError, Credential, Envelope, ErrorCode, ErrorKind, Payload,
    SocketStatus, WireFormat,
};
use serde_json::{Value, json};

// =============================================================================
// BACKEND
// =============================================================================

const SERVER_AUTH: &str = "Basic ZGVmYXVsdGtleTo=";

fn issue_token(user: &str) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_secs();
    let claims = json!({"uid": format!("uid-{user}"), "han": user, "exp": now + 3600, "iat": now});
    format!(
        "{}.{}.{}",
        engine.encode(br#"{"alg":"HS256","typ":"JWT"}"#),
        engine.encode(claims.to_string()),
        engine.encode(b"sig")
    )
}

fn error_body(code: i32, message: &str) -> Json<Value> {
    Json(json!({"error": {"code": code, "message": message}}))
}

async fn register(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some(SERVER_AUTH) {
        return (StatusCode::UNAUTHORIZED, error_body(4, "Invalid server key"));
    }
    match body.get("device").and_then(Value::as_str) {
        Some("") | None => (StatusCode::BAD_REQUEST, error_body(3, "Device ID is required")),
        Some(device) => (StatusCode::OK, Json(json!({"session": {"token": issue_token(device)}}))),
    }
}

async fn login(Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    match body.get("device").and_then(Value::as_str) {
        Some("known") => (StatusCode::OK, Json(json!({"session": {"token": issue_token("known")}}))),
        _ => (StatusCode::UNAUTHORIZED, error_body(5, "User account not found")),
    }
}

async fn api(ws: WebSocketUpgrade, Query(params): Query<HashMap<String, String>>) -> Response {
    if params.get("token").map_or(true, String::is_empty) {
        return (StatusCode::UNAUTHORIZED, "token required").into_response();
    }
    let format = match params.get("format").map(String::as_str) {
        Some("json") => WireFormat::Json,
        _ => WireFormat::Protobuf,
    };
    ws.on_upgrade(move |socket| serve_socket(socket, format))
}

async fn serve_socket(mut socket: WebSocket, format: WireFormat) {
    while let Some(Ok(message)) = socket.recv().await {
        let bytes = match message {
            Message::Binary(bytes) => bytes.to_vec(),
            Message::Text(text) => text.as_str().as_bytes().to_vec(),
            Message::Close(_) => return,
            _ => continue,
        };
        let Ok(envelope) = envelopes::decode(&bytes, format) else {
            continue;
        };
        let Some(frames) = respond(envelope) else {
            let _ = socket.send(Message::Close(None)).await;
            return;
        };
        for frame in frames {
            let bytes = envelopes::encode(&frame, format).expect("encode");
            let message = if format.is_text() {
                Message::Text(String::from_utf8(bytes).expect("utf8").into())
            } else {
                Message::Binary(bytes.into())
            };
            if socket.send(message).await.is_err() {
                return;
            }
        }
    }
}

/// Frames to send back for one request. `None` closes the connection.
fn respond(envelope: Envelope) -> Option<Vec<Envelope>> {
    let cid = envelope.cid.unwrap_or_default();
    let payload = envelope.payload?;
    let frames = match payload {
        Payload::Rpc(rpc) if rpc.id == "echo" => vec![Envelope::correlated(cid, Payload::Rpc(rpc))],
        Payload::Rpc(rpc) if rpc.id == "push" => vec![
            Envelope::new(Payload::MatchData(MatchData {
                match_id: "m-1".to_owned(),
                presence: UserPresence::default(),
                op_code: 9,
                data: String::new(),
            })),
            Envelope::new(Payload::TopicMessage(TopicMessage {
                topic: TopicId { kind: TopicKind::Room, id: "lobby".to_owned() },
                message_id: "msg-1".to_owned(),
                user_id: "uid-server".to_owned(),
                handle: "server".to_owned(),
                created_at: 1,
                data: json!({"text": "welcome"}),
            })),
            Envelope::correlated(cid, Payload::Rpc(rpc)),
        ],
        Payload::Rpc(rpc) if rpc.id == "hangup" => return None,
        Payload::Rpc(_) => vec![Envelope::correlated(
            cid,
            Payload::Error(WireError { code: 14, message: "RPC function not found".to_owned() }),
        )],
        Payload::MatchmakeAdd(_) => vec![Envelope::correlated(
            cid,
            Payload::MatchmakeTicket(MatchmakeTicket { ticket: "ticket-1".to_owned() }),
        )],
        Payload::MatchCreate(_) => vec![Envelope::correlated(
            cid,
            Payload::Match(Match {
                match_id: "m-1".to_owned(),
                presences: Vec::new(),
                self_presence: UserPresence::default(),
            }),
        )],
        Payload::Logout(_) => return None,
        _ => vec![Envelope::ack(cid)],
    };
    Some(frames)
}

async fn spawn_backend() -> ClientConfig {
    let app = Router::new()
        .route("/user/register", post(register))
        .route("/user/login", post(login))
        .route("/api", get(api));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    ClientConfig::default().with_port(port)
}

async fn connected_socket(config: ClientConfig) -> playlink::Socket {
    let client = Client::new(config).expect("client");
    let session = client.register(&Credential::Device("X".to_owned())).await.expect("register");
    let socket = client.socket();
    socket.connect(&session).await.expect("connect");
    socket
}

// =============================================================================
// HANDSHAKE
// =============================================================================

#[tokio::test]
async fn register_with_device_returns_session() {
    let client = Client::new(spawn_backend().await).expect("client");
    let session = client.register(&Credential::Device("X".to_owned())).await.expect("register");

    assert!(!session.token.is_empty());
    assert_eq!(session.handle, "X");
    assert!(!session.has_expired_now());
}

#[tokio::test]
async fn register_with_empty_device_is_rejected() {
    let client = Client::new(spawn_backend().await).expect("client");
    let err = client.register(&Credential::Device(String::new())).await.expect_err("rejected");

    assert_eq!(err.kind(), ErrorKind::Server);
    assert_eq!(err.message(), "Device ID is required");
}

#[tokio::test]
async fn login_of_unknown_user_is_auth_error() {
    let client = Client::new(spawn_backend().await).expect("client");
    let err = client.login(&Credential::Device("stranger".to_owned())).await.expect_err("rejected");

    assert_eq!(err.kind(), ErrorKind::Auth);
    assert_eq!(err.code(), ErrorCode::UserNotFound);
}

#[tokio::test]
async fn wrong_server_key_is_auth_error() {
    let config = spawn_backend().await;
    let config = ClientConfig { server_key: "wrong".to_owned(), ..config };
    let client = Client::new(config).expect("client");
    let err = client.register(&Credential::Device("X".to_owned())).await.expect_err("rejected");

    assert_eq!(err.code(), ErrorCode::AuthError);
}

#[tokio::test]
async fn unreachable_server_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);

    let client = Client::new(ClientConfig::default().with_port(port)).expect("client");
    let err = client.register(&Credential::Device("X".to_owned())).await.expect_err("offline");
    assert_eq!(err.kind(), ErrorKind::Transport);
}

// =============================================================================
// SOCKET
// =============================================================================

#[tokio::test]
async fn back_to_back_requests_get_their_own_replies() {
    let socket = connected_socket(spawn_backend().await).await;

    let (ticket, rpc) = tokio::join!(
        socket.matchmake_add(2, serde_json::Map::new()),
        socket.rpc("echo", Some("ping".to_owned())),
    );

    assert_eq!(ticket.expect("ticket").ticket, "ticket-1");
    let rpc: Rpc = rpc.expect("rpc");
    assert_eq!(rpc.payload.as_deref(), Some("ping"));
    assert_eq!(socket.match_create().await.expect("match").match_id, "m-1");
}

#[tokio::test]
async fn unknown_rpc_is_server_error() {
    let socket = connected_socket(spawn_backend().await).await;
    let err = socket.rpc("missing", None).await.expect_err("server error");

    assert_eq!(err.kind(), ErrorKind::Server);
    assert_eq!(err.code(), ErrorCode::RuntimeFunctionNotFound);
}

#[tokio::test]
async fn pushes_reach_subscribers_and_unsubscribed_are_dropped() {
    let socket = connected_socket(spawn_backend().await).await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    socket.on_topic_message(move |message| sink.lock().expect("lock").push(message.handle.clone()));

    // The match data push has no subscriber and must not disturb the reply.
    let reply = socket.rpc("push", None).await.expect("rpc");

    assert_eq!(reply.id, "push");
    assert_eq!(*seen.lock().expect("lock"), vec!["server".to_owned()]);
}

#[tokio::test]
async fn send_after_disconnect_fails_with_transport_error() {
    let socket = connected_socket(spawn_backend().await).await;
    socket.disconnect().await;

    assert_eq!(socket.status(), SocketStatus::Disconnected);
    let err = socket.rpc("echo", None).await.expect_err("disconnected");
    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn server_hangup_fails_pending_request_and_notifies() {
    let socket = connected_socket(spawn_backend().await).await;
    let closed = Arc::new(Mutex::new(0_usize));
    let counter = Arc::clone(&closed);
    socket.on_disconnect(move |_| *counter.lock().expect("lock") += 1);

    let err = socket.rpc("hangup", None).await.expect_err("hung up");
    assert_eq!(err, ClientError::Closed);
    assert_eq!(*closed.lock().expect("lock"), 1);
    assert_eq!(socket.status(), SocketStatus::Disconnected);
}

#[tokio::test]
async fn json_wire_format_round_trips() {
    let config = spawn_backend().await.with_format(WireFormat::Json);
    let socket = connected_socket(config).await;

    let reply = tokio::time::timeout(Duration::from_secs(5), socket.rpc("echo", Some("j".to_owned())))
        .await
        .expect("in time")
        .expect("rpc");
    assert_eq!(reply.payload.as_deref(), Some("j"));
}
