use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use playlink::{
    Client, ClientConfig, ClientError, Credential, ErrorCode, Session, Socket, WireFormat,
};
use serde_json::{Value, json};
use tokio::sync::Notify;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("failed to wait for ctrl-c: {0}")]
    Signal(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "playlink", about = "Game backend session and realtime socket CLI")]
struct Cli {
    #[arg(long, env = "PLAYLINK_SERVER_KEY", default_value = playlink::config::DEFAULT_SERVER_KEY)]
    server_key: String,

    #[arg(long, env = "PLAYLINK_HOST", default_value = playlink::config::DEFAULT_HOST)]
    host: String,

    #[arg(long, env = "PLAYLINK_PORT", default_value_t = playlink::config::DEFAULT_PORT)]
    port: u16,

    #[arg(long, env = "PLAYLINK_SSL", default_value_t = false)]
    ssl: bool,

    #[arg(long, env = "PLAYLINK_LANG", default_value = playlink::config::DEFAULT_LANG)]
    lang: String,

    #[arg(long, env = "PLAYLINK_FORMAT", value_enum, default_value_t = FormatArg::Protobuf)]
    format: FormatArg,

    #[arg(long, env = "PLAYLINK_REQUEST_TIMEOUT_MS", default_value_t = playlink::config::DEFAULT_REQUEST_TIMEOUT_MS)]
    request_timeout_ms: u64,

    #[arg(long, env = "PLAYLINK_CONNECT_TIMEOUT_MS", default_value_t = playlink::config::DEFAULT_CONNECT_TIMEOUT_MS)]
    connect_timeout_ms: u64,

    #[arg(long, env = "PLAYLINK_REPLY_TIMEOUT_MS")]
    reply_timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    Protobuf,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Authenticate and print the session.
    Auth(AuthArgs),
    /// Call a server-side function and print the reply.
    Rpc(RpcArgs),
    /// Print every push event until the socket closes.
    Listen(DeviceArgs),
}

#[derive(Args, Debug)]
struct AuthArgs {
    #[command(subcommand)]
    credential: CredentialArg,

    /// Create the account instead of logging in.
    #[arg(long, default_value_t = false)]
    register: bool,
}

#[derive(Subcommand, Debug)]
enum CredentialArg {
    Device {
        id: String,
    },
    Custom {
        id: String,
    },
    Email {
        email: String,
        #[arg(long, env = "PLAYLINK_PASSWORD", hide_env_values = true)]
        password: String,
    },
}

#[derive(Args, Debug)]
struct DeviceArgs {
    /// Device id used to register (or reuse) the account.
    #[arg(long, env = "PLAYLINK_DEVICE_ID", default_value = "playlink-cli")]
    device: String,
}

#[derive(Args, Debug)]
struct RpcArgs {
    id: String,

    /// Raw payload string passed to the function.
    #[arg(long)]
    payload: Option<String>,

    #[command(flatten)]
    device: DeviceArgs,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = Client::new(client_config(&cli))?;

    match cli.command {
        Command::Auth(args) => run_auth(&client, args).await,
        Command::Rpc(args) => run_rpc(&client, args).await,
        Command::Listen(args) => run_listen(&client, args).await,
    }
}

fn client_config(cli: &Cli) -> ClientConfig {
    let format = match cli.format {
        FormatArg::Protobuf => WireFormat::Protobuf,
        FormatArg::Json => WireFormat::Json,
    };
    ClientConfig::new(cli.server_key.clone())
        .with_host(cli.host.clone())
        .with_port(cli.port)
        .with_ssl(cli.ssl)
        .with_lang(cli.lang.clone())
        .with_format(format)
        .with_timeouts(
            Duration::from_millis(cli.request_timeout_ms),
            Duration::from_millis(cli.connect_timeout_ms),
        )
        .with_reply_timeout(cli.reply_timeout_ms.map(Duration::from_millis))
}

async fn run_auth(client: &Client, args: AuthArgs) -> Result<(), CliError> {
    let credential = match args.credential {
        CredentialArg::Device { id } => Credential::Device(id),
        CredentialArg::Custom { id } => Credential::Custom(id),
        CredentialArg::Email { email, password } => Credential::Email { email, password },
    };
    let session = if args.register {
        client.register(&credential).await?
    } else {
        client.login(&credential).await?
    };
    print_json(&serde_json::to_value(&session)?)
}

async fn run_rpc(client: &Client, args: RpcArgs) -> Result<(), CliError> {
    let socket = open_socket(client, &args.device).await?;
    let result = socket.rpc(args.id, args.payload).await;
    socket.disconnect().await;
    print_json(&serde_json::to_value(result?)?)
}

async fn run_listen(client: &Client, args: DeviceArgs) -> Result<(), CliError> {
    let socket = client.socket();
    let closed = Arc::new(Notify::new());

    socket.on_matchmake_matched(|event| emit("matchmake_matched", event));
    socket.on_match_data(|event| emit("match_data", event));
    socket.on_match_presence(|event| emit("match_presence", event));
    socket.on_topic_message(|event| emit("topic_message", event));
    socket.on_topic_presence(|event| emit("topic_presence", event));
    socket.on_notification(|event| emit("notification", event));
    socket.on_disconnect({
        let closed = Arc::clone(&closed);
        move |event| {
            info!(code = ?event.code, reason = %event.reason, "socket closed");
            closed.notify_one();
        }
    });

    let session = session_for(client, &args).await?;
    socket.connect(&session).await?;
    info!(user_id = %session.user_id, "listening for push events");

    tokio::select! {
        () = closed.notified() => Ok(()),
        signal = tokio::signal::ctrl_c() => {
            signal?;
            socket.disconnect().await;
            Ok(())
        }
    }
}

async fn open_socket(client: &Client, device: &DeviceArgs) -> Result<Socket, CliError> {
    let session = session_for(client, device).await?;
    let socket = client.socket();
    socket.connect(&session).await?;
    Ok(socket)
}

/// Log in with the device id, registering it on first use.
async fn session_for(client: &Client, device: &DeviceArgs) -> Result<Session, CliError> {
    let credential = Credential::Device(device.device.clone());
    match client.login(&credential).await {
        Err(err) if err.code() == ErrorCode::UserNotFound => Ok(client.register(&credential).await?),
        other => Ok(other?),
    }
}

fn emit<T: serde::Serialize>(event: &str, body: &T) {
    let line = json!({"event": event, "body": serde_json::to_value(body).unwrap_or(Value::Null)});
    println!("{line}");
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
