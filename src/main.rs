//! CLI for chanrelay
//!
//! Subcommands:
//! - `server`: run the WebSocket relay
//! - `client`: join a channel, optionally send one message, print what arrives
//! - `token`: mint a bearer token for relays running with `require_auth`

use std::sync::Arc;

use chanrelay::auth::JwtAuthGate;
use chanrelay::config::load_config;
use chanrelay::relay::Broadcaster;
use chanrelay::transport::start_websocket_server;
use chanrelay::utils::RelayError;
use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "chanrelay")]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the WebSocket relay
    Server,
    /// Join a channel and print incoming messages
    Client {
        /// Relay base URL
        #[arg(long, default_value = "ws://127.0.0.1:8080")]
        url: String,
        /// Channel to join
        #[arg(long, default_value = "general")]
        channel: String,
        /// Message to publish once joined
        #[arg(long)]
        send: Option<String>,
        /// Bearer token, required when the relay enforces authentication
        #[arg(long)]
        token: Option<String>,
    },
    /// Issue a bearer token signed with the configured secret
    Token {
        #[arg(long)]
        subject: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    chanrelay::utils::logging::init(&cli.log_level);

    let result = match cli.command {
        Command::Server => run_server().await,
        Command::Client {
            url,
            channel,
            send,
            token,
        } => run_client(&url, &channel, send, token).await,
        Command::Token { subject } => issue_token(&subject),
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run_server() -> Result<(), RelayError> {
    let config = load_config()?;
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let broadcaster = Arc::new(Broadcaster::from_settings(&config.relay));

    if config.relay.require_auth {
        info!("bearer token required to join a channel");
    }

    tokio::select! {
        res = start_websocket_server(addr, broadcaster, config.clone()) => {
            res?;
            error!("WebSocket server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}

async fn run_client(
    url: &str,
    channel: &str,
    send: Option<String>,
    token: Option<String>,
) -> Result<(), RelayError> {
    let endpoint = format!("{}/ws/{channel}", url.trim_end_matches('/'));
    let mut request = endpoint.as_str().into_client_request()?;
    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| WsError::HttpFormat(e.into()))?;
        request.headers_mut().insert("Authorization", value);
    }

    let (mut ws_stream, _response) = connect_async(request).await?;
    info!("joined {endpoint}");

    if let Some(text) = send {
        ws_stream.send(WsMessage::text(text)).await?;
    }

    while let Some(frame) = ws_stream.next().await {
        match frame? {
            WsMessage::Text(text) => println!("{}", text.as_str()),
            WsMessage::Binary(bytes) => println!("<{} bytes>", bytes.len()),
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    Ok(())
}

fn issue_token(subject: &str) -> Result<(), RelayError> {
    let config = load_config()?;
    let gate = JwtAuthGate::from_settings(&config.server)?;
    println!("{}", gate.issue(subject)?);
    Ok(())
}
