//! WebSocket transport
//!
//! Accepts TCP connections, performs the upgrade handshake and hands every
//! admitted connection to its own `ConnectionSupervisor`. Responsibilities:
//! - route `/ws/{channel}` and reject everything else during the handshake
//! - verify the bearer token first when `relay.require_auth` is set
//! - cap concurrent connections at `relay.max_connections`
//! - bound inbound message size at `relay.max_message_bytes`
//! - give up on handshakes that take longer than `relay.handshake_timeout_ms`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_tungstenite::accept_hdr_async_with_config;
use tracing::{debug, info, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;
use tungstenite::protocol::WebSocketConfig;

use crate::auth::{AuthGate, JwtAuthGate};
use crate::config::{RelaySettings, Settings};
use crate::relay::Broadcaster;
use crate::transport::route::{self, Admission};
use crate::transport::supervisor::ConnectionSupervisor;
use crate::utils::RelayError;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub async fn start_websocket_server(
    addr: String,
    broadcaster: Arc<Broadcaster>,
    settings: Settings,
) -> Result<(), RelayError> {
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| RelayError::Bind {
            addr: addr.clone(),
            source,
        })?;

    info!("WebSocket relay listening on ws://{addr}/ws/{{channel}}");

    serve(listener, broadcaster, settings).await
}

/// Serves an already bound listener. A JWT gate built from `settings.server`
/// is installed when `settings.relay.require_auth` is set. Only returns if
/// that gate cannot be built.
pub async fn serve(
    listener: TcpListener,
    broadcaster: Arc<Broadcaster>,
    settings: Settings,
) -> Result<(), RelayError> {
    let gate = if settings.relay.require_auth {
        let gate = JwtAuthGate::from_settings(&settings.server)?;
        Some(Arc::new(gate) as Arc<dyn AuthGate>)
    } else {
        None
    };
    serve_with_gate(listener, broadcaster, settings.relay, gate).await;
    Ok(())
}

/// Accept loop. Runs until the future is dropped.
pub async fn serve_with_gate(
    listener: TcpListener,
    broadcaster: Arc<Broadcaster>,
    relay: RelaySettings,
    gate: Option<Arc<dyn AuthGate>>,
) {
    let limiter = Arc::new(Semaphore::new(relay.max_connections));

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };

        let broadcaster = broadcaster.clone();
        let gate = gate.clone();
        let permit = limiter.clone().try_acquire_owned().ok();
        let config = ws_config(&relay);
        let handshake_timeout = Duration::from_millis(relay.handshake_timeout_ms);

        tokio::spawn(async move {
            handle_connection(
                stream,
                peer,
                broadcaster,
                gate,
                permit,
                config,
                handshake_timeout,
            )
            .await;
        });
    }
}

fn ws_config(relay: &RelaySettings) -> WebSocketConfig {
    WebSocketConfig::default()
        .max_message_size(Some(relay.max_message_bytes))
        .max_frame_size(Some(relay.max_message_bytes))
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    broadcaster: Arc<Broadcaster>,
    gate: Option<Arc<dyn AuthGate>>,
    permit: Option<OwnedSemaphorePermit>,
    config: WebSocketConfig,
    handshake_timeout: Duration,
) {
    let at_capacity = permit.is_none();
    let mut admission: Option<Admission> = None;

    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if at_capacity {
            return Err(route::reject(
                StatusCode::SERVICE_UNAVAILABLE,
                "too many connections",
            ));
        }
        admission = Some(route::admit(request, gate.as_deref())?);
        Ok(response)
    };

    let handshake = accept_hdr_async_with_config(stream, callback, Some(config));
    let ws_stream = match tokio::time::timeout(handshake_timeout, handshake).await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            let err = RelayError::Handshake(e);
            debug!(%peer, error = %err, "handshake rejected");
            return;
        }
        Err(_) => {
            debug!(%peer, timeout = ?handshake_timeout, "handshake timed out");
            return;
        }
    };

    let Some(admission) = admission else {
        return;
    };
    if let Some(identity) = &admission.identity {
        debug!(%peer, subject = %identity.subject, channel = %admission.channel, "authenticated");
    }

    let mut supervisor =
        ConnectionSupervisor::new(broadcaster, admission.channel, peer.to_string());
    supervisor.run(ws_stream).await;

    drop(permit);
}
