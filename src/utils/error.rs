//! The `error` module defines the error types used within `chanrelay`.
//!
//! Failures are contained at the connection boundary: a `RelayError` coming
//! out of a reader or writer task ends that one connection and nothing else.

use std::io;

use thiserror::Error;
use tungstenite::Error as WsError;
use tungstenite::protocol::frame::coding::CloseCode;

use crate::auth::AuthError;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("websocket handshake failed: {0}")]
    Handshake(#[source] WsError),

    #[error("transport fault: {0}")]
    Transport(#[from] WsError),

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("connection task aborted: {0}")]
    Task(String),
}

impl RelayError {
    /// Short snake_case label for log fields.
    pub fn as_label(&self) -> &'static str {
        match self {
            RelayError::Bind { .. } => "bind",
            RelayError::Handshake(_) => "handshake",
            RelayError::Transport(_) => "transport",
            RelayError::Encode(_) => "encode",
            RelayError::Config(_) => "config",
            RelayError::Auth(_) => "auth",
            RelayError::Task(_) => "task",
        }
    }
}

/// How an inbound read error affects the connection.
///
/// tungstenite stops yielding frames after any read error, so neither kind
/// lets the reader continue. They differ in how the connection ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundFault {
    /// The peer sent an unusable message on an intact socket. The relay
    /// answers with a close frame carrying this status code.
    Malformed(CloseCode),
    /// The stream itself failed; the socket is dropped without a close frame.
    Transport,
}

/// Classifies an error returned while reading the next inbound frame.
pub fn classify_inbound(err: &WsError) -> InboundFault {
    match err {
        WsError::Utf8(_) => InboundFault::Malformed(CloseCode::Invalid),
        WsError::Capacity(_) => InboundFault::Malformed(CloseCode::Size),
        _ => InboundFault::Transport,
    }
}
