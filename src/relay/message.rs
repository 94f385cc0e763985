//! Message definitions for the relay
//!
//! A `Message` is an opaque payload plus the channel it was published to.
//! The relay never wraps payloads in an envelope: whatever frame a client
//! sends is what every subscriber receives.

use tungstenite::protocol::Message as WsMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    /// Extracts the payload of a data frame. Control frames yield `None`.
    pub fn from_frame(frame: WsMessage) -> Option<Self> {
        match frame {
            WsMessage::Text(text) => Some(Payload::Text(text.as_str().to_owned())),
            WsMessage::Binary(bytes) => Some(Payload::Binary(bytes.to_vec())),
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Close(_) | WsMessage::Frame(_) => {
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Payload::Text(text) => text.len(),
            Payload::Binary(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A published message. Shared between subscribers behind an `Arc` and never
/// mutated after publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub channel: String,
    pub payload: Payload,
}

impl Message {
    pub fn new(channel: &str, payload: Payload) -> Self {
        Self {
            channel: channel.to_string(),
            payload,
        }
    }

    /// Builds the outbound frame, preserving the text/binary kind.
    pub fn to_frame(&self) -> WsMessage {
        match &self.payload {
            Payload::Text(text) => WsMessage::text(text.clone()),
            Payload::Binary(bytes) => WsMessage::binary(bytes.clone()),
        }
    }
}
