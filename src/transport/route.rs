//! Handshake admission
//!
//! Decides, while the upgrade request is still in hand, whether a connection
//! may proceed and which channel it joins. Only `/ws/{channel}` is served;
//! the channel is the raw path segment, accepted as-is when non-empty.

use tracing::debug;
use tungstenite::handshake::server::{ErrorResponse, Request};
use tungstenite::http::{HeaderValue, StatusCode, header};

use crate::auth::{AuthError, AuthGate, Identity};

pub const CHANNEL_PREFIX: &str = "/ws/";

/// What the handshake resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub channel: String,
    pub identity: Option<Identity>,
}

/// Extracts the channel from a request path, e.g. `/ws/general` -> `general`.
pub fn channel_from_path(path: &str) -> Option<&str> {
    let channel = path.strip_prefix(CHANNEL_PREFIX)?;
    if channel.is_empty() || channel.contains('/') {
        return None;
    }
    Some(channel)
}

/// Bearer token from the `Authorization` header, falling back to the `token`
/// query parameter (browsers cannot set headers on a WebSocket upgrade).
pub fn bearer_token(request: &Request) -> Option<String> {
    let from_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());
    if let Some(token) = from_header {
        return Some(token.to_string());
    }

    let query = request.uri().query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())
        .filter(|token| !token.is_empty())
}

/// Routes the upgrade request and, when a gate is configured, verifies the
/// caller before anything is registered.
pub fn admit(request: &Request, gate: Option<&dyn AuthGate>) -> Result<Admission, ErrorResponse> {
    let Some(channel) = channel_from_path(request.uri().path()) else {
        return Err(reject(StatusCode::NOT_FOUND, "expected /ws/{channel}"));
    };

    let identity = match gate {
        None => None,
        Some(gate) => {
            let verdict = bearer_token(request)
                .ok_or(AuthError::MissingToken)
                .and_then(|token| gate.verify(&token));
            match verdict {
                Ok(identity) => Some(identity),
                Err(err) => {
                    debug!(%channel, error = %err, "bearer token refused");
                    return Err(unauthorized());
                }
            }
        }
    };

    Ok(Admission {
        channel: channel.to_string(),
        identity,
    })
}

pub fn reject(status: StatusCode, reason: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(reason.to_string()));
    *response.status_mut() = status;
    response
}

fn unauthorized() -> ErrorResponse {
    let mut response = reject(StatusCode::UNAUTHORIZED, "Could not validate credentials");
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    response
}
