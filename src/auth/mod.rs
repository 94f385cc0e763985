//! The `auth` module provides the bearer-token gate consumed by the relay.
//!
//! The relay itself never looks inside a token. It asks an [`AuthGate`] for a
//! verdict and either admits the connection or rejects the handshake.
//! [`JwtAuthGate`] is the HS256 implementation wired up by the binary.

mod jwt;

pub use jwt::{Claims, JwtAuthGate};

use thiserror::Error;

/// The identity a verified token resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("token rejected: {0}")]
    Rejected(#[from] jsonwebtoken::errors::Error),

    #[error("token has an empty subject")]
    EmptySubject,

    #[error("token lifetime is out of range")]
    InvalidTtl,
}

/// Validates bearer tokens and resolves them to a user identity.
pub trait AuthGate: Send + Sync {
    fn verify(&self, token: &str) -> Result<Identity, AuthError>;
}
