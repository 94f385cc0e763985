use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use super::{AuthError, AuthGate, Identity};
use crate::config::ServerSettings;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

/// HS256 token gate sharing one secret for issuing and verifying.
pub struct JwtAuthGate {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl JwtAuthGate {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
            ttl,
        }
    }

    /// Fails when `token_ttl_mins` does not fit a `chrono::Duration`.
    pub fn from_settings(server: &ServerSettings) -> Result<Self, AuthError> {
        let ttl = i64::try_from(server.token_ttl_mins)
            .ok()
            .and_then(Duration::try_minutes)
            .ok_or(AuthError::InvalidTtl)?;
        Ok(Self::new(&server.jwt_secret, ttl))
    }

    /// Mints a token for `subject` that expires after the configured TTL.
    pub fn issue(&self, subject: &str) -> Result<String, AuthError> {
        let exp = Utc::now()
            .checked_add_signed(self.ttl)
            .and_then(|expires| usize::try_from(expires.timestamp()).ok())
            .ok_or(AuthError::InvalidTtl)?;
        let claims = Claims {
            sub: subject.to_string(),
            exp,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }
}

impl AuthGate for JwtAuthGate {
    fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)?;
        if data.claims.sub.is_empty() {
            return Err(AuthError::EmptySubject);
        }
        Ok(Identity {
            subject: data.claims.sub,
        })
    }
}

impl std::fmt::Debug for JwtAuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAuthGate")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
