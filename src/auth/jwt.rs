//! Session tokens.
//!
//! Sessions are HS256 JWTs. The role claim is informational; extractors
//! reload the user so role changes apply to existing sessions immediately.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::{AuthConfig, Role};
use crate::error::{CorpdeskError, Result};
use crate::models::User;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id
    pub sub: String,
    pub role: Role,
    pub email: String,
    pub iss: String,
    pub iat: u64,
    pub exp: u64,
    pub jti: String,
}

/// Issues and verifies session tokens.
#[derive(Clone)]
pub struct SessionIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl SessionIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.expose_secret();
        let secret: Vec<u8> = if secret.is_empty() {
            tracing::warn!("JWT_SECRET not set, sessions use an ephemeral secret");
            crate::utils::secure_random_bytes::<32>().to_vec()
        } else {
            secret.as_bytes().to_vec()
        };

        Self {
            encoding_key: EncodingKey::from_secret(&secret),
            decoding_key: DecodingKey::from_secret(&secret),
            issuer: config.issuer.clone(),
            ttl: Duration::from_secs(config.session_ttl_hours * 60 * 60),
        }
    }

    /// Session lifetime in seconds.
    pub fn ttl_secs(&self) -> u64 {
        self.ttl.as_secs()
    }

    pub fn issue(&self, user: &User) -> Result<String> {
        let now = current_timestamp();
        let claims = SessionClaims {
            sub: user.id.clone(),
            role: user.role,
            email: user.email.clone(),
            iss: self.issuer.clone(),
            iat: now,
            exp: now + self.ttl.as_secs(),
            jti: generate_jti(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| CorpdeskError::internal(format!("Failed to sign session: {}", e)))
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "session token rejected");
                CorpdeskError::unauthorized("Invalid or expired session")
            })
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn generate_jti() -> String {
    let bytes: [u8; 16] = std::array::from_fn(|_| fastrand::u8(..));
    URL_SAFE_NO_PAD.encode(bytes)
}
