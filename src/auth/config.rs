use secrecy::SecretString;

use crate::utils::{get_env_with_prefix, parse_env_with_prefix};

/// Session and token lifetimes.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HS256 signing secret. Empty means an ephemeral per-process secret (dev only).
    pub jwt_secret: SecretString,
    pub issuer: String,
    pub session_ttl_hours: u64,
    pub verification_ttl_hours: u64,
    pub portal_token_ttl_days: u64,
    pub cookie_name: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: SecretString::from(String::new()),
            issuer: "corpdesk".to_string(),
            session_ttl_hours: 24 * 7,
            verification_ttl_hours: 48,
            portal_token_ttl_days: 30,
            cookie_name: "corpdesk_session".to_string(),
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(secret) = get_env_with_prefix("JWT_SECRET") {
            config.jwt_secret = SecretString::from(secret);
        }
        if let Some(issuer) = get_env_with_prefix("JWT_ISSUER") {
            config.issuer = issuer;
        }
        if let Some(hours) = parse_env_with_prefix("SESSION_TTL_HOURS") {
            config.session_ttl_hours = hours;
        }
        if let Some(hours) = parse_env_with_prefix("VERIFICATION_TTL_HOURS") {
            config.verification_ttl_hours = hours;
        }
        if let Some(days) = parse_env_with_prefix("PORTAL_TOKEN_TTL_DAYS") {
            config.portal_token_ttl_days = days;
        }
        config
    }

    pub fn verification_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.verification_ttl_hours as i64)
    }

    pub fn portal_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.portal_token_ttl_days as i64)
    }
}
