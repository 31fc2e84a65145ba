//! Single-use email verification tokens.
//!
//! The raw token is mailed to the user; only its SHA-256 hash is stored.

use chrono::{Duration, Utc};

use crate::db::DatabaseClient;
use crate::error::{CorpdeskError, Result};
use crate::models::VerificationToken;
use crate::utils::{generate_token, hash_token};

/// Replace any pending token for `user_id` and return a fresh raw token.
pub async fn issue_verification_token(
    db: &DatabaseClient,
    user_id: &str,
    ttl: Duration,
) -> Result<String> {
    for stale in db.find_by_user_id::<VerificationToken>(user_id).await? {
        db.delete::<VerificationToken>(&stale.id).await?;
    }

    let token = generate_token();
    let record = VerificationToken::new(user_id, hash_token(&token), Utc::now() + ttl);
    db.create(record).await?;

    tracing::debug!(user_id = %user_id, "verification token issued");
    Ok(token)
}

/// Consume a raw token and return the user id it was issued to.
///
/// Unknown, already used and expired tokens are all a 400.
pub async fn consume_verification_token(db: &DatabaseClient, token: &str) -> Result<String> {
    let invalid = || CorpdeskError::bad_request("Invalid or expired verification token");

    let record = db
        .find_by_lookup_key::<VerificationToken>(&hash_token(token.trim()))
        .await?
        .ok_or_else(invalid)?;

    // A concurrent consume may have removed it since the lookup
    if !db.delete::<VerificationToken>(&record.id).await? {
        return Err(invalid());
    }

    if record.is_expired(Utc::now()) {
        tracing::debug!(user_id = %record.user_id, "expired verification token presented");
        return Err(invalid());
    }

    Ok(record.user_id)
}
