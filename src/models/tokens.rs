use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::new_id;
use crate::db::Record;

/// Pending email verification. Only the SHA-256 hash of the mailed token is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationToken {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VerificationToken {
    pub fn new(
        user_id: impl Into<String>,
        token_hash: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            user_id: user_id.into(),
            token_hash: token_hash.into(),
            expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl Record for VerificationToken {
    const COLLECTION: &'static str = "verification_tokens";
    const LABEL: &'static str = "Verification token";

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> Option<&str> {
        Some(&self.user_id)
    }

    fn lookup_key(&self) -> Option<String> {
        Some(self.token_hash.clone())
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}

/// Grants a contract's client session-less access through the portal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalToken {
    pub id: String,
    pub contract_id: String,
    /// Owner of the contract that issued the link.
    pub user_id: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PortalToken {
    pub fn new(
        contract_id: impl Into<String>,
        user_id: impl Into<String>,
        token_hash: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            contract_id: contract_id.into(),
            user_id: user_id.into(),
            token_hash: token_hash.into(),
            expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl Record for PortalToken {
    const COLLECTION: &'static str = "portal_tokens";
    const LABEL: &'static str = "Portal link";

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> Option<&str> {
        Some(&self.user_id)
    }

    fn parent_id(&self) -> Option<&str> {
        Some(&self.contract_id)
    }

    fn lookup_key(&self) -> Option<String> {
        Some(self.token_hash.clone())
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}

/// Marker for a Stripe webhook event that has been handled. The id is the event id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedWebhookEvent {
    pub id: String,
    pub event_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessedWebhookEvent {
    pub fn new(event_id: impl Into<String>, event_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: event_id.into(),
            event_type: event_type.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for ProcessedWebhookEvent {
    const COLLECTION: &'static str = "processed_webhook_events";
    const LABEL: &'static str = "Webhook event";

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}
