//! Stripe webhook handling.
//!
//! Verifies the `Stripe-Signature` header, skips events already handled and
//! routes subscription, checkout and Connect account events.

use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::client::StripeSubscription;
use super::error::BillingError;
use super::subscription::SubscriptionService;
use crate::db::DatabaseClient;
use crate::error::{CorpdeskError, Result};
use crate::models::{Company, Contract, ContractStatus, ProcessedWebhookEvent};

/// Maximum age of a signed webhook, in seconds.
const SIGNATURE_TOLERANCE_SECS: u64 = 300;

/// Webhook handler for Stripe events.
///
/// The webhook secret is held as a [`SecretString`] and never printed.
#[derive(Clone)]
pub struct WebhookHandler {
    db: DatabaseClient,
    subscriptions: SubscriptionService,
    webhook_secret: SecretString,
}

/// Parsed webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    /// Event type (e.g., "checkout.session.completed").
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
    #[serde(default)]
    pub created: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    /// The object that triggered the event.
    pub object: serde_json::Value,
}

/// Outcome of webhook processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed,
    /// Not an event Corpdesk acts on.
    Ignored,
    /// Seen before; nothing was done.
    AlreadyProcessed,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed => "processed",
            WebhookOutcome::Ignored => "ignored",
            WebhookOutcome::AlreadyProcessed => "already_processed",
        }
    }
}

impl WebhookHandler {
    pub fn new(
        db: DatabaseClient,
        subscriptions: SubscriptionService,
        webhook_secret: impl Into<SecretString>,
    ) -> Self {
        Self {
            db,
            subscriptions,
            webhook_secret: webhook_secret.into(),
        }
    }

    /// Verify the signature against the raw body and parse the event.
    ///
    /// # Errors
    ///
    /// Fails on a malformed header, a timestamp older than five minutes, a
    /// signature mismatch or an unparseable payload.
    pub fn verify_signature(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> std::result::Result<WebhookEvent, BillingError> {
        self.verify_signature_at(payload, signature, Utc::now().timestamp())
    }

    fn verify_signature_at(
        &self,
        payload: &[u8],
        signature: &str,
        now: i64,
    ) -> std::result::Result<WebhookEvent, BillingError> {
        let sig_parts = parse_signature_header(signature)?;

        // The timestamp is untrusted input; abs_diff cannot overflow
        let age_seconds = now.abs_diff(sig_parts.timestamp);
        if age_seconds > SIGNATURE_TOLERANCE_SECS {
            return Err(BillingError::WebhookTimestampExpired { age_seconds });
        }

        let expected = compute_signature(
            self.webhook_secret.expose_secret(),
            sig_parts.timestamp,
            payload,
        )?;

        // Stripe sends one v1 per active secret while a secret is rotated
        let matched = sig_parts
            .signatures
            .iter()
            .filter_map(|candidate| hex::decode(candidate).ok())
            .fold(0u8, |found, provided| {
                found | expected.ct_eq(&provided).unwrap_u8()
            });
        if matched != 1 {
            return Err(BillingError::InvalidWebhookSignature);
        }

        // Log the parse error but return a generic message
        serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse webhook payload");
            BillingError::InvalidWebhookPayload {
                message: "malformed JSON payload".to_string(),
            }
        })
    }

    /// Process a verified event once.
    pub async fn handle_event(&self, event: WebhookEvent) -> Result<WebhookOutcome> {
        if self
            .db
            .find_by_id::<ProcessedWebhookEvent>(&event.id)
            .await?
            .is_some()
        {
            tracing::debug!(event_id = %event.id, "Webhook event already processed");
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        let outcome = match event.event_type.as_str() {
            "customer.subscription.created" | "customer.subscription.updated" => {
                self.handle_subscription_updated(&event).await?
            }
            "customer.subscription.deleted" => self.handle_subscription_deleted(&event).await?,
            "checkout.session.completed" => self.handle_checkout_completed(&event).await?,
            "account.updated" => self.handle_account_updated(&event).await?,
            _ => WebhookOutcome::Ignored,
        };

        if outcome != WebhookOutcome::Ignored {
            let marker = ProcessedWebhookEvent::new(event.id.clone(), event.event_type.clone());
            match self.db.create(marker).await {
                Ok(_) | Err(CorpdeskError::Conflict(_)) => {}
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            outcome = outcome.as_str(),
            "Webhook event handled"
        );
        Ok(outcome)
    }

    async fn handle_subscription_updated(&self, event: &WebhookEvent) -> Result<WebhookOutcome> {
        let (remote, user_id) = parse_subscription(&event.data.object)?;
        self.subscriptions
            .sync_from_stripe(&remote, user_id.as_deref())
            .await?;
        Ok(WebhookOutcome::Processed)
    }

    async fn handle_subscription_deleted(&self, event: &WebhookEvent) -> Result<WebhookOutcome> {
        let subscription_id = str_field(&event.data.object, "id")
            .ok_or_else(|| invalid_payload("missing subscription id"))?;
        self.subscriptions.mark_canceled(subscription_id).await?;
        Ok(WebhookOutcome::Processed)
    }

    /// Marks the contract paid for completed contract checkouts.
    async fn handle_checkout_completed(&self, event: &WebhookEvent) -> Result<WebhookOutcome> {
        let session = &event.data.object;
        let Some(contract_id) = session
            .get("metadata")
            .and_then(|m| str_field(m, "contract_id"))
        else {
            return Ok(WebhookOutcome::Ignored);
        };

        // Delayed payment methods complete the session before the money arrives
        if str_field(session, "payment_status") != Some("paid") {
            tracing::info!(contract_id = %contract_id, "Checkout completed without payment");
            return Ok(WebhookOutcome::Ignored);
        }

        let Some(mut contract) = self.db.find_by_id::<Contract>(contract_id).await? else {
            tracing::warn!(contract_id = %contract_id, "Checkout completed for unknown contract");
            return Ok(WebhookOutcome::Ignored);
        };

        if contract.status != ContractStatus::Paid {
            contract.mark_paid(Utc::now());
            self.db.update(contract).await?;
            tracing::info!(contract_id = %contract_id, "Contract paid");
        }
        Ok(WebhookOutcome::Processed)
    }

    async fn handle_account_updated(&self, event: &WebhookEvent) -> Result<WebhookOutcome> {
        let account = &event.data.object;
        let account_id =
            str_field(account, "id").ok_or_else(|| invalid_payload("missing account id"))?;

        let Some(mut company) = self.db.find_by_lookup_key::<Company>(account_id).await? else {
            tracing::warn!(account_id = %account_id, "Connect account has no company");
            return Ok(WebhookOutcome::Ignored);
        };

        company.connect_charges_enabled = bool_field(account, "charges_enabled");
        company.connect_details_submitted = bool_field(account, "details_submitted");
        let company = self.db.update(company).await?;
        tracing::info!(
            company_id = %company.id,
            charges_enabled = company.connect_charges_enabled,
            "Connect account updated"
        );
        Ok(WebhookOutcome::Processed)
    }
}

impl std::fmt::Debug for WebhookHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookHandler").finish_non_exhaustive()
    }
}

fn invalid_payload(message: &str) -> BillingError {
    BillingError::InvalidWebhookPayload {
        message: message.to_string(),
    }
}

fn str_field<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(|v| v.as_str())
}

fn bool_field(value: &serde_json::Value, key: &str) -> bool {
    value.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

/// An id that may arrive either as a string or as an expanded object.
fn expandable_id(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(id) => Some(id.clone()),
        object => str_field(object, "id").map(str::to_string),
    }
}

/// Subscription state from a webhook payload, plus the `user_id` metadata.
fn parse_subscription(
    object: &serde_json::Value,
) -> std::result::Result<(StripeSubscription, Option<String>), BillingError> {
    let id = str_field(object, "id")
        .ok_or_else(|| invalid_payload("missing subscription id"))?
        .to_string();
    let customer_id = expandable_id(object.get("customer"))
        .ok_or_else(|| invalid_payload("missing customer id"))?;

    let item = object
        .get("items")
        .and_then(|items| items.get("data"))
        .and_then(|data| data.as_array())
        .and_then(|data| data.first());

    let subscription = StripeSubscription {
        id,
        customer_id,
        status: str_field(object, "status").unwrap_or("active").to_string(),
        price_id: item.and_then(|item| expandable_id(item.get("price"))),
        item_id: item.and_then(|item| str_field(item, "id")).map(str::to_string),
        current_period_end: object.get("current_period_end").and_then(|v| v.as_i64()),
        cancel_at_period_end: bool_field(object, "cancel_at_period_end"),
    };

    let user_id = object
        .get("metadata")
        .and_then(|m| str_field(m, "user_id"))
        .map(str::to_string);

    Ok((subscription, user_id))
}

struct SignatureParts {
    timestamp: i64,
    signatures: Vec<String>,
}

/// Parse the Stripe-Signature header (`t=...,v1=...`).
fn parse_signature_header(header: &str) -> std::result::Result<SignatureParts, BillingError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let (key, value) = part
            .split_once('=')
            .ok_or(BillingError::InvalidWebhookSignature)?;

        match key.trim() {
            "t" => timestamp = value.trim().parse().ok(),
            "v1" => signatures.push(value.trim().to_string()),
            _ => {}
        }
    }

    if signatures.is_empty() {
        return Err(BillingError::InvalidWebhookSignature);
    }
    Ok(SignatureParts {
        timestamp: timestamp.ok_or(BillingError::InvalidWebhookSignature)?,
        signatures,
    })
}

/// HMAC-SHA256 over `"{timestamp}.{payload}"`.
fn compute_signature(
    secret: &str,
    timestamp: i64,
    payload: &[u8],
) -> std::result::Result<Vec<u8>, BillingError> {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| {
        BillingError::Internal {
            message: "HMAC key error".to_string(),
        }
    })?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Build a valid `Stripe-Signature` header, for tests and local tooling.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let signature = compute_signature(secret, timestamp, payload)
        .map(hex::encode)
        .unwrap_or_default();
    format!("t={},v1={}", timestamp, signature)
}
