//! Billing-specific error types.

use std::fmt;

/// Errors raised by Stripe orchestration.
///
/// Converted into [`CorpdeskError`](crate::error::CorpdeskError) at the
/// handler boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// Stripe credentials are not configured.
    NotConfigured,
    /// The user has no Stripe customer yet.
    NoCustomer { user_id: String },
    /// No active Stripe price carries this lookup key.
    PriceNotFound { lookup_key: String },
    /// The user's plan does not include this feature.
    FeatureNotIncluded { feature: String, plan: String },
    /// The company has not finished Stripe Connect onboarding.
    ConnectNotReady { company_id: String },
    /// Some catalogue lookup keys already exist in Stripe.
    ProvisioningConflict { existing: Vec<String> },
    /// Catalogue creation failed; `rollback_failures` lists resources left active.
    ProvisioningFailed {
        step: String,
        message: String,
        rollback_failures: Vec<String>,
    },
    InvalidWebhookSignature,
    WebhookTimestampExpired { age_seconds: u64 },
    InvalidWebhookPayload { message: String },
    StripeApiError {
        operation: String,
        message: String,
        code: Option<String>,
        http_status: Option<u16>,
    },
    Internal { message: String },
}

impl fmt::Display for BillingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "Billing is not configured"),
            Self::NoCustomer { user_id } => {
                write!(f, "No Stripe customer found for user '{}'", user_id)
            }
            Self::PriceNotFound { lookup_key } => write!(
                f,
                "No active Stripe price with lookup key '{}' (run `corpdesk stripe-setup`)",
                lookup_key
            ),
            Self::FeatureNotIncluded { feature, plan } => write!(
                f,
                "Your {} plan does not include {}. Upgrade to Pro to use it.",
                plan, feature
            ),
            Self::ConnectNotReady { company_id } => write!(
                f,
                "Company '{}' cannot accept payments until Stripe onboarding is complete",
                company_id
            ),
            Self::ProvisioningConflict { existing } => write!(
                f,
                "Stripe catalogue partially exists (lookup keys: {}); resolve manually",
                existing.join(", ")
            ),
            Self::ProvisioningFailed {
                step,
                message,
                rollback_failures,
            } => {
                write!(f, "Stripe provisioning failed at '{}': {}", step, message)?;
                if !rollback_failures.is_empty() {
                    write!(
                        f,
                        " (rollback could not deactivate: {})",
                        rollback_failures.join(", ")
                    )?;
                }
                Ok(())
            }
            Self::InvalidWebhookSignature => write!(f, "Invalid webhook signature"),
            Self::WebhookTimestampExpired { age_seconds } => {
                write!(f, "Webhook timestamp expired ({} seconds old)", age_seconds)
            }
            Self::InvalidWebhookPayload { message } => {
                write!(f, "Invalid webhook payload: {}", message)
            }
            Self::StripeApiError {
                operation,
                message,
                code,
                http_status,
            } => {
                write!(f, "Stripe API error during '{}': {}", operation, message)?;
                if let Some(code) = code {
                    write!(f, " (code: {})", code)?;
                }
                if let Some(status) = http_status {
                    write!(f, " [HTTP {}]", status)?;
                }
                Ok(())
            }
            Self::Internal { message } => write!(f, "Internal billing error: {}", message),
        }
    }
}

impl std::error::Error for BillingError {}

impl From<BillingError> for crate::error::CorpdeskError {
    fn from(err: BillingError) -> Self {
        use crate::error::CorpdeskError;

        match &err {
            BillingError::NoCustomer { .. } => CorpdeskError::NotFound(err.to_string()),

            BillingError::FeatureNotIncluded { .. } => CorpdeskError::Forbidden(err.to_string()),

            BillingError::ConnectNotReady { .. } | BillingError::ProvisioningConflict { .. } => {
                CorpdeskError::Conflict(err.to_string())
            }

            BillingError::InvalidWebhookSignature
            | BillingError::WebhookTimestampExpired { .. }
            | BillingError::InvalidWebhookPayload { .. } => {
                CorpdeskError::BadRequest(err.to_string())
            }

            BillingError::NotConfigured => CorpdeskError::ServiceUnavailable(err.to_string()),

            BillingError::StripeApiError {
                http_status: Some(429),
                ..
            } => CorpdeskError::ServiceUnavailable(err.to_string()),

            BillingError::PriceNotFound { .. }
            | BillingError::ProvisioningFailed { .. }
            | BillingError::StripeApiError { .. }
            | BillingError::Internal { .. } => CorpdeskError::Internal(err.to_string()),
        }
    }
}
