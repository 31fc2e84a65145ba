//! Stripe billing for Corpdesk.
//!
//! - [`plans`]: the Free / Pro / Gift catalogue and its features
//! - [`SubscriptionService`]: the idempotent `ensure_subscription` used by
//!   email verification, admin user edits and invoice generation
//! - [`WebhookHandler`]: signed webhook intake
//! - [`ConnectService`]: Express accounts and contract checkout
//! - [`provision_catalog`]: one-shot catalogue creation with rollback
//!
//! Stripe itself is reached through the [`StripeApi`] traits so every
//! service can run against [`MockStripe`](crate::testing::MockStripe).

pub mod client;
mod config;
pub mod connect;
mod error;
pub mod live_client;
pub mod plans;
pub mod provision;
pub mod subscription;
pub mod webhook;

pub use client::{
    CatalogApi, CatalogResource, CheckoutSession, ConnectAccountStatus, ConnectApi, CustomerApi,
    PortalApi, StripeApi, StripePrice, StripeResult, StripeSubscription, SubscriptionApi,
};
pub use config::StripeConfig;
pub use connect::{ConnectService, Onboarding};
pub use error::BillingError;
pub use live_client::{LiveStripeClient, LiveStripeClientConfig, validate_api_key};
pub use plans::{BillingInterval, Feature, PRICES, Plan, PlanPrice};
pub use provision::{ProvisionReport, ProvisionStatus, provision_catalog};
pub use subscription::{EnsureOutcome, EnsuredSubscription, SubscriptionService};
pub use webhook::{WebhookEvent, WebhookHandler, WebhookOutcome};
