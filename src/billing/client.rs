//! Narrow Stripe capabilities.
//!
//! Each trait covers one area of the Stripe API so services can depend on
//! just what they use. [`StripeApi`] is implemented for anything providing
//! all of them and is what [`AppContext`](crate::app::AppContext) stores.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;

use super::error::BillingError;
use super::plans::BillingInterval;

pub type StripeResult<T> = std::result::Result<T, BillingError>;

/// The parts of a Stripe subscription Corpdesk mirrors locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripeSubscription {
    pub id: String,
    pub customer_id: String,
    pub status: String,
    /// Price of the (single) subscription item
    pub price_id: Option<String>,
    pub item_id: Option<String>,
    pub current_period_end: Option<i64>,
    pub cancel_at_period_end: bool,
}

impl StripeSubscription {
    /// A canceled subscription cannot be modified and must be replaced.
    pub fn is_terminated(&self) -> bool {
        matches!(self.status.as_str(), "canceled" | "incomplete_expired")
    }
}

#[derive(Debug, Clone)]
pub struct CreateCustomerRequest {
    pub email: String,
    pub name: Option<String>,
    pub user_id: String,
}

#[derive(Debug, Clone)]
pub struct CreateSubscriptionRequest {
    pub customer_id: String,
    pub price_id: String,
    pub user_id: String,
    /// Leave the first invoice open for payment instead of failing immediately.
    pub default_incomplete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripePrice {
    pub id: String,
    pub lookup_key: Option<String>,
    pub product_id: String,
    pub unit_amount: i64,
    pub currency: String,
    pub interval: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct CreateProductRequest {
    pub name: String,
    pub description: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct CreatePriceRequest {
    pub product_id: String,
    pub lookup_key: String,
    pub unit_amount: i64,
    pub currency: String,
    pub interval: BillingInterval,
}

/// Products and prices customers may switch between in the billing portal.
#[derive(Debug, Clone, Serialize)]
pub struct PortalProduct {
    pub product: String,
    pub prices: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PortalConfigurationRequest {
    pub headline: String,
    pub products: Vec<PortalProduct>,
}

/// A catalogue object created during provisioning, kept for rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogResource {
    Feature(String),
    Product(String),
    ProductFeature { product_id: String, attachment_id: String },
    Price(String),
    PortalConfiguration(String),
}

impl std::fmt::Display for CatalogResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Feature(id) => write!(f, "feature {}", id),
            Self::Product(id) => write!(f, "product {}", id),
            Self::ProductFeature {
                product_id,
                attachment_id,
            } => write!(f, "product feature {} on {}", attachment_id, product_id),
            Self::Price(id) => write!(f, "price {}", id),
            Self::PortalConfiguration(id) => write!(f, "portal configuration {}", id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateConnectAccountRequest {
    pub company_id: String,
    pub company_name: String,
    pub email: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAccountStatus {
    pub id: String,
    pub charges_enabled: bool,
    pub details_submitted: bool,
    pub payouts_enabled: bool,
}

/// A one-off payment for a contract, routed to the company's Connect account.
#[derive(Debug, Clone)]
pub struct ContractCheckoutRequest {
    pub contract_id: String,
    pub description: String,
    pub amount_cents: i64,
    pub currency: String,
    pub destination_account: String,
    pub application_fee_cents: i64,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait CustomerApi: Send + Sync {
    /// Returns the new customer id.
    async fn create_customer(&self, request: CreateCustomerRequest) -> StripeResult<String>;
}

#[async_trait]
pub trait SubscriptionApi: Send + Sync {
    /// `None` when Stripe has no subscription with this id.
    async fn get_subscription(&self, subscription_id: &str)
        -> StripeResult<Option<StripeSubscription>>;

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> StripeResult<StripeSubscription>;

    /// Move the subscription's item to `price_id`, prorating.
    async fn change_subscription_price(
        &self,
        subscription: &StripeSubscription,
        price_id: &str,
    ) -> StripeResult<StripeSubscription>;
}

#[async_trait]
pub trait PortalApi: Send + Sync {
    /// Returns the billing portal URL.
    async fn create_portal_session(&self, customer_id: &str, return_url: &str)
        -> StripeResult<String>;
}

#[async_trait]
pub trait ConnectApi: Send + Sync {
    /// Returns the new Express account id.
    async fn create_connect_account(
        &self,
        request: CreateConnectAccountRequest,
    ) -> StripeResult<String>;

    /// Returns the hosted onboarding URL.
    async fn create_account_link(
        &self,
        account_id: &str,
        refresh_url: &str,
        return_url: &str,
    ) -> StripeResult<String>;

    async fn get_connect_account(&self, account_id: &str) -> StripeResult<ConnectAccountStatus>;

    async fn create_contract_checkout(
        &self,
        request: ContractCheckoutRequest,
    ) -> StripeResult<CheckoutSession>;
}

#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Active prices carrying any of `lookup_keys`.
    async fn find_prices_by_lookup_keys(&self, lookup_keys: &[&str])
        -> StripeResult<Vec<StripePrice>>;

    /// Creates an entitlement feature, returning its id.
    async fn create_feature(&self, lookup_key: &str, name: &str) -> StripeResult<String>;

    async fn create_product(&self, request: CreateProductRequest) -> StripeResult<String>;

    /// Grants an entitlement feature to a product, returning the attachment id.
    async fn attach_product_feature(&self, product_id: &str, feature_id: &str)
        -> StripeResult<String>;

    async fn create_price(&self, request: CreatePriceRequest) -> StripeResult<String>;

    async fn create_portal_configuration(
        &self,
        request: PortalConfigurationRequest,
    ) -> StripeResult<String>;

    /// Sets `active=false` on a catalogue object (attachments are removed).
    async fn deactivate(&self, resource: &CatalogResource) -> StripeResult<()>;
}

/// Everything Corpdesk needs from Stripe.
pub trait StripeApi: CustomerApi + SubscriptionApi + PortalApi + ConnectApi + CatalogApi {}

impl<T> StripeApi for T where T: CustomerApi + SubscriptionApi + PortalApi + ConnectApi + CatalogApi {}
