//! Live Stripe client.
//!
//! Customers, subscriptions and the billing portal use the typed
//! `async-stripe` API. Connect and catalogue endpoints go through the
//! client's form/query helpers with local request types.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::time::Duration;

use super::client::{
    CatalogApi, CatalogResource, CheckoutSession, ConnectAccountStatus, ConnectApi,
    ContractCheckoutRequest, CreateConnectAccountRequest, CreateCustomerRequest,
    CreatePriceRequest, CreateProductRequest, CreateSubscriptionRequest, CustomerApi, PortalApi,
    PortalConfigurationRequest, PortalProduct, StripePrice, StripeResult, StripeSubscription,
    SubscriptionApi,
};
use super::config::StripeConfig;
use super::error::BillingError;

const META_USER_ID: &str = "user_id";
const META_COMPANY_ID: &str = "company_id";
const META_CONTRACT_ID: &str = "contract_id";

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct LiveStripeClientConfig {
    /// Maximum number of retry attempts for transient failures.
    pub max_retries: u32,
    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
    /// Per-attempt timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for LiveStripeClientConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            timeout_seconds: 30,
        }
    }
}

impl From<&StripeConfig> for LiveStripeClientConfig {
    fn from(config: &StripeConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            timeout_seconds: config.timeout_seconds,
            ..Self::default()
        }
    }
}

// ============================================================================
// API Key Validation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidApiKeyError {
    pub reason: String,
}

impl std::fmt::Display for InvalidApiKeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid Stripe API key: {}", self.reason)
    }
}

impl std::error::Error for InvalidApiKeyError {}

/// Validate a Stripe secret or restricted key (`sk_test_`, `sk_live_`, `rk_test_`, `rk_live_`).
pub fn validate_api_key(key: &str) -> std::result::Result<(), InvalidApiKeyError> {
    const MIN_KEY_LENGTH: usize = 20;

    if key.is_empty() {
        return Err(InvalidApiKeyError {
            reason: "API key cannot be empty".to_string(),
        });
    }

    if key.len() < MIN_KEY_LENGTH {
        return Err(InvalidApiKeyError {
            reason: format!("API key too short (minimum {} characters)", MIN_KEY_LENGTH),
        });
    }

    let valid_prefixes = ["sk_test_", "sk_live_", "rk_test_", "rk_live_"];
    if !valid_prefixes.iter().any(|prefix| key.starts_with(prefix)) {
        return Err(InvalidApiKeyError {
            reason: "API key must start with sk_test_, sk_live_, rk_test_, or rk_live_"
                .to_string(),
        });
    }

    Ok(())
}

fn parse_customer_id(id: &str) -> StripeResult<stripe::CustomerId> {
    id.parse().map_err(|_| BillingError::Internal {
        message: format!("Invalid customer ID: {}", id),
    })
}

fn parse_subscription_id(id: &str) -> StripeResult<stripe::SubscriptionId> {
    id.parse().map_err(|_| BillingError::Internal {
        message: format!("Invalid subscription ID: {}", id),
    })
}

// ============================================================================
// Live Stripe Client
// ============================================================================

#[derive(Clone)]
pub struct LiveStripeClient {
    client: stripe::Client,
    config: LiveStripeClientConfig,
    api_key: SecretString,
}

impl LiveStripeClient {
    /// The key is validated and never shown by `Debug`.
    pub fn new(
        api_key: impl Into<SecretString>,
        config: LiveStripeClientConfig,
    ) -> std::result::Result<Self, InvalidApiKeyError> {
        let api_key: SecretString = api_key.into();
        validate_api_key(api_key.expose_secret())?;

        let client = stripe::Client::new(api_key.expose_secret()).with_app_info(
            "corpdesk".to_string(),
            Some(env!("CARGO_PKG_VERSION").to_string()),
            None,
        );

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    /// `None` when no secret key is configured.
    pub fn from_config(
        config: &StripeConfig,
    ) -> std::result::Result<Option<Self>, InvalidApiKeyError> {
        config
            .secret_key
            .clone()
            .map(|key| Self::new(key, LiveStripeClientConfig::from(config)))
            .transpose()
    }

    #[must_use]
    pub fn is_test_mode(&self) -> bool {
        let key = self.api_key.expose_secret();
        key.starts_with("sk_test_") || key.starts_with("rk_test_")
    }

    fn generate_idempotency_key(operation: &str) -> String {
        format!("{}_{}", operation, uuid::Uuid::new_v4())
    }

    /// Client whose requests carry a fresh idempotency key, for creates.
    fn idempotent_client(&self, operation: &str) -> stripe::Client {
        let key = Self::generate_idempotency_key(operation);
        self.client
            .clone()
            .with_strategy(stripe::RequestStrategy::Idempotent(key))
    }

    async fn post_form<T, F>(&self, operation: &str, path: &str, form: F) -> StripeResult<T>
    where
        T: DeserializeOwned + Send + 'static,
        F: Serialize + Clone + Send + Sync,
    {
        let client = self.idempotent_client(operation);
        with_retry(&self.config, operation, || {
            let client = client.clone();
            let form = form.clone();
            async move { client.post_form::<T, F>(path, form).await }
        })
        .await
    }
}

impl std::fmt::Debug for LiveStripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveStripeClient")
            .field("config", &self.config)
            .field("is_test_mode", &self.is_test_mode())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Retry Logic
// ============================================================================

/// Run a Stripe call with a per-attempt timeout, retrying 429, 5xx and timeouts.
async fn with_retry<T, F, Fut>(
    config: &LiveStripeClientConfig,
    operation: &str,
    operation_fn: F,
) -> StripeResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, stripe::StripeError>>,
{
    let timeout_duration = Duration::from_secs(config.timeout_seconds);
    let mut attempts = 0;

    loop {
        match tokio::time::timeout(timeout_duration, operation_fn()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => {
                if !is_retryable_error(&e) || attempts >= config.max_retries {
                    return Err(map_stripe_error(e, operation));
                }
                let delay = calculate_backoff_delay(attempts, config.base_delay_ms, config.max_delay_ms);
                tracing::warn!(
                    operation = operation,
                    attempt = attempts + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying Stripe API call after transient error"
                );
                tokio::time::sleep(delay).await;
                attempts += 1;
            }
            Err(_timeout) => {
                if attempts >= config.max_retries {
                    return Err(BillingError::StripeApiError {
                        operation: operation.to_string(),
                        message: format!(
                            "Request timed out after {} seconds",
                            config.timeout_seconds
                        ),
                        code: None,
                        http_status: Some(408),
                    });
                }
                tracing::warn!(
                    operation = operation,
                    attempt = attempts + 1,
                    timeout_seconds = config.timeout_seconds,
                    "Stripe API request timed out, retrying"
                );
                let delay = calculate_backoff_delay(attempts, config.base_delay_ms, config.max_delay_ms);
                tokio::time::sleep(delay).await;
                attempts += 1;
            }
        }
    }
}

fn is_retryable_error(error: &stripe::StripeError) -> bool {
    match error {
        stripe::StripeError::Stripe(request_error) => {
            let status = request_error.http_status;
            status == 429 || (500..600).contains(&status)
        }
        stripe::StripeError::Timeout => true,
        _ => false,
    }
}

/// Exponential backoff (`base * 2^attempt`, capped) plus 0-25% jitter.
fn calculate_backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let delay_ms = base_ms.saturating_mul(2_u64.saturating_pow(attempt));
    let delay_ms = delay_ms.min(max_ms);

    let jitter = if delay_ms > 0 {
        fastrand::u64(0..=delay_ms / 4)
    } else {
        0
    };
    Duration::from_millis(delay_ms.saturating_add(jitter))
}

fn map_stripe_error(error: stripe::StripeError, operation: &str) -> BillingError {
    match error {
        stripe::StripeError::Stripe(request_error) => BillingError::StripeApiError {
            operation: operation.to_string(),
            message: request_error
                .message
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string()),
            code: request_error.code.as_ref().map(|c| format!("{c:?}")),
            http_status: Some(request_error.http_status),
        },
        stripe::StripeError::Timeout => BillingError::StripeApiError {
            operation: operation.to_string(),
            message: "Request timed out".to_string(),
            code: None,
            http_status: Some(408),
        },
        other => BillingError::Internal {
            message: format!("Stripe client error during '{}': {}", operation, other),
        },
    }
}

// ============================================================================
// Customers, subscriptions, portal
// ============================================================================

#[async_trait]
impl CustomerApi for LiveStripeClient {
    async fn create_customer(&self, request: CreateCustomerRequest) -> StripeResult<String> {
        let client = self.idempotent_client("create_customer");

        let mut params = stripe::CreateCustomer::new();
        params.email = Some(&request.email);
        params.name = request.name.as_deref();
        let mut meta = HashMap::new();
        meta.insert(META_USER_ID.to_string(), request.user_id.clone());
        params.metadata = Some(meta);

        let customer = with_retry(&self.config, "create_customer", || {
            let client = client.clone();
            let params = params.clone();
            async move { stripe::Customer::create(&client, params).await }
        })
        .await?;

        Ok(customer.id.to_string())
    }
}

#[async_trait]
impl SubscriptionApi for LiveStripeClient {
    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> StripeResult<Option<StripeSubscription>> {
        let sub_id = parse_subscription_id(subscription_id)?;

        let result = with_retry(&self.config, "get_subscription", || {
            let client = self.client.clone();
            let sub_id = sub_id.clone();
            async move { stripe::Subscription::retrieve(&client, &sub_id, &[]).await }
        })
        .await;

        match result {
            Ok(subscription) => Ok(Some(map_subscription(subscription))),
            Err(BillingError::StripeApiError {
                http_status: Some(404),
                ..
            }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> StripeResult<StripeSubscription> {
        let client = self.idempotent_client("create_subscription");
        let customer_id = parse_customer_id(&request.customer_id)?;

        let mut params = stripe::CreateSubscription::new(customer_id);
        params.items = Some(vec![stripe::CreateSubscriptionItems {
            price: Some(request.price_id.clone()),
            ..Default::default()
        }]);
        let mut meta = HashMap::new();
        meta.insert(META_USER_ID.to_string(), request.user_id.clone());
        params.metadata = Some(meta);
        if request.default_incomplete {
            params.payment_behavior = Some(stripe::SubscriptionPaymentBehavior::DefaultIncomplete);
        }

        let subscription = with_retry(&self.config, "create_subscription", || {
            let client = client.clone();
            let params = params.clone();
            async move { stripe::Subscription::create(&client, params).await }
        })
        .await?;

        Ok(map_subscription(subscription))
    }

    async fn change_subscription_price(
        &self,
        subscription: &StripeSubscription,
        price_id: &str,
    ) -> StripeResult<StripeSubscription> {
        use stripe::generated::billing::subscription::SubscriptionProrationBehavior as SPB;

        let client = self.idempotent_client("update_subscription");
        let sub_id = parse_subscription_id(&subscription.id)?;
        let item_id = subscription
            .item_id
            .clone()
            .ok_or_else(|| BillingError::Internal {
                message: format!("Subscription {} has no items", subscription.id),
            })?;

        let mut params = stripe::UpdateSubscription::new();
        params.items = Some(vec![stripe::UpdateSubscriptionItems {
            id: Some(item_id),
            price: Some(price_id.to_string()),
            ..Default::default()
        }]);
        params.proration_behavior = Some(SPB::CreateProrations);

        let updated = with_retry(&self.config, "update_subscription", || {
            let client = client.clone();
            let sub_id = sub_id.clone();
            let params = params.clone();
            async move { stripe::Subscription::update(&client, &sub_id, params).await }
        })
        .await?;

        Ok(map_subscription(updated))
    }
}

fn map_subscription(sub: stripe::Subscription) -> StripeSubscription {
    let status = match sub.status {
        stripe::SubscriptionStatus::Active => "active",
        stripe::SubscriptionStatus::Canceled => "canceled",
        stripe::SubscriptionStatus::Incomplete => "incomplete",
        stripe::SubscriptionStatus::IncompleteExpired => "incomplete_expired",
        stripe::SubscriptionStatus::PastDue => "past_due",
        stripe::SubscriptionStatus::Trialing => "trialing",
        stripe::SubscriptionStatus::Unpaid => "unpaid",
        stripe::SubscriptionStatus::Paused => "paused",
    };

    let customer_id = match &sub.customer {
        stripe::Expandable::Id(id) => id.to_string(),
        stripe::Expandable::Object(c) => c.id.to_string(),
    };

    let item = sub.items.data.first();

    StripeSubscription {
        id: sub.id.to_string(),
        customer_id,
        status: status.to_string(),
        price_id: item
            .and_then(|item| item.price.as_ref())
            .map(|price| price.id.to_string()),
        item_id: item.map(|item| item.id.to_string()),
        current_period_end: Some(sub.current_period_end),
        cancel_at_period_end: sub.cancel_at_period_end,
    }
}

#[async_trait]
impl PortalApi for LiveStripeClient {
    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> StripeResult<String> {
        let customer_id = parse_customer_id(customer_id)?;

        let mut params = stripe::CreateBillingPortalSession::new(customer_id);
        params.return_url = Some(return_url);

        let session = with_retry(&self.config, "create_portal_session", || {
            let client = self.client.clone();
            let params = params.clone();
            async move { stripe::BillingPortalSession::create(&client, params).await }
        })
        .await?;

        Ok(session.url)
    }
}

// ============================================================================
// Connect
// ============================================================================

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UrlOnly {
    url: String,
}

#[derive(Debug, Deserialize)]
struct RawAccount {
    id: String,
    #[serde(default)]
    charges_enabled: bool,
    #[serde(default)]
    details_submitted: bool,
    #[serde(default)]
    payouts_enabled: bool,
}

#[derive(Debug, Deserialize)]
struct RawCheckoutSession {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct Requested {
    requested: bool,
}

#[derive(Debug, Clone, Serialize)]
struct AccountCapabilities {
    card_payments: Requested,
    transfers: Requested,
}

#[derive(Debug, Clone, Serialize)]
struct AccountBusinessProfile {
    name: String,
}

#[derive(Debug, Clone, Serialize)]
struct AccountForm {
    #[serde(rename = "type")]
    account_type: &'static str,
    country: String,
    email: String,
    business_profile: AccountBusinessProfile,
    capabilities: AccountCapabilities,
    metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
struct AccountLinkForm {
    account: String,
    refresh_url: String,
    return_url: String,
    #[serde(rename = "type")]
    link_type: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct ProductDataForm {
    name: String,
}

#[derive(Debug, Clone, Serialize)]
struct PriceDataForm {
    currency: String,
    unit_amount: i64,
    product_data: ProductDataForm,
}

#[derive(Debug, Clone, Serialize)]
struct LineItemForm {
    price_data: PriceDataForm,
    quantity: u32,
}

#[derive(Debug, Clone, Serialize)]
struct TransferDataForm {
    destination: String,
}

#[derive(Debug, Clone, Serialize)]
struct PaymentIntentDataForm {
    application_fee_amount: i64,
    transfer_data: TransferDataForm,
    metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
struct CheckoutForm {
    mode: &'static str,
    success_url: String,
    cancel_url: String,
    client_reference_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    customer_email: Option<String>,
    line_items: Vec<LineItemForm>,
    payment_intent_data: PaymentIntentDataForm,
    metadata: HashMap<String, String>,
}

#[async_trait]
impl ConnectApi for LiveStripeClient {
    async fn create_connect_account(
        &self,
        request: CreateConnectAccountRequest,
    ) -> StripeResult<String> {
        let mut metadata = HashMap::new();
        metadata.insert(META_COMPANY_ID.to_string(), request.company_id.clone());

        let form = AccountForm {
            account_type: "express",
            country: request.country,
            email: request.email,
            business_profile: AccountBusinessProfile {
                name: request.company_name,
            },
            capabilities: AccountCapabilities {
                card_payments: Requested { requested: true },
                transfers: Requested { requested: true },
            },
            metadata,
        };

        let account: IdOnly = self.post_form("create_connect_account", "/accounts", form).await?;
        Ok(account.id)
    }

    async fn create_account_link(
        &self,
        account_id: &str,
        refresh_url: &str,
        return_url: &str,
    ) -> StripeResult<String> {
        let form = AccountLinkForm {
            account: account_id.to_string(),
            refresh_url: refresh_url.to_string(),
            return_url: return_url.to_string(),
            link_type: "account_onboarding",
        };
        let link: UrlOnly = self
            .post_form("create_account_link", "/account_links", form)
            .await?;
        Ok(link.url)
    }

    async fn get_connect_account(&self, account_id: &str) -> StripeResult<ConnectAccountStatus> {
        let path = format!("/accounts/{}", account_id);
        let account: RawAccount = with_retry(&self.config, "get_connect_account", || {
            let client = self.client.clone();
            let path = path.clone();
            async move { client.get::<RawAccount>(&path).await }
        })
        .await?;

        Ok(ConnectAccountStatus {
            id: account.id,
            charges_enabled: account.charges_enabled,
            details_submitted: account.details_submitted,
            payouts_enabled: account.payouts_enabled,
        })
    }

    async fn create_contract_checkout(
        &self,
        request: ContractCheckoutRequest,
    ) -> StripeResult<CheckoutSession> {
        let mut metadata = HashMap::new();
        metadata.insert(META_CONTRACT_ID.to_string(), request.contract_id.clone());

        let form = CheckoutForm {
            mode: "payment",
            success_url: request.success_url,
            cancel_url: request.cancel_url,
            client_reference_id: request.contract_id.clone(),
            customer_email: request.customer_email,
            line_items: vec![LineItemForm {
                price_data: PriceDataForm {
                    currency: request.currency.to_lowercase(),
                    unit_amount: request.amount_cents,
                    product_data: ProductDataForm {
                        name: request.description,
                    },
                },
                quantity: 1,
            }],
            payment_intent_data: PaymentIntentDataForm {
                application_fee_amount: request.application_fee_cents,
                transfer_data: TransferDataForm {
                    destination: request.destination_account,
                },
                metadata: metadata.clone(),
            },
            metadata,
        };

        let session: RawCheckoutSession = self
            .post_form("create_contract_checkout", "/checkout/sessions", form)
            .await?;

        Ok(CheckoutSession {
            url: session.url.ok_or_else(|| BillingError::Internal {
                message: "Checkout session URL missing".to_string(),
            })?,
            id: session.id,
        })
    }
}

// ============================================================================
// Catalogue
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawList<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct RawRecurring {
    interval: String,
}

#[derive(Debug, Deserialize)]
struct RawPrice {
    id: String,
    lookup_key: Option<String>,
    product: String,
    unit_amount: Option<i64>,
    currency: String,
    recurring: Option<RawRecurring>,
    active: bool,
}

#[derive(Debug, Clone, Serialize)]
struct PriceSearch {
    lookup_keys: Vec<String>,
    active: bool,
    limit: u32,
}

#[derive(Debug, Clone, Serialize)]
struct FeatureForm {
    name: String,
    lookup_key: String,
}

#[derive(Debug, Clone, Serialize)]
struct ProductForm {
    name: String,
    description: String,
    metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
struct ProductFeatureForm {
    entitlement_feature: String,
}

#[derive(Debug, Clone, Serialize)]
struct RecurringForm {
    interval: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct PriceForm {
    product: String,
    unit_amount: i64,
    currency: String,
    lookup_key: String,
    recurring: RecurringForm,
}

#[derive(Debug, Clone, Serialize)]
struct ActiveForm {
    active: bool,
}

#[derive(Debug, Clone, Serialize)]
struct Enabled {
    enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
struct SubscriptionCancelForm {
    enabled: bool,
    mode: &'static str,
}

#[derive(Debug, Clone, Serialize)]
struct SubscriptionUpdateForm {
    enabled: bool,
    default_allowed_updates: Vec<&'static str>,
    proration_behavior: &'static str,
    products: Vec<PortalProduct>,
}

#[derive(Debug, Clone, Serialize)]
struct PortalFeaturesForm {
    invoice_history: Enabled,
    payment_method_update: Enabled,
    subscription_cancel: SubscriptionCancelForm,
    subscription_update: SubscriptionUpdateForm,
}

#[derive(Debug, Clone, Serialize)]
struct PortalBusinessProfile {
    headline: String,
}

#[derive(Debug, Clone, Serialize)]
struct PortalConfigurationForm {
    business_profile: PortalBusinessProfile,
    features: PortalFeaturesForm,
}

#[async_trait]
impl CatalogApi for LiveStripeClient {
    async fn find_prices_by_lookup_keys(
        &self,
        lookup_keys: &[&str],
    ) -> StripeResult<Vec<StripePrice>> {
        let params = PriceSearch {
            lookup_keys: lookup_keys.iter().map(|k| k.to_string()).collect(),
            active: true,
            limit: 100,
        };

        let prices: RawList<RawPrice> = with_retry(&self.config, "list_prices", || {
            let client = self.client.clone();
            let params = params.clone();
            async move { client.get_query::<RawList<RawPrice>, _>("/prices", params).await }
        })
        .await?;

        Ok(prices
            .data
            .into_iter()
            .map(|price| StripePrice {
                id: price.id,
                lookup_key: price.lookup_key,
                product_id: price.product,
                unit_amount: price.unit_amount.unwrap_or(0),
                currency: price.currency,
                interval: price.recurring.map(|r| r.interval),
                active: price.active,
            })
            .collect())
    }

    async fn create_feature(&self, lookup_key: &str, name: &str) -> StripeResult<String> {
        let form = FeatureForm {
            name: name.to_string(),
            lookup_key: lookup_key.to_string(),
        };
        let feature: IdOnly = self
            .post_form("create_feature", "/entitlements/features", form)
            .await?;
        Ok(feature.id)
    }

    async fn create_product(&self, request: CreateProductRequest) -> StripeResult<String> {
        let form = ProductForm {
            name: request.name,
            description: request.description,
            metadata: request.metadata,
        };
        let product: IdOnly = self.post_form("create_product", "/products", form).await?;
        Ok(product.id)
    }

    async fn attach_product_feature(
        &self,
        product_id: &str,
        feature_id: &str,
    ) -> StripeResult<String> {
        let path = format!("/products/{}/features", product_id);
        let form = ProductFeatureForm {
            entitlement_feature: feature_id.to_string(),
        };
        let attachment: IdOnly = self.post_form("attach_product_feature", &path, form).await?;
        Ok(attachment.id)
    }

    async fn create_price(&self, request: CreatePriceRequest) -> StripeResult<String> {
        let form = PriceForm {
            product: request.product_id,
            unit_amount: request.unit_amount,
            currency: request.currency,
            lookup_key: request.lookup_key,
            recurring: RecurringForm {
                interval: request.interval.as_str(),
            },
        };
        let price: IdOnly = self.post_form("create_price", "/prices", form).await?;
        Ok(price.id)
    }

    async fn create_portal_configuration(
        &self,
        request: PortalConfigurationRequest,
    ) -> StripeResult<String> {
        let form = PortalConfigurationForm {
            business_profile: PortalBusinessProfile {
                headline: request.headline,
            },
            features: PortalFeaturesForm {
                invoice_history: Enabled { enabled: true },
                payment_method_update: Enabled { enabled: true },
                subscription_cancel: SubscriptionCancelForm {
                    enabled: true,
                    mode: "at_period_end",
                },
                subscription_update: SubscriptionUpdateForm {
                    enabled: true,
                    default_allowed_updates: vec!["price"],
                    proration_behavior: "create_prorations",
                    products: request.products,
                },
            },
        };
        let configuration: IdOnly = self
            .post_form(
                "create_portal_configuration",
                "/billing_portal/configurations",
                form,
            )
            .await?;
        Ok(configuration.id)
    }

    async fn deactivate(&self, resource: &CatalogResource) -> StripeResult<()> {
        let inactive = ActiveForm { active: false };
        match resource {
            CatalogResource::Feature(id) => {
                let path = format!("/entitlements/features/{}", id);
                self.post_form::<IdOnly, _>("deactivate_feature", &path, inactive)
                    .await?;
            }
            CatalogResource::Product(id) => {
                let path = format!("/products/{}", id);
                self.post_form::<IdOnly, _>("deactivate_product", &path, inactive)
                    .await?;
            }
            CatalogResource::Price(id) => {
                let path = format!("/prices/{}", id);
                self.post_form::<IdOnly, _>("deactivate_price", &path, inactive)
                    .await?;
            }
            CatalogResource::PortalConfiguration(id) => {
                let path = format!("/billing_portal/configurations/{}", id);
                self.post_form::<IdOnly, _>("deactivate_portal_configuration", &path, inactive)
                    .await?;
            }
            CatalogResource::ProductFeature {
                product_id,
                attachment_id,
            } => {
                let path = format!("/products/{}/features/{}", product_id, attachment_id);
                with_retry(&self.config, "detach_product_feature", || {
                    let client = self.client.clone();
                    let path = path.clone();
                    async move { client.delete::<IdOnly>(&path).await }
                })
                .await?;
            }
        }
        Ok(())
    }
}
