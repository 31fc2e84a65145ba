//! In-process stand-ins for Stripe, the mailer, the PDF renderer and the
//! chat-completions endpoint.
//!
//! Each fake records what it was asked to do so tests can assert on calls
//! instead of network traffic.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::billing::client::{
    CatalogApi, CatalogResource, CheckoutSession, ConnectAccountStatus, ConnectApi,
    ContractCheckoutRequest, CreateConnectAccountRequest, CreateCustomerRequest,
    CreatePriceRequest, CreateProductRequest, CreateSubscriptionRequest, CustomerApi, PortalApi,
    PortalConfigurationRequest, StripePrice, StripeResult, StripeSubscription, SubscriptionApi,
};
use crate::billing::{BillingError, PRICES};
use crate::email::{Email, Mailer};
use crate::error::{CorpdeskError, Result};
use crate::invoice::{ChatClient, ChatMessage};
use crate::pdf::PdfRenderer;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Operations that only read from Stripe.
const READ_OPERATIONS: [&str; 3] = [
    "get_subscription",
    "get_connect_account",
    "find_prices_by_lookup_keys",
];

#[derive(Default)]
struct StripeState {
    calls: Vec<String>,
    failing: HashSet<String>,
    prices: Vec<StripePrice>,
    subscriptions: HashMap<String, StripeSubscription>,
    accounts: HashMap<String, ConnectAccountStatus>,
    checkouts: Vec<ContractCheckoutRequest>,
    portal_return_urls: Vec<String>,
    deactivated: Vec<CatalogResource>,
}

/// Stripe double implementing every [`StripeApi`](crate::billing::StripeApi) trait.
///
/// Operation names used by [`call_count`](Self::call_count) and
/// [`fail_on`](Self::fail_on) are the trait method names.
#[derive(Default)]
pub struct MockStripe {
    counter: AtomicU64,
    state: Mutex<StripeState>,
}

impl MockStripe {
    /// An empty account: no catalogue, customers or subscriptions.
    pub fn new() -> Self {
        Self::default()
    }

    /// An account with every catalogue price in place.
    pub fn provisioned() -> Self {
        let keys: Vec<&str> = PRICES.iter().map(|p| p.lookup_key).collect();
        Self::with_prices(&keys)
    }

    /// An account holding active prices for `lookup_keys` only.
    pub fn with_prices(lookup_keys: &[&str]) -> Self {
        let mock = Self::new();
        {
            let mut state = lock(&mock.state);
            for key in lookup_keys {
                let spec = PRICES.iter().find(|p| p.lookup_key == *key);
                state.prices.push(StripePrice {
                    id: Self::price_id(key),
                    lookup_key: Some(key.to_string()),
                    product_id: format!("prod_{}", key),
                    unit_amount: spec.map(|p| p.amount_cents).unwrap_or(0),
                    currency: "usd".to_string(),
                    interval: spec.map(|p| p.interval.as_str().to_string()),
                    active: true,
                });
            }
        }
        mock
    }

    /// The price id this mock uses for a lookup key.
    pub fn price_id(lookup_key: &str) -> String {
        format!("price_{}", lookup_key)
    }

    /// Make every later call of `operation` fail with an HTTP 500.
    pub fn fail_on(&self, operation: &str) {
        lock(&self.state).failing.insert(operation.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }

    /// Number of calls that would have changed something in Stripe.
    pub fn write_count(&self) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|c| !READ_OPERATIONS.contains(&c.as_str()))
            .count()
    }

    pub fn subscription(&self, id: &str) -> Option<StripeSubscription> {
        lock(&self.state).subscriptions.get(id).cloned()
    }

    /// Change a subscription's price as if the customer did it in the portal.
    pub fn set_subscription_price(&self, id: &str, price_id: &str) {
        if let Some(sub) = lock(&self.state).subscriptions.get_mut(id) {
            sub.price_id = Some(price_id.to_string());
        }
    }

    pub fn set_subscription_status(&self, id: &str, status: &str) {
        if let Some(sub) = lock(&self.state).subscriptions.get_mut(id) {
            sub.status = status.to_string();
        }
    }

    /// Replace (or add) a Connect account's status.
    pub fn set_account(&self, status: ConnectAccountStatus) {
        lock(&self.state).accounts.insert(status.id.clone(), status);
    }

    pub fn deactivated(&self) -> Vec<CatalogResource> {
        lock(&self.state).deactivated.clone()
    }

    pub fn last_checkout(&self) -> Option<ContractCheckoutRequest> {
        lock(&self.state).checkouts.last().cloned()
    }

    /// `return_url` of the most recent billing-portal session.
    pub fn last_portal_return_url(&self) -> Option<String> {
        lock(&self.state).portal_return_urls.last().cloned()
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}_mock_{}", prefix, self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Record the call and fail it when asked to.
    fn call(&self, operation: &str) -> StripeResult<()> {
        let mut state = lock(&self.state);
        state.calls.push(operation.to_string());
        if state.failing.contains(operation) {
            return Err(BillingError::StripeApiError {
                operation: operation.to_string(),
                message: format!("{} failed (mock)", operation),
                code: None,
                http_status: Some(500),
            });
        }
        Ok(())
    }

    fn missing(operation: &str, what: &str) -> BillingError {
        BillingError::StripeApiError {
            operation: operation.to_string(),
            message: format!("No such {}", what),
            code: Some("resource_missing".to_string()),
            http_status: Some(404),
        }
    }
}

#[async_trait]
impl CustomerApi for MockStripe {
    async fn create_customer(&self, _request: CreateCustomerRequest) -> StripeResult<String> {
        self.call("create_customer")?;
        Ok(self.next_id("cus"))
    }
}

#[async_trait]
impl SubscriptionApi for MockStripe {
    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> StripeResult<Option<StripeSubscription>> {
        self.call("get_subscription")?;
        Ok(self.subscription(subscription_id))
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> StripeResult<StripeSubscription> {
        self.call("create_subscription")?;
        let subscription = StripeSubscription {
            id: self.next_id("sub"),
            customer_id: request.customer_id,
            status: if request.default_incomplete {
                "incomplete".to_string()
            } else {
                "active".to_string()
            },
            price_id: Some(request.price_id),
            item_id: Some(self.next_id("si")),
            current_period_end: Some(chrono::Utc::now().timestamp() + 30 * 24 * 3600),
            cancel_at_period_end: false,
        };
        lock(&self.state)
            .subscriptions
            .insert(subscription.id.clone(), subscription.clone());
        Ok(subscription)
    }

    async fn change_subscription_price(
        &self,
        subscription: &StripeSubscription,
        price_id: &str,
    ) -> StripeResult<StripeSubscription> {
        self.call("change_subscription_price")?;
        let mut state = lock(&self.state);
        let stored = state
            .subscriptions
            .get_mut(&subscription.id)
            .ok_or_else(|| Self::missing("change_subscription_price", "subscription"))?;
        stored.price_id = Some(price_id.to_string());
        Ok(stored.clone())
    }
}

#[async_trait]
impl PortalApi for MockStripe {
    async fn create_portal_session(
        &self,
        _customer_id: &str,
        return_url: &str,
    ) -> StripeResult<String> {
        self.call("create_portal_session")?;
        lock(&self.state)
            .portal_return_urls
            .push(return_url.to_string());
        Ok(format!(
            "https://billing.stripe.com/p/session/{}",
            self.next_id("bps")
        ))
    }
}

#[async_trait]
impl ConnectApi for MockStripe {
    async fn create_connect_account(
        &self,
        _request: CreateConnectAccountRequest,
    ) -> StripeResult<String> {
        self.call("create_connect_account")?;
        let id = self.next_id("acct");
        self.set_account(ConnectAccountStatus {
            id: id.clone(),
            charges_enabled: false,
            details_submitted: false,
            payouts_enabled: false,
        });
        Ok(id)
    }

    async fn create_account_link(
        &self,
        account_id: &str,
        _refresh_url: &str,
        _return_url: &str,
    ) -> StripeResult<String> {
        self.call("create_account_link")?;
        Ok(format!(
            "https://connect.stripe.com/setup/e/{}/{}",
            account_id,
            self.next_id("link")
        ))
    }

    async fn get_connect_account(&self, account_id: &str) -> StripeResult<ConnectAccountStatus> {
        self.call("get_connect_account")?;
        lock(&self.state)
            .accounts
            .get(account_id)
            .cloned()
            .ok_or_else(|| Self::missing("get_connect_account", "account"))
    }

    async fn create_contract_checkout(
        &self,
        request: ContractCheckoutRequest,
    ) -> StripeResult<CheckoutSession> {
        self.call("create_contract_checkout")?;
        let id = self.next_id("cs");
        lock(&self.state).checkouts.push(request);
        Ok(CheckoutSession {
            url: format!("https://checkout.stripe.com/c/pay/{}", id),
            id,
        })
    }
}

#[async_trait]
impl CatalogApi for MockStripe {
    async fn find_prices_by_lookup_keys(
        &self,
        lookup_keys: &[&str],
    ) -> StripeResult<Vec<StripePrice>> {
        self.call("find_prices_by_lookup_keys")?;
        Ok(lock(&self.state)
            .prices
            .iter()
            .filter(|p| p.active)
            .filter(|p| {
                p.lookup_key
                    .as_deref()
                    .is_some_and(|key| lookup_keys.contains(&key))
            })
            .cloned()
            .collect())
    }

    async fn create_feature(&self, _lookup_key: &str, _name: &str) -> StripeResult<String> {
        self.call("create_feature")?;
        Ok(self.next_id("feat"))
    }

    async fn create_product(&self, _request: CreateProductRequest) -> StripeResult<String> {
        self.call("create_product")?;
        Ok(self.next_id("prod"))
    }

    async fn attach_product_feature(
        &self,
        _product_id: &str,
        _feature_id: &str,
    ) -> StripeResult<String> {
        self.call("attach_product_feature")?;
        Ok(self.next_id("prodft"))
    }

    async fn create_price(&self, request: CreatePriceRequest) -> StripeResult<String> {
        self.call("create_price")?;
        let id = Self::price_id(&request.lookup_key);
        lock(&self.state).prices.push(StripePrice {
            id: id.clone(),
            lookup_key: Some(request.lookup_key),
            product_id: request.product_id,
            unit_amount: request.unit_amount,
            currency: request.currency,
            interval: Some(request.interval.as_str().to_string()),
            active: true,
        });
        Ok(id)
    }

    async fn create_portal_configuration(
        &self,
        _request: PortalConfigurationRequest,
    ) -> StripeResult<String> {
        self.call("create_portal_configuration")?;
        Ok(self.next_id("bpc"))
    }

    async fn deactivate(&self, resource: &CatalogResource) -> StripeResult<()> {
        self.call("deactivate")?;
        let mut state = lock(&self.state);
        if let CatalogResource::Price(id) = resource {
            for price in state.prices.iter_mut().filter(|p| &p.id == id) {
                price.active = false;
            }
        }
        state.deactivated.push(resource.clone());
        Ok(())
    }
}

/// Mailer that keeps every message instead of sending it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<Email>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose every send fails.
    pub fn failing() -> Self {
        let mailer = Self::default();
        mailer.failing.store(true, Ordering::SeqCst);
        mailer
    }

    pub fn sent(&self) -> Vec<Email> {
        lock(&self.sent).clone()
    }

    pub fn sent_to(&self, address: &str) -> Vec<Email> {
        lock(&self.sent)
            .iter()
            .filter(|e| e.to.iter().any(|to| to == address))
            .cloned()
            .collect()
    }

    /// The newest URL in any text body that contains `needle`.
    pub fn link_containing(&self, needle: &str) -> Option<String> {
        lock(&self.sent).iter().rev().find_map(|email| {
            email
                .text
                .as_deref()?
                .split_whitespace()
                .find(|word| word.starts_with("http") && word.contains(needle))
                .map(str::to_string)
        })
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CorpdeskError::service_unavailable("Mail relay unavailable"));
        }
        email.validate()?;
        lock(&self.sent).push(email.clone());
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "recording"
    }
}

/// Renderer that returns a fixed PDF and remembers the HTML it was given.
#[derive(Default)]
pub struct StaticPdfRenderer {
    rendered: Mutex<Vec<String>>,
    unavailable: bool,
}

impl StaticPdfRenderer {
    pub const PDF: &'static [u8] = b"%PDF-1.7\n% corpdesk test document\n%%EOF\n";

    pub fn new() -> Self {
        Self::default()
    }

    /// A renderer that behaves like a machine without a browser.
    pub fn unavailable() -> Self {
        Self {
            rendered: Mutex::default(),
            unavailable: true,
        }
    }

    pub fn rendered(&self) -> Vec<String> {
        lock(&self.rendered).clone()
    }
}

#[async_trait]
impl PdfRenderer for StaticPdfRenderer {
    async fn render(&self, html: &str) -> Result<Vec<u8>> {
        if self.unavailable {
            return Err(CorpdeskError::service_unavailable("No browser available"));
        }
        lock(&self.rendered).push(html.to_string());
        Ok(Self::PDF.to_vec())
    }

    async fn is_available(&self) -> bool {
        !self.unavailable
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Chat client with a canned answer.
pub struct ScriptedChat {
    reply: Option<String>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChat {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            requests: Mutex::default(),
        }
    }

    /// Every completion fails as if the endpoint were down.
    pub fn failing() -> Self {
        Self {
            reply: None,
            requests: Mutex::default(),
        }
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        lock(&self.requests).push(messages.to_vec());
        self.reply
            .clone()
            .ok_or_else(|| CorpdeskError::service_unavailable("Inference endpoint unavailable"))
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::plans::{FREE_MONTHLY, PRO_MONTHLY};

    #[tokio::test]
    async fn test_reads_do_not_count_as_writes() {
        let stripe = MockStripe::provisioned();
        let prices = stripe
            .find_prices_by_lookup_keys(&[FREE_MONTHLY, PRO_MONTHLY])
            .await
            .unwrap();
        assert_eq!(prices.len(), 2);
        assert_eq!(stripe.write_count(), 0);

        stripe
            .create_customer(CreateCustomerRequest {
                email: "a@example.com".into(),
                name: None,
                user_id: "u1".into(),
            })
            .await
            .unwrap();
        assert_eq!(stripe.write_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_on_is_recorded() {
        let stripe = MockStripe::new();
        stripe.fail_on("create_portal_session");
        let err = stripe.create_portal_session("cus_1", "http://x").await.unwrap_err();
        assert!(err.to_string().contains("create_portal_session"));
        assert_eq!(stripe.call_count("create_portal_session"), 1);
    }

    #[tokio::test]
    async fn test_recording_mailer_finds_links() {
        let mailer = RecordingMailer::new();
        let email = Email::new("from@example.com", "to@example.com", "Hi")
            .text("Open https://app.example.com/verify-email?token=abc to confirm.");
        mailer.send(&email).await.unwrap();

        assert_eq!(mailer.sent_to("to@example.com").len(), 1);
        assert_eq!(
            mailer.link_containing("verify-email").as_deref(),
            Some("https://app.example.com/verify-email?token=abc")
        );
        assert!(RecordingMailer::failing().send(&email).await.is_err());
    }
}
