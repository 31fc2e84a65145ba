//! Subscription orchestration.
//!
//! [`SubscriptionService::ensure_subscription`] is the single place that
//! reconciles a user's role with Stripe and the local [`Subscription`]
//! record. Email verification, admin role edits and invoice generation all
//! call it, and calling it again with nothing changed makes no Stripe writes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::client::{CreateCustomerRequest, CreateSubscriptionRequest, StripeApi, StripeSubscription};
use super::error::BillingError;
use super::plans::{ALL_LOOKUP_KEYS, PRO_YEARLY, Plan, price_for_lookup_key};
use crate::db::DatabaseClient;
use crate::error::{CorpdeskError, Result};
use crate::models::{Subscription, User};

/// What `ensure_subscription` had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnsureOutcome {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsuredSubscription {
    pub subscription: Subscription,
    pub outcome: EnsureOutcome,
}

/// Keeps Stripe and local subscription records in line with user roles.
#[derive(Clone)]
pub struct SubscriptionService {
    db: DatabaseClient,
    stripe: Option<Arc<dyn StripeApi>>,
    /// lookup key -> Stripe price id, filled on first use
    prices: Arc<RwLock<HashMap<String, String>>>,
}

fn cache_poisoned() -> CorpdeskError {
    CorpdeskError::internal("Price cache lock poisoned")
}

fn timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
}

impl SubscriptionService {
    pub fn new(db: DatabaseClient, stripe: Option<Arc<dyn StripeApi>>) -> Self {
        Self {
            db,
            stripe,
            prices: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.stripe.is_some()
    }

    /// The user's local subscription record, if any.
    pub async fn current(&self, user_id: &str) -> Result<Option<Subscription>> {
        let mut found: Vec<Subscription> = self.db.find_by_user_id(user_id).await?;
        Ok(found.pop())
    }

    /// Plan the user is billed on: the local record's, else the role's.
    pub async fn effective_plan(&self, user: &User) -> Result<Plan> {
        Ok(self
            .current(&user.id)
            .await?
            .map(|sub| sub.plan)
            .unwrap_or_else(|| Plan::for_role(user.role)))
    }

    /// Make Stripe and the local record match the plan implied by the user's role.
    ///
    /// # Errors
    ///
    /// Stripe failures and missing catalogue prices are returned as is;
    /// nothing is rolled back since every step is safe to repeat.
    pub async fn ensure_subscription(&self, user: &User) -> Result<EnsuredSubscription> {
        let plan = Plan::for_role(user.role);
        let existing = self.current(&user.id).await?;

        let Some(stripe) = self.stripe.clone() else {
            return self.ensure_local_only(user, existing, plan).await;
        };

        let customer_id = self
            .ensure_customer(stripe.as_ref(), user, existing.as_ref())
            .await?;

        let remote = match existing
            .as_ref()
            .and_then(|sub| sub.stripe_subscription_id.as_deref())
        {
            Some(id) => stripe
                .get_subscription(id)
                .await?
                .filter(|sub| !sub.is_terminated()),
            None => None,
        };

        let current_price = remote.as_ref().and_then(|sub| sub.price_id.clone());
        let lookup_key = self
            .target_lookup_key(stripe.as_ref(), plan, current_price.as_deref())
            .await?;
        let price_id = self.price_id_for(stripe.as_ref(), lookup_key).await?;

        let mut outcome = EnsureOutcome::Unchanged;
        let remote = match remote {
            Some(current) if current.price_id.as_deref() == Some(price_id.as_str()) => current,
            Some(current) => {
                tracing::info!(
                    user_id = %user.id,
                    subscription_id = %current.id,
                    plan = %plan,
                    "Moving Stripe subscription to new price"
                );
                outcome = EnsureOutcome::Updated;
                stripe.change_subscription_price(&current, &price_id).await?
            }
            None => {
                tracing::info!(user_id = %user.id, plan = %plan, "Creating Stripe subscription");
                outcome = EnsureOutcome::Created;
                stripe
                    .create_subscription(CreateSubscriptionRequest {
                        customer_id: customer_id.clone(),
                        price_id: price_id.clone(),
                        user_id: user.id.clone(),
                        default_incomplete: plan == Plan::Pro,
                    })
                    .await?
            }
        };

        let mut desired = existing
            .clone()
            .unwrap_or_else(|| Subscription::new(user.id.clone(), plan));
        desired.plan = plan;
        desired.stripe_customer_id = Some(customer_id);
        apply_remote(&mut desired, &remote);

        let subscription = match existing {
            Some(existing) if existing == desired => existing,
            Some(_) => {
                if outcome == EnsureOutcome::Unchanged {
                    outcome = EnsureOutcome::Updated;
                }
                self.db.update(desired).await?
            }
            None => {
                outcome = EnsureOutcome::Created;
                self.db.create(desired).await?
            }
        };

        tracing::debug!(user_id = %user.id, outcome = ?outcome, "Subscription ensured");
        Ok(EnsuredSubscription {
            subscription,
            outcome,
        })
    }

    async fn ensure_local_only(
        &self,
        user: &User,
        existing: Option<Subscription>,
        plan: Plan,
    ) -> Result<EnsuredSubscription> {
        tracing::warn!(
            user_id = %user.id,
            plan = %plan,
            "Stripe is not configured, keeping a local-only subscription"
        );

        let (subscription, outcome) = match existing {
            Some(sub) if sub.plan == plan => (sub, EnsureOutcome::Unchanged),
            Some(mut sub) => {
                sub.plan = plan;
                (self.db.update(sub).await?, EnsureOutcome::Updated)
            }
            None => {
                let sub = Subscription::new(user.id.clone(), plan);
                (self.db.create(sub).await?, EnsureOutcome::Created)
            }
        };

        Ok(EnsuredSubscription {
            subscription,
            outcome,
        })
    }

    /// Reuse the subscription's customer, then the user's, else create one.
    async fn ensure_customer(
        &self,
        stripe: &dyn StripeApi,
        user: &User,
        existing: Option<&Subscription>,
    ) -> Result<String> {
        let known = existing
            .and_then(|sub| sub.stripe_customer_id.clone())
            .or_else(|| user.stripe_customer_id.clone());

        let customer_id = match known {
            Some(id) => id,
            None => {
                tracing::info!(user_id = %user.id, "Creating Stripe customer");
                stripe
                    .create_customer(CreateCustomerRequest {
                        email: user.email.clone(),
                        name: Some(user.name.clone()).filter(|n| !n.is_empty()),
                        user_id: user.id.clone(),
                    })
                    .await?
            }
        };

        if user.stripe_customer_id.as_deref() != Some(customer_id.as_str()) {
            let mut stored: User = self.db.get(&user.id).await?;
            stored.stripe_customer_id = Some(customer_id.clone());
            self.db.update(stored).await?;
        }

        Ok(customer_id)
    }

    /// Pro keeps its billing interval: a yearly subscriber stays yearly.
    async fn target_lookup_key(
        &self,
        stripe: &dyn StripeApi,
        plan: Plan,
        current_price: Option<&str>,
    ) -> Result<&'static str> {
        if plan == Plan::Pro {
            if let Some(current) = current_price {
                if self.price_id_for(stripe, PRO_YEARLY).await? == current {
                    return Ok(PRO_YEARLY);
                }
            }
        }
        Ok(plan.default_lookup_key())
    }

    fn cached_price(&self, lookup_key: &str) -> Result<Option<String>> {
        let cache = self.prices.read().map_err(|_| cache_poisoned())?;
        Ok(cache.get(lookup_key).cloned())
    }

    async fn refresh_prices(&self, stripe: &dyn StripeApi) -> Result<()> {
        let prices = stripe.find_prices_by_lookup_keys(&ALL_LOOKUP_KEYS).await?;
        let mut cache = self.prices.write().map_err(|_| cache_poisoned())?;
        for price in prices {
            if let Some(key) = price.lookup_key {
                cache.insert(key, price.id);
            }
        }
        tracing::debug!(count = cache.len(), "Stripe price cache refreshed");
        Ok(())
    }

    /// Stripe price id for a catalogue lookup key, cached per process.
    pub async fn price_id_for(&self, stripe: &dyn StripeApi, lookup_key: &str) -> Result<String> {
        if let Some(id) = self.cached_price(lookup_key)? {
            return Ok(id);
        }
        self.refresh_prices(stripe).await?;
        self.cached_price(lookup_key)?.ok_or_else(|| {
            BillingError::PriceNotFound {
                lookup_key: lookup_key.to_string(),
            }
            .into()
        })
    }

    /// The plan a Stripe price belongs to, if it is one of ours.
    async fn plan_for_price(&self, price_id: &str) -> Result<Option<Plan>> {
        let find = |cache: &HashMap<String, String>| {
            cache
                .iter()
                .find(|(_, id)| id.as_str() == price_id)
                .and_then(|(key, _)| price_for_lookup_key(key))
                .map(|price| price.plan)
        };

        let cached = {
            let cache = self.prices.read().map_err(|_| cache_poisoned())?;
            find(&cache)
        };
        if cached.is_some() {
            return Ok(cached);
        }

        let Some(stripe) = &self.stripe else {
            return Ok(None);
        };
        self.refresh_prices(stripe.as_ref()).await?;
        let cache = self.prices.read().map_err(|_| cache_poisoned())?;
        Ok(find(&cache))
    }

    /// Apply a subscription state pushed by Stripe.
    ///
    /// The record is found by Stripe subscription id, then by `user_id`
    /// (taken from the subscription metadata). Unknown subscriptions are
    /// skipped and `None` is returned.
    pub async fn sync_from_stripe(
        &self,
        remote: &StripeSubscription,
        user_id: Option<&str>,
    ) -> Result<Option<Subscription>> {
        let mut local = match self.db.find_by_lookup_key::<Subscription>(&remote.id).await? {
            Some(sub) => sub,
            None => match user_id {
                Some(user_id) => match self.current(user_id).await? {
                    Some(sub) => sub,
                    None => {
                        tracing::warn!(
                            subscription_id = %remote.id,
                            user_id = %user_id,
                            "No local subscription for Stripe subscription"
                        );
                        return Ok(None);
                    }
                },
                None => {
                    tracing::warn!(
                        subscription_id = %remote.id,
                        "Stripe subscription has no local record or user metadata"
                    );
                    return Ok(None);
                }
            },
        };

        if let Some(price_id) = &remote.price_id {
            if let Some(plan) = self.plan_for_price(price_id).await? {
                local.plan = plan;
            }
        }
        local.stripe_customer_id = Some(remote.customer_id.clone());
        apply_remote(&mut local, remote);

        let updated = self.db.update(local).await?;
        tracing::info!(
            user_id = %updated.user_id,
            subscription_id = %remote.id,
            status = %updated.status,
            "Subscription synced from Stripe"
        );
        Ok(Some(updated))
    }

    /// Record a subscription deleted in Stripe: canceled, back on Free.
    pub async fn mark_canceled(&self, stripe_subscription_id: &str) -> Result<bool> {
        let Some(mut local) = self
            .db
            .find_by_lookup_key::<Subscription>(stripe_subscription_id)
            .await?
        else {
            return Ok(false);
        };

        local.status = "canceled".to_string();
        local.plan = Plan::Free;
        local.cancel_at_period_end = false;
        let updated = self.db.update(local).await?;
        tracing::info!(
            user_id = %updated.user_id,
            subscription_id = %stripe_subscription_id,
            "Subscription canceled in Stripe"
        );
        Ok(true)
    }

    /// Stripe billing portal URL for the user's customer.
    pub async fn portal_url(&self, user: &User, return_url: &str) -> Result<String> {
        let stripe = self.stripe.as_ref().ok_or(BillingError::NotConfigured)?;

        let customer_id = self
            .current(&user.id)
            .await?
            .and_then(|sub| sub.stripe_customer_id)
            .or_else(|| user.stripe_customer_id.clone())
            .ok_or_else(|| BillingError::NoCustomer {
                user_id: user.id.clone(),
            })?;

        Ok(stripe.create_portal_session(&customer_id, return_url).await?)
    }
}

fn apply_remote(local: &mut Subscription, remote: &StripeSubscription) {
    local.stripe_subscription_id = Some(remote.id.clone());
    local.status = remote.status.clone();
    local.price_id = remote.price_id.clone();
    local.current_period_end = timestamp(remote.current_period_end);
    local.cancel_at_period_end = remote.cancel_at_period_end;
}

impl std::fmt::Debug for SubscriptionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionService")
            .field("stripe_configured", &self.stripe.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::billing::plans::{GIFT_MONTHLY, PRO_MONTHLY};
    use crate::testing::MockStripe;

    async fn seeded_user(db: &DatabaseClient, role: Role) -> User {
        let mut user = User::new("owner@example.com", "Owner", "hash");
        user.role = role;
        db.create(user).await.unwrap()
    }

    fn service(db: &DatabaseClient, stripe: &Arc<MockStripe>) -> SubscriptionService {
        SubscriptionService::new(db.clone(), Some(stripe.clone() as Arc<dyn StripeApi>))
    }

    #[tokio::test]
    async fn test_first_ensure_creates_customer_and_subscription() {
        let db = DatabaseClient::in_memory();
        let stripe = Arc::new(MockStripe::provisioned());
        let user = seeded_user(&db, Role::Free).await;

        let ensured = service(&db, &stripe).ensure_subscription(&user).await.unwrap();

        assert_eq!(ensured.outcome, EnsureOutcome::Created);
        assert_eq!(ensured.subscription.plan, Plan::Free);
        assert_eq!(
            ensured.subscription.price_id.as_deref(),
            Some(MockStripe::price_id(crate::billing::plans::FREE_MONTHLY).as_str())
        );
        assert_eq!(stripe.call_count("create_customer"), 1);
        assert_eq!(stripe.call_count("create_subscription"), 1);

        let stored: User = db.get(&user.id).await.unwrap();
        assert_eq!(stored.stripe_customer_id, ensured.subscription.stripe_customer_id);
    }

    #[tokio::test]
    async fn test_repeat_ensure_makes_no_stripe_writes() {
        let db = DatabaseClient::in_memory();
        let stripe = Arc::new(MockStripe::provisioned());
        let user = seeded_user(&db, Role::Pro).await;
        let svc = service(&db, &stripe);

        svc.ensure_subscription(&user).await.unwrap();
        let user: User = db.get(&user.id).await.unwrap();
        let writes = stripe.write_count();

        let again = svc.ensure_subscription(&user).await.unwrap();
        assert_eq!(again.outcome, EnsureOutcome::Unchanged);
        assert_eq!(stripe.write_count(), writes);
    }

    #[tokio::test]
    async fn test_role_change_moves_price() {
        let db = DatabaseClient::in_memory();
        let stripe = Arc::new(MockStripe::provisioned());
        let mut user = seeded_user(&db, Role::Free).await;
        let svc = service(&db, &stripe);

        let first = svc.ensure_subscription(&user).await.unwrap();

        user = db.get(&user.id).await.unwrap();
        user.role = Role::Gift;
        let user = db.update(user).await.unwrap();

        let second = svc.ensure_subscription(&user).await.unwrap();
        assert_eq!(second.outcome, EnsureOutcome::Updated);
        assert_eq!(second.subscription.plan, Plan::Gift);
        assert_eq!(second.subscription.id, first.subscription.id);
        assert_eq!(
            second.subscription.price_id.as_deref(),
            Some(MockStripe::price_id(GIFT_MONTHLY).as_str())
        );
        assert_eq!(stripe.call_count("change_subscription_price"), 1);
        assert_eq!(stripe.call_count("create_customer"), 1);
    }

    #[tokio::test]
    async fn test_yearly_pro_subscriber_stays_yearly() {
        let db = DatabaseClient::in_memory();
        let stripe = Arc::new(MockStripe::provisioned());
        let user = seeded_user(&db, Role::Pro).await;
        let svc = service(&db, &stripe);

        let first = svc.ensure_subscription(&user).await.unwrap();
        assert_eq!(
            first.subscription.price_id.as_deref(),
            Some(MockStripe::price_id(PRO_MONTHLY).as_str())
        );

        let sub_id = first.subscription.stripe_subscription_id.clone().unwrap();
        stripe.set_subscription_price(&sub_id, &MockStripe::price_id(PRO_YEARLY));

        let user: User = db.get(&user.id).await.unwrap();
        let again = svc.ensure_subscription(&user).await.unwrap();
        assert_eq!(
            again.subscription.price_id.as_deref(),
            Some(MockStripe::price_id(PRO_YEARLY).as_str())
        );
        assert_eq!(stripe.call_count("change_subscription_price"), 0);
    }

    #[tokio::test]
    async fn test_canceled_subscription_is_replaced() {
        let db = DatabaseClient::in_memory();
        let stripe = Arc::new(MockStripe::provisioned());
        let user = seeded_user(&db, Role::Pro).await;
        let svc = service(&db, &stripe);

        let first = svc.ensure_subscription(&user).await.unwrap();
        let old_id = first.subscription.stripe_subscription_id.clone().unwrap();
        stripe.set_subscription_status(&old_id, "canceled");

        let user: User = db.get(&user.id).await.unwrap();
        let second = svc.ensure_subscription(&user).await.unwrap();
        assert_eq!(second.outcome, EnsureOutcome::Created);
        assert_ne!(second.subscription.stripe_subscription_id, Some(old_id));
        assert_eq!(stripe.call_count("create_subscription"), 2);
    }

    #[tokio::test]
    async fn test_missing_catalogue_price() {
        let db = DatabaseClient::in_memory();
        let stripe = Arc::new(MockStripe::new());
        let user = seeded_user(&db, Role::Free).await;

        let err = service(&db, &stripe).ensure_subscription(&user).await.unwrap_err();
        assert!(err.to_string().contains("corpdesk_free_monthly"));
    }

    #[tokio::test]
    async fn test_prices_fetched_once() {
        let db = DatabaseClient::in_memory();
        let stripe = Arc::new(MockStripe::provisioned());
        let svc = service(&db, &stripe);

        svc.price_id_for(stripe.as_ref(), PRO_MONTHLY).await.unwrap();
        svc.price_id_for(stripe.as_ref(), GIFT_MONTHLY).await.unwrap();
        assert_eq!(stripe.call_count("find_prices_by_lookup_keys"), 1);
    }

    #[tokio::test]
    async fn test_local_only_mode() {
        let db = DatabaseClient::in_memory();
        let user = seeded_user(&db, Role::Pro).await;
        let svc = SubscriptionService::new(db.clone(), None);

        let first = svc.ensure_subscription(&user).await.unwrap();
        assert_eq!(first.outcome, EnsureOutcome::Created);
        assert_eq!(first.subscription.plan, Plan::Pro);
        assert!(first.subscription.stripe_customer_id.is_none());

        let again = svc.ensure_subscription(&user).await.unwrap();
        assert_eq!(again.outcome, EnsureOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_sync_and_cancel_from_stripe() {
        let db = DatabaseClient::in_memory();
        let stripe = Arc::new(MockStripe::provisioned());
        let user = seeded_user(&db, Role::Pro).await;
        let svc = service(&db, &stripe);

        let ensured = svc.ensure_subscription(&user).await.unwrap();
        let sub_id = ensured.subscription.stripe_subscription_id.clone().unwrap();

        let mut remote = stripe.subscription(&sub_id).unwrap();
        remote.status = "past_due".to_string();
        remote.cancel_at_period_end = true;
        let synced = svc.sync_from_stripe(&remote, None).await.unwrap().unwrap();
        assert_eq!(synced.status, "past_due");
        assert!(synced.cancel_at_period_end);
        assert_eq!(synced.plan, Plan::Pro);

        assert!(svc.mark_canceled(&sub_id).await.unwrap());
        let local = svc.current(&user.id).await.unwrap().unwrap();
        assert_eq!(local.status, "canceled");
        assert_eq!(local.plan, Plan::Free);

        assert!(!svc.mark_canceled("sub_unknown").await.unwrap());
    }

    #[tokio::test]
    async fn test_portal_requires_customer() {
        let db = DatabaseClient::in_memory();
        let stripe = Arc::new(MockStripe::provisioned());
        let user = seeded_user(&db, Role::Free).await;
        let svc = service(&db, &stripe);

        let err = svc.portal_url(&user, "http://localhost/billing").await.unwrap_err();
        assert!(matches!(err, CorpdeskError::NotFound(_)));

        svc.ensure_subscription(&user).await.unwrap();
        let url = svc.portal_url(&user, "http://localhost/billing").await.unwrap();
        assert!(url.starts_with("https://"));
    }
}
