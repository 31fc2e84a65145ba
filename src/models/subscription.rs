use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::new_id;
use crate::billing::Plan;
use crate::db::Record;

/// Local mirror of a user's Stripe subscription.
///
/// One per user; `stripe_customer_id` is the user's single Stripe customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub plan: Plan,
    /// Stripe subscription status (`active`, `incomplete`, `canceled`, ...)
    pub status: String,
    pub price_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(user_id: impl Into<String>, plan: Plan) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            user_id: user_id.into(),
            stripe_customer_id: None,
            stripe_subscription_id: None,
            plan,
            status: "active".to_string(),
            price_id: None,
            current_period_end: None,
            cancel_at_period_end: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status.as_str(), "active" | "trialing")
    }
}

impl Record for Subscription {
    const COLLECTION: &'static str = "subscriptions";
    const LABEL: &'static str = "Subscription";

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> Option<&str> {
        Some(&self.user_id)
    }

    /// Webhooks locate the record by Stripe subscription id.
    fn lookup_key(&self) -> Option<String> {
        self.stripe_subscription_id.clone()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}
