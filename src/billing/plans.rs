//! The Corpdesk plan catalogue.
//!
//! Plans follow the user's role: `free` users are on Free, `pro` users on
//! Pro, and `gift` and `admin` users on Gift (Pro features at no charge).
//! Stripe prices are found by lookup key, never by hard-coded price id.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::BillingError;
use crate::auth::Role;

pub const FREE_MONTHLY: &str = "corpdesk_free_monthly";
pub const PRO_MONTHLY: &str = "corpdesk_pro_monthly";
pub const PRO_YEARLY: &str = "corpdesk_pro_yearly";
pub const GIFT_MONTHLY: &str = "corpdesk_gift_monthly";

/// Every lookup key the catalogue defines.
pub const ALL_LOOKUP_KEYS: [&str; 4] = [FREE_MONTHLY, PRO_MONTHLY, PRO_YEARLY, GIFT_MONTHLY];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
    Gift,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Feature {
    InvoiceGeneration,
    ClientPortal,
    StripeConnect,
    UnlimitedCompanies,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Month,
    Year,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Month => "month",
            BillingInterval::Year => "year",
        }
    }
}

/// One recurring Stripe price of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanPrice {
    pub lookup_key: &'static str,
    pub plan: Plan,
    pub amount_cents: i64,
    pub currency: &'static str,
    pub interval: BillingInterval,
}

pub const PRICES: [PlanPrice; 4] = [
    PlanPrice {
        lookup_key: FREE_MONTHLY,
        plan: Plan::Free,
        amount_cents: 0,
        currency: "usd",
        interval: BillingInterval::Month,
    },
    PlanPrice {
        lookup_key: PRO_MONTHLY,
        plan: Plan::Pro,
        amount_cents: 29_00,
        currency: "usd",
        interval: BillingInterval::Month,
    },
    PlanPrice {
        lookup_key: PRO_YEARLY,
        plan: Plan::Pro,
        amount_cents: 290_00,
        currency: "usd",
        interval: BillingInterval::Year,
    },
    PlanPrice {
        lookup_key: GIFT_MONTHLY,
        plan: Plan::Gift,
        amount_cents: 0,
        currency: "usd",
        interval: BillingInterval::Month,
    },
];

const PAID_FEATURES: [Feature; 4] = [
    Feature::InvoiceGeneration,
    Feature::ClientPortal,
    Feature::StripeConnect,
    Feature::UnlimitedCompanies,
];

impl Plan {
    pub const ALL: [Plan; 3] = [Plan::Free, Plan::Pro, Plan::Gift];

    /// The plan a role entitles its holder to.
    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Free => Plan::Free,
            Role::Pro => Plan::Pro,
            Role::Gift | Role::Admin => Plan::Gift,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
            Plan::Gift => "gift",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Plan::Free => "Free",
            Plan::Pro => "Pro",
            Plan::Gift => "Gift",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Plan::Free => "One company with contracts, incorporations and notes.",
            Plan::Pro => "Unlimited companies, invoice PDFs, client portal and Stripe Connect payments.",
            Plan::Gift => "Every Pro feature, complimentary.",
        }
    }

    pub fn features(&self) -> &'static [Feature] {
        match self {
            Plan::Free => &[],
            Plan::Pro | Plan::Gift => &PAID_FEATURES,
        }
    }

    pub fn has_feature(&self, feature: Feature) -> bool {
        self.features().contains(&feature)
    }

    /// Err with [`BillingError::FeatureNotIncluded`] unless the plan has `feature`.
    pub fn require(&self, feature: Feature) -> Result<(), BillingError> {
        if self.has_feature(feature) {
            Ok(())
        } else {
            Err(BillingError::FeatureNotIncluded {
                feature: feature.as_str().to_string(),
                plan: self.as_str().to_string(),
            })
        }
    }

    /// Maximum number of companies, `None` for unlimited.
    pub fn company_limit(&self) -> Option<usize> {
        if self.has_feature(Feature::UnlimitedCompanies) {
            None
        } else {
            Some(1)
        }
    }

    pub fn prices(&self) -> impl Iterator<Item = &'static PlanPrice> + '_ {
        PRICES.iter().filter(move |price| price.plan == *self)
    }

    /// Lookup key of the price new subscriptions start on.
    pub fn default_lookup_key(&self) -> &'static str {
        match self {
            Plan::Free => FREE_MONTHLY,
            Plan::Pro => PRO_MONTHLY,
            Plan::Gift => GIFT_MONTHLY,
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Feature {
    pub const ALL: [Feature; 4] = PAID_FEATURES;

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::InvoiceGeneration => "invoice-generation",
            Feature::ClientPortal => "client-portal",
            Feature::StripeConnect => "stripe-connect",
            Feature::UnlimitedCompanies => "unlimited-companies",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Feature::InvoiceGeneration => "Invoice generation",
            Feature::ClientPortal => "Client portal",
            Feature::StripeConnect => "Stripe Connect payments",
            Feature::UnlimitedCompanies => "Unlimited companies",
        }
    }
}

pub fn price_for_lookup_key(lookup_key: &str) -> Option<&'static PlanPrice> {
    PRICES.iter().find(|price| price.lookup_key == lookup_key)
}
