use secrecy::SecretString;

use crate::utils::{get_env_with_prefix, parse_env_with_prefix};

/// Stripe credentials and client behaviour.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// `sk_*`/`rk_*` key. Billing runs in local-only mode without it.
    pub secret_key: Option<SecretString>,
    pub webhook_secret: Option<SecretString>,
    pub max_retries: u32,
    pub timeout_seconds: u64,
    /// Application fee on Connect contract payments, in basis points.
    pub application_fee_bps: u32,
    /// Country for new Connect Express accounts.
    pub connect_country: String,
    /// Where the billing portal sends users back to. `{base_url}/billing` when absent.
    pub portal_return_url: Option<String>,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            webhook_secret: None,
            max_retries: 3,
            timeout_seconds: 30,
            application_fee_bps: 250,
            connect_country: "US".to_string(),
            portal_return_url: None,
        }
    }
}

impl StripeConfig {
    pub fn from_env() -> Self {
        let mut config = Self {
            secret_key: get_env_with_prefix("STRIPE_SECRET_KEY").map(SecretString::from),
            webhook_secret: get_env_with_prefix("STRIPE_WEBHOOK_SECRET").map(SecretString::from),
            ..Self::default()
        };
        if let Some(retries) = parse_env_with_prefix("STRIPE_MAX_RETRIES") {
            config.max_retries = retries;
        }
        if let Some(timeout) = parse_env_with_prefix("STRIPE_TIMEOUT_SECONDS") {
            config.timeout_seconds = timeout;
        }
        if let Some(bps) = parse_env_with_prefix("STRIPE_APPLICATION_FEE_BPS") {
            config.application_fee_bps = bps;
        }
        if let Some(country) = get_env_with_prefix("STRIPE_CONNECT_COUNTRY") {
            config.connect_country = country;
        }
        config.portal_return_url = get_env_with_prefix("STRIPE_PORTAL_RETURN_URL");
        config
    }

    pub fn is_configured(&self) -> bool {
        self.secret_key.is_some()
    }

    /// Platform fee for a payment of `amount_cents`, rounded down.
    pub fn application_fee(&self, amount_cents: i64) -> i64 {
        amount_cents.saturating_mul(self.application_fee_bps as i64) / 10_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_fee() {
        let config = StripeConfig::default();
        assert_eq!(config.application_fee(100_00), 2_50);
        assert_eq!(config.application_fee(99), 2);
        assert_eq!(config.application_fee(0), 0);
    }
}
