//! Stripe Connect for companies.
//!
//! Each company gets one Express account. Contract payments made through the
//! client portal are destination charges to that account, minus the platform
//! application fee.

use serde::Serialize;
use std::sync::Arc;

use super::client::{
    CheckoutSession, ContractCheckoutRequest, CreateConnectAccountRequest, StripeApi,
};
use super::config::StripeConfig;
use super::error::BillingError;
use crate::db::DatabaseClient;
use crate::error::Result;
use crate::models::{Company, Contract, User};

#[derive(Debug, Clone, Serialize)]
pub struct Onboarding {
    pub account_id: String,
    /// Hosted onboarding page; single use and short-lived.
    pub url: String,
    /// Whether the account was created by this call.
    pub created: bool,
}

#[derive(Clone)]
pub struct ConnectService {
    db: DatabaseClient,
    stripe: Option<Arc<dyn StripeApi>>,
    config: StripeConfig,
    base_url: String,
}

impl ConnectService {
    pub fn new(
        db: DatabaseClient,
        stripe: Option<Arc<dyn StripeApi>>,
        config: StripeConfig,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            db,
            stripe,
            config,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn stripe(&self) -> std::result::Result<&Arc<dyn StripeApi>, BillingError> {
        self.stripe.as_ref().ok_or(BillingError::NotConfigured)
    }

    /// Create the company's Express account if it has none, then an onboarding link.
    pub async fn start_onboarding(&self, company: Company, owner: &User) -> Result<Onboarding> {
        let stripe = self.stripe()?;

        let (company, created) = match &company.connect_account_id {
            Some(_) => (company, false),
            None => {
                let account_id = stripe
                    .create_connect_account(CreateConnectAccountRequest {
                        company_id: company.id.clone(),
                        company_name: company.name.clone(),
                        email: owner.email.clone(),
                        country: self.config.connect_country.clone(),
                    })
                    .await?;
                tracing::info!(
                    company_id = %company.id,
                    account_id = %account_id,
                    "Connect account created"
                );

                let mut company = company;
                company.connect_account_id = Some(account_id);
                (self.db.update(company).await?, true)
            }
        };

        let account_id = company
            .connect_account_id
            .clone()
            .ok_or_else(|| BillingError::Internal {
                message: "Connect account id missing after creation".to_string(),
            })?;

        let page = format!("{}/companies/{}/connect", self.base_url, company.id);
        let url = stripe
            .create_account_link(
                &account_id,
                &format!("{}?refresh=1", page),
                &format!("{}?complete=1", page),
            )
            .await?;

        Ok(Onboarding {
            account_id,
            url,
            created,
        })
    }

    /// Pull the account's current capabilities into the company record.
    pub async fn refresh_status(&self, company: Company) -> Result<Company> {
        let Some(account_id) = company.connect_account_id.clone() else {
            return Ok(company);
        };
        let status = self.stripe()?.get_connect_account(&account_id).await?;

        if status.charges_enabled == company.connect_charges_enabled
            && status.details_submitted == company.connect_details_submitted
        {
            return Ok(company);
        }

        let mut company = company;
        company.connect_charges_enabled = status.charges_enabled;
        company.connect_details_submitted = status.details_submitted;
        Ok(self.db.update(company).await?)
    }

    /// Checkout session paying `contract` into the company's account.
    ///
    /// # Errors
    ///
    /// [`BillingError::ConnectNotReady`] (409) unless the company's account
    /// can accept charges.
    pub async fn create_contract_checkout(
        &self,
        contract: &Contract,
        company: &Company,
        portal_token: &str,
    ) -> Result<CheckoutSession> {
        let stripe = self.stripe()?;

        let destination = match &company.connect_account_id {
            Some(account) if company.connect_charges_enabled => account.clone(),
            _ => {
                return Err(BillingError::ConnectNotReady {
                    company_id: company.id.clone(),
                }
                .into());
            }
        };

        let portal_page = format!("{}/portal/{}", self.base_url, portal_token);
        let session = stripe
            .create_contract_checkout(ContractCheckoutRequest {
                contract_id: contract.id.clone(),
                description: format!("{} ({})", contract.title, company.name),
                amount_cents: contract.amount_cents,
                currency: contract.currency.clone(),
                destination_account: destination,
                application_fee_cents: self.config.application_fee(contract.amount_cents),
                customer_email: contract.client_email.clone(),
                success_url: format!("{}?paid=1", portal_page),
                cancel_url: portal_page,
            })
            .await?;

        tracing::info!(
            contract_id = %contract.id,
            session_id = %session.id,
            "Contract checkout created"
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::client::ConnectAccountStatus;
    use crate::error::CorpdeskError;
    use crate::models::EntityType;
    use crate::testing::MockStripe;

    fn service(db: &DatabaseClient, stripe: &Arc<MockStripe>) -> ConnectService {
        ConnectService::new(
            db.clone(),
            Some(stripe.clone() as Arc<dyn StripeApi>),
            StripeConfig::default(),
            "https://app.example.com/",
        )
    }

    #[tokio::test]
    async fn test_onboarding_creates_account_once() {
        let db = DatabaseClient::in_memory();
        let stripe = Arc::new(MockStripe::provisioned());
        let owner = User::new("owner@example.com", "Owner", "hash");
        let company = db
            .create(Company::new(&owner.id, "Acme LLC", EntityType::Llc))
            .await
            .unwrap();
        let svc = service(&db, &stripe);

        let first = svc.start_onboarding(company.clone(), &owner).await.unwrap();
        assert!(first.created);

        let stored: Company = db.get(&company.id).await.unwrap();
        assert_eq!(stored.connect_account_id.as_deref(), Some(first.account_id.as_str()));

        let second = svc.start_onboarding(stored, &owner).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.account_id, first.account_id);
        assert_eq!(stripe.call_count("create_connect_account"), 1);
        assert_eq!(stripe.call_count("create_account_link"), 2);
    }

    #[tokio::test]
    async fn test_checkout_requires_charges_enabled() {
        let db = DatabaseClient::in_memory();
        let stripe = Arc::new(MockStripe::provisioned());
        let mut company = Company::new("u1", "Acme LLC", EntityType::Llc);
        company.connect_account_id = Some("acct_1".to_string());
        let company = db.create(company).await.unwrap();
        let mut contract = Contract::new(&company.id, "u1", "Retainer", "Client", 100_00);
        contract.client_email = Some("client@example.com".to_string());
        let svc = service(&db, &stripe);

        let err = svc
            .create_contract_checkout(&contract, &company, "tok")
            .await
            .unwrap_err();
        assert!(matches!(err, CorpdeskError::Conflict(_)));

        stripe.set_account(ConnectAccountStatus {
            id: "acct_1".to_string(),
            charges_enabled: true,
            details_submitted: true,
            payouts_enabled: true,
        });
        let company = svc.refresh_status(company).await.unwrap();
        assert!(company.connect_charges_enabled);

        let session = svc
            .create_contract_checkout(&contract, &company, "tok")
            .await
            .unwrap();
        assert!(session.url.starts_with("https://"));

        let request = stripe.last_checkout().unwrap();
        assert_eq!(request.application_fee_cents, 2_50);
        assert_eq!(request.destination_account, "acct_1");
        assert_eq!(request.cancel_url, "https://app.example.com/portal/tok");
    }

    #[tokio::test]
    async fn test_unconfigured_stripe() {
        let db = DatabaseClient::in_memory();
        let svc = ConnectService::new(db, None, StripeConfig::default(), "http://localhost");
        let owner = User::new("owner@example.com", "Owner", "hash");
        let company = Company::new(&owner.id, "Acme", EntityType::Llc);

        let err = svc.start_onboarding(company, &owner).await.unwrap_err();
        assert!(matches!(err, CorpdeskError::ServiceUnavailable(_)));
    }
}
