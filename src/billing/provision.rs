//! One-shot creation of the Stripe catalogue.
//!
//! Creates the entitlement features, one product per plan, the product
//! feature grants, every price in [`PRICES`] and a billing portal
//! configuration. Nothing is created when any lookup key already exists.
//! When a step fails, everything created so far is deactivated in reverse
//! order; resources that cannot be deactivated are logged and reported.

use serde::Serialize;
use std::collections::HashMap;

use super::client::{
    CatalogResource, CreatePriceRequest, CreateProductRequest, PortalConfigurationRequest,
    PortalProduct, StripeApi,
};
use super::error::BillingError;
use super::plans::{ALL_LOOKUP_KEYS, Feature, PRICES, Plan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStatus {
    /// Every lookup key already exists; nothing was done.
    AlreadyProvisioned,
    /// Nothing was created; `steps` lists what would be.
    DryRun,
    Created,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub status: ProvisionStatus,
    pub steps: Vec<String>,
}

/// Entitlement feature lookup key, e.g. `corpdesk_invoice_generation`.
pub fn feature_lookup_key(feature: Feature) -> String {
    format!("corpdesk_{}", feature.as_str().replace('-', "_"))
}

fn product_name(plan: Plan) -> String {
    format!("Corpdesk {}", plan.display_name())
}

/// Human-readable description of every object provisioning creates.
pub fn planned_steps() -> Vec<String> {
    let mut steps = Vec::new();
    for feature in Feature::ALL {
        steps.push(format!("create feature {}", feature_lookup_key(feature)));
    }
    for plan in Plan::ALL {
        steps.push(format!("create product {}", product_name(plan)));
    }
    for plan in Plan::ALL {
        for feature in plan.features() {
            steps.push(format!(
                "grant {} to {}",
                feature_lookup_key(*feature),
                product_name(plan)
            ));
        }
    }
    for price in PRICES.iter() {
        steps.push(format!(
            "create price {} ({} {} / {})",
            price.lookup_key,
            price.amount_cents,
            price.currency,
            price.interval.as_str()
        ));
    }
    steps.push("create billing portal configuration".to_string());
    steps
}

/// Provision the catalogue.
///
/// # Errors
///
/// [`BillingError::ProvisioningConflict`] when only some lookup keys exist,
/// [`BillingError::ProvisioningFailed`] when a creation step fails (after
/// the rollback attempt).
pub async fn provision_catalog(
    stripe: &dyn StripeApi,
    dry_run: bool,
) -> Result<ProvisionReport, BillingError> {
    let existing: Vec<String> = stripe
        .find_prices_by_lookup_keys(&ALL_LOOKUP_KEYS)
        .await?
        .into_iter()
        .filter_map(|price| price.lookup_key)
        .collect();

    if ALL_LOOKUP_KEYS
        .iter()
        .all(|key| existing.iter().any(|e| e == key))
    {
        tracing::info!("Stripe catalogue already provisioned");
        return Ok(ProvisionReport {
            status: ProvisionStatus::AlreadyProvisioned,
            steps: Vec::new(),
        });
    }

    if !existing.is_empty() {
        let mut existing = existing;
        existing.sort();
        existing.dedup();
        return Err(BillingError::ProvisioningConflict { existing });
    }

    if dry_run {
        return Ok(ProvisionReport {
            status: ProvisionStatus::DryRun,
            steps: planned_steps(),
        });
    }

    let mut run = Provisioning {
        stripe,
        created: Vec::new(),
    };

    match run.create_all().await {
        Ok(()) => {
            tracing::info!(resources = run.created.len(), "Stripe catalogue provisioned");
            Ok(ProvisionReport {
                status: ProvisionStatus::Created,
                steps: run.created.iter().map(ToString::to_string).collect(),
            })
        }
        Err((step, error)) => {
            tracing::error!(step = %step, error = %error, "Stripe provisioning failed, rolling back");
            let rollback_failures = run.rollback().await;
            Err(BillingError::ProvisioningFailed {
                step,
                message: error.to_string(),
                rollback_failures,
            })
        }
    }
}

struct Provisioning<'a> {
    stripe: &'a dyn StripeApi,
    created: Vec<CatalogResource>,
}

type StepResult<T> = Result<T, (String, BillingError)>;

impl Provisioning<'_> {
    async fn create_all(&mut self) -> StepResult<()> {
        let mut features = HashMap::new();
        for feature in Feature::ALL {
            let lookup_key = feature_lookup_key(feature);
            let id = self
                .stripe
                .create_feature(&lookup_key, feature.display_name())
                .await
                .map_err(|e| (format!("create feature {}", lookup_key), e))?;
            self.created.push(CatalogResource::Feature(id.clone()));
            features.insert(feature, id);
        }

        let mut products = HashMap::new();
        for plan in Plan::ALL {
            let mut metadata = HashMap::new();
            metadata.insert("plan".to_string(), plan.as_str().to_string());
            let id = self
                .stripe
                .create_product(CreateProductRequest {
                    name: product_name(plan),
                    description: plan.description().to_string(),
                    metadata,
                })
                .await
                .map_err(|e| (format!("create product {}", product_name(plan)), e))?;
            self.created.push(CatalogResource::Product(id.clone()));
            products.insert(plan, id);
        }

        for plan in Plan::ALL {
            let product_id = &products[&plan];
            for feature in plan.features() {
                let attachment_id = self
                    .stripe
                    .attach_product_feature(product_id, &features[feature])
                    .await
                    .map_err(|e| {
                        (
                            format!("grant {} to {}", feature.as_str(), product_name(plan)),
                            e,
                        )
                    })?;
                self.created.push(CatalogResource::ProductFeature {
                    product_id: product_id.clone(),
                    attachment_id,
                });
            }
        }

        let mut prices: HashMap<Plan, Vec<String>> = HashMap::new();
        for price in PRICES.iter() {
            let id = self
                .stripe
                .create_price(CreatePriceRequest {
                    product_id: products[&price.plan].clone(),
                    lookup_key: price.lookup_key.to_string(),
                    unit_amount: price.amount_cents,
                    currency: price.currency.to_string(),
                    interval: price.interval,
                })
                .await
                .map_err(|e| (format!("create price {}", price.lookup_key), e))?;
            self.created.push(CatalogResource::Price(id.clone()));
            prices.entry(price.plan).or_default().push(id);
        }

        // Gift is assigned by admins, so customers only switch between Free and Pro
        let switchable = [Plan::Free, Plan::Pro]
            .into_iter()
            .map(|plan| PortalProduct {
                product: products[&plan].clone(),
                prices: prices.remove(&plan).unwrap_or_default(),
            })
            .collect();
        let id = self
            .stripe
            .create_portal_configuration(PortalConfigurationRequest {
                headline: "Manage your Corpdesk subscription".to_string(),
                products: switchable,
            })
            .await
            .map_err(|e| ("create billing portal configuration".to_string(), e))?;
        self.created.push(CatalogResource::PortalConfiguration(id));

        Ok(())
    }

    /// Deactivate created resources newest first. Returns the ones that failed.
    async fn rollback(&self) -> Vec<String> {
        let mut failures = Vec::new();
        for resource in self.created.iter().rev() {
            match self.stripe.deactivate(resource).await {
                Ok(()) => tracing::info!(resource = %resource, "Rolled back"),
                Err(e) => {
                    tracing::warn!(
                        resource = %resource,
                        error = %e,
                        "Rollback could not deactivate resource"
                    );
                    failures.push(resource.to_string());
                }
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::plans::PRO_MONTHLY;
    use crate::testing::MockStripe;

    #[tokio::test]
    async fn test_fresh_account_is_provisioned() {
        let stripe = MockStripe::new();
        let report = provision_catalog(&stripe, false).await.unwrap();

        assert_eq!(report.status, ProvisionStatus::Created);
        assert_eq!(stripe.call_count("create_feature"), 4);
        assert_eq!(stripe.call_count("create_product"), 3);
        assert_eq!(stripe.call_count("attach_product_feature"), 8);
        assert_eq!(stripe.call_count("create_price"), 4);
        assert_eq!(stripe.call_count("create_portal_configuration"), 1);
        assert_eq!(report.steps.len(), 20);

        // A second run finds every key
        let again = provision_catalog(&stripe, false).await.unwrap();
        assert_eq!(again.status, ProvisionStatus::AlreadyProvisioned);
        assert_eq!(stripe.call_count("create_feature"), 4);
    }

    #[tokio::test]
    async fn test_dry_run_creates_nothing() {
        let stripe = MockStripe::new();
        let report = provision_catalog(&stripe, true).await.unwrap();
        assert_eq!(report.status, ProvisionStatus::DryRun);
        assert_eq!(report.steps, planned_steps());
        assert_eq!(stripe.write_count(), 0);
    }

    #[tokio::test]
    async fn test_partial_catalogue_conflicts() {
        let stripe = MockStripe::with_prices(&[PRO_MONTHLY]);
        let err = provision_catalog(&stripe, false).await.unwrap_err();
        assert_eq!(
            err,
            BillingError::ProvisioningConflict {
                existing: vec![PRO_MONTHLY.to_string()]
            }
        );
        assert_eq!(stripe.write_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_rolls_back_in_reverse() {
        let stripe = MockStripe::new();
        stripe.fail_on("create_price");

        let err = provision_catalog(&stripe, false).await.unwrap_err();
        let BillingError::ProvisioningFailed {
            step,
            rollback_failures,
            ..
        } = err
        else {
            panic!("expected ProvisioningFailed, got {err:?}");
        };
        assert_eq!(step, "create price corpdesk_free_monthly");
        assert!(rollback_failures.is_empty());

        let deactivated = stripe.deactivated();
        assert_eq!(deactivated.len(), 4 + 3 + 8);
        assert!(matches!(deactivated.first(), Some(CatalogResource::ProductFeature { .. })));
        assert!(matches!(deactivated.last(), Some(CatalogResource::Feature(_))));
    }

    #[tokio::test]
    async fn test_rollback_failures_are_reported_not_raised() {
        let stripe = MockStripe::new();
        stripe.fail_on("create_portal_configuration");
        stripe.fail_on("deactivate");

        let err = provision_catalog(&stripe, false).await.unwrap_err();
        match err {
            BillingError::ProvisioningFailed {
                step,
                message,
                rollback_failures,
            } => {
                assert_eq!(step, "create billing portal configuration");
                assert!(message.contains("create_portal_configuration"));
                assert_eq!(rollback_failures.len(), 4 + 3 + 8 + 4);
            }
            other => panic!("expected ProvisioningFailed, got {other:?}"),
        }
    }
}
