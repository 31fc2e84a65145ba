use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::app::AppContext;
use crate::billing::{BillingInterval, Feature, Plan};
use crate::health::{ComponentHealth, HealthChecker, HealthStatus};
use crate::http::RouteModule;

pub struct StatusModule;

impl RouteModule for StatusModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/api/status", get(status))
            .route("/api/pricing", get(pricing))
    }
}

#[derive(Serialize)]
struct StatusResponse {
    status: HealthStatus,
    version: &'static str,
    uptime_seconds: u64,
    components: Vec<ComponentHealth>,
}

/// Always 200; the body carries the overall status.
async fn status(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    let health = HealthChecker::for_context(&ctx).check_health().await;
    Json(StatusResponse {
        status: health.status,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: ctx.uptime().as_secs(),
        components: health.checks,
    })
}

#[derive(Serialize)]
struct PriceView {
    lookup_key: &'static str,
    amount_cents: i64,
    currency: &'static str,
    interval: BillingInterval,
}

#[derive(Serialize)]
struct FeatureView {
    key: Feature,
    name: &'static str,
}

#[derive(Serialize)]
struct PlanView {
    plan: Plan,
    name: &'static str,
    description: &'static str,
    prices: Vec<PriceView>,
    features: Vec<FeatureView>,
    company_limit: Option<usize>,
}

#[derive(Serialize)]
struct PricingResponse {
    plans: Vec<PlanView>,
}

fn catalogue() -> PricingResponse {
    let plans = Plan::ALL
        .iter()
        .map(|plan| PlanView {
            plan: *plan,
            name: plan.display_name(),
            description: plan.description(),
            prices: plan
                .prices()
                .map(|p| PriceView {
                    lookup_key: p.lookup_key,
                    amount_cents: p.amount_cents,
                    currency: p.currency,
                    interval: p.interval,
                })
                .collect(),
            features: plan
                .features()
                .iter()
                .map(|f| FeatureView {
                    key: *f,
                    name: f.display_name(),
                })
                .collect(),
            company_limit: plan.company_limit(),
        })
        .collect();
    PricingResponse { plans }
}

async fn pricing() -> Json<PricingResponse> {
    Json(catalogue())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_lists_every_plan() {
        let catalogue = serde_json::to_value(catalogue()).unwrap();
        let plans = catalogue["plans"].as_array().unwrap();
        assert_eq!(plans.len(), 3);
        assert_eq!(plans[1]["plan"], "pro");
        assert_eq!(plans[1]["prices"].as_array().unwrap().len(), 2);
        assert_eq!(plans[0]["company_limit"], 1);
        assert_eq!(plans[2]["features"][0]["key"], "invoice-generation");
    }
}
