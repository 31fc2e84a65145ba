use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::app::AppContext;
use crate::auth::AuthUser;
use crate::billing::Plan;
use crate::error::Result;
use crate::http::RouteModule;
use crate::models::{Company, Contract, ContractStatus, Incorporation, IncorporationStatus};

pub struct DashboardModule;

impl RouteModule for DashboardModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new().route("/api/dashboard", get(dashboard))
    }
}

#[derive(Debug, Serialize, PartialEq)]
struct DashboardSummary {
    companies: usize,
    contracts: usize,
    contracts_by_status: BTreeMap<&'static str, usize>,
    incorporations_by_status: BTreeMap<&'static str, usize>,
    /// Sum over all contracts, in cents, regardless of currency.
    total_contract_value_cents: i64,
    paid_contract_value_cents: i64,
    plan: Plan,
    subscription_status: Option<String>,
}

/// Saturates instead of overflowing on records stored before amounts were capped.
fn total_cents<'a>(contracts: impl Iterator<Item = &'a Contract>) -> i64 {
    contracts.fold(0i64, |total, c| total.saturating_add(c.amount_cents))
}

fn summarize(
    companies: &[Company],
    contracts: &[Contract],
    incorporations: &[Incorporation],
    plan: Plan,
    subscription_status: Option<String>,
) -> DashboardSummary {
    let mut contracts_by_status: BTreeMap<&'static str, usize> =
        ContractStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect();
    for contract in contracts {
        *contracts_by_status.entry(contract.status.as_str()).or_default() += 1;
    }

    let mut incorporations_by_status: BTreeMap<&'static str, usize> =
        IncorporationStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect();
    for packet in incorporations {
        *incorporations_by_status.entry(packet.status.as_str()).or_default() += 1;
    }

    DashboardSummary {
        companies: companies.len(),
        contracts: contracts.len(),
        contracts_by_status,
        incorporations_by_status,
        total_contract_value_cents: total_cents(contracts.iter()),
        paid_contract_value_cents: total_cents(
            contracts.iter().filter(|c| c.status == ContractStatus::Paid),
        ),
        plan,
        subscription_status,
    }
}

async fn dashboard(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
) -> Result<Json<DashboardSummary>> {
    let db = ctx.db();
    let companies: Vec<Company> = db.find_by_user_id(&user.id).await?;
    let contracts: Vec<Contract> = db.find_by_user_id(&user.id).await?;
    let incorporations: Vec<Incorporation> = db.find_by_user_id(&user.id).await?;

    let subscription = ctx.subscriptions().current(&user.id).await?;
    let plan = subscription
        .as_ref()
        .map(|s| s.plan)
        .unwrap_or_else(|| Plan::for_role(user.role));

    Ok(Json(summarize(
        &companies,
        &contracts,
        &incorporations,
        plan,
        subscription.map(|s| s.status),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityType;

    #[test]
    fn test_totals_saturate() {
        let company = Company::new("u1", "Acme LLC", EntityType::Llc);
        let huge: Vec<Contract> = (0..2)
            .map(|_| Contract::new(&company.id, "u1", "Huge", "Client", 5_000_000_000_000_000_000))
            .collect();
        let summary = summarize(&[company], &huge, &[], Plan::Free, None);
        assert_eq!(summary.total_contract_value_cents, i64::MAX);
        assert_eq!(summary.paid_contract_value_cents, 0);
    }

    #[test]
    fn test_summary_counts_and_sums() {
        let company = Company::new("u1", "Acme LLC", EntityType::Llc);
        let mut paid = Contract::new(&company.id, "u1", "Build", "Client", 500_00);
        paid.mark_paid(chrono::Utc::now());
        let mut sent = Contract::new(&company.id, "u1", "Design", "Client", 250_00);
        sent.status = ContractStatus::Sent;
        let draft = Contract::new(&company.id, "u1", "Audit", "Client", 100_00);

        let summary = summarize(
            &[company],
            &[paid, sent, draft],
            &[],
            Plan::Pro,
            Some("active".into()),
        );

        assert_eq!(summary.companies, 1);
        assert_eq!(summary.contracts, 3);
        assert_eq!(summary.contracts_by_status["paid"], 1);
        assert_eq!(summary.contracts_by_status["sent"], 1);
        assert_eq!(summary.contracts_by_status["draft"], 1);
        assert_eq!(summary.contracts_by_status["cancelled"], 0);
        assert_eq!(summary.incorporations_by_status["submitted"], 0);
        assert_eq!(summary.total_contract_value_cents, 850_00);
        assert_eq!(summary.paid_contract_value_cents, 500_00);
    }
}
