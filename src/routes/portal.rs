//! Client portal: session-less access to one contract through a link token.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::app::AppContext;
use crate::error::{CorpdeskError, Result};
use crate::http::RouteModule;
use crate::models::{Company, Contract, ContractStatus, PortalToken};
use crate::utils::hash_token;

pub struct PortalModule;

impl RouteModule for PortalModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/{token}", get(view_contract))
            .route("/{token}/pay", post(pay_contract))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/api/portal")
    }
}

/// Unknown and expired links look the same to the caller.
async fn resolve(ctx: &AppContext, token: &str) -> Result<(Contract, Company)> {
    let not_found = || CorpdeskError::not_found("Portal link not found or expired");

    let link = ctx
        .db()
        .find_by_lookup_key::<PortalToken>(&hash_token(token))
        .await?
        .ok_or_else(not_found)?;
    if link.is_expired(Utc::now()) {
        tracing::debug!(link_id = %link.id, "Expired portal link used");
        return Err(not_found());
    }

    let contract = ctx
        .db()
        .find_by_id::<Contract>(&link.contract_id)
        .await?
        .ok_or_else(not_found)?;
    let company: Company = ctx.db().get(&contract.company_id).await?;
    Ok((contract, company))
}

#[derive(Serialize)]
struct PortalView {
    title: String,
    description: Option<String>,
    amount_cents: i64,
    currency: String,
    status: ContractStatus,
    due_date: Option<NaiveDate>,
    company_name: String,
    client_name: String,
    invoice_url: Option<String>,
    payable: bool,
}

async fn view_contract(
    State(ctx): State<AppContext>,
    Path(token): Path<String>,
) -> Result<Json<PortalView>> {
    let (contract, company) = resolve(&ctx, &token).await?;
    Ok(Json(PortalView {
        payable: contract.is_payable(),
        title: contract.title,
        description: contract.description,
        amount_cents: contract.amount_cents,
        currency: contract.currency,
        status: contract.status,
        due_date: contract.due_date,
        company_name: company.name,
        client_name: contract.client_name,
        invoice_url: contract.invoice_url,
    }))
}

#[derive(Serialize)]
struct PayResponse {
    url: String,
}

async fn pay_contract(
    State(ctx): State<AppContext>,
    Path(token): Path<String>,
) -> Result<Json<PayResponse>> {
    let (contract, company) = resolve(&ctx, &token).await?;
    if !contract.is_payable() {
        return Err(CorpdeskError::conflict(format!(
            "Contract is {} and cannot be paid",
            contract.status.as_str()
        )));
    }

    let session = ctx
        .connect()
        .create_contract_checkout(&contract, &company, &token)
        .await?;
    Ok(Json(PayResponse { url: session.url }))
}
