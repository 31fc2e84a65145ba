use axum::{Router, extract::State, routing::post};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::load_owned;
use crate::app::AppContext;
use crate::auth::VerifiedUser;
use crate::billing::{Feature, Plan};
use crate::email::templates;
use crate::error::{CorpdeskError, Result};
use crate::http::{CreatedResponse, JsonBody, RouteModule};
use crate::invoice::{InvoiceData, InvoiceSource};
use crate::models::{Company, Contract};
use crate::storage::invoice_key;

pub struct InvoicesModule;

impl RouteModule for InvoicesModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new().route("/generate-storage", post(generate_invoice_storage))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/api/invoices")
    }
}

#[derive(Deserialize)]
struct GenerateRequest {
    contract_id: String,
    #[serde(default)]
    send_email: bool,
}

#[derive(Serialize)]
struct GenerateResponse {
    invoice_number: String,
    url: String,
    source: InvoiceSource,
    plan: Plan,
    emailed: bool,
}

/// `generate-invoice-storage`: render the contract's invoice to PDF, store
/// it and record the URL on the contract.
async fn generate_invoice_storage(
    State(ctx): State<AppContext>,
    VerifiedUser(user): VerifiedUser,
    JsonBody(req): JsonBody<GenerateRequest>,
) -> Result<CreatedResponse<GenerateResponse>> {
    let mut contract: Contract = load_owned(&ctx, &req.contract_id, &user).await?;

    let ensured = ctx.subscriptions().ensure_subscription(&user).await?;
    let plan = ensured.subscription.plan;
    plan.require(Feature::InvoiceGeneration)?;

    if req.send_email && contract.client_email.is_none() {
        return Err(CorpdeskError::bad_request(
            "Contract has no client email to send the invoice to",
        ));
    }

    let company: Company = ctx.db().get(&contract.company_id).await?;
    let data = InvoiceData::new(&contract, &company, Utc::now().date_naive());
    let invoice = ctx.invoices().generate(&data).await;

    let pdf = ctx.pdf().render(&invoice.html).await?;
    let key = invoice_key(&user.id, &data.invoice_number);
    let url = ctx.storage().put(&key, pdf, "application/pdf").await?;

    contract.invoice_number = Some(data.invoice_number.clone());
    contract.invoice_url = Some(url.clone());
    let contract = ctx.db().update(contract).await?;

    tracing::info!(
        user_id = %user.id,
        contract_id = %contract.id,
        invoice_number = %data.invoice_number,
        source = invoice.source.as_str(),
        "Invoice generated"
    );

    let mut emailed = false;
    if let Some(to) = contract.client_email.as_deref().filter(|_| req.send_email) {
        emailed = ctx
            .notify(
                to,
                templates::invoice_ready(
                    &contract.client_name,
                    &company.name,
                    &data.invoice_number,
                    &data.formatted_total(),
                    &url,
                ),
            )
            .await;
    }

    Ok(CreatedResponse::new(
        GenerateResponse {
            invoice_number: data.invoice_number,
            url: url.clone(),
            source: invoice.source,
            plan,
            emailed,
        },
        url,
    ))
}
