use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{load_owned, optional_text, required_text, validate_email};
use crate::app::AppContext;
use crate::auth::AuthUser;
use crate::billing::Feature;
use crate::email::templates;
use crate::error::{CorpdeskError, Result};
use crate::http::{CreatedResponse, JsonBody, NoContentResponse, QueryParams, RouteModule};
use crate::models::{Company, Contract, ContractStatus, Note, PortalToken};
use crate::utils::{format_money, generate_token, hash_token};

pub struct ContractsModule;

impl RouteModule for ContractsModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/api/contracts", get(list_contracts).post(create_contract))
            .route(
                "/api/contracts/{id}",
                get(get_contract).put(update_contract).delete(delete_contract),
            )
            .route("/api/contracts/{id}/portal-link", post(create_portal_link))
    }
}

#[derive(Deserialize)]
struct ListQuery {
    company_id: Option<String>,
}

async fn list_contracts(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    QueryParams(query): QueryParams<ListQuery>,
) -> Result<Json<Vec<Contract>>> {
    let contracts: Vec<Contract> = match query.company_id {
        Some(company_id) => {
            let company: Company = load_owned(&ctx, &company_id, &user).await?;
            ctx.db().find_by_parent_id(&company.id).await?
        }
        None => ctx.db().find_by_user_id(&user.id).await?,
    };
    Ok(Json(contracts))
}

#[derive(Deserialize)]
struct CreateContractRequest {
    company_id: String,
    title: String,
    description: Option<String>,
    client_name: String,
    client_email: Option<String>,
    amount_cents: i64,
    currency: Option<String>,
    due_date: Option<NaiveDate>,
}

fn normalize_currency(currency: Option<String>) -> Result<String> {
    let Some(currency) = optional_text(currency) else {
        return Ok("usd".to_string());
    };
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(CorpdeskError::bad_request(
            "currency must be a three-letter ISO code",
        ));
    }
    Ok(currency.to_ascii_lowercase())
}

/// Largest amount Stripe accepts for a single charge, in minor units.
const MAX_AMOUNT_CENTS: i64 = 99_999_999;

fn validate_amount(amount_cents: i64) -> Result<()> {
    if amount_cents < 0 {
        return Err(CorpdeskError::bad_request("amount_cents must not be negative"));
    }
    if amount_cents > MAX_AMOUNT_CENTS {
        return Err(CorpdeskError::bad_request(format!(
            "amount_cents must not exceed {}",
            MAX_AMOUNT_CENTS
        )));
    }
    Ok(())
}

fn client_email(value: Option<String>) -> Result<Option<String>> {
    let email = optional_text(value);
    if let Some(email) = &email {
        validate_email(email)?;
    }
    Ok(email)
}

async fn create_contract(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    JsonBody(req): JsonBody<CreateContractRequest>,
) -> Result<CreatedResponse<Contract>> {
    let company: Company = load_owned(&ctx, &req.company_id, &user).await?;
    let title = required_text("title", &req.title, 200)?;
    let client_name = required_text("client_name", &req.client_name, 200)?;
    validate_amount(req.amount_cents)?;

    let mut contract = Contract::new(&company.id, &user.id, title, client_name, req.amount_cents);
    contract.description = optional_text(req.description);
    contract.client_email = client_email(req.client_email)?;
    contract.currency = normalize_currency(req.currency)?;
    contract.due_date = req.due_date;
    let contract = ctx.db().create(contract).await?;

    tracing::info!(user_id = %user.id, contract_id = %contract.id, "Contract created");
    let location = format!("/api/contracts/{}", contract.id);
    Ok(CreatedResponse::new(contract, location))
}

async fn get_contract(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Contract>> {
    Ok(Json(load_owned(&ctx, &id, &user).await?))
}

#[derive(Deserialize)]
struct UpdateContractRequest {
    title: Option<String>,
    description: Option<String>,
    client_name: Option<String>,
    client_email: Option<String>,
    amount_cents: Option<i64>,
    currency: Option<String>,
    status: Option<ContractStatus>,
    due_date: Option<NaiveDate>,
}

async fn update_contract(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateContractRequest>,
) -> Result<Json<Contract>> {
    let mut contract: Contract = load_owned(&ctx, &id, &user).await?;

    if let Some(title) = req.title {
        contract.title = required_text("title", &title, 200)?;
    }
    if req.description.is_some() {
        contract.description = optional_text(req.description);
    }
    if let Some(client_name) = req.client_name {
        contract.client_name = required_text("client_name", &client_name, 200)?;
    }
    if req.client_email.is_some() {
        contract.client_email = client_email(req.client_email)?;
    }
    if let Some(amount) = req.amount_cents {
        validate_amount(amount)?;
        contract.amount_cents = amount;
    }
    if req.currency.is_some() {
        contract.currency = normalize_currency(req.currency)?;
    }
    if req.due_date.is_some() {
        contract.due_date = req.due_date;
    }
    match req.status {
        Some(ContractStatus::Paid) if contract.status != ContractStatus::Paid => {
            contract.mark_paid(Utc::now());
        }
        Some(status) => {
            contract.status = status;
            if status != ContractStatus::Paid {
                contract.paid_at = None;
            }
        }
        None => {}
    }

    Ok(Json(ctx.db().update(contract).await?))
}

/// Deletes the contract, its portal links and the notes attached to it.
async fn delete_contract(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<NoContentResponse> {
    let contract: Contract = load_owned(&ctx, &id, &user).await?;
    let db = ctx.db();

    for token in db.find_by_parent_id::<PortalToken>(&contract.id).await? {
        db.delete::<PortalToken>(&token.id).await?;
    }
    let notes: Vec<Note> = db.find_by_parent_id(&contract.company_id).await?;
    for note in notes
        .iter()
        .filter(|n| n.contract_id.as_deref() == Some(contract.id.as_str()))
    {
        db.delete::<Note>(&note.id).await?;
    }
    db.delete::<Contract>(&contract.id).await?;

    tracing::info!(user_id = %user.id, contract_id = %contract.id, "Contract deleted");
    Ok(NoContentResponse)
}

#[derive(Deserialize, Default)]
struct PortalLinkRequest {
    #[serde(default)]
    send_email: bool,
}

#[derive(Serialize)]
struct PortalLinkResponse {
    url: String,
    token: String,
    expires_at: DateTime<Utc>,
    emailed: bool,
}

/// Issue a client portal link. Only the hash is stored; the raw token is
/// returned once. A draft contract moves to `sent`.
async fn create_portal_link(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<PortalLinkRequest>,
) -> Result<CreatedResponse<PortalLinkResponse>> {
    let mut contract: Contract = load_owned(&ctx, &id, &user).await?;
    let plan = ctx.subscriptions().effective_plan(&user).await?;
    plan.require(Feature::ClientPortal)?;

    if req.send_email && contract.client_email.is_none() {
        return Err(CorpdeskError::bad_request(
            "Contract has no client email to send the link to",
        ));
    }

    let token = generate_token();
    let expires_at = Utc::now() + ctx.config().auth.portal_token_ttl();
    ctx.db()
        .create(PortalToken::new(
            &contract.id,
            &user.id,
            hash_token(&token),
            expires_at,
        ))
        .await?;

    if contract.status == ContractStatus::Draft {
        contract.status = ContractStatus::Sent;
        contract = ctx.db().update(contract).await?;
    }

    let url = format!("{}/portal/{}", ctx.base_url(), token);
    let mut emailed = false;
    if let Some(to) = contract.client_email.as_deref().filter(|_| req.send_email) {
        let company: Company = ctx.db().get(&contract.company_id).await?;
        let amount = format_money(contract.amount_cents, &contract.currency);
        emailed = ctx
            .notify(
                to,
                templates::portal_invitation(
                    &contract.client_name,
                    &company.name,
                    &contract.title,
                    &amount,
                    &url,
                ),
            )
            .await;
    }

    tracing::info!(user_id = %user.id, contract_id = %contract.id, emailed, "Portal link issued");
    Ok(CreatedResponse::new(
        PortalLinkResponse {
            url,
            token,
            expires_at,
            emailed,
        },
        format!("/api/contracts/{}", contract.id),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_defaults_and_normalizes() {
        assert_eq!(normalize_currency(None).unwrap(), "usd");
        assert_eq!(normalize_currency(Some(" EUR ".into())).unwrap(), "eur");
        assert!(normalize_currency(Some("dollars".into())).is_err());
        assert!(normalize_currency(Some("u5d".into())).is_err());
    }

    #[test]
    fn test_amount_bounds() {
        assert!(validate_amount(0).is_ok());
        assert!(validate_amount(MAX_AMOUNT_CENTS).is_ok());
        assert!(validate_amount(-1).is_err());
        assert!(validate_amount(MAX_AMOUNT_CENTS + 1).is_err());
        assert!(validate_amount(i64::MAX).is_err());
    }
}
