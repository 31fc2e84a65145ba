use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, put},
};
use serde::{Deserialize, Serialize};

use super::{load_owned, optional_text, required_text};
use crate::app::AppContext;
use crate::auth::AuthUser;
use crate::billing::{Feature, Onboarding};
use crate::error::{CorpdeskError, Result};
use crate::http::{CreatedResponse, JsonBody, NoContentResponse, RouteModule};
use crate::models::{
    Address, Company, CompanyFinance, Contract, EntityType, Note, PortalToken, is_valid_period,
};

pub struct CompaniesModule;

impl RouteModule for CompaniesModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/api/companies", get(list_companies).post(create_company))
            .route(
                "/api/companies/{id}",
                get(get_company).put(update_company).delete(delete_company),
            )
            .route(
                "/api/companies/{id}/finances",
                get(list_finances).post(create_finance),
            )
            .route(
                "/api/companies/{id}/connect",
                get(connect_status).post(start_connect),
            )
            .route(
                "/api/finances/{id}",
                put(update_finance).delete(delete_finance),
            )
    }
}

#[derive(Deserialize)]
struct CreateCompanyRequest {
    name: String,
    entity_type: EntityType,
    state: Option<String>,
    address: Option<Address>,
    ein: Option<String>,
}

fn validate_address(address: &Option<Address>) -> Result<()> {
    if let Some(address) = address {
        let missing = address.missing_fields();
        if !missing.is_empty() {
            return Err(CorpdeskError::bad_request(format!(
                "Missing fields: {}",
                missing.join(", ")
            )));
        }
    }
    Ok(())
}

/// `XX-XXXXXXX`; the dash is optional on input.
fn normalize_ein(ein: Option<String>) -> Result<Option<String>> {
    let Some(ein) = optional_text(ein) else {
        return Ok(None);
    };
    let digits: String = ein.chars().filter(|c| *c != '-').collect();
    if digits.len() != 9 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(CorpdeskError::bad_request("EIN must have 9 digits"));
    }
    Ok(Some(format!("{}-{}", &digits[..2], &digits[2..])))
}

async fn list_companies(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Company>>> {
    Ok(Json(ctx.db().find_by_user_id(&user.id).await?))
}

async fn create_company(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    JsonBody(req): JsonBody<CreateCompanyRequest>,
) -> Result<CreatedResponse<Company>> {
    let name = required_text("name", &req.name, 200)?;
    validate_address(&req.address)?;
    let ein = normalize_ein(req.ein)?;

    let plan = ctx.subscriptions().effective_plan(&user).await?;
    if let Some(limit) = plan.company_limit() {
        let owned: Vec<Company> = ctx.db().find_by_user_id(&user.id).await?;
        if owned.len() >= limit {
            plan.require(Feature::UnlimitedCompanies)?;
        }
    }

    let mut company = Company::new(&user.id, name, req.entity_type);
    company.state = optional_text(req.state);
    company.address = req.address;
    company.ein = ein;
    let company = ctx.db().create(company).await?;

    tracing::info!(user_id = %user.id, company_id = %company.id, "Company created");
    let location = format!("/api/companies/{}", company.id);
    Ok(CreatedResponse::new(company, location))
}

async fn get_company(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Company>> {
    Ok(Json(load_owned(&ctx, &id, &user).await?))
}

#[derive(Deserialize)]
struct UpdateCompanyRequest {
    name: Option<String>,
    entity_type: Option<EntityType>,
    state: Option<String>,
    address: Option<Address>,
    ein: Option<String>,
}

async fn update_company(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateCompanyRequest>,
) -> Result<Json<Company>> {
    let mut company: Company = load_owned(&ctx, &id, &user).await?;

    if let Some(name) = req.name {
        company.name = required_text("name", &name, 200)?;
    }
    if let Some(entity_type) = req.entity_type {
        company.entity_type = entity_type;
    }
    if req.state.is_some() {
        company.state = optional_text(req.state);
    }
    if req.address.is_some() {
        validate_address(&req.address)?;
        company.address = req.address;
    }
    if req.ein.is_some() {
        company.ein = normalize_ein(req.ein)?;
    }

    Ok(Json(ctx.db().update(company).await?))
}

/// Deletes the company with its contracts, their portal links, finances and notes.
async fn delete_company(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<NoContentResponse> {
    let company: Company = load_owned(&ctx, &id, &user).await?;
    let db = ctx.db();

    let contracts: Vec<Contract> = db.find_by_parent_id(&company.id).await?;
    for contract in &contracts {
        for token in db.find_by_parent_id::<PortalToken>(&contract.id).await? {
            db.delete::<PortalToken>(&token.id).await?;
        }
        db.delete::<Contract>(&contract.id).await?;
    }
    let finances: Vec<CompanyFinance> = db.find_by_parent_id(&company.id).await?;
    for finance in &finances {
        db.delete::<CompanyFinance>(&finance.id).await?;
    }
    let notes: Vec<Note> = db.find_by_parent_id(&company.id).await?;
    for note in &notes {
        db.delete::<Note>(&note.id).await?;
    }
    db.delete::<Company>(&company.id).await?;

    tracing::info!(
        user_id = %user.id,
        company_id = %company.id,
        contracts = contracts.len(),
        finances = finances.len(),
        notes = notes.len(),
        "Company deleted"
    );
    Ok(NoContentResponse)
}

#[derive(Serialize)]
struct FinanceView {
    #[serde(flatten)]
    finance: CompanyFinance,
    profit_cents: i64,
}

impl From<CompanyFinance> for FinanceView {
    fn from(finance: CompanyFinance) -> Self {
        Self {
            profit_cents: finance.profit_cents(),
            finance,
        }
    }
}

#[derive(Deserialize)]
struct FinanceRequest {
    period: String,
    revenue_cents: i64,
    expenses_cents: i64,
    notes: Option<String>,
}

fn validate_finance(req: &FinanceRequest) -> Result<()> {
    if !is_valid_period(req.period.trim()) {
        return Err(CorpdeskError::bad_request("period must be YYYY-MM"));
    }
    if req.revenue_cents < 0 || req.expenses_cents < 0 {
        return Err(CorpdeskError::bad_request(
            "revenue_cents and expenses_cents must not be negative",
        ));
    }
    Ok(())
}

async fn list_finances(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<FinanceView>>> {
    let company: Company = load_owned(&ctx, &id, &user).await?;
    let mut finances: Vec<CompanyFinance> = ctx.db().find_by_parent_id(&company.id).await?;
    finances.sort_by(|a, b| a.period.cmp(&b.period));
    Ok(Json(finances.into_iter().map(FinanceView::from).collect()))
}

async fn create_finance(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<FinanceRequest>,
) -> Result<CreatedResponse<FinanceView>> {
    let company: Company = load_owned(&ctx, &id, &user).await?;
    validate_finance(&req)?;
    let period = req.period.trim().to_string();

    let existing: Vec<CompanyFinance> = ctx.db().find_by_parent_id(&company.id).await?;
    if existing.iter().any(|f| f.period == period) {
        return Err(CorpdeskError::conflict(format!(
            "Finances for {} already recorded",
            period
        )));
    }

    let mut finance = CompanyFinance::new(
        &company.id,
        &user.id,
        period,
        req.revenue_cents,
        req.expenses_cents,
    );
    finance.notes = optional_text(req.notes);
    let finance = ctx.db().create(finance).await?;

    let location = format!("/api/finances/{}", finance.id);
    Ok(CreatedResponse::new(FinanceView::from(finance), location))
}

async fn update_finance(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<FinanceRequest>,
) -> Result<Json<FinanceView>> {
    let mut finance: CompanyFinance = load_owned(&ctx, &id, &user).await?;
    validate_finance(&req)?;
    let period = req.period.trim().to_string();

    if period != finance.period {
        let siblings: Vec<CompanyFinance> = ctx.db().find_by_parent_id(&finance.company_id).await?;
        if siblings.iter().any(|f| f.period == period && f.id != finance.id) {
            return Err(CorpdeskError::conflict(format!(
                "Finances for {} already recorded",
                period
            )));
        }
    }

    finance.period = period;
    finance.revenue_cents = req.revenue_cents;
    finance.expenses_cents = req.expenses_cents;
    finance.notes = optional_text(req.notes);
    Ok(Json(FinanceView::from(ctx.db().update(finance).await?)))
}

async fn delete_finance(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<NoContentResponse> {
    let finance: CompanyFinance = load_owned(&ctx, &id, &user).await?;
    ctx.db().delete::<CompanyFinance>(&finance.id).await?;
    Ok(NoContentResponse)
}

/// Create the company's Connect account if needed and return an onboarding link.
async fn start_connect(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Onboarding>> {
    let company: Company = load_owned(&ctx, &id, &user).await?;
    let plan = ctx.subscriptions().effective_plan(&user).await?;
    plan.require(Feature::StripeConnect)?;

    Ok(Json(ctx.connect().start_onboarding(company, &user).await?))
}

#[derive(Serialize)]
struct ConnectStatus {
    account_id: Option<String>,
    charges_enabled: bool,
    details_submitted: bool,
}

async fn connect_status(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ConnectStatus>> {
    let company: Company = load_owned(&ctx, &id, &user).await?;
    let company = ctx.connect().refresh_status(company).await?;
    Ok(Json(ConnectStatus {
        account_id: company.connect_account_id,
        charges_enabled: company.connect_charges_enabled,
        details_submitted: company.connect_details_submitted,
    }))
}
