//! Companies, contracts, finances and notes: CRUD, ownership and plan limits.

use corpdesk::auth::Role;
use corpdesk::models::{Contract, Note, PortalToken};
use corpdesk::testing::{self, TestHarness};
use serde_json::{Value, json};

async fn create_company(harness: &TestHarness, token: &str, name: &str) -> Value {
    testing::post(harness.app(), "/api/companies")
        .bearer_token(token)
        .json_body(&json!({
            "name": name,
            "entity_type": "llc",
            "state": "DE",
            "ein": "123456789",
            "address": {
                "line1": "1 Main St",
                "city": "Wilmington",
                "state": "DE",
                "postal_code": "19801",
            },
        }))
        .execute()
        .await
        .assert_created()
        .json_value()
}

#[tokio::test]
async fn test_company_crud() {
    let harness = TestHarness::new();
    let (_, token) = harness.verified_user().await;

    let company = create_company(&harness, &token, "Acme LLC").await;
    assert_eq!(company["ein"], "12-3456789");
    assert_eq!(company["address"]["country"], "US");
    let id = company["id"].as_str().unwrap();

    let listed: Vec<Value> = testing::get(harness.app(), "/api/companies")
        .bearer_token(&token)
        .execute()
        .await
        .assert_ok()
        .json();
    assert_eq!(listed.len(), 1);

    testing::put(harness.app(), &format!("/api/companies/{}", id))
        .bearer_token(&token)
        .json_body(&json!({ "name": "Acme Holdings LLC" }))
        .execute()
        .await
        .assert_ok()
        .assert_json_path("name", json!("Acme Holdings LLC"));

    testing::delete(harness.app(), &format!("/api/companies/{}", id))
        .bearer_token(&token)
        .execute()
        .await
        .assert_no_content();

    testing::get(harness.app(), &format!("/api/companies/{}", id))
        .bearer_token(&token)
        .execute()
        .await
        .assert_not_found();
}

#[tokio::test]
async fn test_company_validation() {
    let harness = TestHarness::new();
    let (_, token) = harness.verified_user().await;

    testing::post(harness.app(), "/api/companies")
        .bearer_token(&token)
        .json_body(&json!({ "name": "  ", "entity_type": "llc" }))
        .execute()
        .await
        .assert_bad_request();

    testing::post(harness.app(), "/api/companies")
        .bearer_token(&token)
        .json_body(&json!({ "name": "Acme", "entity_type": "llc", "ein": "12-34" }))
        .execute()
        .await
        .assert_bad_request();

    testing::post(harness.app(), "/api/companies")
        .bearer_token(&token)
        .json_body(&json!({
            "name": "Acme",
            "entity_type": "llc",
            "address": { "line1": "1 Main St", "city": "", "state": "DE", "postal_code": "" },
        }))
        .execute()
        .await
        .assert_bad_request()
        .assert_contains("postal_code");
}

#[tokio::test]
async fn test_other_users_records_are_forbidden() {
    let harness = TestHarness::new();
    let (owner, _) = harness.verified_user().await;
    let (_, intruder) = harness.verified_user().await;
    let company = harness.company(&owner).await;
    let contract = harness.contract(&company, None).await;

    for uri in [
        format!("/api/companies/{}", company.id),
        format!("/api/contracts/{}", contract.id),
    ] {
        testing::get(harness.app(), &uri)
            .bearer_token(&intruder)
            .execute()
            .await
            .assert_forbidden();
        testing::delete(harness.app(), &uri)
            .bearer_token(&intruder)
            .execute()
            .await
            .assert_forbidden();
    }

    testing::post(harness.app(), "/api/contracts")
        .bearer_token(&intruder)
        .json_body(&json!({
            "company_id": company.id,
            "title": "Sneaky",
            "client_name": "Mallory",
            "amount_cents": 100,
        }))
        .execute()
        .await
        .assert_forbidden();
}

#[tokio::test]
async fn test_free_plan_allows_one_company() {
    let harness = TestHarness::new();
    let (_, free) = harness.verified_user().await;
    create_company(&harness, &free, "First LLC").await;

    testing::post(harness.app(), "/api/companies")
        .bearer_token(&free)
        .json_body(&json!({ "name": "Second LLC", "entity_type": "llc" }))
        .execute()
        .await
        .assert_forbidden();

    let (_, pro) = harness.user(Role::Pro, true).await;
    create_company(&harness, &pro, "First Pro LLC").await;
    create_company(&harness, &pro, "Second Pro LLC").await;
}

#[tokio::test]
async fn test_contract_lifecycle() {
    let harness = TestHarness::new();
    let (user, token) = harness.verified_user().await;
    let company = harness.company(&user).await;

    let contract = testing::post(harness.app(), "/api/contracts")
        .bearer_token(&token)
        .json_body(&json!({
            "company_id": company.id,
            "title": "Brand refresh",
            "client_name": "Initech",
            "client_email": "billing@initech.example",
            "amount_cents": 1_250_00,
            "currency": "EUR",
            "due_date": "2026-12-31",
        }))
        .execute()
        .await
        .assert_created()
        .json_value();
    assert_eq!(contract["currency"], "eur");
    assert_eq!(contract["status"], "draft");
    let id = contract["id"].as_str().unwrap().to_string();

    let listed: Vec<Value> = testing::get(harness.app(), "/api/contracts")
        .bearer_token(&token)
        .with_query(&[("company_id", company.id.as_str())])
        .execute()
        .await
        .assert_ok()
        .json();
    assert_eq!(listed.len(), 1);

    testing::put(harness.app(), &format!("/api/contracts/{}", id))
        .bearer_token(&token)
        .json_body(&json!({ "status": "paid" }))
        .execute()
        .await
        .assert_ok()
        .assert_json_path("status", json!("paid"));

    let stored: Contract = harness.ctx.db().get(&id).await.unwrap();
    assert!(stored.paid_at.is_some());

    testing::post(harness.app(), "/api/contracts")
        .bearer_token(&token)
        .json_body(&json!({
            "company_id": company.id,
            "title": "Refund",
            "client_name": "Initech",
            "amount_cents": -5,
        }))
        .execute()
        .await
        .assert_bad_request();

    for amount in [100_000_000_i64, 5_000_000_000_000_000_000] {
        testing::post(harness.app(), "/api/contracts")
            .bearer_token(&token)
            .json_body(&json!({
                "company_id": company.id,
                "title": "Too much",
                "client_name": "Initech",
                "amount_cents": amount,
            }))
            .execute()
            .await
            .assert_bad_request()
            .assert_contains("amount_cents");
    }
    testing::put(harness.app(), &format!("/api/contracts/{}", id))
        .bearer_token(&token)
        .json_body(&json!({ "amount_cents": 5_000_000_000_000_000_000_i64 }))
        .execute()
        .await
        .assert_bad_request();

    testing::post(harness.app(), "/api/contracts")
        .bearer_token(&token)
        .json_body(&json!({
            "company_id": company.id,
            "title": "Odd money",
            "client_name": "Initech",
            "amount_cents": 5,
            "currency": "dollars",
        }))
        .execute()
        .await
        .assert_bad_request();
}

#[tokio::test]
async fn test_finances_per_period() {
    let harness = TestHarness::new();
    let (user, token) = harness.verified_user().await;
    let company = harness.company(&user).await;
    let uri = format!("/api/companies/{}/finances", company.id);

    for (period, revenue) in [("2026-02", 9_000_00), ("2026-01", 10_000_00)] {
        testing::post(harness.app(), &uri)
            .bearer_token(&token)
            .json_body(&json!({
                "period": period,
                "revenue_cents": revenue,
                "expenses_cents": 4_000_00,
            }))
            .execute()
            .await
            .assert_created();
    }

    testing::post(harness.app(), &uri)
        .bearer_token(&token)
        .json_body(&json!({ "period": "2026-01", "revenue_cents": 1, "expenses_cents": 1 }))
        .execute()
        .await
        .assert_conflict();

    testing::get(harness.app(), &uri)
        .bearer_token(&token)
        .execute()
        .await
        .assert_ok()
        .assert_json_path("0.period", json!("2026-01"))
        .assert_json_path("0.profit_cents", json!(6_000_00))
        .assert_json_path("1.period", json!("2026-02"));
}

#[tokio::test]
async fn test_notes_follow_their_records() {
    let harness = TestHarness::new();
    let (user, token) = harness.verified_user().await;
    let company = harness.company(&user).await;
    let other_company = harness.company(&user).await;
    let contract = harness.contract(&company, None).await;

    let note = testing::post(harness.app(), "/api/notes")
        .bearer_token(&token)
        .json_body(&json!({ "body": "Call the client on Monday", "contract_id": contract.id }))
        .execute()
        .await
        .assert_created()
        .json_value();
    assert_eq!(note["company_id"], json!(company.id));

    testing::post(harness.app(), "/api/notes")
        .bearer_token(&token)
        .json_body(&json!({
            "body": "Mismatched",
            "contract_id": contract.id,
            "company_id": other_company.id,
        }))
        .execute()
        .await
        .assert_bad_request();

    let listed: Vec<Value> = testing::get(harness.app(), "/api/notes")
        .bearer_token(&token)
        .with_query(&[("company_id", company.id.as_str())])
        .execute()
        .await
        .assert_ok()
        .json();
    assert_eq!(listed.len(), 1);

    // Deleting the company takes its contracts, tokens and notes with it.
    harness
        .ctx
        .db()
        .create(PortalToken::new(
            &contract.id,
            &user.id,
            "hash",
            chrono::Utc::now() + chrono::Duration::days(1),
        ))
        .await
        .unwrap();
    testing::delete(harness.app(), &format!("/api/companies/{}", company.id))
        .bearer_token(&token)
        .execute()
        .await
        .assert_no_content();

    let notes: Vec<Note> = harness.ctx.db().find_by_user_id(&user.id).await.unwrap();
    assert!(notes.is_empty());
    let tokens: Vec<PortalToken> = harness.ctx.db().find_by_user_id(&user.id).await.unwrap();
    assert!(tokens.is_empty());
    assert!(
        harness
            .ctx
            .db()
            .find_by_id::<Contract>(&contract.id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_dashboard_summary() {
    let harness = TestHarness::new();
    let (user, token) = harness.verified_user().await;
    let company = harness.company(&user).await;
    let contract = harness.contract(&company, None).await;

    testing::get(harness.app(), "/api/dashboard")
        .bearer_token(&token)
        .execute()
        .await
        .assert_ok()
        .assert_json_path("companies", json!(1))
        .assert_json_path("contracts_by_status.draft", json!(1))
        .assert_json_path("total_contract_value_cents", json!(contract.amount_cents))
        .assert_json_path("plan", json!("free"));
}
