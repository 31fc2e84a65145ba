//! Subscription sync, admin role changes, the billing portal and webhooks.

use corpdesk::auth::Role;
use corpdesk::billing::plans::{GIFT_MONTHLY, PRO_MONTHLY};
use corpdesk::models::{Company, Contract, ContractStatus, Subscription};
use corpdesk::testing::{self, MockStripe, TestHarness};
use serde_json::json;

fn subscription_of(harness: &TestHarness, sub: &Subscription) -> Option<String> {
    sub.stripe_subscription_id
        .as_deref()
        .and_then(|id| harness.stripe().subscription(id))
        .and_then(|s| s.price_id)
}

#[tokio::test]
async fn test_subscription_endpoint_is_idempotent() {
    let harness = TestHarness::new();
    let (_, token) = harness.user(Role::Pro, true).await;

    testing::get(harness.app(), "/api/billing/subscription")
        .bearer_token(&token)
        .execute()
        .await
        .assert_ok()
        .assert_json_path("outcome", json!("created"))
        .assert_json_path("plan", json!("pro"))
        .assert_json_path("features.0", json!("invoice-generation"));
    let writes = harness.stripe().write_count();

    testing::get(harness.app(), "/api/billing/subscription")
        .bearer_token(&token)
        .execute()
        .await
        .assert_ok()
        .assert_json_path("outcome", json!("unchanged"));
    assert_eq!(harness.stripe().write_count(), writes);
}

#[tokio::test]
async fn test_unverified_users_are_not_billed() {
    let harness = TestHarness::new();
    let (_, token) = harness.user(Role::Free, false).await;

    testing::get(harness.app(), "/api/billing/subscription")
        .bearer_token(&token)
        .execute()
        .await
        .assert_ok()
        .assert_json_path("outcome", json!(null))
        .assert_json_path("subscription", json!(null));
    assert_eq!(harness.stripe().write_count(), 0);

    testing::post(harness.app(), "/api/billing/portal")
        .bearer_token(&token)
        .json_body(&json!({}))
        .execute()
        .await
        .assert_forbidden();
}

#[tokio::test]
async fn test_admin_role_change_moves_the_subscription() {
    let harness = TestHarness::new();
    let (_, admin) = harness.admin().await;
    let (user, _) = harness.verified_user().await;
    harness.ctx.subscriptions().ensure_subscription(&user).await.unwrap();

    let body = testing::patch(harness.app(), &format!("/api/admin/users/{}", user.id))
        .bearer_token(&admin)
        .json_body(&json!({ "role": "gift" }))
        .execute()
        .await
        .assert_ok()
        .json_value();
    assert_eq!(body["user"]["role"], "gift");
    assert_eq!(body["subscription"]["outcome"], "updated");
    assert_eq!(body["subscription"]["subscription"]["plan"], "gift");

    let sub = harness.ctx.subscriptions().current(&user.id).await.unwrap().unwrap();
    assert_eq!(
        subscription_of(&harness, &sub),
        Some(MockStripe::price_id(GIFT_MONTHLY))
    );

    // Same role again: nothing to sync.
    testing::patch(harness.app(), &format!("/api/admin/users/{}", user.id))
        .bearer_token(&admin)
        .json_body(&json!({ "role": "gift", "name": "Renamed" }))
        .execute()
        .await
        .assert_ok()
        .assert_json_path("subscription", json!(null))
        .assert_json_path("user.name", json!("Renamed"));
}

#[tokio::test]
async fn test_admin_routes_require_admin() {
    let harness = TestHarness::new();
    let (user, token) = harness.user(Role::Pro, true).await;

    testing::get(harness.app(), "/api/admin/users")
        .bearer_token(&token)
        .execute()
        .await
        .assert_forbidden();
    testing::patch(harness.app(), &format!("/api/admin/users/{}", user.id))
        .bearer_token(&token)
        .json_body(&json!({ "role": "admin" }))
        .execute()
        .await
        .assert_forbidden();

    let (_, admin) = harness.admin().await;
    let users: Vec<serde_json::Value> = testing::get(harness.app(), "/api/admin/users")
        .bearer_token(&admin)
        .execute()
        .await
        .assert_ok()
        .json();
    assert_eq!(users.len(), 2);
    assert!(users.iter().all(|u| u.get("password_hash").is_none()));
}

#[tokio::test]
async fn test_billing_portal_session() {
    let harness = TestHarness::new();
    let (_, token) = harness.user(Role::Pro, true).await;

    let body = testing::post(harness.app(), "/api/billing/portal")
        .bearer_token(&token)
        .json_body(&json!({ "return_url": "https://evil.example/phish" }))
        .execute()
        .await
        .assert_ok()
        .json_value();
    assert!(body["url"].as_str().unwrap().starts_with("https://"));
    assert_eq!(harness.stripe().call_count("create_portal_session"), 1);
    assert_eq!(
        harness.stripe().last_portal_return_url().as_deref(),
        Some("https://app.corpdesk.test/billing")
    );

    for (requested, expected) in [
        (
            "https://app.corpdesk.test.evil.example/phish",
            "https://app.corpdesk.test/billing",
        ),
        (
            "https://app.corpdesk.test/settings?tab=plan",
            "https://app.corpdesk.test/settings?tab=plan",
        ),
    ] {
        testing::post(harness.app(), "/api/billing/portal")
            .bearer_token(&token)
            .json_body(&json!({ "return_url": requested }))
            .execute()
            .await
            .assert_ok();
        assert_eq!(
            harness.stripe().last_portal_return_url().as_deref(),
            Some(expected)
        );
    }
}

#[tokio::test]
async fn test_local_only_billing() {
    let harness = TestHarness::without_stripe();
    let (_, token) = harness.user(Role::Pro, true).await;

    testing::get(harness.app(), "/api/billing/subscription")
        .bearer_token(&token)
        .execute()
        .await
        .assert_ok()
        .assert_json_path("plan", json!("pro"));

    testing::post(harness.app(), "/api/billing/portal")
        .bearer_token(&token)
        .json_body(&json!({}))
        .execute()
        .await
        .assert_status(axum::http::StatusCode::SERVICE_UNAVAILABLE);
}

fn event(id: &str, event_type: &str, object: serde_json::Value) -> String {
    json!({ "id": id, "type": event_type, "created": 0, "data": { "object": object } }).to_string()
}

async fn send_webhook(harness: &TestHarness, payload: &str) -> testing::ScenarioAssert {
    testing::post(harness.app(), "/api/billing/webhook")
        .header("stripe-signature", &TestHarness::sign_webhook(payload))
        .raw_body(payload.to_string(), "application/json")
        .execute()
        .await
}

#[tokio::test]
async fn test_webhook_signature_is_required() {
    let harness = TestHarness::new();
    let payload = event("evt_1", "invoice.paid", json!({}));

    testing::post(harness.app(), "/api/billing/webhook")
        .raw_body(payload.clone(), "application/json")
        .execute()
        .await
        .assert_bad_request();

    testing::post(harness.app(), "/api/billing/webhook")
        .header("stripe-signature", "t=1,v1=deadbeef")
        .raw_body(payload.clone(), "application/json")
        .execute()
        .await
        .assert_bad_request();

    send_webhook(&harness, &payload)
        .await
        .assert_ok()
        .assert_json_path("outcome", json!("ignored"));
}

#[tokio::test]
async fn test_webhook_rejects_out_of_range_timestamps() {
    let harness = TestHarness::new();
    let payload = event("evt_old", "invoice.paid", json!({}));

    for header in ["t=-9223372036854775808,v1=00", "t=9223372036854775807,v1=00"] {
        testing::post(harness.app(), "/api/billing/webhook")
            .header("stripe-signature", header)
            .raw_body(payload.clone(), "application/json")
            .execute()
            .await
            .assert_bad_request()
            .assert_contains("expired");
    }
}

#[tokio::test]
async fn test_webhook_accepts_any_signature_during_rotation() {
    let harness = TestHarness::new();
    let payload = event("evt_rotated", "invoice.paid", json!({}));
    let signed = TestHarness::sign_webhook(&payload);
    let (timestamp, valid) = signed.split_once(",v1=").unwrap();
    let header = format!("{},v1={},v1={}", timestamp, "0".repeat(64), valid);

    testing::post(harness.app(), "/api/billing/webhook")
        .header("stripe-signature", &header)
        .raw_body(payload, "application/json")
        .execute()
        .await
        .assert_ok()
        .assert_json_path("outcome", json!("ignored"));
}

#[tokio::test]
async fn test_checkout_webhook_marks_contract_paid_once() {
    let harness = TestHarness::new();
    let (user, _) = harness.user(Role::Pro, true).await;
    let company = harness.company(&user).await;
    let contract = harness.contract(&company, None).await;

    let paid = event(
        "evt_paid",
        "checkout.session.completed",
        json!({
            "id": "cs_1",
            "payment_status": "paid",
            "metadata": { "contract_id": contract.id },
        }),
    );
    send_webhook(&harness, &paid)
        .await
        .assert_ok()
        .assert_json_path("outcome", json!("processed"));
    send_webhook(&harness, &paid)
        .await
        .assert_ok()
        .assert_json_path("outcome", json!("already_processed"));

    let stored: Contract = harness.ctx.db().get(&contract.id).await.unwrap();
    assert_eq!(stored.status, ContractStatus::Paid);

    let other = harness.contract(&company, None).await;
    let unpaid = event(
        "evt_unpaid",
        "checkout.session.completed",
        json!({
            "id": "cs_2",
            "payment_status": "unpaid",
            "metadata": { "contract_id": other.id },
        }),
    );
    send_webhook(&harness, &unpaid)
        .await
        .assert_ok()
        .assert_json_path("outcome", json!("ignored"));
    let stored: Contract = harness.ctx.db().get(&other.id).await.unwrap();
    assert_eq!(stored.status, ContractStatus::Draft);
}

#[tokio::test]
async fn test_subscription_webhooks_update_the_local_record() {
    let harness = TestHarness::new();
    let (user, _) = harness.verified_user().await;
    let ensured = harness.ctx.subscriptions().ensure_subscription(&user).await.unwrap();
    let sub = ensured.subscription;
    let stripe_id = sub.stripe_subscription_id.clone().unwrap();

    let updated = event(
        "evt_upd",
        "customer.subscription.updated",
        json!({
            "id": stripe_id,
            "customer": sub.stripe_customer_id,
            "status": "active",
            "cancel_at_period_end": false,
            "metadata": { "user_id": user.id },
            "items": { "data": [{
                "id": "si_1",
                "price": { "id": MockStripe::price_id(PRO_MONTHLY), "lookup_key": PRO_MONTHLY },
            }] },
        }),
    );
    send_webhook(&harness, &updated).await.assert_ok();
    let local = harness.ctx.subscriptions().current(&user.id).await.unwrap().unwrap();
    assert_eq!(local.plan, corpdesk::billing::Plan::Pro);

    let deleted = event(
        "evt_del",
        "customer.subscription.deleted",
        json!({ "id": stripe_id }),
    );
    send_webhook(&harness, &deleted).await.assert_ok();
    let local = harness.ctx.subscriptions().current(&user.id).await.unwrap().unwrap();
    assert_eq!(local.status, "canceled");
    assert_eq!(local.plan, corpdesk::billing::Plan::Free);
}

#[tokio::test]
async fn test_account_webhook_enables_charges() {
    let harness = TestHarness::new();
    let (user, _) = harness.user(Role::Pro, true).await;
    let mut company = harness.company(&user).await;
    company.connect_account_id = Some("acct_hook".into());
    let company = harness.ctx.db().update(company).await.unwrap();

    let payload = event(
        "evt_acct",
        "account.updated",
        json!({ "id": "acct_hook", "charges_enabled": true, "details_submitted": true }),
    );
    send_webhook(&harness, &payload)
        .await
        .assert_ok()
        .assert_json_path("outcome", json!("processed"));

    let stored: Company = harness.ctx.db().get(&company.id).await.unwrap();
    assert!(stored.connect_charges_enabled);
    assert!(stored.connect_details_submitted);
}
