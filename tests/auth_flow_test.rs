//! Registration, verification and session handling over HTTP.

use corpdesk::testing::{self, TEST_PASSWORD, TestHarness};
use serde_json::{Value, json};

async fn register(harness: &TestHarness, email: &str) -> Value {
    testing::post(harness.app(), "/api/auth/register")
        .json_body(&json!({
            "email": email,
            "password": TEST_PASSWORD,
            "name": "Ada Lovelace",
        }))
        .execute()
        .await
        .assert_created()
        .assert_header("location", "/api/users/me")
        .json_value()
}

fn verification_token(harness: &TestHarness) -> String {
    let link = harness
        .mailer
        .link_containing("verify-email")
        .expect("verification email sent");
    link.split("token=").nth(1).unwrap().to_string()
}

#[tokio::test]
async fn test_register_verify_and_login() {
    let harness = TestHarness::new();
    let body = register(&harness, "Ada@Example.com").await;
    assert_eq!(body["user"]["email"], "ada@example.com");
    assert_eq!(body["user"]["email_verified"], false);
    let session = body["token"].as_str().unwrap().to_string();

    // Nothing is billed before the address is confirmed.
    assert_eq!(harness.stripe().write_count(), 0);

    let token = verification_token(&harness);
    let verified = testing::post(harness.app(), "/api/auth/verify-email")
        .json_body(&json!({ "token": token }))
        .execute()
        .await
        .assert_ok()
        .json_value();
    assert_eq!(verified["user"]["email_verified"], true);
    assert_eq!(verified["plan"], "free");
    assert_eq!(verified["subscription"]["outcome"], "created");
    assert_eq!(harness.stripe().call_count("create_customer"), 1);
    assert_eq!(harness.stripe().call_count("create_subscription"), 1);

    let welcome = harness.mailer.sent_to("ada@example.com");
    assert!(welcome.iter().any(|e| e.subject == "Welcome to Corpdesk"));

    // Tokens are single use.
    testing::post(harness.app(), "/api/auth/verify-email")
        .json_body(&json!({ "token": token }))
        .execute()
        .await
        .assert_bad_request();

    testing::post(harness.app(), "/api/auth/login")
        .json_body(&json!({ "email": "ada@example.com", "password": TEST_PASSWORD }))
        .execute()
        .await
        .assert_ok();

    testing::get(harness.app(), "/api/users/me")
        .bearer_token(&session)
        .execute()
        .await
        .assert_ok()
        .assert_json_path("email_verified", json!(true))
        .assert_json_path("plan", json!("free"));
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let harness = TestHarness::new();
    register(&harness, "grace@example.com").await;

    testing::post(harness.app(), "/api/auth/register")
        .json_body(&json!({ "email": "GRACE@example.com", "password": TEST_PASSWORD }))
        .execute()
        .await
        .assert_conflict();
}

#[tokio::test]
async fn test_register_rejects_bad_input() {
    let harness = TestHarness::new();
    testing::post(harness.app(), "/api/auth/register")
        .json_body(&json!({ "email": "not-an-email", "password": TEST_PASSWORD }))
        .execute()
        .await
        .assert_bad_request();

    testing::post(harness.app(), "/api/auth/register")
        .json_body(&json!({ "email": "short@example.com", "password": "abc" }))
        .execute()
        .await
        .assert_bad_request();
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let harness = TestHarness::new();
    register(&harness, "alan@example.com").await;

    let wrong_password = testing::post(harness.app(), "/api/auth/login")
        .json_body(&json!({ "email": "alan@example.com", "password": "wrong password!" }))
        .execute()
        .await
        .assert_unauthorized()
        .json_value();
    let unknown_user = testing::post(harness.app(), "/api/auth/login")
        .json_body(&json!({ "email": "nobody@example.com", "password": TEST_PASSWORD }))
        .execute()
        .await
        .assert_unauthorized()
        .json_value();
    assert_eq!(wrong_password["error"], unknown_user["error"]);
}

#[tokio::test]
async fn test_session_required() {
    let harness = TestHarness::new();
    testing::get(harness.app(), "/api/users/me")
        .execute()
        .await
        .assert_unauthorized();

    testing::get(harness.app(), "/api/users/me")
        .bearer_token("not-a-jwt")
        .execute()
        .await
        .assert_unauthorized();
}

#[tokio::test]
async fn test_resend_verification() {
    let harness = TestHarness::new();
    let (_, unverified) = harness.user(corpdesk::auth::Role::Free, false).await;
    testing::post(harness.app(), "/api/auth/resend-verification")
        .bearer_token(&unverified)
        .execute()
        .await
        .assert_ok()
        .assert_json_path("sent", json!(true));
    assert!(harness.mailer.link_containing("verify-email").is_some());

    let (_, verified) = harness.verified_user().await;
    testing::post(harness.app(), "/api/auth/resend-verification")
        .bearer_token(&verified)
        .execute()
        .await
        .assert_conflict();
}

#[tokio::test]
async fn test_verification_survives_billing_outage() {
    let harness = TestHarness::new();
    harness.stripe().fail_on("create_customer");
    register(&harness, "outage@example.com").await;

    let body = testing::post(harness.app(), "/api/auth/verify-email")
        .json_body(&json!({ "token": verification_token(&harness) }))
        .execute()
        .await
        .assert_ok()
        .json_value();
    assert_eq!(body["user"]["email_verified"], true);
    assert!(body["subscription"].is_null());
}

#[tokio::test]
async fn test_profile_image_upload() {
    let harness = TestHarness::new();
    let (_, token) = harness.verified_user().await;

    let png = [
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R',
    ];
    let body = testing::post(harness.app(), "/api/users/me/profile-image")
        .bearer_token(&token)
        .raw_body(png.to_vec(), "image/png")
        .execute()
        .await
        .assert_ok()
        .json_value();
    assert!(body["profile_image_url"].as_str().unwrap().ends_with(".png"));

    testing::post(harness.app(), "/api/users/me/profile-image")
        .bearer_token(&token)
        .raw_body(b"plain text".to_vec(), "image/png")
        .execute()
        .await
        .assert_bad_request();
}
