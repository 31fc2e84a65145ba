//! Ready-wired application state for handler and integration tests.

use axum::Router;
use secrecy::SecretString;
use std::sync::Arc;
use uuid::Uuid;

use super::fakes::{MockStripe, RecordingMailer, ScriptedChat, StaticPdfRenderer};
use crate::app::AppContext;
use crate::auth::{PasswordConfig, Role};
use crate::billing::StripeConfig;
use crate::billing::webhook::sign_payload;
use crate::config::{Config, ConfigBuilder};
use crate::core::App;
use crate::models::{Company, Contract, EntityType, User};

pub const TEST_BASE_URL: &str = "https://app.corpdesk.test";
pub const TEST_JWT_SECRET: &str = "corpdesk-test-secret-0123456789abcdef";
pub const TEST_WEBHOOK_SECRET: &str = "whsec_corpdesk_test";
/// Password set on every seeded user.
pub const TEST_PASSWORD: &str = "correct horse battery";

/// Random values for test data.
pub mod fake {
    use super::*;

    pub fn email() -> String {
        format!("test-{}@example.com", Uuid::new_v4().simple())
    }

    pub fn uuid() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn name() -> String {
        format!("Test User {}", &Uuid::new_v4().simple().to_string()[..8])
    }

    pub fn company_name() -> String {
        format!("Test Co {} LLC", &Uuid::new_v4().simple().to_string()[..6])
    }

    /// A well-formed EIN, `XX-XXXXXXX`.
    pub fn ein() -> String {
        format!("{:02}-{:07}", fastrand::u32(10..99), fastrand::u32(0..9_999_999))
    }

    pub fn amount_cents() -> i64 {
        fastrand::i64(1_00..10_000_00)
    }
}

/// An [`AppContext`] over in-memory storage and recording fakes, plus the
/// router built from it.
pub struct TestHarness {
    pub ctx: AppContext,
    pub mailer: Arc<RecordingMailer>,
    pub pdf: Arc<StaticPdfRenderer>,
    stripe: Option<Arc<MockStripe>>,
    router: Router,
}

impl TestHarness {
    /// Billing against a provisioned [`MockStripe`] with webhooks enabled.
    pub fn new() -> Self {
        Self::build(Some(Arc::new(MockStripe::provisioned())), None)
    }

    /// Billing in local-only mode.
    pub fn without_stripe() -> Self {
        Self::build(None, None)
    }

    /// Like [`new`](Self::new) with invoice drafting through `chat`.
    pub fn with_chat(chat: Arc<ScriptedChat>) -> Self {
        Self::build(Some(Arc::new(MockStripe::provisioned())), Some(chat))
    }

    pub fn config() -> Config {
        let stripe = StripeConfig {
            webhook_secret: Some(SecretString::from(TEST_WEBHOOK_SECRET)),
            ..StripeConfig::default()
        };
        ConfigBuilder::new()
            .with_base_url(TEST_BASE_URL)
            .with_jwt_secret(TEST_JWT_SECRET)
            .with_stripe(stripe)
            .build()
            .expect("test config is valid")
    }

    fn build(stripe: Option<Arc<MockStripe>>, chat: Option<Arc<ScriptedChat>>) -> Self {
        let mailer = Arc::new(RecordingMailer::new());
        let pdf = Arc::new(StaticPdfRenderer::new());

        let mut builder = AppContext::builder(Self::config())
            .with_password_config(PasswordConfig::fast())
            .with_mailer(mailer.clone())
            .with_pdf_renderer(pdf.clone());
        if let Some(stripe) = &stripe {
            builder = builder.with_stripe(stripe.clone());
        }
        if let Some(chat) = chat {
            builder = builder.with_chat(chat);
        }
        let ctx = builder.build();
        let router = App::new(ctx.clone()).into_router();

        Self {
            ctx,
            mailer,
            pdf,
            stripe,
            router,
        }
    }

    pub fn app(&self) -> Router {
        self.router.clone()
    }

    /// The mock behind billing. Panics for [`without_stripe`](Self::without_stripe).
    pub fn stripe(&self) -> &MockStripe {
        self.stripe.as_deref().expect("harness has no Stripe mock")
    }

    /// Insert a user directly and return it with a session token.
    pub async fn user(&self, role: Role, verified: bool) -> (User, String) {
        let hash = self.ctx.passwords().hash(TEST_PASSWORD).unwrap();
        let mut user = User::new(&fake::email(), fake::name(), hash);
        user.role = role;
        user.email_verified = verified;
        let user = self.ctx.db().create(user).await.unwrap();
        let token = self.ctx.sessions().issue(&user).unwrap();
        (user, token)
    }

    /// A verified free-plan user.
    pub async fn verified_user(&self) -> (User, String) {
        self.user(Role::Free, true).await
    }

    pub async fn admin(&self) -> (User, String) {
        self.user(Role::Admin, true).await
    }

    pub async fn company(&self, owner: &User) -> Company {
        let company = Company::new(&owner.id, fake::company_name(), EntityType::Llc);
        self.ctx.db().create(company).await.unwrap()
    }

    pub async fn contract(&self, company: &Company, client_email: Option<&str>) -> Contract {
        let mut contract = Contract::new(
            &company.id,
            &company.user_id,
            "Website rebuild",
            "Globex Corporation",
            fake::amount_cents(),
        );
        contract.client_email = client_email.map(str::to_string);
        self.ctx.db().create(contract).await.unwrap()
    }

    /// A `Stripe-Signature` header value for `payload`, signed now.
    pub fn sign_webhook(payload: &str) -> String {
        sign_payload(
            TEST_WEBHOOK_SECRET,
            chrono::Utc::now().timestamp(),
            payload.as_bytes(),
        )
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
