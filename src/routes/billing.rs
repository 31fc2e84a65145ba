use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::app::AppContext;
use crate::auth::{AuthUser, VerifiedUser};
use crate::billing::{EnsureOutcome, Feature, Plan};
use crate::error::{CorpdeskError, Result};
use crate::http::{JsonBody, RouteModule};
use crate::models::Subscription;
use crate::utils::is_under_base_url;

pub struct BillingModule;

impl RouteModule for BillingModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/subscription", get(subscription))
            .route("/portal", post(portal))
            .route("/webhook", post(webhook))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/api/billing")
    }
}

#[derive(Serialize)]
struct SubscriptionResponse {
    subscription: Option<Subscription>,
    /// What syncing did; absent until the email address is verified.
    outcome: Option<EnsureOutcome>,
    plan: Plan,
    features: &'static [Feature],
}

/// The caller's subscription. For verified users billing is first brought
/// in line with their role, which also retries a sync that failed at
/// verification time.
async fn subscription(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
) -> Result<Json<SubscriptionResponse>> {
    let (subscription, outcome) = if user.email_verified {
        let ensured = ctx.subscriptions().ensure_subscription(&user).await?;
        (Some(ensured.subscription), Some(ensured.outcome))
    } else {
        (ctx.subscriptions().current(&user.id).await?, None)
    };

    let plan = subscription
        .as_ref()
        .map(|s| s.plan)
        .unwrap_or_else(|| Plan::for_role(user.role));

    Ok(Json(SubscriptionResponse {
        subscription,
        outcome,
        plan,
        features: plan.features(),
    }))
}

#[derive(Deserialize, Default)]
struct PortalRequest {
    return_url: Option<String>,
}

#[derive(Serialize)]
struct PortalResponse {
    url: String,
}

async fn portal(
    State(ctx): State<AppContext>,
    VerifiedUser(user): VerifiedUser,
    JsonBody(req): JsonBody<PortalRequest>,
) -> Result<Json<PortalResponse>> {
    let return_url = req
        .return_url
        .filter(|url| is_under_base_url(url, ctx.base_url()))
        .or_else(|| ctx.config().stripe.portal_return_url.clone())
        .unwrap_or_else(|| format!("{}/billing", ctx.base_url()));

    let url = ctx.subscriptions().portal_url(&user, &return_url).await?;
    Ok(Json(PortalResponse { url }))
}

#[derive(Serialize)]
struct WebhookResponse {
    received: bool,
    outcome: &'static str,
}

/// Stripe webhook intake. The raw body is needed for the signature check.
async fn webhook(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>> {
    let handler = ctx.webhooks()?;
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| CorpdeskError::bad_request("Missing Stripe-Signature header"))?;

    let event = handler.verify_signature(&body, signature)?;
    let event_id = event.id.clone();
    let outcome = handler.handle_event(event).await?;

    tracing::info!(event_id = %event_id, outcome = outcome.as_str(), "Webhook handled");
    Ok(Json(WebhookResponse {
        received: true,
        outcome: outcome.as_str(),
    }))
}
