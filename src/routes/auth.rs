use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};

use super::{required_text, validate_email};
use crate::app::AppContext;
use crate::auth::{AuthUser, consume_verification_token, issue_verification_token, validate_password};
use crate::billing::{EnsuredSubscription, Plan};
use crate::email::templates;
use crate::error::{CorpdeskError, Result};
use crate::http::{CreatedResponse, JsonBody, RouteModule};
use crate::models::{User, UserView, normalize_email};

pub struct AuthModule;

impl RouteModule for AuthModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/register", post(register))
            .route("/login", post(login))
            .route("/verify-email", post(verify_email))
            .route("/resend-verification", post(resend_verification))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/api/auth")
    }
}

#[derive(Deserialize)]
struct RegisterRequest {
    email: String,
    password: String,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct SessionResponse {
    token: String,
    expires_in: u64,
    user: UserView,
}

async fn send_verification(ctx: &AppContext, user: &User) -> Result<bool> {
    let token =
        issue_verification_token(ctx.db(), &user.id, ctx.config().auth.verification_ttl()).await?;
    let link = format!("{}/verify-email?token={}", ctx.base_url(), token);
    Ok(ctx
        .notify(&user.email, templates::verification(&user.name, &link))
        .await)
}

async fn register(
    State(ctx): State<AppContext>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<CreatedResponse<SessionResponse>> {
    validate_email(&req.email)?;
    validate_password(&req.password)?;
    let name = if req.name.trim().is_empty() {
        String::new()
    } else {
        required_text("name", &req.name, 100)?
    };

    let email = normalize_email(&req.email);
    if ctx.db().find_by_lookup_key::<User>(&email).await?.is_some() {
        return Err(CorpdeskError::conflict("An account with this email already exists"));
    }

    let hash = ctx.passwords().hash(&req.password)?;
    let user = ctx.db().create(User::new(&email, name, hash)).await?;
    tracing::info!(user_id = %user.id, "User registered");

    send_verification(&ctx, &user).await?;

    let token = ctx.sessions().issue(&user)?;
    Ok(CreatedResponse::new(
        SessionResponse {
            token,
            expires_in: ctx.sessions().ttl_secs(),
            user: UserView::from(&user),
        },
        "/api/users/me",
    ))
}

async fn login(
    State(ctx): State<AppContext>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<Json<SessionResponse>> {
    let invalid = || CorpdeskError::unauthorized("Invalid email or password");

    let user = ctx
        .db()
        .find_by_lookup_key::<User>(&normalize_email(&req.email))
        .await?
        .ok_or_else(invalid)?;

    if !ctx.passwords().verify(&req.password, &user.password_hash)? {
        tracing::info!(user_id = %user.id, "Failed login attempt");
        return Err(invalid());
    }

    let token = ctx.sessions().issue(&user)?;
    Ok(Json(SessionResponse {
        token,
        expires_in: ctx.sessions().ttl_secs(),
        user: UserView::from(&user),
    }))
}

#[derive(Deserialize)]
struct VerifyEmailRequest {
    token: String,
}

#[derive(Serialize)]
struct VerifyEmailResponse {
    user: UserView,
    plan: Plan,
    /// Absent when billing could not be synced; it is retried on the next
    /// subscription request.
    subscription: Option<EnsuredSubscription>,
}

/// Consume the token, mark the email verified, bring billing in line with
/// the user's role and send the welcome email.
async fn verify_email(
    State(ctx): State<AppContext>,
    JsonBody(req): JsonBody<VerifyEmailRequest>,
) -> Result<Json<VerifyEmailResponse>> {
    if req.token.trim().is_empty() {
        return Err(CorpdeskError::bad_request("token is required"));
    }
    let user_id = consume_verification_token(ctx.db(), &req.token).await?;
    let mut user: User = ctx.db().get(&user_id).await?;

    if !user.email_verified {
        user.email_verified = true;
        user = ctx.db().update(user).await?;
        tracing::info!(user_id = %user.id, "Email verified");
    }

    let subscription = match ctx.subscriptions().ensure_subscription(&user).await {
        Ok(ensured) => Some(ensured),
        Err(e) => {
            tracing::error!(user_id = %user.id, error = %e, "Subscription sync after verification failed");
            None
        }
    };
    let plan = subscription
        .as_ref()
        .map(|s| s.subscription.plan)
        .unwrap_or_else(|| Plan::for_role(user.role));

    let dashboard = format!("{}/dashboard", ctx.base_url());
    ctx.notify(&user.email, templates::welcome(&user.name, plan, &dashboard))
        .await;

    Ok(Json(VerifyEmailResponse {
        user: UserView::from(&user),
        plan,
        subscription,
    }))
}

#[derive(Serialize)]
struct ResendResponse {
    sent: bool,
}

async fn resend_verification(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser,
) -> Result<Json<ResendResponse>> {
    if user.email_verified {
        return Err(CorpdeskError::conflict("Email address is already verified"));
    }
    let sent = send_verification(&ctx, &user).await?;
    Ok(Json(ResendResponse { sent }))
}
