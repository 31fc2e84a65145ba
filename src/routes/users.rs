use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};

use super::required_text;
use crate::app::AppContext;
use crate::auth::{AdminUser, AuthUser, Role};
use crate::billing::{EnsuredSubscription, Plan};
use crate::error::Result;
use crate::http::{JsonBody, RouteModule};
use crate::models::{User, UserView};
use crate::storage::{profile_image_key, validate_profile_image};

pub struct UsersModule;

impl RouteModule for UsersModule {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/api/users/me", get(me).patch(update_me))
            .route("/api/users/me/profile-image", post(upload_profile_image))
            .route("/api/admin/users", get(list_users))
            .route("/api/admin/users/{id}", patch(edit_user))
    }
}

#[derive(Serialize)]
struct MeResponse {
    #[serde(flatten)]
    user: UserView,
    plan: Plan,
}

async fn me(State(ctx): State<AppContext>, AuthUser(user): AuthUser) -> Result<Json<MeResponse>> {
    let plan = ctx.subscriptions().effective_plan(&user).await?;
    Ok(Json(MeResponse {
        user: UserView::from(&user),
        plan,
    }))
}

#[derive(Deserialize)]
struct UpdateMeRequest {
    name: String,
}

async fn update_me(
    State(ctx): State<AppContext>,
    AuthUser(mut user): AuthUser,
    JsonBody(req): JsonBody<UpdateMeRequest>,
) -> Result<Json<UserView>> {
    user.name = required_text("name", &req.name, 100)?;
    let user = ctx.db().update(user).await?;
    Ok(Json(UserView::from(&user)))
}

/// Raw image bytes as the request body. The previous image is removed.
async fn upload_profile_image(
    State(ctx): State<AppContext>,
    AuthUser(mut user): AuthUser,
    body: Bytes,
) -> Result<Json<UserView>> {
    let kind = validate_profile_image(&body)?;
    let key = profile_image_key(&user.id, kind);
    let url = ctx
        .storage()
        .put(&key, body.to_vec(), kind.content_type())
        .await?;

    let previous = user.profile_image_url.replace(url);
    let user = ctx.db().update(user).await?;

    if let Some(old_key) = previous
        .as_deref()
        .and_then(|old| ctx.storage().key_for_url(old))
    {
        if let Err(e) = ctx.storage().delete(old_key).await {
            tracing::warn!(user_id = %user.id, error = %e, "Failed to delete old profile image");
        }
    }

    tracing::info!(user_id = %user.id, size = body.len(), "Profile image updated");
    Ok(Json(UserView::from(&user)))
}

async fn list_users(
    State(ctx): State<AppContext>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<Vec<UserView>>> {
    let users: Vec<User> = ctx.db().list().await?;
    Ok(Json(users.iter().map(UserView::from).collect()))
}

#[derive(Deserialize)]
struct EditUserRequest {
    role: Option<Role>,
    name: Option<String>,
    email_verified: Option<bool>,
}

#[derive(Serialize)]
struct EditUserResponse {
    user: UserView,
    /// Present when the role changed and billing was brought in line.
    subscription: Option<EnsuredSubscription>,
}

/// `editUser`: role, name and verification flag. A role change moves the
/// user's subscription to the matching plan.
async fn edit_user(
    State(ctx): State<AppContext>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<EditUserRequest>,
) -> Result<Json<EditUserResponse>> {
    let mut user: User = ctx.db().get(&id).await?;

    let role_changed = matches!(req.role, Some(role) if role != user.role);
    if let Some(role) = req.role {
        user.role = role;
    }
    if let Some(name) = req.name {
        user.name = required_text("name", &name, 100)?;
    }
    if let Some(verified) = req.email_verified {
        user.email_verified = verified;
    }
    let user = ctx.db().update(user).await?;

    let subscription = if role_changed {
        tracing::info!(
            admin_id = %admin.id,
            user_id = %user.id,
            role = %user.role,
            "User role changed"
        );
        Some(ctx.subscriptions().ensure_subscription(&user).await?)
    } else {
        None
    };

    Ok(Json(EditUserResponse {
        user: UserView::from(&user),
        subscription,
    }))
}
