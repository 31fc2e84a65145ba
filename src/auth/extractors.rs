//! `withAuth` for axum: extractors that gate handlers by session and role.

use axum::{extract::FromRequestParts, http::request::Parts};
use std::future::Future;

use super::{Role, token::TokenExtractor};
use crate::app::AppContext;
use crate::error::CorpdeskError;
use crate::models::User;

/// A request with a valid session.
///
/// The user is reloaded from the database on every request, so role and
/// verification changes apply without re-login. Rejects with 401.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl AuthUser {
    /// 403 unless the user holds one of `roles`.
    pub fn require_role(&self, roles: &[Role]) -> Result<(), CorpdeskError> {
        if roles.contains(&self.0.role) {
            Ok(())
        } else {
            Err(CorpdeskError::forbidden("Insufficient role for this action"))
        }
    }
}

impl FromRequestParts<AppContext> for AuthUser {
    type Rejection = CorpdeskError;

    fn from_request_parts(
        parts: &mut Parts,
        ctx: &AppContext,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            let token = TokenExtractor::from_request(parts, &ctx.config().auth.cookie_name)?;
            let claims = ctx.sessions().verify(&token)?;

            let user = ctx
                .db()
                .find_by_id::<User>(&claims.sub)
                .await?
                .ok_or_else(|| CorpdeskError::unauthorized("Session user no longer exists"))?;

            Ok(AuthUser(user))
        }
    }
}

/// A session whose user has the admin role. Rejects with 401 or 403.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

impl FromRequestParts<AppContext> for AdminUser {
    type Rejection = CorpdeskError;

    fn from_request_parts(
        parts: &mut Parts,
        ctx: &AppContext,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            let auth = AuthUser::from_request_parts(parts, ctx).await?;
            if !auth.0.is_admin() {
                tracing::warn!(user_id = %auth.0.id, "non-admin attempted admin action");
                return Err(CorpdeskError::forbidden("Admin access required"));
            }
            Ok(AdminUser(auth.0))
        }
    }
}

/// A session whose user has confirmed their email address.
#[derive(Debug, Clone)]
pub struct VerifiedUser(pub User);

impl FromRequestParts<AppContext> for VerifiedUser {
    type Rejection = CorpdeskError;

    fn from_request_parts(
        parts: &mut Parts,
        ctx: &AppContext,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            let auth = AuthUser::from_request_parts(parts, ctx).await?;
            if !auth.0.email_verified {
                return Err(CorpdeskError::forbidden("Email address not verified"));
            }
            Ok(VerifiedUser(auth.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_role() {
        let mut user = User::new("ada@example.com", "Ada", "hash");
        user.role = Role::Gift;
        let auth = AuthUser(user);

        assert!(auth.require_role(&[Role::Pro, Role::Gift]).is_ok());
        let err = auth.require_role(&[Role::Admin]).unwrap_err();
        assert!(matches!(err, CorpdeskError::Forbidden(_)));
    }
}
