//! HTTP handlers, one [`RouteModule`] per area of the API.
//!
//! Handler rules shared by every module: malformed input is a 400, a
//! missing session a 401, a record owned by someone else a 403, a missing
//! record a 404, a duplicate a 409 and a feature outside the user's plan a
//! 403.

mod auth;
mod billing;
mod companies;
mod contracts;
mod dashboard;
mod incorporations;
mod invoices;
mod notes;
mod portal;
mod status;
mod users;

pub use auth::AuthModule;
pub use billing::BillingModule;
pub use companies::CompaniesModule;
pub use contracts::ContractsModule;
pub use dashboard::DashboardModule;
pub use incorporations::IncorporationsModule;
pub use invoices::InvoicesModule;
pub use notes::NotesModule;
pub use portal::PortalModule;
pub use status::StatusModule;
pub use users::UsersModule;

use axum::Router;

use crate::app::AppContext;
use crate::db::Record;
use crate::error::{CorpdeskError, Result};
use crate::http::RouteModule;
use crate::models::User;

/// Every `/api` route.
pub fn api_router() -> Router<AppContext> {
    let router = Router::new();
    let router = StatusModule.register(router);
    let router = AuthModule.register(router);
    let router = UsersModule.register(router);
    let router = CompaniesModule.register(router);
    let router = ContractsModule.register(router);
    let router = IncorporationsModule.register(router);
    let router = NotesModule.register(router);
    let router = BillingModule.register(router);
    let router = InvoicesModule.register(router);
    let router = DashboardModule.register(router);
    PortalModule.register(router)
}

/// Load a record and check it belongs to `user`: 404 when missing, 403 when
/// owned by someone else.
pub(crate) async fn load_owned<T: Record>(ctx: &AppContext, id: &str, user: &User) -> Result<T> {
    let record: T = ctx.db().get(id).await?;
    if record.owner_id() != Some(user.id.as_str()) {
        tracing::warn!(
            user_id = %user.id,
            record = T::LABEL,
            record_id = %id,
            "Access to another user's record denied"
        );
        return Err(CorpdeskError::forbidden(format!(
            "{} belongs to another user",
            T::LABEL
        )));
    }
    Ok(record)
}

/// Trimmed value of a required text field; 400 when blank or too long.
pub(crate) fn required_text(field: &str, value: &str, max_len: usize) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CorpdeskError::bad_request(format!("{} is required", field)));
    }
    if value.chars().count() > max_len {
        return Err(CorpdeskError::bad_request(format!(
            "{} must be at most {} characters",
            field, max_len
        )));
    }
    Ok(value.to_string())
}

/// Trimmed optional text; blank becomes `None`.
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Minimal shape check: one `@` with text on both sides and a dot in the domain.
pub(crate) fn validate_email(email: &str) -> Result<()> {
    let valid = match email.trim().split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(CorpdeskError::bad_request("Invalid email address"))
    }
}
