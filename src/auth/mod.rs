//! Sessions, passwords and the request extractors that gate handlers.
//!
//! Handlers opt into authentication by taking one of the extractors:
//!
//! ```rust,ignore
//! async fn list(AuthUser(user): AuthUser, State(ctx): State<AppContext>) -> Result<..> { .. }
//! async fn edit_user(AdminUser(admin): AdminUser, ..) -> Result<..> { .. }
//! ```

mod config;
pub mod extractors;
pub mod jwt;
pub mod password;
pub mod token;
pub mod verification;

pub use config::AuthConfig;
pub use extractors::{AdminUser, AuthUser, VerifiedUser};
pub use jwt::{SessionClaims, SessionIssuer};
pub use password::{MIN_PASSWORD_LENGTH, PasswordConfig, PasswordHasher, validate_password};
pub use token::TokenExtractor;
pub use verification::{consume_verification_token, issue_verification_token};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account role. Drives both authorization and the billing plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Free,
    Pro,
    Gift,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Free => "free",
            Role::Pro => "pro",
            Role::Gift => "gift",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = crate::error::CorpdeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Role::Free),
            "pro" => Ok(Role::Pro),
            "gift" => Ok(Role::Gift),
            "admin" => Ok(Role::Admin),
            other => Err(crate::error::CorpdeskError::bad_request(format!(
                "Unknown role: {}",
                other
            ))),
        }
    }
}
