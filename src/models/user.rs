use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::new_id;
use crate::auth::Role;
use crate::db::Record;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    /// Always stored lower-cased.
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
    pub email_verified: bool,
    pub profile_image_url: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: &str, name: impl Into<String>, password_hash: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            email: normalize_email(email),
            name: name.into(),
            password_hash: password_hash.into(),
            role: Role::Free,
            email_verified: false,
            profile_image_url: None,
            stripe_customer_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl Record for User {
    const COLLECTION: &'static str = "users";
    const LABEL: &'static str = "User";

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> Option<&str> {
        Some(&self.id)
    }

    fn lookup_key(&self) -> Option<String> {
        Some(normalize_email(&self.email))
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}

/// User as returned by the API, without credentials.
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub email_verified: bool,
    pub profile_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            email_verified: user.email_verified,
            profile_image_url: user.profile_image_url.clone(),
            created_at: user.created_at,
        }
    }
}
