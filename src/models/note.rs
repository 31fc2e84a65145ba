use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::new_id;
use crate::db::Record;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub user_id: String,
    pub company_id: Option<String>,
    pub contract_id: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    pub fn new(user_id: impl Into<String>, body: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            user_id: user_id.into(),
            company_id: None,
            contract_id: None,
            body: body.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for Note {
    const COLLECTION: &'static str = "notes";
    const LABEL: &'static str = "Note";

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> Option<&str> {
        Some(&self.user_id)
    }

    fn parent_id(&self) -> Option<&str> {
        self.company_id.as_deref()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}
