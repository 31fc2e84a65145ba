use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::new_id;
use crate::db::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Llc,
    CCorp,
    SCorp,
    Partnership,
    SoleProprietorship,
    Nonprofit,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "US".to_string()
}

impl Address {
    /// Names of required fields that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.line1.trim().is_empty() {
            missing.push("address.line1");
        }
        if self.city.trim().is_empty() {
            missing.push("address.city");
        }
        if self.state.trim().is_empty() {
            missing.push("address.state");
        }
        if self.postal_code.trim().is_empty() {
            missing.push("address.postal_code");
        }
        missing
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub entity_type: EntityType,
    /// State of formation
    pub state: Option<String>,
    pub address: Option<Address>,
    pub ein: Option<String>,
    pub connect_account_id: Option<String>,
    #[serde(default)]
    pub connect_charges_enabled: bool,
    #[serde(default)]
    pub connect_details_submitted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Company {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>, entity_type: EntityType) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            user_id: user_id.into(),
            name: name.into(),
            entity_type,
            state: None,
            address: None,
            ein: None,
            connect_account_id: None,
            connect_charges_enabled: false,
            connect_details_submitted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Record for Company {
    const COLLECTION: &'static str = "companies";
    const LABEL: &'static str = "Company";

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> Option<&str> {
        Some(&self.user_id)
    }

    /// Connect account ids are unique, so webhooks can find the company.
    fn lookup_key(&self) -> Option<String> {
        self.connect_account_id.clone()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}
