use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::company::{Address, EntityType};
use super::new_id;
use crate::db::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncorporationStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
}

impl IncorporationStatus {
    pub const ALL: [IncorporationStatus; 4] = [
        IncorporationStatus::Draft,
        IncorporationStatus::Submitted,
        IncorporationStatus::Approved,
        IncorporationStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IncorporationStatus::Draft => "draft",
            IncorporationStatus::Submitted => "submitted",
            IncorporationStatus::Approved => "approved",
            IncorporationStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusinessInfo {
    #[serde(default)]
    pub legal_name: String,
    #[serde(default)]
    pub entity_type: Option<EntityType>,
    #[serde(default)]
    pub state_of_formation: String,
    #[serde(default)]
    pub business_purpose: Option<String>,
    #[serde(default)]
    pub registered_agent: Option<String>,
    #[serde(default)]
    pub members: Vec<String>,
}

/// The filer's signed statement that the packet is accurate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attestation {
    pub signer_name: String,
    pub agreed: bool,
    #[serde(default)]
    pub signed_at: Option<DateTime<Utc>>,
}

/// An LLC formation packet moving from draft to an admin decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incorporation {
    pub id: String,
    pub user_id: String,
    /// Set once the packet is approved and the company exists.
    pub company_id: Option<String>,
    pub status: IncorporationStatus,
    pub business: BusinessInfo,
    pub address: Option<Address>,
    pub attestation: Option<Attestation>,
    pub review_note: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Incorporation {
    pub fn new(user_id: impl Into<String>, business: BusinessInfo) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            user_id: user_id.into(),
            company_id: None,
            status: IncorporationStatus::Draft,
            business,
            address: None,
            attestation: None,
            review_note: None,
            submitted_at: None,
            reviewed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_draft(&self) -> bool {
        self.status == IncorporationStatus::Draft
    }

    /// Required fields that are still missing before the packet can be filed.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.business.legal_name.trim().is_empty() {
            missing.push("business.legal_name");
        }
        if self.business.entity_type.is_none() {
            missing.push("business.entity_type");
        }
        if self.business.state_of_formation.trim().is_empty() {
            missing.push("business.state_of_formation");
        }
        match &self.address {
            Some(address) => missing.extend(address.missing_fields()),
            None => missing.push("address"),
        }
        match &self.attestation {
            Some(attestation) => {
                if attestation.signer_name.trim().is_empty() {
                    missing.push("attestation.signer_name");
                }
                if !attestation.agreed {
                    missing.push("attestation.agreed");
                }
            }
            None => missing.push("attestation"),
        }
        missing
    }
}

impl Record for Incorporation {
    const COLLECTION: &'static str = "incorporations";
    const LABEL: &'static str = "Incorporation";

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> Option<&str> {
        Some(&self.user_id)
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}
