use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::new_id;
use crate::db::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Draft,
    Sent,
    Signed,
    Paid,
    Cancelled,
}

impl ContractStatus {
    pub const ALL: [ContractStatus; 5] = [
        ContractStatus::Draft,
        ContractStatus::Sent,
        ContractStatus::Signed,
        ContractStatus::Paid,
        ContractStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Draft => "draft",
            ContractStatus::Sent => "sent",
            ContractStatus::Signed => "signed",
            ContractStatus::Paid => "paid",
            ContractStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: String,
    pub company_id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub client_name: String,
    pub client_email: Option<String>,
    pub amount_cents: i64,
    /// ISO 4217, lower-case
    pub currency: String,
    pub status: ContractStatus,
    pub due_date: Option<NaiveDate>,
    pub invoice_number: Option<String>,
    pub invoice_url: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    pub fn new(
        company_id: impl Into<String>,
        user_id: impl Into<String>,
        title: impl Into<String>,
        client_name: impl Into<String>,
        amount_cents: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            company_id: company_id.into(),
            user_id: user_id.into(),
            title: title.into(),
            description: None,
            client_name: client_name.into(),
            client_email: None,
            amount_cents,
            currency: "usd".to_string(),
            status: ContractStatus::Draft,
            due_date: None,
            invoice_number: None,
            invoice_url: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A client can still pay this contract through the portal.
    pub fn is_payable(&self) -> bool {
        self.amount_cents > 0
            && !matches!(self.status, ContractStatus::Paid | ContractStatus::Cancelled)
    }

    pub fn mark_paid(&mut self, at: DateTime<Utc>) {
        self.status = ContractStatus::Paid;
        self.paid_at = Some(at);
    }
}

impl Record for Contract {
    const COLLECTION: &'static str = "contracts";
    const LABEL: &'static str = "Contract";

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> Option<&str> {
        Some(&self.user_id)
    }

    fn parent_id(&self) -> Option<&str> {
        Some(&self.company_id)
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}
