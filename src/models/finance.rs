use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::new_id;
use crate::db::Record;

/// Revenue and expenses of a company for one month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyFinance {
    pub id: String,
    pub company_id: String,
    pub user_id: String,
    /// `YYYY-MM`
    pub period: String,
    pub revenue_cents: i64,
    pub expenses_cents: i64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CompanyFinance {
    pub fn new(
        company_id: impl Into<String>,
        user_id: impl Into<String>,
        period: impl Into<String>,
        revenue_cents: i64,
        expenses_cents: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            company_id: company_id.into(),
            user_id: user_id.into(),
            period: period.into(),
            revenue_cents,
            expenses_cents,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn profit_cents(&self) -> i64 {
        self.revenue_cents - self.expenses_cents
    }
}

/// Checks a `YYYY-MM` period string.
pub fn is_valid_period(period: &str) -> bool {
    let Some((year, month)) = period.split_once('-') else {
        return false;
    };
    year.len() == 4
        && month.len() == 2
        && year.chars().all(|c| c.is_ascii_digit())
        && matches!(month.parse::<u32>(), Ok(1..=12))
}

impl Record for CompanyFinance {
    const COLLECTION: &'static str = "company_finances";
    const LABEL: &'static str = "Finance record";

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
