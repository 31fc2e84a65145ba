//! Plain records persisted through the [`DatabaseClient`](crate::db::DatabaseClient).

mod company;
mod contract;
mod finance;
mod incorporation;
mod note;
mod subscription;
mod tokens;
mod user;

pub use company::{Address, Company, EntityType};
pub use contract::{Contract, ContractStatus};
pub use finance::{CompanyFinance, is_valid_period};
pub use incorporation::{Attestation, BusinessInfo, Incorporation, IncorporationStatus};
pub use note::Note;
pub use subscription::Subscription;
pub use tokens::{PortalToken, ProcessedWebhookEvent, VerificationToken};
pub use user::{User, UserView, normalize_email};

/// New random record id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
