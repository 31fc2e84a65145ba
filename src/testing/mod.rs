//! Test support for Corpdesk handlers and services.
//!
//! - [`Scenario`]: drive the router in-process with fluent assertions
//! - [`TestHarness`]: an [`AppContext`](crate::AppContext) wired to the fakes below
//! - [`MockStripe`], [`RecordingMailer`], [`StaticPdfRenderer`], [`ScriptedChat`]:
//!   stand-ins for the external services
//! - `TestDb`: SQLite in memory behind the SeaORM store
//!
//! ```rust,ignore
//! use corpdesk::testing::{self, TestHarness};
//!
//! #[tokio::test]
//! async fn test_pricing() {
//!     let harness = TestHarness::new();
//!     testing::get(harness.app(), "/api/pricing")
//!         .execute()
//!         .await
//!         .assert_ok()
//!         .assert_json_path("plans.0.plan", serde_json::json!("free"));
//! }
//! ```

#[cfg(feature = "database")]
mod database;
mod fakes;
mod fixtures;
mod scenario;

#[cfg(feature = "database")]
pub use database::TestDb;
pub use fakes::{MockStripe, RecordingMailer, ScriptedChat, StaticPdfRenderer};
pub use fixtures::{
    TEST_BASE_URL, TEST_PASSWORD, TEST_WEBHOOK_SECRET, TestHarness, fake,
};
pub use scenario::{Scenario, ScenarioAssert, delete, get, patch, post, put};
