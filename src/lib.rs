//! Corpdesk - company administration for small businesses
//!
//! A multi-tenant HTTP API built on Axum and Tokio: companies, client
//! contracts, incorporation packets, finances and notes, with Stripe plans,
//! Connect payouts for contract payments, PDF invoices and a token-gated
//! client portal.
//!
//! # Services
//!
//! - **Billing**: idempotent subscription sync, plan gating, webhooks and
//!   catalogue provisioning against Stripe ([`billing`])
//! - **Invoices**: LLM-drafted HTML with a template fallback ([`invoice`]),
//!   rendered to PDF by headless Chrome ([`pdf`]) and stored in S3 ([`storage`])
//! - **Email**: SMTP or console delivery with built-in templates ([`email`])
//! - **Persistence**: JSON documents in SQLite/Postgres via SeaORM or in
//!   memory ([`db`])
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use corpdesk::{App, AppContext, ConfigBuilder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigBuilder::new().from_env().build()?;
//!     corpdesk::init_tracing_with_config(&config);
//!
//!     let context = AppContext::from_config(config).await?;
//!     App::new(context).serve().await?;
//!     Ok(())
//! }
//! ```

mod app;
pub mod auth;
pub mod billing;
mod config;
mod core;
pub mod db;
pub mod email;
mod error;
pub mod health;
pub mod http;
pub mod invoice;
mod middleware;
pub mod models;
pub mod pdf;
pub mod routes;
pub mod storage;
pub mod testing;
mod utils;

pub use app::{AppContext, AppContextBuilder};
pub use config::{Config, ConfigBuilder, DevConfig, LoggingConfig, ServerConfig};
pub use core::{App, AppBuilder};
pub use error::{CorpdeskError, ErrorResponse, Result};
pub use health::{ComponentHealth, HealthCheck, HealthChecker, HealthStatus};
pub use http::{CreatedResponse, JsonBody, NoContentResponse, QueryParams, RouteModule};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging from the environment.
///
/// - `RUST_LOG`: filter directives, `info` by default
/// - `CORPDESK_LOG_JSON`: `true` for JSON lines
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json_logs = utils::flag_env_with_prefix("LOG_JSON").unwrap_or(false);
    install_subscriber(env_filter, json_logs);
}

/// Initialize logging from [`LoggingConfig`]. `RUST_LOG` still wins when set.
pub fn init_tracing_with_config(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    install_subscriber(env_filter, config.logging.json);
}

fn install_subscriber(env_filter: EnvFilter, json: bool) {
    // A second init (tests, embedding) keeps the first subscriber.
    let result = if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    };
    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
