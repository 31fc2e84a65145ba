//! SQLite-backed database for tests that should exercise the SeaORM store
//! rather than the in-memory one.
//!
//! ```rust,ignore
//! let db = TestDb::new().await;
//! let ctx = AppContext::builder(TestHarness::config())
//!     .with_database(db.client())
//!     .build();
//! ```

use std::sync::Arc;

use crate::db::{DatabaseClient, DatabaseConfig, SeaOrmStore};
use crate::error::Result;

/// A private in-memory SQLite database with the `records` schema created.
pub struct TestDb {
    store: Arc<SeaOrmStore>,
}

impl TestDb {
    /// Panics when SQLite cannot be opened; use [`try_new`](Self::try_new)
    /// to handle the error.
    pub async fn new() -> Self {
        Self::try_new()
            .await
            .expect("failed to open in-memory SQLite")
    }

    pub async fn try_new() -> Result<Self> {
        // Every pooled connection to `sqlite::memory:` gets its own database,
        // so the pool is held at one connection.
        let config = DatabaseConfig {
            max_connections: 1,
            min_connections: 1,
            auto_migrate: true,
            ..DatabaseConfig::default().with_url("sqlite::memory:")
        };
        let store = SeaOrmStore::from_config(&config).await?;
        Ok(Self {
            store: Arc::new(store),
        })
    }

    pub fn client(&self) -> DatabaseClient {
        DatabaseClient::new(self.store.clone())
    }

    pub fn store(&self) -> &SeaOrmStore {
        &self.store
    }
}
