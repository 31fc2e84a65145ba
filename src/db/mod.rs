//! Document persistence for Corpdesk records.
//!
//! Every entity is stored as a JSON document in a named collection, indexed
//! by owning user, parent record and an optional unique lookup key. The
//! [`DatabaseClient`] wraps a [`DocumentStore`] with typed helpers.

pub mod config;
pub mod memory;
#[cfg(feature = "database")]
pub mod sea_orm_store;

pub use config::{DatabaseConfig, redact_database_url};
pub use memory::InMemoryStore;
#[cfg(feature = "database")]
pub use sea_orm_store::SeaOrmStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;

use crate::error::{CorpdeskError, Result};

/// A persisted record as the store sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub collection: String,
    pub id: String,
    pub owner_id: Option<String>,
    pub parent_id: Option<String>,
    pub lookup_key: Option<String>,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Selects documents within one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    All,
    Owner(String),
    Parent(String),
    LookupKey(String),
}

impl Filter {
    pub fn matches(&self, doc: &StoredDocument) -> bool {
        match self {
            Filter::All => true,
            Filter::Owner(owner) => doc.owner_id.as_deref() == Some(owner.as_str()),
            Filter::Parent(parent) => doc.parent_id.as_deref() == Some(parent.as_str()),
            Filter::LookupKey(key) => doc.lookup_key.as_deref() == Some(key.as_str()),
        }
    }
}

/// Storage backend for documents.
///
/// `insert` rejects a duplicate id or a lookup key already used in the same
/// collection with [`CorpdeskError::Conflict`]. `replace` fails with
/// [`CorpdeskError::NotFound`] when the document does not exist. `query`
/// returns documents ordered by creation time.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>>;

    async fn insert(&self, doc: StoredDocument) -> Result<()>;

    async fn replace(&self, doc: StoredDocument) -> Result<()>;

    /// Returns `true` when a document was removed.
    async fn remove(&self, collection: &str, id: &str) -> Result<bool>;

    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<StoredDocument>>;

    async fn ping(&self) -> Result<()>;

    /// Short backend name for status reporting.
    fn backend(&self) -> &'static str;
}

/// An entity persisted through the [`DatabaseClient`].
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: &'static str;
    /// Human-readable name used in error messages.
    const LABEL: &'static str;

    fn id(&self) -> &str;

    /// The user owning this record.
    fn owner_id(&self) -> Option<&str> {
        None
    }

    /// The record this one belongs to (a company for contracts and finances).
    fn parent_id(&self) -> Option<&str> {
        None
    }

    /// Unique secondary key within the collection.
    fn lookup_key(&self) -> Option<String> {
        None
    }

    fn created_at(&self) -> DateTime<Utc>;

    fn set_updated_at(&mut self, at: DateTime<Utc>);
}

fn to_document<T: Record>(record: &T, updated_at: DateTime<Utc>) -> Result<StoredDocument> {
    Ok(StoredDocument {
        collection: T::COLLECTION.to_string(),
        id: record.id().to_string(),
        owner_id: record.owner_id().map(str::to_string),
        parent_id: record.parent_id().map(str::to_string),
        lookup_key: record.lookup_key(),
        data: serde_json::to_value(record)?,
        created_at: record.created_at(),
        updated_at,
    })
}

fn from_document<T: Record>(doc: StoredDocument) -> Result<T> {
    serde_json::from_value(doc.data).map_err(|e| {
        CorpdeskError::Database(format!(
            "Corrupt {} document {}: {}",
            T::COLLECTION,
            doc.id,
            e
        ))
    })
}

/// Typed access to every Corpdesk collection.
#[derive(Clone)]
pub struct DatabaseClient {
    store: Arc<dyn DocumentStore>,
}

impl DatabaseClient {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Client over a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    /// Connect according to config: SeaORM when a URL is set, memory otherwise.
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        match &config.url {
            #[cfg(feature = "database")]
            Some(_) => {
                let store = SeaOrmStore::from_config(config).await?;
                Ok(Self::new(Arc::new(store)))
            }
            #[cfg(not(feature = "database"))]
            Some(_) => Err(CorpdeskError::internal(
                "DATABASE_URL is set but the database feature is disabled",
            )),
            None => {
                tracing::warn!("DATABASE_URL not set, using the in-memory store");
                Ok(Self::in_memory())
            }
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub async fn find_by_id<T: Record>(&self, id: &str) -> Result<Option<T>> {
        self.store
            .get(T::COLLECTION, id)
            .await?
            .map(from_document)
            .transpose()
    }

    /// Like [`find_by_id`](Self::find_by_id) but a missing record is a 404.
    pub async fn get<T: Record>(&self, id: &str) -> Result<T> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| CorpdeskError::not_found(format!("{} not found", T::LABEL)))
    }

    pub async fn find_by_user_id<T: Record>(&self, user_id: &str) -> Result<Vec<T>> {
        self.query(&Filter::Owner(user_id.to_string())).await
    }

    pub async fn find_by_parent_id<T: Record>(&self, parent_id: &str) -> Result<Vec<T>> {
        self.query(&Filter::Parent(parent_id.to_string())).await
    }

    pub async fn find_by_lookup_key<T: Record>(&self, key: &str) -> Result<Option<T>> {
        let mut found = self.query::<T>(&Filter::LookupKey(key.to_string())).await?;
        Ok(found.pop())
    }

    pub async fn list<T: Record>(&self) -> Result<Vec<T>> {
        self.query(&Filter::All).await
    }

    async fn query<T: Record>(&self, filter: &Filter) -> Result<Vec<T>> {
        self.store
            .query(T::COLLECTION, filter)
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    pub async fn create<T: Record>(&self, record: T) -> Result<T> {
        let doc = to_document(&record, record.created_at())?;
        self.store.insert(doc).await?;
        tracing::debug!(collection = T::COLLECTION, id = %record.id(), "record created");
        Ok(record)
    }

    /// Replace an existing record, bumping its `updated_at`.
    pub async fn update<T: Record>(&self, mut record: T) -> Result<T> {
        let now = Utc::now();
        record.set_updated_at(now);
        let doc = to_document(&record, now)?;
        self.store.replace(doc).await?;
        tracing::debug!(collection = T::COLLECTION, id = %record.id(), "record updated");
        Ok(record)
    }

    /// Returns `true` when the record existed.
    pub async fn delete<T: Record>(&self, id: &str) -> Result<bool> {
        let removed = self.store.remove(T::COLLECTION, id).await?;
        if removed {
            tracing::debug!(collection = T::COLLECTION, id = %id, "record deleted");
        }
        Ok(removed)
    }

    pub async fn ping(&self) -> Result<()> {
        self.store.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        id: String,
        user_id: String,
        company_id: String,
        sku: String,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    }

    impl Record for Widget {
        const COLLECTION: &'static str = "widgets";
        const LABEL: &'static str = "Widget";

        fn id(&self) -> &str {
            &self.id
        }

        fn owner_id(&self) -> Option<&str> {
            Some(&self.user_id)
        }

        fn parent_id(&self) -> Option<&str> {
            Some(&self.company_id)
        }

        fn lookup_key(&self) -> Option<String> {
            Some(self.sku.clone())
        }

        fn created_at(&self) -> DateTime<Utc> {
            self.created_at
        }

        fn set_updated_at(&mut self, at: DateTime<Utc>) {
            self.updated_at = at;
        }
    }

    fn widget(id: &str, user: &str, company: &str, sku: &str) -> Widget {
        let now = Utc::now();
        Widget {
            id: id.into(),
            user_id: user.into(),
            company_id: company.into(),
            sku: sku.into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let db = DatabaseClient::in_memory();
        db.create(widget("w1", "u1", "c1", "A")).await.unwrap();
        db.create(widget("w2", "u1", "c2", "B")).await.unwrap();
        db.create(widget("w3", "u2", "c2", "C")).await.unwrap();

        let found: Widget = db.get("w1").await.unwrap();
        assert_eq!(found.sku, "A");

        let by_user: Vec<Widget> = db.find_by_user_id("u1").await.unwrap();
        assert_eq!(by_user.len(), 2);

        let by_company: Vec<Widget> = db.find_by_parent_id("c2").await.unwrap();
        assert_eq!(by_company.len(), 2);

        let by_sku: Option<Widget> = db.find_by_lookup_key("C").await.unwrap();
        assert_eq!(by_sku.map(|w| w.id), Some("w3".to_string()));

        assert_eq!(db.list::<Widget>().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_record_is_not_found() {
        let db = DatabaseClient::in_memory();
        let err = db.get::<Widget>("nope").await.unwrap_err();
        assert!(matches!(err, CorpdeskError::NotFound(ref m) if m == "Widget not found"));
    }

    #[tokio::test]
    async fn test_duplicates_conflict() {
        let db = DatabaseClient::in_memory();
        db.create(widget("w1", "u1", "c1", "A")).await.unwrap();

        let err = db.create(widget("w1", "u1", "c1", "Z")).await.unwrap_err();
        assert!(matches!(err, CorpdeskError::Conflict(_)));

        let err = db.create(widget("w2", "u1", "c1", "A")).await.unwrap_err();
        assert!(matches!(err, CorpdeskError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let db = DatabaseClient::in_memory();
        let created = db.create(widget("w1", "u1", "c1", "A")).await.unwrap();

        let mut changed = created.clone();
        changed.sku = "B".into();
        let updated = db.update(changed).await.unwrap();
        assert!(updated.updated_at >= created.updated_at);
        assert!(db.find_by_lookup_key::<Widget>("A").await.unwrap().is_none());

        assert!(db.delete::<Widget>("w1").await.unwrap());
        assert!(!db.delete::<Widget>("w1").await.unwrap());

        let err = db.update(created).await.unwrap_err();
        assert!(matches!(err, CorpdeskError::NotFound(_)));
    }
}
