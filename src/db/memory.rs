use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{DocumentStore, Filter, StoredDocument};
use crate::error::{CorpdeskError, Result};

type Key = (String, String);

/// Process-local document store for development and tests.
#[derive(Default)]
pub struct InMemoryStore {
    documents: RwLock<HashMap<Key, StoredDocument>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents across all collections.
    pub fn len(&self) -> usize {
        self.documents.read().map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> CorpdeskError {
    CorpdeskError::internal("In-memory store lock poisoned")
}

fn lookup_taken(docs: &HashMap<Key, StoredDocument>, doc: &StoredDocument) -> bool {
    let Some(key) = doc.lookup_key.as_deref() else {
        return false;
    };
    docs.values().any(|other| {
        other.collection == doc.collection
            && other.id != doc.id
            && other.lookup_key.as_deref() == Some(key)
    })
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>> {
        let docs = self.documents.read().map_err(|_| poisoned())?;
        Ok(docs.get(&(collection.to_string(), id.to_string())).cloned())
    }

    async fn insert(&self, doc: StoredDocument) -> Result<()> {
        let mut docs = self.documents.write().map_err(|_| poisoned())?;
        let key = (doc.collection.clone(), doc.id.clone());
        if docs.contains_key(&key) {
            return Err(CorpdeskError::conflict(format!(
                "{} {} already exists",
                doc.collection, doc.id
            )));
        }
        if lookup_taken(&docs, &doc) {
            return Err(CorpdeskError::conflict(format!(
                "Duplicate key in {}",
                doc.collection
            )));
        }
        docs.insert(key, doc);
        Ok(())
    }

    async fn replace(&self, doc: StoredDocument) -> Result<()> {
        let mut docs = self.documents.write().map_err(|_| poisoned())?;
        let key = (doc.collection.clone(), doc.id.clone());
        let Some(existing) = docs.get(&key) else {
            return Err(CorpdeskError::not_found(format!(
                "{} {} not found",
                doc.collection, doc.id
            )));
        };
        if lookup_taken(&docs, &doc) {
            return Err(CorpdeskError::conflict(format!(
                "Duplicate key in {}",
                doc.collection
            )));
        }
        let created_at = existing.created_at;
        docs.insert(key, StoredDocument { created_at, ..doc });
        Ok(())
    }

    async fn remove(&self, collection: &str, id: &str) -> Result<bool> {
        let mut docs = self.documents.write().map_err(|_| poisoned())?;
        Ok(docs
            .remove(&(collection.to_string(), id.to_string()))
            .is_some())
    }

    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<StoredDocument>> {
        let docs = self.documents.read().map_err(|_| poisoned())?;
        let mut found: Vec<StoredDocument> = docs
            .values()
            .filter(|doc| doc.collection == collection && filter.matches(doc))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn ping(&self) -> Result<()> {
        self.documents.read().map(|_| ()).map_err(|_| poisoned())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn doc(collection: &str, id: &str, lookup: Option<&str>, age_secs: i64) -> StoredDocument {
        let at = Utc::now() - Duration::seconds(age_secs);
        StoredDocument {
            collection: collection.into(),
            id: id.into(),
            owner_id: Some("u1".into()),
            parent_id: None,
            lookup_key: lookup.map(str::to_string),
            data: json!({ "id": id }),
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn test_query_orders_by_creation() {
        let store = InMemoryStore::new();
        store.insert(doc("notes", "b", None, 10)).await.unwrap();
        store.insert(doc("notes", "a", None, 20)).await.unwrap();
        store.insert(doc("notes", "c", None, 0)).await.unwrap();

        let ids: Vec<String> = store
            .query("notes", &Filter::All)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_lookup_keys_are_scoped_to_collection() {
        let store = InMemoryStore::new();
        store.insert(doc("users", "1", Some("a@x.io"), 0)).await.unwrap();
        store
            .insert(doc("portal_tokens", "1", Some("a@x.io"), 0))
            .await
            .unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_replace_keeps_created_at() {
        let store = InMemoryStore::new();
        let original = doc("notes", "n1", None, 60);
        store.insert(original.clone()).await.unwrap();

        let mut changed = doc("notes", "n1", None, 0);
        changed.data = json!({ "id": "n1", "body": "edited" });
        store.replace(changed).await.unwrap();

        let stored = store.get("notes", "n1").await.unwrap().unwrap();
        assert_eq!(stored.created_at, original.created_at);
        assert_eq!(stored.data["body"], "edited");
    }

    #[tokio::test]
    async fn test_replace_into_taken_lookup_conflicts() {
        let store = InMemoryStore::new();
        store.insert(doc("users", "1", Some("a@x.io"), 0)).await.unwrap();
        store.insert(doc("users", "2", Some("b@x.io"), 0)).await.unwrap();

        let err = store
            .replace(doc("users", "2", Some("a@x.io"), 0))
            .await
            .unwrap_err();
        assert!(matches!(err, CorpdeskError::Conflict(_)));
    }
}
