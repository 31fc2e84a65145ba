//! SeaORM-backed document store.
//!
//! All collections share one `records` table:
//!
//! | column | type | notes |
//! |---|---|---|
//! | collection | text | primary key (with id) |
//! | id | text | primary key (with collection) |
//! | owner_id | text null | indexed |
//! | parent_id | text null | indexed |
//! | lookup_key | text null | unique per collection |
//! | data | json | the serialized record |
//! | created_at / updated_at | timestamptz | |

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    DbErr, EntityTrait, QueryFilter, QueryOrder, Schema, Set, SqlErr, sea_query::Index,
};
use std::time::Duration;

use super::config::{DatabaseConfig, redact_database_url};
use super::{DocumentStore, Filter, StoredDocument};
use crate::error::{CorpdeskError, Result};

mod entity {
    pub mod record {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
        #[sea_orm(table_name = "records")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub collection: String,
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            #[sea_orm(indexed)]
            pub owner_id: Option<String>,
            #[sea_orm(indexed)]
            pub parent_id: Option<String>,
            pub lookup_key: Option<String>,
            #[sea_orm(column_type = "JsonBinary")]
            pub data: Json,
            pub created_at: DateTimeWithTimeZone,
            pub updated_at: DateTimeWithTimeZone,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }
}

use entity::record;

/// Document store over a SeaORM connection (Postgres or SQLite).
#[derive(Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Connect using the pool settings and create the schema when `auto_migrate` is set.
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| CorpdeskError::internal("Database URL not configured"))?;

        let mut opt = ConnectOptions::new(url);
        opt.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .idle_timeout(Duration::from_secs(config.idle_timeout))
            .sqlx_logging(false);

        let db = Database::connect(opt).await.map_err(|e| {
            CorpdeskError::internal(format!("Failed to connect to database: {}", e))
        })?;

        tracing::info!(
            url = %redact_database_url(url),
            max_connections = config.max_connections,
            "Database connected"
        );

        let store = Self::new(db);
        if config.auto_migrate {
            store.create_schema().await?;
        }
        Ok(store)
    }

    /// Create the `records` table and its indexes if they do not exist.
    pub async fn create_schema(&self) -> Result<()> {
        let backend = self.db.get_database_backend();
        let schema = Schema::new(backend);

        let mut table = schema.create_table_from_entity(record::Entity);
        table.if_not_exists();
        self.db.execute(backend.build(&table)).await?;

        for mut index in schema.create_index_from_entity(record::Entity) {
            index.if_not_exists();
            self.db.execute(backend.build(&index)).await?;
        }

        let lookup_index = Index::create()
            .name("idx_records_collection_lookup_key")
            .table(record::Entity)
            .col(record::Column::Collection)
            .col(record::Column::LookupKey)
            .unique()
            .if_not_exists()
            .to_owned();
        self.db.execute(backend.build(&lookup_index)).await?;

        tracing::info!("records schema ready");
        Ok(())
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    async fn lookup_owner(&self, collection: &str, key: &str) -> Result<Option<String>> {
        let existing = record::Entity::find()
            .filter(record::Column::Collection.eq(collection))
            .filter(record::Column::LookupKey.eq(key))
            .one(&self.db)
            .await?;
        Ok(existing.map(|m| m.id))
    }
}

fn to_active(doc: StoredDocument) -> record::ActiveModel {
    record::ActiveModel {
        collection: Set(doc.collection),
        id: Set(doc.id),
        owner_id: Set(doc.owner_id),
        parent_id: Set(doc.parent_id),
        lookup_key: Set(doc.lookup_key),
        data: Set(doc.data),
        created_at: Set(doc.created_at.fixed_offset()),
        updated_at: Set(doc.updated_at.fixed_offset()),
    }
}

fn from_model(model: record::Model) -> StoredDocument {
    StoredDocument {
        collection: model.collection,
        id: model.id,
        owner_id: model.owner_id,
        parent_id: model.parent_id,
        lookup_key: model.lookup_key,
        data: model.data,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

fn map_write_error(err: DbErr, collection: &str) -> CorpdeskError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            CorpdeskError::conflict(format!("Duplicate key in {}", collection))
        }
        _ => err.into(),
    }
}

#[async_trait]
impl DocumentStore for SeaOrmStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>> {
        let model = record::Entity::find_by_id((collection.to_string(), id.to_string()))
            .one(&self.db)
            .await?;
        Ok(model.map(from_model))
    }

    async fn insert(&self, doc: StoredDocument) -> Result<()> {
        if self.get(&doc.collection, &doc.id).await?.is_some() {
            return Err(CorpdeskError::conflict(format!(
                "{} {} already exists",
                doc.collection, doc.id
            )));
        }
        if let Some(key) = doc.lookup_key.as_deref() {
            if self.lookup_owner(&doc.collection, key).await?.is_some() {
                return Err(CorpdeskError::conflict(format!(
                    "Duplicate key in {}",
                    doc.collection
                )));
            }
        }

        let collection = doc.collection.clone();
        record::Entity::insert(to_active(doc))
            .exec(&self.db)
            .await
            .map_err(|e| map_write_error(e, &collection))?;
        Ok(())
    }

    async fn replace(&self, doc: StoredDocument) -> Result<()> {
        let Some(existing) = self.get(&doc.collection, &doc.id).await? else {
            return Err(CorpdeskError::not_found(format!(
                "{} {} not found",
                doc.collection, doc.id
            )));
        };
        if let Some(key) = doc.lookup_key.as_deref() {
            if let Some(owner) = self.lookup_owner(&doc.collection, key).await? {
                if owner != doc.id {
                    return Err(CorpdeskError::conflict(format!(
                        "Duplicate key in {}",
                        doc.collection
                    )));
                }
            }
        }

        let collection = doc.collection.clone();
        to_active(StoredDocument {
            created_at: existing.created_at,
            ..doc
        })
        .update(&self.db)
            .await
            .map_err(|e| map_write_error(e, &collection))?;
        Ok(())
    }

    async fn remove(&self, collection: &str, id: &str) -> Result<bool> {
        let result = record::Entity::delete_by_id((collection.to_string(), id.to_string()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    async fn query(&self, collection: &str, filter: &Filter) -> Result<Vec<StoredDocument>> {
        let mut select = record::Entity::find().filter(record::Column::Collection.eq(collection));
        select = match filter {
            Filter::All => select,
            Filter::Owner(owner) => select.filter(record::Column::OwnerId.eq(owner.as_str())),
            Filter::Parent(parent) => select.filter(record::Column::ParentId.eq(parent.as_str())),
            Filter::LookupKey(key) => select.filter(record::Column::LookupKey.eq(key.as_str())),
        };

        let models = select
            .order_by_asc(record::Column::CreatedAt)
            .order_by_asc(record::Column::Id)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(from_model).collect())
    }

    async fn ping(&self) -> Result<()> {
        self.db.ping().await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        match self.db.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => "postgres",
            sea_orm::DatabaseBackend::Sqlite => "sqlite",
            _ => "sql",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn sqlite_store() -> SeaOrmStore {
        let config = DatabaseConfig::default().with_url("sqlite::memory:");
        let config = DatabaseConfig {
            max_connections: 1,
            ..config
        };
        SeaOrmStore::from_config(&config).await.unwrap()
    }

    fn doc(id: &str, lookup: Option<&str>) -> StoredDocument {
        let now = Utc::now();
        StoredDocument {
            collection: "users".into(),
            id: id.into(),
            owner_id: Some(id.into()),
            parent_id: None,
            lookup_key: lookup.map(str::to_string),
            data: json!({ "id": id }),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_sqlite_round_trip() {
        let store = sqlite_store().await;
        store.ping().await.unwrap();
        assert_eq!(store.backend(), "sqlite");

        store.insert(doc("u1", Some("a@corp.io"))).await.unwrap();
        let found = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(found.lookup_key.as_deref(), Some("a@corp.io"));

        let by_key = store
            .query("users", &Filter::LookupKey("a@corp.io".into()))
            .await
            .unwrap();
        assert_eq!(by_key.len(), 1);

        let err = store.insert(doc("u2", Some("a@corp.io"))).await.unwrap_err();
        assert!(matches!(err, CorpdeskError::Conflict(_)));

        let mut changed = doc("u1", Some("b@corp.io"));
        changed.data = json!({ "id": "u1", "name": "Ada" });
        store.replace(changed).await.unwrap();
        let found = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(found.data["name"], "Ada");

        assert!(store.remove("users", "u1").await.unwrap());
        assert!(store.get("users", "u1").await.unwrap().is_none());
    }
}
