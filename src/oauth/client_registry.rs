//! Client registration storage on top of a record store.

use crate::config::StoreConfig;
use crate::errors::StorageError;
use crate::oauth::types::ClientRecord;
use crate::storage::records::{
    ColumnDef, Predicate, RecordStore, Row, Table, TableSchema, provision,
};
use crate::storage::traits::{ClientStore, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const ID: &str = "id";
const CREATED_AT: &str = "created_at";
const UPDATED_AT: &str = "updated_at";
const DOMAIN: &str = "domain";
const SECRET: &str = "secret";
const USER_ID: &str = "user_id";

/// Layout of the client table
pub static CLIENT_SCHEMA: TableSchema = TableSchema {
    primary_key: ID,
    columns: &[
        ColumnDef::text(ID),
        ColumnDef::timestamp(CREATED_AT),
        ColumnDef::timestamp(UPDATED_AT),
        ColumnDef::text(DOMAIN),
        ColumnDef::text(SECRET),
        ColumnDef::text(USER_ID),
    ],
};

/// Client registrations keyed by client id. Clients never expire.
pub struct ClientRegistry {
    records: Arc<dyn RecordStore>,
    table: Table,
    config: StoreConfig,
}

impl ClientRegistry {
    /// Create a registry, provisioning its table when absent
    pub async fn new(records: Arc<dyn RecordStore>, config: StoreConfig) -> Result<Self> {
        let table = Table::new(config.table_name.as_ref(), &CLIENT_SCHEMA);
        provision(records.as_ref(), &table).await?;
        Ok(Self {
            records,
            table,
            config,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Delete a client; deleting an absent client succeeds
    pub async fn remove_by_id(&self, id: &str) -> Result<()> {
        if id.is_empty() {
            return Ok(());
        }
        match self.records.delete_by_primary_key(&self.table, id).await {
            Err(StorageError::NotFound(_)) => Ok(()),
            result => result,
        }
    }

    /// No-op: client records have no validity window, so no reclaimer runs
    /// and `StoreConfig::reclaim_interval` is never read
    pub fn close(&self) {}

    fn row_to_client(row: &Row) -> Result<ClientRecord> {
        Ok(ClientRecord {
            id: row.require_text(ID)?.to_string(),
            secret: row.require_text(SECRET)?.to_string(),
            domain: row.require_text(DOMAIN)?.to_string(),
            user_id: row.require_text(USER_ID)?.to_string(),
            created_at: row.require_timestamp(CREATED_AT)?,
            updated_at: row.require_timestamp(UPDATED_AT)?,
        })
    }
}

#[async_trait]
impl ClientStore for ClientRegistry {
    /// Timestamps are stamped by the store at insert time
    async fn create(&self, client: &ClientRecord) -> Result<()> {
        if client.id.is_empty() {
            return Err(StorageError::InvalidData(
                "Client id must not be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let row = Row::new()
            .with(ID, client.id.as_str())
            .with(CREATED_AT, now)
            .with(UPDATED_AT, now)
            .with(DOMAIN, client.domain.as_str())
            .with(SECRET, client.secret.as_str())
            .with(USER_ID, client.user_id.as_str());
        self.records.insert(&self.table, &row).await
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<ClientRecord>> {
        if id.is_empty() {
            return Ok(None);
        }

        let row = self
            .records
            .find_one(&self.table, &Predicate::Equals(ID, id.into()))
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("Client not found: {}", id)))?;
        Self::row_to_client(&row).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::inmemory::MemoryRecordStore;

    async fn setup() -> (Arc<dyn RecordStore>, ClientRegistry) {
        let records: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
        let registry = ClientRegistry::new(records.clone(), StoreConfig::clients())
            .await
            .unwrap();
        (records, registry)
    }

    #[tokio::test]
    async fn test_new_with_default_config() {
        let (records, registry) = setup().await;
        assert_eq!(registry.table().name(), "ClientStore");
        assert_eq!(
            *registry.config().reclaim_interval.as_ref(),
            std::time::Duration::from_secs(5)
        );
        assert!(records.table_exists("ClientStore").await.unwrap());
    }

    #[tokio::test]
    async fn test_new_with_passed_config() {
        let records: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
        let config = StoreConfig::clients()
            .with_table_name("client_store")
            .unwrap()
            .with_reclaim_interval(std::time::Duration::from_secs(6))
            .unwrap();
        let registry = ClientRegistry::new(records.clone(), config).await.unwrap();
        assert_eq!(registry.table().name(), "client_store");
        assert!(records.table_exists("client_store").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reclaim_interval_never_removes_clients() {
        let records: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
        let config = StoreConfig::clients()
            .with_reclaim_interval(std::time::Duration::from_millis(1))
            .unwrap();
        let registry = ClientRegistry::new(records.clone(), config).await.unwrap();
        registry
            .create(&ClientRecord::new("abc", "mysecret", "example.com", "me"))
            .await
            .unwrap();

        tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        assert!(registry.get_by_id("abc").await.unwrap().is_some());
        registry.close();
        assert!(registry.get_by_id("abc").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (_, registry) = setup().await;
        let client = ClientRecord::new("abc", "mysecret", "example.com", "me");
        registry.create(&client).await.unwrap();

        let found = registry.get_by_id("abc").await.unwrap().unwrap();
        assert_eq!(found.id, "abc");
        assert_eq!(found.secret, "mysecret");
        assert_eq!(found.domain, "example.com");
        assert_eq!(found.user_id, "me");
        assert_eq!(found.created_at, found.updated_at);
    }

    #[tokio::test]
    async fn test_get_by_empty_id_returns_none() {
        let (_, registry) = setup().await;
        assert!(registry.get_by_id("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_unknown_id_is_not_found() {
        let (_, registry) = setup().await;
        let result = registry.get_by_id("missing").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_and_empty_ids() {
        let (_, registry) = setup().await;
        let client = ClientRecord::new("abc", "mysecret", "example.com", "me");
        registry.create(&client).await.unwrap();

        let result = registry.create(&client).await;
        assert!(matches!(result, Err(StorageError::DuplicateKey(_))));

        let result = registry
            .create(&ClientRecord::new("", "s", "example.com", "me"))
            .await;
        assert!(matches!(result, Err(StorageError::InvalidData(_))));
    }

    #[tokio::test]
    async fn test_remove_by_id_is_idempotent() {
        let (_, registry) = setup().await;
        registry
            .create(&ClientRecord::new("abc", "mysecret", "example.com", "me"))
            .await
            .unwrap();

        registry.remove_by_id("abc").await.unwrap();
        assert!(registry.get_by_id("abc").await.is_err());
        registry.remove_by_id("abc").await.unwrap();
        registry.remove_by_id("").await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_row_surfaces_error() {
        let (records, registry) = setup().await;
        // secret column missing entirely
        static PARTIAL: TableSchema = TableSchema {
            primary_key: ID,
            columns: &[
                ColumnDef::text(ID),
                ColumnDef::timestamp(CREATED_AT),
                ColumnDef::timestamp(UPDATED_AT),
                ColumnDef::text(DOMAIN),
                ColumnDef::text(SECRET).nullable(),
                ColumnDef::text(USER_ID),
            ],
        };
        let partial = Table::new("ClientStore", &PARTIAL);
        let now = Utc::now();
        records
            .insert(
                &partial,
                &Row::new()
                    .with(ID, "broken")
                    .with(CREATED_AT, now)
                    .with(UPDATED_AT, now)
                    .with(DOMAIN, "example.com")
                    .with(USER_ID, "me"),
            )
            .await
            .unwrap();

        let result = registry.get_by_id("broken").await;
        assert!(matches!(result, Err(StorageError::CorruptRecord(_))));
    }
}
