//! Issued token storage with multi-key lookup and background expiry.
//!
//! Each token is one row. The code, access, and refresh values are indexed
//! columns so any of them resolves the row; `expires_at` is derived from the
//! last-lived secret the token carries and drives reclamation. Everything else
//! travels as an opaque JSON payload.
//!
//! Lookups do not filter on `expires_at`. A token past its window stays
//! readable until the next reclaimer tick removes it; callers that need strict
//! freshness check the returned metadata with [`IssuedSecret::is_expired`].
//!
//! [`IssuedSecret::is_expired`]: crate::oauth::types::IssuedSecret::is_expired

use crate::config::StoreConfig;
use crate::errors::StorageError;
use crate::oauth::reclaimer::{ExpiryReclaimer, sweep};
use crate::oauth::types::TokenMetadata;
use crate::storage::records::{
    ColumnDef, MAX_TIMESTAMP_YEAR, Predicate, RecordStore, Row, Table, TableSchema,
    is_storable_timestamp, provision,
};
use crate::storage::traits::{Result, TokenStore};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use ulid::Ulid;

const ID: &str = "id";
const CREATED_AT: &str = "created_at";
const UPDATED_AT: &str = "updated_at";
const EXPIRES_AT: &str = "expires_at";
const CODE: &str = "code";
const ACCESS: &str = "access";
const REFRESH: &str = "refresh";
const PAYLOAD: &str = "payload";

/// Layout of the token table
pub static TOKEN_SCHEMA: TableSchema = TableSchema {
    primary_key: ID,
    columns: &[
        ColumnDef::text(ID),
        ColumnDef::timestamp(CREATED_AT),
        ColumnDef::timestamp(UPDATED_AT),
        ColumnDef::timestamp(EXPIRES_AT).indexed(),
        ColumnDef::text(CODE).nullable().indexed(),
        ColumnDef::text(ACCESS).nullable().indexed(),
        ColumnDef::text(REFRESH).nullable().indexed(),
        ColumnDef::text(PAYLOAD),
    ],
};

/// Token records reachable by code, access, or refresh value
pub struct CredentialStore {
    records: Arc<dyn RecordStore>,
    table: Table,
    config: StoreConfig,
    reclaimer: ExpiryReclaimer,
}

impl CredentialStore {
    /// Create a store, provisioning its table and starting its reclaimer
    pub async fn new(records: Arc<dyn RecordStore>, config: StoreConfig) -> Result<Self> {
        let table = Table::new(config.table_name.as_ref(), &TOKEN_SCHEMA);
        provision(records.as_ref(), &table).await?;

        let reclaimer = ExpiryReclaimer::spawn(
            records.clone(),
            table.clone(),
            EXPIRES_AT,
            *config.reclaim_interval.as_ref(),
            config.reporter.clone(),
        );

        Ok(Self {
            records,
            table,
            config,
            reclaimer,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Stop automatic reclamation; foreground operations keep working
    pub fn close(&self) {
        self.reclaimer.stop();
    }

    /// Stop automatic reclamation and wait for the task to exit
    pub async fn shutdown(&self) {
        self.reclaimer.stop();
        self.reclaimer.stopped().await;
    }

    pub fn is_closed(&self) -> bool {
        self.reclaimer.is_stopped()
    }

    /// Run one sweep immediately, returning how many records were removed
    pub async fn reclaim_now(&self) -> Result<u64> {
        sweep(self.records.as_ref(), &self.table, EXPIRES_AT, Utc::now()).await
    }

    fn token_to_row(token: &TokenMetadata) -> Result<Row> {
        let governing = token.governing_secret().ok_or_else(|| {
            StorageError::InvalidData("Token carries no code, access, or refresh value".to_string())
        })?;
        let expires_at = governing.expires_at().ok_or_else(|| {
            StorageError::InvalidData(format!(
                "Token lifetime of {}s overflows its issue time",
                governing.lifetime.num_seconds()
            ))
        })?;
        if !is_storable_timestamp(&expires_at) {
            return Err(StorageError::InvalidData(format!(
                "Token expiry {} is past year {}",
                expires_at, MAX_TIMESTAMP_YEAR
            )));
        }
        let fractional = [&token.code, &token.access, &token.refresh]
            .into_iter()
            .flatten()
            .any(|secret| !secret.has_whole_second_lifetime());
        if fractional {
            return Err(StorageError::InvalidData(
                "Token lifetimes must be whole seconds".to_string(),
            ));
        }
        let payload = serde_json::to_string(token)
            .map_err(|e| StorageError::SerializationFailed(e.to_string()))?;

        let now = Utc::now();
        Ok(Row::new()
            .with(ID, Ulid::new().to_string())
            .with(CREATED_AT, now)
            .with(UPDATED_AT, now)
            .with(EXPIRES_AT, expires_at)
            .with(CODE, token.code_value())
            .with(ACCESS, token.access_value())
            .with(REFRESH, token.refresh_value())
            .with(PAYLOAD, payload))
    }

    fn row_to_token(row: &Row) -> Result<TokenMetadata> {
        let payload = row.require_text(PAYLOAD)?;
        serde_json::from_str(payload).map_err(|e| {
            StorageError::CorruptRecord(format!(
                "Token {} payload: {}",
                row.text(ID).unwrap_or_default(),
                e
            ))
        })
    }

    async fn find_by(&self, column: &'static str, value: &str) -> Result<Option<Row>> {
        self.records
            .find_one(&self.table, &Predicate::Equals(column, value.into()))
            .await
    }

    async fn get_by(&self, column: &'static str, value: &str) -> Result<Option<TokenMetadata>> {
        if value.is_empty() {
            return Ok(None);
        }

        let row = self
            .find_by(column, value)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("No token with matching {}", column)))?;
        Self::row_to_token(&row).map(Some)
    }

    // The row is resolved first and then deleted by primary key, so a
    // non-unique secondary index can never widen the delete.
    async fn remove_by(&self, column: &'static str, value: &str) -> Result<()> {
        if value.is_empty() {
            return Ok(());
        }

        let Some(row) = self.find_by(column, value).await? else {
            return Ok(());
        };
        let id = row.require_text(ID)?;
        match self.records.delete_by_primary_key(&self.table, id).await {
            // reclaimed between lookup and delete
            Err(StorageError::NotFound(_)) => Ok(()),
            result => result,
        }
    }
}

#[async_trait]
impl TokenStore for CredentialStore {
    async fn create(&self, token: &TokenMetadata) -> Result<()> {
        let row = Self::token_to_row(token)?;
        self.records.insert(&self.table, &row).await
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<TokenMetadata>> {
        self.get_by(CODE, code).await
    }

    async fn get_by_access(&self, access: &str) -> Result<Option<TokenMetadata>> {
        self.get_by(ACCESS, access).await
    }

    async fn get_by_refresh(&self, refresh: &str) -> Result<Option<TokenMetadata>> {
        self.get_by(REFRESH, refresh).await
    }

    async fn remove_by_code(&self, code: &str) -> Result<()> {
        self.remove_by(CODE, code).await
    }

    async fn remove_by_access(&self, access: &str) -> Result<()> {
        self.remove_by(ACCESS, access).await
    }

    async fn remove_by_refresh(&self, refresh: &str) -> Result<()> {
        self.remove_by(REFRESH, refresh).await
    }
}
