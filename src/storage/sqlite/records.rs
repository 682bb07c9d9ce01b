//! SQLite implementation of the record store

use crate::errors::StorageError;
use crate::storage::records::{ColumnType, Predicate, RecordStore, Result, Row, Table, Value};
use crate::storage::sql::{self, Dialect};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row as _;
use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use std::collections::HashSet;
use std::str::FromStr;

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// SQLite implementation of the record store
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Create a new SQLite record store
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a database file, creating it when missing
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StorageError::ConnectionFailed(format!("Invalid SQLite URL: {}", e)))?
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            StorageError::ConnectionFailed(format!("SQLite connection failed: {}", e))
        })?;
        Ok(Self::new(pool))
    }

    /// Private in-memory database held by a single long-lived connection
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                StorageError::ConnectionFailed(format!("SQLite connection failed: {}", e))
            })?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn encode_timestamp(value: &DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn decode_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| {
                StorageError::CorruptRecord(format!("Invalid {} timestamp: {}", column, e))
            })
    }

    fn bind<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
        match value {
            Value::Text(text) => query.bind(text.clone()),
            Value::Timestamp(at) => query.bind(Self::encode_timestamp(at)),
            Value::Null => query.bind(None::<String>),
        }
    }

    fn row_to_record(table: &Table, row: &SqliteRow) -> Result<Row> {
        let mut record = Row::new();
        for column in table.schema().columns {
            let raw: Option<String> = row.try_get(column.name).map_err(|e| {
                StorageError::StorageFailure(format!("Failed to get {}: {}", column.name, e))
            })?;
            let value = match (column.column_type, raw) {
                (_, None) => Value::Null,
                (ColumnType::Text, Some(text)) => Value::Text(text),
                (ColumnType::Timestamp, Some(text)) => {
                    Value::Timestamp(Self::decode_timestamp(column.name, &text)?)
                }
            };
            record.set(column.name, value);
        }
        Ok(record)
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn table_exists(&self, name: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn create_table(&self, table: &Table) -> Result<()> {
        sqlx::query(&sql::create_table(Dialect::Sqlite, table))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn ensure_schema(&self, table: &Table) -> Result<()> {
        let existing: HashSet<String> =
            sqlx::query_scalar::<_, String>("SELECT name FROM pragma_table_info(?)")
                .bind(table.name())
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .collect();

        for column in table.schema().columns {
            if !existing.contains(column.name) {
                tracing::info!(table = table.name(), column = column.name, "adding column");
                sqlx::query(&sql::add_column(Dialect::Sqlite, table, column))
                    .execute(&self.pool)
                    .await?;
            }
        }

        for column in table.schema().indexed_columns() {
            sqlx::query(&sql::create_index(table, column))
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn insert(&self, table: &Table, row: &Row) -> Result<()> {
        table.check_row(row)?;

        let columns: Vec<&str> = row.iter().map(|(name, _)| name).collect();
        let statement = sql::insert(Dialect::Sqlite, table, &columns);
        let mut query = sqlx::query(&statement);
        for (_, value) in row.iter() {
            query = Self::bind(query, value);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }

    async fn find_one(&self, table: &Table, predicate: &Predicate) -> Result<Option<Row>> {
        table.check_predicate(predicate)?;

        let statement = sql::select_one(Dialect::Sqlite, table, predicate);
        let query = sqlx::query(&statement);
        let query = match predicate {
            Predicate::Equals(_, value) => Self::bind(query, value),
            Predicate::ExpiredAt(_, at) => query.bind(Self::encode_timestamp(at)),
        };

        let row = query.fetch_optional(&self.pool).await?;
        row.map(|row| Self::row_to_record(table, &row)).transpose()
    }

    async fn delete_where(&self, table: &Table, predicate: &Predicate) -> Result<u64> {
        table.check_predicate(predicate)?;

        let statement = sql::delete_where(Dialect::Sqlite, table, predicate);
        let query = sqlx::query(&statement);
        let query = match predicate {
            Predicate::Equals(_, value) => Self::bind(query, value),
            Predicate::ExpiredAt(_, at) => query.bind(Self::encode_timestamp(at)),
        };

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn delete_by_primary_key(&self, table: &Table, key: &str) -> Result<()> {
        let statement = sql::delete_by_primary_key(Dialect::Sqlite, table);
        let result = sqlx::query(&statement)
            .bind(key.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "{}.{} = {}",
                table.name(),
                table.schema().primary_key,
                key
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::records::{ColumnDef, TableSchema, provision};
    use chrono::Duration;

    static SCHEMA: TableSchema = TableSchema {
        primary_key: "id",
        columns: &[
            ColumnDef::text("id"),
            ColumnDef::text("code").nullable().indexed(),
            ColumnDef::timestamp("expires_at").indexed(),
        ],
    };

    static WIDER_SCHEMA: TableSchema = TableSchema {
        primary_key: "id",
        columns: &[
            ColumnDef::text("id"),
            ColumnDef::text("code").nullable().indexed(),
            ColumnDef::timestamp("expires_at").indexed(),
            ColumnDef::text("payload").nullable(),
        ],
    };

    async fn setup() -> (SqliteRecordStore, Table) {
        let records = SqliteRecordStore::in_memory().await.unwrap();
        let table = Table::new("Things", &SCHEMA);
        provision(&records, &table).await.unwrap();
        (records, table)
    }

    #[tokio::test]
    async fn test_provision_creates_table() {
        let (records, table) = setup().await;
        assert!(records.table_exists("Things").await.unwrap());
        assert!(!records.table_exists("Others").await.unwrap());
        provision(&records, &table).await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_schema_adds_missing_columns() {
        let (records, _) = setup().await;
        let wider = Table::new("Things", &WIDER_SCHEMA);
        provision(&records, &wider).await.unwrap();

        let row = Row::new()
            .with("id", "a")
            .with("expires_at", Utc::now())
            .with("payload", "{}");
        records.insert(&wider, &row).await.unwrap();

        let found = records
            .find_one(&wider, &Predicate::Equals("id", "a".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.text("payload"), Some("{}"));
    }

    #[tokio::test]
    async fn test_round_trip_preserves_values() {
        let (records, table) = setup().await;
        let expires_at = Utc::now() + Duration::minutes(5);
        let row = Row::new()
            .with("id", "a")
            .with("code", None::<String>)
            .with("expires_at", expires_at);
        records.insert(&table, &row).await.unwrap();

        let found = records
            .find_one(&table, &Predicate::Equals("id", "a".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.get("code"), Some(&Value::Null));
        assert_eq!(
            found.timestamp("expires_at").unwrap().timestamp_micros(),
            expires_at.timestamp_micros()
        );
    }

    #[tokio::test]
    async fn test_duplicate_primary_key_maps_to_duplicate_key() {
        let (records, table) = setup().await;
        let row = Row::new().with("id", "a").with("expires_at", Utc::now());
        records.insert(&table, &row).await.unwrap();

        let result = records.insert(&table, &row).await;
        assert!(matches!(result, Err(StorageError::DuplicateKey(_))));
    }

    #[tokio::test]
    async fn test_delete_where_compares_timestamps() {
        let (records, table) = setup().await;
        let now = Utc::now();
        for (id, offset) in [("old", -3600), ("older", -86400), ("fresh", 3600)] {
            records
                .insert(
                    &table,
                    &Row::new()
                        .with("id", id)
                        .with("expires_at", now + Duration::seconds(offset)),
                )
                .await
                .unwrap();
        }

        let removed = records
            .delete_where(&table, &Predicate::ExpiredAt("expires_at", now))
            .await
            .unwrap();
        assert_eq!(removed, 2);

        records.delete_by_primary_key(&table, "fresh").await.unwrap();
        let result = records.delete_by_primary_key(&table, "fresh").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rejects_timestamps_past_year_9999() {
        let (records, table) = setup().await;
        let far = DateTime::parse_from_rfc3339("9999-12-31T23:59:59Z")
            .unwrap()
            .with_timezone(&Utc)
            + Duration::days(1);
        let row = Row::new().with("id", "far").with("expires_at", far);

        let result = records.insert(&table, &row).await;
        assert!(matches!(result, Err(StorageError::InvalidData(_))));
        assert!(
            records
                .find_one(&table, &Predicate::Equals("id", "far".into()))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_far_future_token_survives_sweeps() {
        use crate::config::StoreConfig;
        use crate::oauth::{CredentialStore, TokenMetadata};
        use crate::storage::traits::TokenStore;
        use std::sync::Arc;

        let records = Arc::new(SqliteRecordStore::in_memory().await.unwrap());
        let store = CredentialStore::new(records, StoreConfig::tokens())
            .await
            .unwrap();
        let token = TokenMetadata::new("abc", "me", "http://localhost", "profile");

        let result = store
            .create(&token.clone().with_refresh(
                "refresh_9000y",
                Utc::now(),
                Duration::days(365 * 9000),
            ))
            .await;
        assert!(matches!(result, Err(StorageError::InvalidData(_))));

        store
            .create(&token.with_refresh(
                "refresh_7000y",
                Utc::now(),
                Duration::days(365 * 7000),
            ))
            .await
            .unwrap();
        assert_eq!(store.reclaim_now().await.unwrap(), 0);
        assert!(store.get_by_refresh("refresh_7000y").await.unwrap().is_some());

        store.shutdown().await;
    }
}
