//! PostgreSQL implementation of the record store

use crate::errors::StorageError;
use crate::storage::records::{
    ColumnDef, ColumnType, Predicate, RecordStore, Result, Row, Table, Value,
};
use crate::storage::sql::{self, Dialect};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row as _;
use sqlx::postgres::{PgArguments, PgPool, PgRow, Postgres};
use sqlx::query::Query;
use std::collections::HashSet;

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// PostgreSQL implementation of the record store
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    /// Create a new PostgreSQL record store
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await.map_err(|e| {
            StorageError::ConnectionFailed(format!("PostgreSQL connection failed: {}", e))
        })?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // Nulls are bound with the column's own type so Postgres can infer the parameter
    fn bind<'q>(query: PgQuery<'q>, column: &ColumnDef, value: &Value) -> PgQuery<'q> {
        match value {
            Value::Text(text) => query.bind(text.clone()),
            Value::Timestamp(at) => query.bind(*at),
            Value::Null => match column.column_type {
                ColumnType::Text => query.bind(None::<String>),
                ColumnType::Timestamp => query.bind(None::<DateTime<Utc>>),
            },
        }
    }

    fn bind_predicate<'q>(
        query: PgQuery<'q>,
        table: &Table,
        predicate: &Predicate,
    ) -> Result<PgQuery<'q>> {
        Ok(match predicate {
            Predicate::Equals(column, value) => Self::bind(query, table.column(column)?, value),
            Predicate::ExpiredAt(_, at) => query.bind(*at),
        })
    }

    fn row_to_record(table: &Table, row: &PgRow) -> Result<Row> {
        let mut record = Row::new();
        for column in table.schema().columns {
            let value = match column.column_type {
                ColumnType::Text => {
                    let raw: Option<String> = row.try_get(column.name).map_err(|e| {
                        StorageError::StorageFailure(format!(
                            "Failed to get {}: {}",
                            column.name, e
                        ))
                    })?;
                    raw.into()
                }
                ColumnType::Timestamp => {
                    let raw: Option<DateTime<Utc>> = row.try_get(column.name).map_err(|e| {
                        StorageError::StorageFailure(format!(
                            "Failed to get {}: {}",
                            column.name, e
                        ))
                    })?;
                    raw.into()
                }
            };
            record.set(column.name, value);
        }
        Ok(record)
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn table_exists(&self, name: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = current_schema() AND table_name = $1
            )
            "#,
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn create_table(&self, table: &Table) -> Result<()> {
        sqlx::query(&sql::create_table(Dialect::Postgres, table))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn ensure_schema(&self, table: &Table) -> Result<()> {
        let existing: HashSet<String> = sqlx::query_scalar::<_, String>(
            r#"
            SELECT column_name::text FROM information_schema.columns
            WHERE table_schema = current_schema() AND table_name = $1
            "#,
        )
        .bind(table.name())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .collect();

        for column in table.schema().columns {
            if !existing.contains(column.name) {
                tracing::info!(table = table.name(), column = column.name, "adding column");
                sqlx::query(&sql::add_column(Dialect::Postgres, table, column))
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
        let statement = sql::insert(Dialect::Postgres, table, &columns);
        let mut query = sqlx::query(&statement);
        for (name, value) in row.iter() {
            query = Self::bind(query, table.column(name)?, value);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }

    async fn find_one(&self, table: &Table, predicate: &Predicate) -> Result<Option<Row>> {
        table.check_predicate(predicate)?;

        let statement = sql::select_one(Dialect::Postgres, table, predicate);
        let query = Self::bind_predicate(sqlx::query(&statement), table, predicate)?;
        let row = query.fetch_optional(&self.pool).await?;
        row.map(|row| Self::row_to_record(table, &row)).transpose()
    }

    async fn delete_where(&self, table: &Table, predicate: &Predicate) -> Result<u64> {
        table.check_predicate(predicate)?;

        let statement = sql::delete_where(Dialect::Postgres, table, predicate);
        let query = Self::bind_predicate(sqlx::query(&statement), table, predicate)?;
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn delete_by_primary_key(&self, table: &Table, key: &str) -> Result<()> {
        let statement = sql::delete_by_primary_key(Dialect::Postgres, table);
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
