//! In-memory record store with per-column secondary indexes.

use crate::errors::StorageError;
use crate::storage::records::{Predicate, RecordStore, Result, Row, Table, Value};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

#[derive(Default)]
struct MemoryTable {
    rows: HashMap<String, Row>,
    // column -> text value -> primary keys
    indexes: HashMap<&'static str, HashMap<String, BTreeSet<String>>>,
}

impl MemoryTable {
    fn index_row(&mut self, key: &str, row: &Row) {
        for (column, index) in self.indexes.iter_mut() {
            if let Some(value) = row.text(column) {
                index
                    .entry(value.to_string())
                    .or_default()
                    .insert(key.to_string());
            }
        }
    }

    fn unindex_row(&mut self, key: &str, row: &Row) {
        for (column, index) in self.indexes.iter_mut() {
            if let Some(value) = row.text(column) {
                if let Some(keys) = index.get_mut(value) {
                    keys.remove(key);
                    if keys.is_empty() {
                        index.remove(value);
                    }
                }
            }
        }
    }

    fn add_index(&mut self, column: &'static str) {
        if self.indexes.contains_key(column) {
            return;
        }
        let mut index: HashMap<String, BTreeSet<String>> = HashMap::new();
        for (key, row) in &self.rows {
            if let Some(value) = row.text(column) {
                index.entry(value.to_string()).or_default().insert(key.clone());
            }
        }
        self.indexes.insert(column, index);
    }

    fn matching_keys(&self, predicate: &Predicate) -> Vec<String> {
        if let Predicate::Equals(column, Value::Text(value)) = predicate {
            if let Some(index) = self.indexes.get(*column) {
                return index
                    .get(value)
                    .map(|keys| keys.iter().cloned().collect())
                    .unwrap_or_default();
            }
        }

        let mut keys: Vec<String> = self
            .rows
            .iter()
            .filter(|(_, row)| predicate.matches(row))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.rows.remove(key) {
            Some(row) => {
                self.unindex_row(key, &row);
                true
            }
            None => false,
        }
    }
}

/// In-memory implementation of the record store
#[derive(Default)]
pub struct MemoryRecordStore {
    tables: RwLock<HashMap<String, MemoryTable>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_error<E: std::fmt::Display>(e: E) -> StorageError {
        StorageError::StorageFailure(format!("Lock error: {}", e))
    }

    fn missing_table(table: &Table) -> StorageError {
        StorageError::StorageFailure(format!("No such table: {}", table.name()))
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn table_exists(&self, name: &str) -> Result<bool> {
        let tables = self.tables.read().map_err(Self::lock_error)?;
        Ok(tables.contains_key(name))
    }

    async fn create_table(&self, table: &Table) -> Result<()> {
        let mut tables = self.tables.write().map_err(Self::lock_error)?;
        if tables.contains_key(table.name()) {
            return Err(StorageError::StorageFailure(format!(
                "Table already exists: {}",
                table.name()
            )));
        }
        tables.insert(table.name().to_string(), MemoryTable::default());
        Ok(())
    }

    async fn ensure_schema(&self, table: &Table) -> Result<()> {
        let mut tables = self.tables.write().map_err(Self::lock_error)?;
        let entry = tables
            .get_mut(table.name())
            .ok_or_else(|| Self::missing_table(table))?;
        for column in table.schema().indexed_columns() {
            entry.add_index(column.name);
        }
        Ok(())
    }

    async fn insert(&self, table: &Table, row: &Row) -> Result<()> {
        table.check_row(row)?;
        let key = table.primary_key_of(row)?.to_string();

        let mut tables = self.tables.write().map_err(Self::lock_error)?;
        let entry = tables
            .get_mut(table.name())
            .ok_or_else(|| Self::missing_table(table))?;
        if entry.rows.contains_key(&key) {
            return Err(StorageError::DuplicateKey(format!(
                "{}.{} = {}",
                table.name(),
                table.schema().primary_key,
                key
            )));
        }

        entry.index_row(&key, row);
        entry.rows.insert(key, row.clone());
        Ok(())
    }

    async fn find_one(&self, table: &Table, predicate: &Predicate) -> Result<Option<Row>> {
        table.check_predicate(predicate)?;

        let tables = self.tables.read().map_err(Self::lock_error)?;
        let entry = tables
            .get(table.name())
            .ok_or_else(|| Self::missing_table(table))?;
        Ok(entry
            .matching_keys(predicate)
            .first()
            .and_then(|key| entry.rows.get(key))
            .cloned())
    }

    async fn delete_where(&self, table: &Table, predicate: &Predicate) -> Result<u64> {
        table.check_predicate(predicate)?;

        let mut tables = self.tables.write().map_err(Self::lock_error)?;
        let entry = tables
            .get_mut(table.name())
            .ok_or_else(|| Self::missing_table(table))?;

        let mut removed = 0;
        for key in entry.matching_keys(predicate) {
            if entry.remove(&key) {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn delete_by_primary_key(&self, table: &Table, key: &str) -> Result<()> {
        let mut tables = self.tables.write().map_err(Self::lock_error)?;
        let entry = tables
            .get_mut(table.name())
            .ok_or_else(|| Self::missing_table(table))?;
        if entry.remove(key) {
            Ok(())
        } else {
            Err(StorageError::NotFound(format!(
                "{}.{} = {}",
                table.name(),
                table.schema().primary_key,
                key
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::records::{ColumnDef, TableSchema, provision};
    use chrono::{Duration, Utc};

    static SCHEMA: TableSchema = TableSchema {
        primary_key: "id",
        columns: &[
            ColumnDef::text("id"),
            ColumnDef::text("code").nullable().indexed(),
            ColumnDef::timestamp("expires_at").indexed(),
        ],
    };

    async fn setup() -> (MemoryRecordStore, Table) {
        let records = MemoryRecordStore::new();
        let table = Table::new("things", &SCHEMA);
        provision(&records, &table).await.unwrap();
        (records, table)
    }

    #[tokio::test]
    async fn test_provision_is_idempotent() {
        let (records, table) = setup().await;
        assert!(records.table_exists("things").await.unwrap());
        assert!(!records.table_exists("others").await.unwrap());
        provision(&records, &table).await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_primary_key() {
        let (records, table) = setup().await;
        let row = Row::new().with("id", "a").with("expires_at", Utc::now());

        records.insert(&table, &row).await.unwrap();
        let result = records.insert(&table, &row).await;
        assert!(matches!(result, Err(StorageError::DuplicateKey(_))));
    }

    #[tokio::test]
    async fn test_find_one_uses_secondary_index() {
        let (records, table) = setup().await;
        let now = Utc::now();
        records
            .insert(
                &table,
                &Row::new().with("id", "a").with("code", "c1").with("expires_at", now),
            )
            .await
            .unwrap();
        records
            .insert(
                &table,
                &Row::new().with("id", "b").with("code", "c2").with("expires_at", now),
            )
            .await
            .unwrap();

        let found = records
            .find_one(&table, &Predicate::Equals("code", "c2".into()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.text("id"), Some("b"));

        let missing = records
            .find_one(&table, &Predicate::Equals("code", "c3".into()))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_delete_where_and_by_primary_key() {
        let (records, table) = setup().await;
        let now = Utc::now();
        for (id, offset) in [("old", -10), ("older", -20), ("fresh", 60)] {
            records
                .insert(
                    &table,
                    &Row::new()
                        .with("id", id)
                        .with("code", format!("code-{id}"))
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

        let index_cleared = records
            .find_one(&table, &Predicate::Equals("code", "code-old".into()))
            .await
            .unwrap();
        assert!(index_cleared.is_none());

        records.delete_by_primary_key(&table, "fresh").await.unwrap();
        let result = records.delete_by_primary_key(&table, "fresh").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_operations_on_missing_table_fail() {
        let records = MemoryRecordStore::new();
        let table = Table::new("missing", &SCHEMA);
        let result = records
            .find_one(&table, &Predicate::Equals("id", "a".into()))
            .await;
        assert!(matches!(result, Err(StorageError::StorageFailure(_))));
    }
}
