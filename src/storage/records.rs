//! Persistent-record collaborator contract.
//!
//! The stores describe their tables with a static [`TableSchema`] and talk to
//! any engine through [`RecordStore`]: create/read/delete by primary key or by a
//! single-column predicate, plus table provisioning.

use crate::errors::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use std::collections::BTreeMap;

pub type Result<T> = std::result::Result<T, StorageError>;

/// Last year every backend can store and compare as a timestamp
pub const MAX_TIMESTAMP_YEAR: i32 = 9999;

/// Whether a timestamp falls inside the range shared by all backends
pub fn is_storable_timestamp(value: &DateTime<Utc>) -> bool {
    (0..=MAX_TIMESTAMP_YEAR).contains(&value.year())
}

/// Column value type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Timestamp,
}

/// Column definition within a table schema
#[derive(Clone, Copy, Debug)]
pub struct ColumnDef {
    pub name: &'static str,
    pub column_type: ColumnType,
    pub nullable: bool,
    /// Backed by a non-unique secondary index
    pub indexed: bool,
}

impl ColumnDef {
    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            column_type: ColumnType::Text,
            nullable: false,
            indexed: false,
        }
    }

    pub const fn timestamp(name: &'static str) -> Self {
        Self {
            name,
            column_type: ColumnType::Timestamp,
            nullable: false,
            indexed: false,
        }
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }
}

/// Static description of a table; the primary key must be a text column
#[derive(Debug)]
pub struct TableSchema {
    pub primary_key: &'static str,
    pub columns: &'static [ColumnDef],
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn indexed_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.indexed)
    }
}

/// Named table bound to its schema
#[derive(Clone, Debug)]
pub struct Table {
    name: String,
    schema: &'static TableSchema,
}

impl Table {
    pub fn new(name: impl Into<String>, schema: &'static TableSchema) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &'static TableSchema {
        self.schema
    }

    /// Look up a column, failing for names outside the schema
    pub fn column(&self, name: &str) -> Result<&'static ColumnDef> {
        self.schema.column(name).ok_or_else(|| {
            StorageError::InvalidData(format!("Unknown column {} in table {}", name, self.name))
        })
    }

    /// Validate a row against the schema before it is written
    pub fn check_row(&self, row: &Row) -> Result<()> {
        for (name, value) in row.iter() {
            let column = self.column(name)?;
            let type_matches = match value {
                Value::Null => true,
                Value::Text(_) => column.column_type == ColumnType::Text,
                Value::Timestamp(_) => column.column_type == ColumnType::Timestamp,
            };
            if !type_matches {
                return Err(StorageError::InvalidData(format!(
                    "Value for column {} does not match its type",
                    name
                )));
            }
            if let Value::Timestamp(at) = value {
                if !is_storable_timestamp(at) {
                    return Err(StorageError::InvalidData(format!(
                        "Timestamp {} for column {} is outside years 0 to {}",
                        at, name, MAX_TIMESTAMP_YEAR
                    )));
                }
            }
        }

        for column in self.schema.columns.iter().filter(|c| !c.nullable) {
            if matches!(row.get(column.name), None | Some(Value::Null)) {
                return Err(StorageError::InvalidData(format!(
                    "Column {} of table {} requires a value",
                    column.name, self.name
                )));
            }
        }

        Ok(())
    }

    /// Validate that a predicate only references columns of this table
    pub fn check_predicate(&self, predicate: &Predicate) -> Result<()> {
        let column = self.column(predicate.column())?;
        if let Predicate::ExpiredAt(_, _) = predicate {
            if column.column_type != ColumnType::Timestamp {
                return Err(StorageError::InvalidData(format!(
                    "Column {} is not a timestamp",
                    column.name
                )));
            }
        }
        Ok(())
    }

    /// Primary key value of a row
    pub fn primary_key_of<'a>(&self, row: &'a Row) -> Result<&'a str> {
        row.text(self.schema.primary_key).ok_or_else(|| {
            StorageError::InvalidData(format!(
                "Row for table {} has no primary key {}",
                self.name, self.schema.primary_key
            ))
        })
    }
}

/// Single column value
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Text(String),
    Timestamp(DateTime<Utc>),
    Null,
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Column name to value mapping for one record
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row(BTreeMap<&'static str, Value>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: &'static str, value: impl Into<Value>) {
        self.0.insert(column, value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.0.iter().map(|(name, value)| (*name, value))
    }

    /// Text value of a column, `None` when absent or null
    pub fn text(&self, column: &str) -> Option<&str> {
        match self.0.get(column) {
            Some(Value::Text(value)) => Some(value),
            _ => None,
        }
    }

    /// Timestamp value of a column, `None` when absent or null
    pub fn timestamp(&self, column: &str) -> Option<DateTime<Utc>> {
        match self.0.get(column) {
            Some(Value::Timestamp(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn require_text(&self, column: &str) -> Result<&str> {
        self.text(column).ok_or_else(|| {
            StorageError::CorruptRecord(format!("Missing text column {}", column))
        })
    }

    pub fn require_timestamp(&self, column: &str) -> Result<DateTime<Utc>> {
        self.timestamp(column).ok_or_else(|| {
            StorageError::CorruptRecord(format!("Missing timestamp column {}", column))
        })
    }
}

/// Single-column row filter
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// `column = value`; never matches a null value
    Equals(&'static str, Value),
    /// `column <= instant`
    ExpiredAt(&'static str, DateTime<Utc>),
}

impl Predicate {
    pub fn column(&self) -> &'static str {
        match self {
            Predicate::Equals(column, _) | Predicate::ExpiredAt(column, _) => column,
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        match self {
            Predicate::Equals(_, Value::Null) => false,
            Predicate::Equals(column, value) => row.get(column) == Some(value),
            Predicate::ExpiredAt(column, at) => row.timestamp(column).is_some_and(|t| t <= *at),
        }
    }
}

/// Storage engine consumed by the stores
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Check whether a table has been created
    async fn table_exists(&self, name: &str) -> Result<bool>;

    /// Create a table with its primary key
    async fn create_table(&self, table: &Table) -> Result<()>;

    /// Add missing columns and secondary indexes to an existing table
    async fn ensure_schema(&self, table: &Table) -> Result<()>;

    /// Insert one row; `DuplicateKey` when the primary key is taken
    async fn insert(&self, table: &Table, row: &Row) -> Result<()>;

    /// Fetch the first row matching the predicate
    async fn find_one(&self, table: &Table, predicate: &Predicate) -> Result<Option<Row>>;

    /// Delete every matching row in one statement, returning the count
    async fn delete_where(&self, table: &Table, predicate: &Predicate) -> Result<u64>;

    /// Delete the row with this primary key; `NotFound` when nothing was removed
    async fn delete_by_primary_key(&self, table: &Table, key: &str) -> Result<()>;
}

/// Create the table when absent, then bring its schema up to date
pub async fn provision(records: &dyn RecordStore, table: &Table) -> Result<()> {
    if !records.table_exists(table.name()).await? {
        tracing::info!(table = table.name(), "creating table");
        records.create_table(table).await?;
    }
    records.ensure_schema(table).await
}
