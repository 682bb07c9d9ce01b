//! SQL text shared by the sqlx-backed record stores.
//!
//! Identifiers come from validated table names and static schemas and are
//! always double-quoted; values are always bound.

use crate::storage::records::{ColumnDef, ColumnType, Predicate, Table};

/// Placeholder and type differences between engines
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    fn placeholder(self, position: usize) -> String {
        match self {
            Dialect::Sqlite => "?".to_string(),
            Dialect::Postgres => format!("${}", position),
        }
    }

    fn column_type(self, column_type: ColumnType) -> &'static str {
        match (self, column_type) {
            (_, ColumnType::Text) => "TEXT",
            (Dialect::Sqlite, ColumnType::Timestamp) => "TEXT",
            (Dialect::Postgres, ColumnType::Timestamp) => "TIMESTAMPTZ",
        }
    }
}

pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn column_list(table: &Table) -> String {
    table
        .schema()
        .columns
        .iter()
        .map(|c| quote_ident(c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn column_definition(dialect: Dialect, column: &ColumnDef, primary_key: bool) -> String {
    let mut definition = format!(
        "{} {}",
        quote_ident(column.name),
        dialect.column_type(column.column_type)
    );
    if primary_key {
        definition.push_str(" PRIMARY KEY");
    } else if !column.nullable {
        definition.push_str(" NOT NULL");
    }
    definition
}

fn where_clause(predicate: &Predicate, dialect: Dialect, position: usize) -> String {
    let operator = match predicate {
        Predicate::Equals(_, _) => "=",
        Predicate::ExpiredAt(_, _) => "<=",
    };
    format!(
        "{} {} {}",
        quote_ident(predicate.column()),
        operator,
        dialect.placeholder(position)
    )
}

pub fn create_table(dialect: Dialect, table: &Table) -> String {
    let schema = table.schema();
    let columns = schema
        .columns
        .iter()
        .map(|c| column_definition(dialect, c, c.name == schema.primary_key))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({})", quote_ident(table.name()), columns)
}

/// Added columns are always nullable so existing rows stay valid
pub fn add_column(dialect: Dialect, table: &Table, column: &ColumnDef) -> String {
    let if_not_exists = match dialect {
        Dialect::Sqlite => "",
        Dialect::Postgres => "IF NOT EXISTS ",
    };
    format!(
        "ALTER TABLE {} ADD COLUMN {}{} {}",
        quote_ident(table.name()),
        if_not_exists,
        quote_ident(column.name),
        dialect.column_type(column.column_type)
    )
}

pub fn create_index(table: &Table, column: &ColumnDef) -> String {
    format!(
        "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
        quote_ident(&format!("idx_{}_{}", table.name(), column.name)),
        quote_ident(table.name()),
        quote_ident(column.name)
    )
}

pub fn insert(dialect: Dialect, table: &Table, columns: &[&str]) -> String {
    let placeholders = (1..=columns.len())
        .map(|i| dialect.placeholder(i))
        .collect::<Vec<_>>()
        .join(", ");
    let names = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table.name()),
        names,
        placeholders
    )
}

pub fn select_one(dialect: Dialect, table: &Table, predicate: &Predicate) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} LIMIT 1",
        column_list(table),
        quote_ident(table.name()),
        where_clause(predicate, dialect, 1)
    )
}

pub fn delete_where(dialect: Dialect, table: &Table, predicate: &Predicate) -> String {
    format!(
        "DELETE FROM {} WHERE {}",
        quote_ident(table.name()),
        where_clause(predicate, dialect, 1)
    )
}

pub fn delete_by_primary_key(dialect: Dialect, table: &Table) -> String {
    format!(
        "DELETE FROM {} WHERE {} = {}",
        quote_ident(table.name()),
        quote_ident(table.schema().primary_key),
        dialect.placeholder(1)
    )
}
