//! Persistence gateway: relational stores and the flat-file sink.

pub mod csv;
pub mod postgres;
pub mod sqlite;

use crate::core::config::{DatabaseConfig, DatabaseDriver};
use async_trait::async_trait;
use chrono::NaiveDate;
use postgres::PgGateway;
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use sqlite::SqliteGateway;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// One result row, keyed by column name.
pub type Row = Map<String, Value>;

/// A value bound positionally into a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Decimal(Decimal),
    Date(NaiveDate),
}

#[derive(Error, Debug)]
pub enum StoreError {
    /// A unique constraint rejected the row.
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Failed to connect to database: {0}")]
    Connection(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Invalid SQL identifier: '{0}'")]
    InvalidIdentifier(String),

    #[error("Got {values} values for {columns} columns")]
    ArityMismatch { columns: usize, values: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err
            && db_err.is_unique_violation()
        {
            return StoreError::Duplicate(db_err.message().to_string());
        }
        StoreError::Database(err)
    }
}

/// Accepts `[A-Za-z_][A-Za-z0-9_]*`, the only names interpolated into SQL.
pub fn validate_identifier(name: &str) -> Result<&str, StoreError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(name)
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

/// Builds `INSERT INTO t (a, b) VALUES (p1, p2)` with one placeholder per value.
pub fn build_insert_sql(
    table: &str,
    columns: &[&str],
    value_count: usize,
    placeholder: impl Fn(usize) -> String,
) -> Result<String, StoreError> {
    if columns.len() != value_count {
        return Err(StoreError::ArityMismatch {
            columns: columns.len(),
            values: value_count,
        });
    }
    let table = validate_identifier(table)?;
    let columns = columns
        .iter()
        .map(|c| validate_identifier(c))
        .collect::<Result<Vec<_>, _>>()?;
    let placeholders: Vec<String> = (1..=value_count).map(placeholder).collect();
    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders.join(", ")
    ))
}

#[async_trait]
pub trait Gateway: Send + Sync {
    /// Placeholder for the 1-based parameter `index`.
    fn placeholder(&self, index: usize) -> String;

    /// DDL for the rates table on this backend.
    fn rates_table_ddl(&self, table: &str) -> String;

    /// Runs a statement and commits it. Returns the affected row count.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, StoreError>;

    /// Runs a query and returns every row.
    async fn fetch(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, StoreError>;

    async fn insert_row(
        &self,
        table: &str,
        columns: &[&str],
        values: &[SqlValue],
    ) -> Result<(), StoreError> {
        let sql = build_insert_sql(table, columns, values.len(), |i| self.placeholder(i))?;
        debug!("Inserting into {}: {:?}", table, values);
        self.execute(&sql, values).await?;
        Ok(())
    }

    async fn query_all(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        let sql = format!("SELECT * FROM {}", validate_identifier(table)?);
        self.fetch(&sql, &[]).await
    }

    async fn run_query(&self, sql: &str) -> Result<Vec<Row>, StoreError> {
        self.fetch(sql, &[]).await
    }

    async fn ensure_rates_table(&self, table: &str) -> Result<(), StoreError> {
        let ddl = self.rates_table_ddl(validate_identifier(table)?);
        self.execute(&ddl, &[]).await?;
        Ok(())
    }
}

/// Opens a gateway. Called once per pipeline run.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn Gateway>, StoreError>;
}

#[async_trait]
impl Connector for DatabaseConfig {
    async fn connect(&self) -> Result<Arc<dyn Gateway>, StoreError> {
        match self.driver {
            DatabaseDriver::Postgres => Ok(Arc::new(PgGateway::connect(self).await?)),
            DatabaseDriver::Sqlite => {
                let gateway = match &self.path {
                    Some(path) => SqliteGateway::open(path).await?,
                    None => SqliteGateway::in_memory().await?,
                };
                Ok(Arc::new(gateway))
            }
        }
    }
}
