use crate::store::{Gateway, Row, SqlValue, StoreError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column, Row as _, Sqlite, TypeInfo, ValueRef};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Gateway over a local SQLite database file, or an in-memory database.
pub struct SqliteGateway {
    pool: SqlitePool,
}

impl SqliteGateway {
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        info!("Opening SQLite database at: {:?}", path);

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(30));
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { pool })
    }

    /// A private database that lives as long as the gateway.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new().in_memory(true);
        // A single connection that never recycles, otherwise each new
        // connection would see an empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { pool })
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    params: &'q [SqlValue],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for param in params {
        query = match param {
            SqlValue::Text(v) => query.bind(v.as_str()),
            // SQLite has no decimal type; the canonical string keeps it exact.
            SqlValue::Decimal(v) => query.bind(v.to_string()),
            SqlValue::Date(v) => query.bind(*v),
        };
    }
    query
}

fn row_to_map(row: &SqliteRow) -> Result<Row, StoreError> {
    let mut map = Map::new();
    for column in row.columns() {
        let index = column.ordinal();
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_string();
            match type_name.as_str() {
                "INTEGER" => Value::from(row.try_get_unchecked::<i64, _>(index)?),
                "REAL" => Value::from(row.try_get_unchecked::<f64, _>(index)?),
                "BOOLEAN" => Value::Bool(row.try_get_unchecked::<bool, _>(index)?),
                "TEXT" => Value::String(row.try_get_unchecked::<String, _>(index)?),
                other => {
                    debug!("Skipping column {} of type {}", column.name(), other);
                    Value::Null
                }
            }
        };
        map.insert(column.name().to_string(), value);
    }
    Ok(map)
}

#[async_trait]
impl Gateway for SqliteGateway {
    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn rates_table_ddl(&self, table: &str) -> String {
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                rate_id INTEGER PRIMARY KEY AUTOINCREMENT,
                rate_date TEXT NOT NULL,
                base_currency_code TEXT NOT NULL,
                target_currency_code TEXT NOT NULL,
                exchange_rate TEXT NOT NULL,
                UNIQUE (rate_date, target_currency_code)
            )
            "#
        )
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64, StoreError> {
        let result = bind_params(sqlx::query(sql), params)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn fetch(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, StoreError> {
        debug!("Running query: {}", sql);
        let rows = bind_params(sqlx::query(sql), params)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_map).collect()
    }
}
