use crate::core::config::DatabaseConfig;
use crate::store::{Gateway, Row, SqlValue, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgSslMode};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row as _, TypeInfo, ValueRef};
use tracing::{debug, info};

const DEFAULT_PORT: u16 = 5432;

/// Gateway over a TLS-secured PostgreSQL server.
pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    /// Builds connection options from the configured credentials.
    ///
    /// TLS is always required. With a certificate path the server certificate
    /// is verified against it.
    pub fn connect_options(config: &DatabaseConfig) -> Result<PgConnectOptions, StoreError> {
        let host = config
            .host
            .as_deref()
            .ok_or_else(|| StoreError::Connection("database host is not configured".into()))?;
        let name = config
            .name
            .as_deref()
            .ok_or_else(|| StoreError::Connection("database name is not configured".into()))?;
        let user = config
            .user
            .as_deref()
            .ok_or_else(|| StoreError::Connection("database user is not configured".into()))?;

        let mut options = PgConnectOptions::new()
            .host(host)
            .port(config.port.unwrap_or(DEFAULT_PORT))
            .database(name)
            .username(user);
        if let Some(password) = &config.password {
            options = options.password(password);
        }
        options = match &config.ssl_cert_path {
            Some(cert) => options.ssl_mode(PgSslMode::VerifyFull).ssl_root_cert(cert),
            None => options.ssl_mode(PgSslMode::Require),
        };
        Ok(options)
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let options = Self::connect_options(config)?;
        info!(
            "Connecting to PostgreSQL at {}:{}",
            options.get_host(),
            options.get_port()
        );
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { pool })
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [SqlValue],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlValue::Text(v) => query.bind(v.as_str()),
            SqlValue::Decimal(v) => query.bind(*v),
            SqlValue::Date(v) => query.bind(*v),
        };
    }
    query
}

fn row_to_map(row: &PgRow) -> Result<Row, StoreError> {
    let mut map = Map::new();
    for column in row.columns() {
        let index = column.ordinal();
        let value = if row.try_get_raw(index)?.is_null() {
            Value::Null
        } else {
            match column.type_info().name() {
                "BOOL" => Value::Bool(row.try_get::<bool, _>(index)?),
                "INT2" => Value::from(row.try_get::<i16, _>(index)?),
                "INT4" => Value::from(row.try_get::<i32, _>(index)?),
                "INT8" => Value::from(row.try_get::<i64, _>(index)?),
                "FLOAT4" => Value::from(f64::from(row.try_get::<f32, _>(index)?)),
                "FLOAT8" => Value::from(row.try_get::<f64, _>(index)?),
                // Kept as text so the exact decimal survives the JSON row.
                "NUMERIC" => Value::String(row.try_get::<Decimal, _>(index)?.to_string()),
                "DATE" => Value::String(row.try_get::<NaiveDate, _>(index)?.to_string()),
                "TIMESTAMP" => Value::String(row.try_get::<NaiveDateTime, _>(index)?.to_string()),
                "TIMESTAMPTZ" => {
                    Value::String(row.try_get::<DateTime<Utc>, _>(index)?.to_rfc3339())
                }
                other => match row.try_get::<String, _>(index) {
                    Ok(text) => Value::String(text),
                    Err(e) => {
                        debug!("Skipping column {} of type {}: {}", column.name(), other, e);
                        Value::Null
                    }
                },
            }
        };
        map.insert(column.name().to_string(), value);
    }
    Ok(map)
}

#[async_trait]
impl Gateway for PgGateway {
    fn placeholder(&self, index: usize) -> String {
        format!("${index}")
    }

    fn rates_table_ddl(&self, table: &str) -> String {
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                rate_id BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY,
                rate_date DATE NOT NULL,
                base_currency_code VARCHAR(3) NOT NULL,
                target_currency_code VARCHAR(3) NOT NULL,
                exchange_rate NUMERIC NOT NULL,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DatabaseDriver;

    fn pg_config() -> DatabaseConfig {
        DatabaseConfig {
            driver: DatabaseDriver::Postgres,
            host: Some("db.example.com".to_string()),
            port: Some(30376),
            name: Some("rates".to_string()),
            user: Some("etl".to_string()),
            password: Some("secret".to_string()),
            ssl_cert_path: Some("/etc/ssl/db.crt".into()),
            ..DatabaseConfig::default()
        }
    }

    #[test]
    fn test_connect_options_from_config() {
        let options = PgGateway::connect_options(&pg_config()).unwrap();
        assert_eq!(options.get_host(), "db.example.com");
        assert_eq!(options.get_port(), 30376);
        assert_eq!(options.get_database(), Some("rates"));
        assert_eq!(options.get_username(), "etl");
    }

    #[test]
    fn test_connect_options_default_port() {
        let config = DatabaseConfig {
            port: None,
            ..pg_config()
        };
        let options = PgGateway::connect_options(&config).unwrap();
        assert_eq!(options.get_port(), DEFAULT_PORT);
    }

    #[test]
    fn test_connect_options_require_credentials() {
        let config = DatabaseConfig {
            host: None,
            ..pg_config()
        };
        let err = PgGateway::connect_options(&config).unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)));
        assert!(err.to_string().contains("host"));
    }
}
