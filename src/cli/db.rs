use crate::core::config::AppConfig;
use crate::store::{Connector, Gateway, StoreError, csv};
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use tracing::info;

/// Creates the rates table if it does not exist yet.
pub async fn init_db(config: &AppConfig) -> Result<()> {
    let gateway = config
        .database
        .connect()
        .await
        .context("Failed to connect to the rates database")?;
    let table = &config.database.rates_table;
    gateway
        .ensure_rates_table(table)
        .await
        .with_context(|| format!("Failed to create table {table}"))?;

    info!("Rates table {} is ready", table);
    println!("Rates table {table} is ready.");
    Ok(())
}

/// Appends every row of `table` to `output` as one compact JSON line.
pub async fn export_table(
    gateway: &dyn Gateway,
    table: &str,
    output: &Path,
) -> Result<usize, StoreError> {
    let rows = gateway.query_all(table).await?;
    let lines: Vec<String> = rows
        .into_iter()
        .map(|row| Value::Object(row).to_string())
        .collect();
    csv::append_values(output, &lines)
}

/// Dumps the rates table to `output`, or to the configured CSV path.
pub async fn export(config: &AppConfig, output: Option<&Path>) -> Result<usize> {
    let output = output
        .or(config.csv_path.as_deref())
        .context("No output file given and no csv_path configured")?;
    let gateway = config
        .database
        .connect()
        .await
        .context("Failed to connect to the rates database")?;

    let written = export_table(gateway.as_ref(), &config.database.rates_table, output)
        .await
        .with_context(|| format!("Failed to export rates to {}", output.display()))?;

    info!("Exported {} rows to {}", written, output.display());
    println!("Exported {written} rates to {}.", output.display());
    Ok(written)
}
