use super::ui;
use crate::core::config::AppConfig;
use crate::core::conversion::ConversionService;
use crate::store::Connector;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use comfy_table::Cell;
use rust_decimal::Decimal;

const DISPLAY_DP: u32 = 4;

/// Converts `amount` from one currency to another with the rates stored for
/// `date`, prints the result and returns it unrounded.
pub async fn run(
    config: &AppConfig,
    amount: Decimal,
    from: &str,
    to: &str,
    date: NaiveDate,
) -> Result<Decimal> {
    let gateway = config
        .database
        .connect()
        .await
        .context("Failed to connect to the rates database")?;
    let service = ConversionService::new(gateway, &config.database.rates_table)?;

    let converted = service
        .exchange(amount, from, to, date)
        .await
        .with_context(|| format!("Failed to convert {amount} {from} to {to} on {date}"))?;

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Date"),
        ui::header_cell("Amount"),
        ui::header_cell("From"),
        ui::header_cell("Converted"),
        ui::header_cell("To"),
    ]);
    table.add_row(vec![
        Cell::new(date),
        Cell::new(amount),
        Cell::new(from.to_ascii_uppercase()),
        ui::amount_cell(converted, DISPLAY_DP),
        Cell::new(to.to_ascii_uppercase()),
    ]);
    println!("{table}");

    Ok(converted)
}
