use super::ui;
use crate::core::config::AppConfig;
use crate::core::rate::RATE_COLUMNS;
use crate::store::{Connector, Gateway, Row, SqlValue, StoreError, validate_identifier};
use anyhow::{Context, Result};
use chrono::NaiveDate;

/// Stored rates ordered by date and currency, optionally for a single date.
pub async fn list_rates(
    gateway: &dyn Gateway,
    table: &str,
    date: Option<NaiveDate>,
) -> Result<Vec<Row>, StoreError> {
    let columns = RATE_COLUMNS.join(", ");
    let table = validate_identifier(table)?;
    match date {
        Some(date) => {
            let sql = format!(
                "SELECT {columns} FROM {table} WHERE rate_date = {} ORDER BY target_currency_code",
                gateway.placeholder(1)
            );
            gateway.fetch(&sql, &[SqlValue::Date(date)]).await
        }
        None => {
            let sql = format!(
                "SELECT {columns} FROM {table} ORDER BY rate_date, target_currency_code"
            );
            gateway.run_query(&sql).await
        }
    }
}

/// Prints the stored rates. Returns how many were listed.
pub async fn run(config: &AppConfig, date: Option<NaiveDate>) -> Result<usize> {
    let gateway = config
        .database
        .connect()
        .await
        .context("Failed to connect to the rates database")?;
    let rows = list_rates(gateway.as_ref(), &config.database.rates_table, date)
        .await
        .context("Failed to read stored rates")?;

    if rows.is_empty() {
        match date {
            Some(date) => println!("No rates stored for {date}."),
            None => println!("No rates stored yet."),
        }
        return Ok(0);
    }

    let mut table = ui::new_styled_table();
    table.set_header(RATE_COLUMNS.iter().map(|c| ui::header_cell(c)).collect::<Vec<_>>());
    for row in &rows {
        table.add_row(
            RATE_COLUMNS
                .iter()
                .map(|c| ui::value_cell(row.get(*c)))
                .collect::<Vec<_>>(),
        );
    }
    println!("{table}");
    println!(
        "{} {}",
        ui::style_text("Total rates:", ui::StyleType::TotalLabel),
        ui::style_text(&rows.len().to_string(), ui::StyleType::TotalValue)
    );

    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rate::RateRecord;
    use crate::store::sqlite::SqliteGateway;
    use rust_decimal::Decimal;
    use serde_json::json;

    const TABLE: &str = "CURRENCY_RATES";

    async fn seeded_gateway() -> SqliteGateway {
        let gateway = SqliteGateway::in_memory().await.unwrap();
        gateway.ensure_rates_table(TABLE).await.unwrap();
        for (day, code, rate) in [(2, "USD", 125), (1, "USD", 124), (1, "EGP", 2199)] {
            let record = RateRecord {
                rate_date: NaiveDate::from_ymd_opt(2018, 2, day).unwrap(),
                base_currency_code: "EUR".to_string(),
                target_currency_code: code.to_string(),
                exchange_rate: Decimal::new(rate, 2),
            };
            gateway
                .insert_row(TABLE, &RATE_COLUMNS, &record.insert_values())
                .await
                .unwrap();
        }
        gateway
    }

    #[tokio::test]
    async fn test_list_rates_is_ordered() {
        let gateway = seeded_gateway().await;
        let rows = list_rates(&gateway, TABLE, None).await.unwrap();

        let keys: Vec<(String, String)> = rows
            .iter()
            .map(|r| {
                (
                    r["rate_date"].as_str().unwrap().to_string(),
                    r["target_currency_code"].as_str().unwrap().to_string(),
                )
            })
            .collect();
        assert_eq!(
            keys,
            vec![
                ("2018-02-01".to_string(), "EGP".to_string()),
                ("2018-02-01".to_string(), "USD".to_string()),
                ("2018-02-02".to_string(), "USD".to_string()),
            ]
        );
        assert!(rows[0].get("rate_id").is_none());
    }

    #[tokio::test]
    async fn test_list_rates_for_one_date() {
        let gateway = seeded_gateway().await;
        let day = NaiveDate::from_ymd_opt(2018, 2, 2).unwrap();
        let rows = list_rates(&gateway, TABLE, Some(day)).await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["exchange_rate"], json!("1.25"));
    }
}
