//! Historical rate pipeline: extract, repair and shape, connect, insert.
//!
//! A run never returns an error. Stage failures halt the run and are recorded
//! in the [`PipelineReport`]; row failures are counted and the loop moves on.

use crate::core::error::RateError;
use crate::core::rate::{PIVOT_CURRENCY, RATE_COLUMNS, RatePayload};
use crate::core::repair::repair_value;
use crate::core::table::{RateTable, project_columns, records_to_table};
use crate::providers::fetcher::{RateFetcher, is_valid_range};
use crate::store::{Connector, StoreError, csv};
use serde_json::Value;
use std::fmt;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// The span of dates a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    /// The first day of every month.
    Year(i32),
    Month {
        year: i32,
        month: u32,
    },
    Range {
        year: i32,
        month: u32,
        start_day: u32,
        end_day: u32,
    },
    Latest,
}

impl Period {
    pub fn validate(&self) -> Result<(), RateError> {
        match *self {
            Period::Month { month, .. } | Period::Range { month, .. }
                if !(1..=12).contains(&month) =>
            {
                Err(RateError::InvalidInput(format!(
                    "Month must be between 1 and 12, got: {month}"
                )))
            }
            _ => Ok(()),
        }
    }

    /// How many upstream calls a run over this period makes.
    pub fn call_count(&self) -> u64 {
        match *self {
            Period::Year(_) => 12,
            Period::Month { .. } => 31,
            Period::Range {
                start_day, end_day, ..
            } if is_valid_range(start_day, end_day) => u64::from(end_day - start_day + 1),
            Period::Range { .. } => 0,
            Period::Latest => 1,
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Period::Year(year) => write!(f, "{year}"),
            Period::Month { year, month } => write!(f, "{year}-{month:02}"),
            Period::Range {
                year,
                month,
                start_day,
                end_day,
            } => write!(f, "{year}-{month:02}-{start_day:02}..{end_day:02}"),
            Period::Latest => write!(f, "latest"),
        }
    }
}

/// Where shaped rates end up.
pub enum LoadTarget<'a> {
    Database {
        connector: &'a dyn Connector,
        table: &'a str,
    },
    Csv(&'a Path),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    /// Payloads returned by the source.
    pub fetched: usize,
    /// Rows left after repair and shaping.
    pub shaped: usize,
    pub inserted: usize,
    /// Rows rejected by the unique constraint.
    pub duplicates: usize,
    /// Rows whose insert failed for any other reason.
    pub failed: usize,
    /// Records or rates dropped as malformed or not quoted against EUR.
    pub skipped: usize,
    pub lines_written: usize,
    /// Why the run stopped early, if it did.
    pub halted: Option<String>,
}

impl PipelineReport {
    pub fn is_complete(&self) -> bool {
        self.halted.is_none()
    }

    fn halt(mut self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        error!("Pipeline halted: {}", reason);
        self.halted = Some(reason);
        self
    }
}

pub async fn run_pipeline(
    fetcher: &RateFetcher<'_>,
    period: Period,
    target: &LoadTarget<'_>,
) -> PipelineReport {
    let report = PipelineReport::default();
    if let Err(e) = period.validate() {
        return report.halt(e.to_string());
    }

    info!("Extracting rates for {}", period);
    let payloads = extract(fetcher, period).await;
    let mut report = PipelineReport {
        fetched: payloads.len(),
        ..report
    };
    if payloads.is_empty() {
        return report.halt(format!("No rates were fetched for {period}"));
    }

    info!("Shaping {} fetched records", payloads.len());
    let table = match shape(&payloads, &mut report) {
        Ok(table) if !table.is_empty() => table,
        Ok(_) => return report.halt("No records left after shaping"),
        Err(e) => return report.halt(format!("Shaping failed: {e}")),
    };
    report.shaped = table.len();

    match target {
        LoadTarget::Csv(path) => match csv::append_table(path, &table) {
            Ok(written) => {
                info!("Wrote {} lines to {}", written, path.display());
                report.lines_written = written;
                report
            }
            Err(e) => report.halt(format!("Writing {} failed: {e}", path.display())),
        },
        LoadTarget::Database { connector, table: name } => {
            load(*connector, name, &table, report).await
        }
    }
}

async fn extract(fetcher: &RateFetcher<'_>, period: Period) -> Vec<Value> {
    let results = match period {
        Period::Year(year) => fetcher.fetch_for_year(year).await,
        Period::Month { year, month } => fetcher.fetch_for_month(year, month).await,
        Period::Range {
            year,
            month,
            start_day,
            end_day,
        } => {
            fetcher
                .fetch_for_range(year, month, start_day, end_day)
                .await
        }
        Period::Latest => {
            return fetcher.fetch_latest().await.into_payload().into_iter().collect();
        }
    };
    results.into_values().collect()
}

fn shape(payloads: &[Value], report: &mut PipelineReport) -> Result<RateTable, RateError> {
    let mut records = Vec::with_capacity(payloads.len());
    for payload in payloads {
        match repair_value(payload) {
            Ok(record @ Value::Object(_)) => records.push(record),
            Ok(other) => {
                warn!("Dropping record that is not a mapping: {}", other);
                report.skipped += 1;
            }
            Err(e) => {
                warn!("Dropping unrepairable record: {}", e);
                report.skipped += 1;
            }
        }
    }
    project_columns(&records_to_table(&Value::Array(records))?)
}

async fn load(
    connector: &dyn Connector,
    name: &str,
    table: &RateTable,
    mut report: PipelineReport,
) -> PipelineReport {
    let gateway = match connector.connect().await {
        Ok(gateway) => gateway,
        Err(e) => return report.halt(e.to_string()),
    };
    if let Err(e) = gateway.ensure_rates_table(name).await {
        return report.halt(format!("Preparing table {name} failed: {e}"));
    }

    for row in table.rows() {
        let payload = match RatePayload::from_row(row) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Skipping malformed row: {}", e);
                report.skipped += 1;
                continue;
            }
        };
        if payload.base != PIVOT_CURRENCY {
            warn!(
                "Skipping rates for {} quoted against {} instead of {}",
                payload.date, payload.base, PIVOT_CURRENCY
            );
            report.skipped += 1;
            continue;
        }

        for (target, record) in payload.records() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping {} rate for {}: {}", target, payload.date, e);
                    report.skipped += 1;
                    continue;
                }
            };

            match gateway
                .insert_row(name, &RATE_COLUMNS, &record.insert_values())
                .await
            {
                Ok(()) => {
                    debug!("Inserted {} rate for {}", target, payload.date);
                    report.inserted += 1;
                }
                Err(StoreError::Duplicate(_)) => {
                    warn!(
                        "Duplicate entry for date: {} and currency: {}. Skipping.",
                        payload.date, target
                    );
                    report.duplicates += 1;
                }
                Err(e) => {
                    error!("Insert of {} rate for {} failed: {}", target, payload.date, e);
                    report.failed += 1;
                }
            }
        }
    }

    info!(
        "Loaded {} rates into {} ({} duplicates, {} failed)",
        report.inserted, name, report.duplicates, report.failed
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rate::{FetchOutcome, RateSource};
    use crate::store::sqlite::SqliteGateway;
    use crate::store::{Gateway, Row, SqlValue};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;

    const TABLE: &str = "CURRENCY_RATES";

    /// Serves canned answers by day; unknown days are not found.
    struct ScriptedSource {
        by_day: HashMap<u32, Value>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(by_day: impl IntoIterator<Item = (u32, Value)>) -> Self {
            Self {
                by_day: by_day.into_iter().collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RateSource for ScriptedSource {
        async fn fetch_for_date(&self, _year: i32, _month: u32, day: u32) -> FetchOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.by_day.get(&day) {
                Some(payload) => FetchOutcome::Success(payload.clone()),
                None => FetchOutcome::NotFound,
            }
        }

        async fn fetch_latest(&self) -> FetchOutcome {
            self.fetch_for_date(0, 0, 0).await
        }
    }

    /// Hands out one shared gateway so tests can inspect what was loaded.
    struct SharedGateway(Arc<SqliteGateway>);

    #[async_trait]
    impl Connector for SharedGateway {
        async fn connect(&self) -> Result<Arc<dyn Gateway>, StoreError> {
            Ok(self.0.clone())
        }
    }

    struct FailingConnector;

    #[async_trait]
    impl Connector for FailingConnector {
        async fn connect(&self) -> Result<Arc<dyn Gateway>, StoreError> {
            Err(StoreError::Connection("connection refused".to_string()))
        }
    }

    fn payload(date: &str, rates: Value) -> Value {
        json!({
            "success": true,
            "historical": true,
            "base": "EUR",
            "date": date,
            "rates": rates
        })
    }

    async fn shared_gateway() -> SharedGateway {
        SharedGateway(Arc::new(SqliteGateway::in_memory().await.unwrap()))
    }

    #[tokio::test]
    async fn test_month_run_inserts_one_row_per_rate() {
        let source = ScriptedSource::new([
            (1, payload("2018-02-01", json!({"EGP": 21.99, "USD": 1.2459}))),
            (2, payload("2018-02-02", json!({"EGP": 22.01, "USD": 1.2510}))),
        ]);
        let fetcher = RateFetcher::new(&source, Duration::ZERO);
        let connector = shared_gateway().await;
        let target = LoadTarget::Database {
            connector: &connector,
            table: TABLE,
        };

        let report = run_pipeline(&fetcher, Period::Month { year: 2018, month: 2 }, &target).await;

        assert!(report.is_complete(), "{report:?}");
        assert_eq!(source.calls.load(Ordering::SeqCst), 31);
        assert_eq!(report.fetched, 2);
        assert_eq!(report.inserted, 4);

        let rows = connector
            .0
            .fetch(
                "SELECT exchange_rate FROM CURRENCY_RATES WHERE rate_date = ? AND target_currency_code = ?",
                &[
                    SqlValue::Date(chrono::NaiveDate::from_ymd_opt(2018, 2, 2).unwrap()),
                    SqlValue::Text("USD".to_string()),
                ],
            )
            .await
            .unwrap();
        assert_eq!(rows[0]["exchange_rate"], json!("1.251"));
    }

    #[tokio::test]
    async fn test_duplicate_rows_are_skipped_once() {
        let same = payload("2018-02-01", json!({"USD": 1.2459}));
        let source = ScriptedSource::new([(1, same.clone()), (2, same)]);
        let fetcher = RateFetcher::new(&source, Duration::ZERO);
        let connector = shared_gateway().await;
        let target = LoadTarget::Database {
            connector: &connector,
            table: TABLE,
        };
        let period = Period::Range {
            year: 2018,
            month: 2,
            start_day: 1,
            end_day: 2,
        };

        let report = run_pipeline(&fetcher, period, &target).await;

        assert!(report.is_complete());
        assert_eq!(report.inserted, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.failed, 0);
        let rows: Vec<Row> = connector.0.query_all(TABLE).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_connection_failure_halts() {
        let source = ScriptedSource::new([(1, payload("2018-01-01", json!({"USD": 1.2})))]);
        let fetcher = RateFetcher::new(&source, Duration::ZERO);
        let target = LoadTarget::Database {
            connector: &FailingConnector,
            table: TABLE,
        };

        let report = run_pipeline(&fetcher, Period::Month { year: 2018, month: 1 }, &target).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 31);
        assert_eq!(report.fetched, 1);
        assert_eq!(report.inserted, 0);
        assert!(report.halted.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_empty_extraction_halts_before_connecting() {
        let source = ScriptedSource::new([]);
        let fetcher = RateFetcher::new(&source, Duration::ZERO);
        let target = LoadTarget::Database {
            connector: &FailingConnector,
            table: TABLE,
        };

        let report = run_pipeline(&fetcher, Period::Year(2018), &target).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 12);
        assert!(report.halted.unwrap().contains("No rates were fetched"));
    }

    #[tokio::test]
    async fn test_bad_month_makes_no_calls() {
        let source = ScriptedSource::new([]);
        let fetcher = RateFetcher::new(&source, Duration::ZERO);
        let target = LoadTarget::Database {
            connector: &FailingConnector,
            table: TABLE,
        };

        let report = run_pipeline(&fetcher, Period::Month { year: 2018, month: 13 }, &target).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
        assert!(report.halted.unwrap().contains("between 1 and 12"));
    }

    #[tokio::test]
    async fn test_malformed_records_are_skipped() {
        let source = ScriptedSource::new([
            (1, json!("{'date': '2018-03-01', 'base': 'EUR', 'rates': {'USD': 1.22}, 'success': True}")),
            (2, json!(42)),
            (3, payload("2018-03-03", json!({"USD": "n/a", "EGP": 21.5}))),
        ]);
        let fetcher = RateFetcher::new(&source, Duration::ZERO);
        let connector = shared_gateway().await;
        let target = LoadTarget::Database {
            connector: &connector,
            table: TABLE,
        };
        let period = Period::Range {
            year: 2018,
            month: 3,
            start_day: 1,
            end_day: 3,
        };

        let report = run_pipeline(&fetcher, period, &target).await;

        assert!(report.is_complete());
        assert_eq!(report.shaped, 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.inserted, 2);
    }

    #[tokio::test]
    async fn test_non_eur_base_is_skipped() {
        let usd_based = json!({"date": "2018-02-01", "base": "USD", "rates": {"EGP": 17.6}});
        let source = ScriptedSource::new([
            (1, usd_based),
            (2, payload("2018-02-02", json!({"EGP": 21.9}))),
        ]);
        let fetcher = RateFetcher::new(&source, Duration::ZERO);
        let connector = shared_gateway().await;
        let target = LoadTarget::Database {
            connector: &connector,
            table: TABLE,
        };
        let period = Period::Range {
            year: 2018,
            month: 2,
            start_day: 1,
            end_day: 2,
        };

        let report = run_pipeline(&fetcher, period, &target).await;

        assert!(report.is_complete());
        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped, 1);
        let rows = connector.0.query_all(TABLE).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["base_currency_code"], json!("EUR"));
        assert_eq!(rows[0]["rate_date"], json!("2018-02-02"));
    }

    #[tokio::test]
    async fn test_missing_rates_column_halts() {
        let source = ScriptedSource::new([(1, json!({"date": "2018-01-01", "base": "EUR"}))]);
        let fetcher = RateFetcher::new(&source, Duration::ZERO);
        let target = LoadTarget::Database {
            connector: &FailingConnector,
            table: TABLE,
        };

        let report = run_pipeline(&fetcher, Period::Year(2018), &target).await;

        assert!(report.halted.unwrap().contains("'rates'"));
    }

    #[tokio::test]
    async fn test_latest_to_csv() {
        let source = ScriptedSource::new([(0, payload("2024-05-02", json!({"USD": 1.07})))]);
        let fetcher = RateFetcher::new(&source, Duration::ZERO);
        let dir = tempdir().unwrap();
        let path = dir.path().join("latest.csv");

        let report = run_pipeline(&fetcher, Period::Latest, &LoadTarget::Csv(&path)).await;

        assert!(report.is_complete());
        assert_eq!(report.lines_written, 1);
        assert_eq!(
            csv::read_to_string(&path).unwrap(),
            "{\"base\":\"EUR\",\"date\":\"2024-05-02\",\"rates\":{\"USD\":1.07}}\n"
        );
    }

    #[test]
    fn test_period_call_count() {
        assert_eq!(Period::Year(2020).call_count(), 12);
        assert_eq!(Period::Month { year: 2020, month: 1 }.call_count(), 31);
        let range = |s, e| Period::Range {
            year: 2020,
            month: 1,
            start_day: s,
            end_day: e,
        };
        assert_eq!(range(3, 7).call_count(), 5);
        assert_eq!(range(7, 3).call_count(), 0);
    }
}
