use super::ui;
use crate::core::config::AppConfig;
use crate::pipeline::{LoadTarget, Period, PipelineReport, run_pipeline};
use crate::providers::{ExchangeRatesApiProvider, RateFetcher};
use anyhow::{Result, bail};
use comfy_table::Cell;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Runs the pipeline for `period` and prints what it did.
///
/// Rates go to `csv_path` when given, otherwise to the configured database.
pub async fn run(
    config: &AppConfig,
    period: Period,
    csv_path: Option<&Path>,
    use_backup_key: bool,
) -> Result<PipelineReport> {
    let access_key = config.api.key(use_backup_key)?;
    let provider =
        ExchangeRatesApiProvider::new(&config.api.base_url, access_key, &config.api.symbols)?;

    let pb = ui::new_progress_bar(period.call_count());
    pb.set_message(format!("Fetching {period}"));
    let tick = || pb.inc(1);
    let fetcher = RateFetcher::new(&provider, Duration::from_millis(config.api.request_delay_ms))
        .with_progress(&tick);

    let target = match csv_path {
        Some(path) => LoadTarget::Csv(path),
        None => LoadTarget::Database {
            connector: &config.database,
            table: &config.database.rates_table,
        },
    };
    info!("Starting pipeline run for {}", period);
    let report = run_pipeline(&fetcher, period, &target).await;
    pb.finish_and_clear();

    print_report(&period, &report);
    if let Some(reason) = &report.halted {
        bail!("Pipeline run for {period} halted: {reason}");
    }
    Ok(report)
}

fn print_report(period: &Period, report: &PipelineReport) {
    println!(
        "\nRates for {}",
        ui::style_text(&period.to_string(), ui::StyleType::Title)
    );

    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Stage"), ui::header_cell("Count")]);
    let rows = [
        ("Fetched", report.fetched),
        ("Shaped", report.shaped),
        ("Inserted", report.inserted),
        ("Duplicates skipped", report.duplicates),
        ("Failed inserts", report.failed),
        ("Malformed skipped", report.skipped),
        ("Lines written", report.lines_written),
    ];
    for (label, count) in rows {
        table.add_row(vec![Cell::new(label), ui::count_cell(count)]);
    }
    println!("{table}");

    if let Some(reason) = &report.halted {
        println!("{}", ui::style_text(reason, ui::StyleType::Error));
    }
}
