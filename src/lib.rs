pub mod cli;
pub mod core;
pub mod pipeline;
pub mod providers;
pub mod store;

use crate::core::config::AppConfig;
use crate::pipeline::Period;
use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing::{debug, info};

pub enum AppCommand {
    Setup,
    Fetch {
        period: Period,
        csv: Option<PathBuf>,
        use_backup_key: bool,
    },
    Convert {
        amount: Decimal,
        from: String,
        to: String,
        date: NaiveDate,
    },
    Rates {
        date: Option<NaiveDate>,
    },
    Export {
        output: Option<PathBuf>,
    },
    InitDb,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    if let AppCommand::Setup = command {
        return match config_path {
            Some(path) => cli::setup::setup_at_path(path),
            None => cli::setup::setup(),
        };
    }
    info!("fxpivot starting...");

    let config = AppConfig::load(config_path)?;
    debug!("Loaded config: {config:#?}");

    match command {
        AppCommand::Fetch {
            period,
            csv,
            use_backup_key,
        } => {
            cli::fetch::run(&config, period, csv.as_deref(), use_backup_key).await?;
        }
        AppCommand::Convert {
            amount,
            from,
            to,
            date,
        } => {
            cli::convert::run(&config, amount, &from, &to, date).await?;
        }
        AppCommand::Rates { date } => {
            cli::rates::run(&config, date).await?;
        }
        AppCommand::Export { output } => {
            cli::db::export(&config, output.as_deref()).await?;
        }
        AppCommand::InitDb => cli::db::init_db(&config).await?,
        AppCommand::Setup => {}
    }
    Ok(())
}
