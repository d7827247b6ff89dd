use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, CommandFactory, Parser, Subcommand};
use fxpivot::core::log::init_logging;
use fxpivot::pipeline::Period;
use rust_decimal::Decimal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct LoadArgs {
    /// Append the shaped rates to this CSV file instead of the database
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Use the backup API access key
    #[arg(long)]
    backup_key: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Fetch historical rates for a year, a month or a range of days
    Fetch {
        #[arg(long)]
        year: i32,
        #[arg(long)]
        month: Option<u32>,
        #[arg(long, requires = "month", requires = "end_day")]
        start_day: Option<u32>,
        #[arg(long, requires = "start_day")]
        end_day: Option<u32>,
        #[command(flatten)]
        load: LoadArgs,
    },
    /// Fetch the latest published rates
    Latest {
        #[command(flatten)]
        load: LoadArgs,
    },
    /// Convert an amount between currencies using stored rates
    Convert {
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        /// Rate date as YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,
    },
    /// List stored rates
    Rates {
        /// Only rates for this date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Export the rates table to a CSV file
    Export {
        /// Defaults to csv_path from the configuration
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Create the rates table if it does not exist
    InitDb,
}

fn period_from_args(
    year: i32,
    month: Option<u32>,
    start_day: Option<u32>,
    end_day: Option<u32>,
) -> Period {
    match (month, start_day, end_day) {
        (Some(month), Some(start_day), Some(end_day)) => Period::Range {
            year,
            month,
            start_day,
            end_day,
        },
        (Some(month), _, _) => Period::Month { year, month },
        _ => Period::Year(year),
    }
}

impl From<Commands> for fxpivot::AppCommand {
    fn from(cmd: Commands) -> fxpivot::AppCommand {
        match cmd {
            Commands::Setup => fxpivot::AppCommand::Setup,
            Commands::Fetch {
                year,
                month,
                start_day,
                end_day,
                load,
            } => fxpivot::AppCommand::Fetch {
                period: period_from_args(year, month, start_day, end_day),
                csv: load.csv,
                use_backup_key: load.backup_key,
            },
            Commands::Latest { load } => fxpivot::AppCommand::Fetch {
                period: Period::Latest,
                csv: load.csv,
                use_backup_key: load.backup_key,
            },
            Commands::Convert {
                amount,
                from,
                to,
                date,
            } => fxpivot::AppCommand::Convert {
                amount,
                from,
                to,
                date,
            },
            Commands::Rates { date } => fxpivot::AppCommand::Rates { date },
            Commands::Export { output } => fxpivot::AppCommand::Export { output },
            Commands::InitDb => fxpivot::AppCommand::InitDb,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(cmd) => fxpivot::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_fetch_args_select_period() {
        let cli = Cli::parse_from(["fxpivot", "fetch", "--year", "2018", "--month", "2"]);
        let Some(Commands::Fetch {
            year,
            month,
            start_day,
            end_day,
            ..
        }) = cli.command
        else {
            panic!("expected fetch");
        };
        assert_eq!(
            period_from_args(year, month, start_day, end_day),
            Period::Month {
                year: 2018,
                month: 2
            }
        );

        assert_eq!(period_from_args(2018, None, None, None), Period::Year(2018));
        assert_eq!(
            period_from_args(2018, Some(3), Some(5), Some(9)),
            Period::Range {
                year: 2018,
                month: 3,
                start_day: 5,
                end_day: 9
            }
        );
    }

    #[test]
    fn test_start_day_requires_month() {
        let result = Cli::try_parse_from(["fxpivot", "fetch", "--year", "2018", "--start-day", "1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_convert_parses_decimal_and_date() {
        let cli = Cli::parse_from([
            "fxpivot", "convert", "--amount", "500.25", "--from", "EGP", "--to", "USD", "--date",
            "2018-02-01",
        ]);
        match cli.command {
            Some(Commands::Convert { amount, date, .. }) => {
                assert_eq!(amount, Decimal::new(50025, 2));
                assert_eq!(date, NaiveDate::from_ymd_opt(2018, 2, 1).unwrap());
            }
            _ => panic!("expected convert"),
        }
    }
}
