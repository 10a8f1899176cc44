mod config;
mod error;
mod instances;
mod mime;
mod models;
mod normalize;
mod period;
mod providers;
mod report;
mod service;
mod telemetry;

use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use crate::config::load_config;
use models::RunOutcome;
use period::previous_month_range;
use service::{preflight_failure, ReportService};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "ec2-usage-report")]
#[command(about = "Monthly EC2 clock-hour usage report")]
struct Cli {
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Generate, store and email last month's report (default).
    Run(RunArgs),
    /// Print the period and file name a run would use.
    Period {
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
}

#[derive(Debug, Default, Args)]
struct RunArgs {
    /// Treat this date as today, for backfills.
    #[arg(long)]
    as_of: Option<NaiveDate>,

    /// TOML file layered under the environment.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn run_instant(as_of: Option<NaiveDate>) -> chrono::DateTime<Utc> {
    as_of
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or_else(Utc::now)
}

async fn handler(args: RunArgs) -> RunOutcome {
    info!("Starting EC2 usage report generation");

    let cfg = match load_config(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "Configuration invalid");
            return preflight_failure(&e);
        }
    };
    info!("Configuration validated successfully");

    let svc = ReportService::from_aws(cfg).await;
    svc.run(run_instant(args.as_of)).await
}

fn print_json(value: &impl serde::Serialize) -> Result<(), error::AppError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Runs the handler in its own task so a panic still ends in a logged, non-zero exit.
async fn supervise(args: RunArgs) -> ExitCode {
    let outcome = match tokio::spawn(handler(args)).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Handler execution failed");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = print_json(&outcome) {
        error!(error = %e, "Failed to render run result");
        return ExitCode::FAILURE;
    }
    if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = telemetry::init_tracing(&cli.log_level, cli.json_logs) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command.unwrap_or_else(|| Commands::Run(RunArgs::default())) {
        Commands::Run(args) => supervise(args).await,
        Commands::Period { as_of } => {
            let period = previous_month_range(run_instant(as_of).date_naive());
            let summary = serde_json::json!({
                "start": period.start,
                "end": period.end,
                "file": period.file_name(),
            });
            match print_json(&summary) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    error!(error = %e, "Failed to render period");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_instant_uses_as_of_date_at_midnight_utc() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 10).expect("valid date");
        let instant = run_instant(Some(date));
        assert_eq!(instant.date_naive(), date);
        assert_eq!(instant.to_rfc3339(), "2024-01-10T00:00:00+00:00");
    }

    #[test]
    fn cli_defaults_to_run_without_subcommand() {
        let cli = Cli::try_parse_from(["ec2-usage-report"]).expect("parse");
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn cli_parses_period_as_of() {
        let cli = Cli::try_parse_from(["ec2-usage-report", "period", "--as-of", "2024-03-15"])
            .expect("parse");
        match cli.command {
            Some(Commands::Period { as_of }) => {
                assert_eq!(as_of, NaiveDate::from_ymd_opt(2024, 3, 15));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_rejects_malformed_date() {
        assert!(Cli::try_parse_from(["ec2-usage-report", "run", "--as-of", "March"]).is_err());
    }
}
