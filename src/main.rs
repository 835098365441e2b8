use anyhow::Result;
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use daily_report::config::{default_config_path, Config};
use daily_report::delivery::SmtpMailer;
use daily_report::dispatcher::{ReportDispatcher, RunOutcome};
use daily_report::sources::{HttpRateSource, HttpSalesSource};

/// Generate today's sales sheet and mail the workbook
#[derive(Parser, Debug)]
#[command(name = "daily-report", version, about)]
struct Cli {
    /// Configuration file (defaults to $XDG_CONFIG_HOME/daily-report/config.toml)
    #[arg(long, env = "DAILY_REPORT_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = Config::load(&config_path)?;

    let dispatcher = ReportDispatcher::new(
        HttpSalesSource::new(&config.sales)?,
        HttpRateSource::new(&config.quotes)?,
        SmtpMailer::new(config.smtp.clone()),
        config.report.path.clone(),
        config.report.recipient.clone(),
    );

    match dispatcher.run(Local::now().date_naive())? {
        RunOutcome::NoSales => info!("Nothing to report today"),
        RunOutcome::Delivered { sheet, rows, .. } => {
            info!("Done: sheet {} with {} sales", sheet, rows)
        }
    }

    Ok(())
}
