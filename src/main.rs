//! VOLT-X - main entry point
//!
//! This binary provides two subcommands:
//! - run: Run the trading loop (paper or live)
//! - report: Summarise closed-trade ledgers

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use voltx::{Config, TradingMode};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "voltx")]
#[command(about = "VOLT-X Upbit trading loop with paper and live modes", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the trading loop
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/voltx.json")]
        config: String,

        /// Trading mode (overrides config file)
        #[arg(short, long, value_enum)]
        mode: Option<TradingMode>,

        /// Run identifier used in log and ledger file names
        #[arg(long)]
        run_id: Option<String>,
    },

    /// Summarise trade ledgers
    Report {
        /// Ledger CSV files (default: every reports/trades_*.csv)
        #[arg(short, long, num_args = 1..)]
        ledger: Vec<PathBuf>,

        /// Directory scanned when no ledger is given; summaries are written here
        #[arg(long, default_value = "reports")]
        dir: PathBuf,

        /// Capital used for return and drawdown percentages
        #[arg(long, default_value = "10000000")]
        capital: f64,
    },
}

fn setup_logging(verbose: bool, log_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    let log_filename = format!("voltx_{}.log", log_name);
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    // Same format without ANSI colors
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());
    Ok(())
}

/// Trading-day date for the run log name. An unreadable config falls back to
/// the default timezone; `run` reports the error itself.
fn trading_date(config_path: &str) -> String {
    let now = chrono::Utc::now();
    Config::from_file(config_path)
        .map(|c| c.trading)
        .unwrap_or_default()
        .trading_date(now)
        .unwrap_or_else(|_| now.format("%Y-%m-%d").to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_name = match &cli.command {
        Commands::Run {
            run_id: Some(id), ..
        } => id.clone(),
        Commands::Run { config, .. } => trading_date(config),
        Commands::Report { .. } => "report".to_string(),
    };
    setup_logging(cli.verbose, &log_name)?;

    match cli.command {
        Commands::Run {
            config,
            mode,
            run_id,
        } => commands::run::run(config, mode, run_id),

        Commands::Report {
            ledger,
            dir,
            capital,
        } => commands::report::run(ledger, dir, capital),
    }
}
