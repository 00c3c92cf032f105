pub mod commands;

use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "souk",
    about = "Souk quote engine operator CLI",
    long_about = "Apply migrations, load demo data, run maintenance sweeps, and inspect configuration.",
    after_help = "Examples:\n  souk migrate\n  souk seed\n  souk sweep --at 2026-01-01T00:00:00Z\n  souk config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the demo RFQ, sellers, products and quotes (idempotent)")]
    Seed,
    #[command(about = "Run one maintenance sweep: expiries followed by auto-conversion")]
    Sweep {
        #[arg(long, help = "Evaluate expiry as of this RFC 3339 instant instead of now")]
        at: Option<DateTime<Utc>>,
        #[arg(long, help = "Skip auto-conversion of stale counter-offers for this run")]
        skip_auto_conversion: bool,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
}

/// Diagnostics go to stderr so stdout stays a single JSON document.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Sweep { at, skip_auto_conversion } => {
            commands::sweep::run(commands::sweep::SweepOptions { at, skip_auto_conversion })
        }
        Command::Config => commands::config::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
