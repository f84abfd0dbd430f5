//! bizdesk-integrity - data integrity tooling for the business console
//!
//! This CLI enables operators to:
//! - Scan a tenant's dataset for orphans, stock drift and duplicate stock rows
//! - Preview the repairs a scan suggests
//! - Apply selected repairs and verify them with a fresh scan
//! - Inspect the relationship rules a scan evaluates

use clap::{Parser, Subcommand};

mod commands;
mod error;
mod logging;
mod output;

use error::CliResult;
use logging::LogFormat;

/// bizdesk-integrity - Tenant data integrity scanner
#[derive(Parser)]
#[command(name = "bizdesk-integrity")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log output format
    #[arg(long, global = true, env = "BIZDESK_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a tenant for integrity findings
    Scan(commands::scan::ScanArgs),

    /// Show what a repair would change without touching the data
    Preview(commands::preview::PreviewArgs),

    /// Repair selected findings and re-scan to verify
    Repair(commands::repair::RepairArgs),

    /// List the relationship rules a scan evaluates
    Rules(commands::rules::RulesArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.log_format, logging::DEFAULT_FILTER);

    let result = run(cli).await;

    match result {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Scan(args) => commands::scan::execute(args).await,
        Commands::Preview(args) => commands::preview::execute(args).await,
        Commands::Repair(args) => commands::repair::execute(args).await,
        Commands::Rules(args) => commands::rules::execute(args),
    }
}
