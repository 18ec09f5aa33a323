// scrubscan/src/main.rs
//! Scrubscan entry point.
//!
//! Exit status: 0 on a completed run, 1 on a fatal error (configuration,
//! connection, or listing failure), 2 when `scan --fail-on-item-error` saw
//! failed items.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use scrubscan::cli::{Cli, Commands};
use scrubscan::commands::{cache, container, scan};
use scrubscan::logger;

async fn dispatch(args: &Cli) -> Result<ExitCode> {
    let config_path = args.config.as_deref();
    match &args.command {
        Commands::Scan(opts) => match scan::run_scan(config_path, opts).await? {
            scan::ScanStatus::Clean => Ok(ExitCode::SUCCESS),
            scan::ScanStatus::ItemFailures => Ok(ExitCode::from(2)),
        },
        Commands::Container(command) => {
            container::run_container(config_path, command).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Cache(command) => {
            cache::run_cache(config_path, command).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine.
    dotenvy::dotenv().ok();

    let args = Cli::parse();
    logger::init_logger(logger::level_for(args.quiet, args.debug));

    match dispatch(&args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
