// scrubscan/src/commands/scan.rs
//! The `scan` command: one incremental run over the configured container.

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use scrubscan_core::{build_scanner, CacheConfig, ItemOutcome, RunReport, ScannerConfig};

use crate::cli::ScanCommand;

/// How a completed run ended, for the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Clean,
    ItemFailures,
}

/// Applies command-line overrides on top of the loaded configuration.
pub fn apply_overrides(config: &mut ScannerConfig, opts: &ScanCommand) {
    if let Some(concurrency) = opts.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(container) = &opts.container {
        config.container = container.clone();
    }
    if let Some(path) = &opts.cache_file {
        config.cache = CacheConfig::File { path: path.clone() };
    }
}

pub async fn run_scan(config_path: Option<&Path>, opts: &ScanCommand) -> Result<ScanStatus> {
    let mut config = super::load_config(config_path)?;
    apply_overrides(&mut config, opts);

    let (scanner, container) = build_scanner(&config)
        .await
        .context("Failed to start the scanner")?;
    let report = scanner.run(&container).await?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if opts.json {
        serde_json::to_writer_pretty(&mut out, &report)?;
        writeln!(out)?;
    } else {
        print_report(&mut out, &report)?;
    }

    for (path, warning) in report.warnings() {
        warn!("[{}] {}", path, warning);
    }

    let failed = report.failed() + report.lost_tasks;
    if failed > 0 {
        info!("{} items failed and will be retried on the next run.", failed);
        if opts.fail_on_item_error {
            return Ok(ScanStatus::ItemFailures);
        }
    }
    Ok(ScanStatus::Clean)
}

/// Human-readable report: one line per finding or failure, then the summary.
pub fn print_report<W: Write>(out: &mut W, report: &RunReport) -> io::Result<()> {
    for item in &report.items {
        match &item.outcome {
            ItemOutcome::Scanned { findings, .. } => {
                for finding in findings {
                    writeln!(out, "[{}] {}", item.path, finding.describe())?;
                }
            }
            ItemOutcome::Failed { stage, error } => {
                writeln!(out, "[{}] {} failed: {}", item.path, stage, error)?;
            }
            ItemOutcome::Skipped => {}
        }
    }
    writeln!(out, "{}", report.summary())
}
