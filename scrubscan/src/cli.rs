// scrubscan/src/cli.rs
//! This file defines the command-line interface (CLI) for the scrubscan application,
//! including all available commands and their arguments.
//! License: MIT OR Apache-2.0

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(
    name = "scrubscan",
    author = "Relay",
    version = env!("CARGO_PKG_VERSION"),
    about = "Scan object storage containers for sensitive data",
    long_about = "Scrubscan walks a container in an object store (S3, Azure Blob, or a local directory), sends every new or changed item to an analyzer service, and forwards the findings, with the matched text removed, to a sink service. A fingerprint cache makes repeated runs skip content that was already fully processed.",
    arg_required_else_help = true,
)]
pub struct Cli {
    /// Path to the scanner configuration (YAML). Falls back to the SCANNER_TEMPLATE environment variable.
    #[arg(long, short = 'c', value_name = "FILE", env = "SCRUBSCAN_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Disable informational messages
    #[arg(long, short = 'q', global = true, help = "Suppress all informational and debug messages.")]
    pub quiet: bool,

    /// Enable debug logging (overrides RUST_LOG)
    #[arg(long, short = 'd', global = true, conflicts_with = "quiet", help = "Enable debug logging.")]
    pub debug: bool,

    /// The subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// All available commands for the `scrubscan` CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Runs one incremental scan over the configured container.
    Scan(ScanCommand),

    /// Creates or removes a container in the configured object store.
    #[command(subcommand)]
    Container(ContainerCommand),

    /// Manages entries in the fingerprint cache.
    #[command(subcommand)]
    Cache(CacheCommand),
}

/// Arguments for the `scan` command.
#[derive(Parser, Debug, Default)]
pub struct ScanCommand {
    /// Print the full run report as JSON instead of a summary.
    #[arg(long)]
    pub json: bool,

    /// Exit with status 2 when any item failed.
    #[arg(long = "fail-on-item-error")]
    pub fail_on_item_error: bool,

    /// Override the configured worker-pool size.
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Override the configured container.
    #[arg(long, value_name = "NAME")]
    pub container: Option<String>,

    /// Use a file-backed fingerprint cache at this path.
    #[arg(long = "cache-file", value_name = "FILE")]
    pub cache_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum ContainerCommand {
    /// Creates the container. An existing container is reused.
    Create {
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Removes the container.
    Remove {
        #[arg(value_name = "NAME")]
        name: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Removes a fingerprint so the matching content is scanned again on the next run.
    Forget {
        #[arg(value_name = "FINGERPRINT")]
        fingerprint: String,

        /// Fingerprint cache file (defaults to the configured file or Redis cache).
        #[arg(long = "cache-file", value_name = "FILE")]
        cache_file: Option<PathBuf>,
    },
}
