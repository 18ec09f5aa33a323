// scrubscan/src/commands/mod.rs
pub mod cache;
pub mod container;
pub mod scan;

use std::path::Path;

use anyhow::{bail, Result};
use scrubscan_core::{ScannerConfig, SCANNER_TEMPLATE_ENV};

/// Resolves the configuration: an explicit file first, then `SCANNER_TEMPLATE`.
pub fn load_config(path: Option<&Path>) -> Result<ScannerConfig> {
    if let Some(path) = path {
        return Ok(ScannerConfig::load_from_file(path)?);
    }
    match ScannerConfig::from_env()? {
        Some(config) => Ok(config),
        None => bail!(
            "No configuration given. Pass --config <FILE> or set {}.",
            SCANNER_TEMPLATE_ENV
        ),
    }
}
