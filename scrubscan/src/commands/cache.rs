// scrubscan/src/commands/cache.rs
//! Manual cache maintenance. Forgetting a fingerprint makes the next run
//! treat the matching content as new.

use std::path::Path;

use anyhow::{bail, Result};
use scrubscan_core::{open_cache, CacheConfig};

use crate::cli::CacheCommand;

/// Picks the cache: an explicit file, else the configured persistent cache.
fn resolve_cache(config_path: Option<&Path>, cache_file: Option<&Path>) -> Result<CacheConfig> {
    if let Some(path) = cache_file {
        return Ok(CacheConfig::File { path: path.to_path_buf() });
    }
    match super::load_config(config_path)?.cache {
        CacheConfig::Memory => bail!(
            "The configured cache is in-memory and holds nothing between runs. Pass --cache-file <FILE>."
        ),
        persistent => Ok(persistent),
    }
}

pub async fn run_cache(config_path: Option<&Path>, command: &CacheCommand) -> Result<()> {
    match command {
        CacheCommand::Forget { fingerprint, cache_file } => {
            let cache = open_cache(&resolve_cache(config_path, cache_file.as_deref())?).await?;
            if cache.remove(fingerprint).await? {
                println!("Removed {}", fingerprint);
            } else {
                println!("{} was not cached", fingerprint);
            }
        }
    }
    Ok(())
}
