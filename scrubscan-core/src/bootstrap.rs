//! Startup wiring: turns a validated [`ScannerConfig`] into a ready [`Scanner`].
//!
//! Every downstream service gets exactly one connection attempt here. Any
//! failure is fatal and returned before the first item is touched.

use std::sync::Arc;

use log::info;

use crate::analyzer::HttpAnalyzer;
use crate::cache::{FileCache, FingerprintCache, MemoryCache, RedisCache};
use crate::config::{CacheConfig, ScannerConfig};
use crate::content::ContentFilter;
use crate::errors::ScanError;
use crate::orchestrator::Scanner;
use crate::sink::HttpSink;
use crate::store::{self, Container, ObjectStore};
use crate::walker::BoundedWalker;

pub async fn open_cache(config: &CacheConfig) -> Result<Arc<dyn FingerprintCache>, ScanError> {
    match config {
        CacheConfig::Memory => Ok(Arc::new(MemoryCache::new())),
        CacheConfig::File { path } => {
            let cache = FileCache::open(path)
                .map_err(|e| ScanError::connection("fingerprint cache", e))?;
            Ok(Arc::new(cache))
        }
        CacheConfig::Redis { address, db } => {
            let cache = RedisCache::connect(address, *db)
                .await
                .map_err(|e| ScanError::connection("fingerprint cache", e))?;
            Ok(Arc::new(cache))
        }
    }
}

pub async fn connect_store(config: &ScannerConfig) -> Result<Arc<dyn ObjectStore>, ScanError> {
    store::connect(&config.kind, &config.credentials).await
}

/// Creates (or reuses) the configured container.
pub async fn ensure_container(
    object_store: &Arc<dyn ObjectStore>,
    name: &str,
) -> Result<Container, ScanError> {
    object_store
        .create_container(name)
        .await
        .map_err(|e| ScanError::connection(format!("{} object store", object_store.kind()), e))
}

/// Connects every collaborator named by `config` and returns the scanner
/// together with the container it should walk.
pub async fn build_scanner(config: &ScannerConfig) -> Result<(Scanner, Container), ScanError> {
    config.validate()?;

    let object_store = connect_store(config).await?;
    let container = ensure_container(&object_store, &config.container).await?;
    let cache = open_cache(&config.cache).await?;
    let analyzer = HttpAnalyzer::connect(&config.analyzer_url, config.connect_timeout()).await?;

    let mut scanner = Scanner::new(object_store, cache, Arc::new(analyzer), config.analyze_request())
        .with_filter(ContentFilter::new(config.max_item_size))
        .with_walker(BoundedWalker::new(config.concurrency, config.page_size));

    match &config.sink_url {
        Some(sink_url) => {
            let sink = HttpSink::connect(sink_url, config.connect_timeout(), &config.sink_template).await?;
            scanner = scanner.with_sink(Arc::new(sink));
        }
        None => info!("No sink configured; items with findings will be reported and rescanned on every run."),
    }

    Ok((scanner, container))
}
