//! Scanner configuration.
//!
//! A [`ScannerConfig`] is read from a YAML file, or from a JSON document in the
//! `SCANNER_TEMPLATE` environment variable. Every optional field has a serde
//! default; [`ScannerConfig::validate`] rejects values the pipeline cannot run with.
//!
//! License: MIT OR Apache-2.0

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::errors::ScanError;
use crate::finding::AnalyzeRequest;
use crate::store::Credentials;
use crate::transport::{service_url, DEFAULT_CONNECT_TIMEOUT};
use crate::walker::{DEFAULT_CONCURRENCY, DEFAULT_PAGE_SIZE};

/// Environment variable holding the whole configuration as JSON.
pub const SCANNER_TEMPLATE_ENV: &str = "SCANNER_TEMPLATE";

/// Where scanned fingerprints are remembered between runs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CacheConfig {
    /// Process-lifetime only; every run of a fresh process rescans everything.
    #[default]
    Memory,
    File { path: PathBuf },
    /// Shared across processes and hosts. `address` is `host:port` or a
    /// `redis://` URL.
    Redis {
        address: String,
        #[serde(default)]
        db: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ScannerConfig {
    /// Object-store kind: `s3`, `azure`, `local` or `memory`.
    pub kind: String,
    #[serde(default)]
    pub credentials: Credentials,
    pub container: String,
    pub analyzer_url: String,
    /// Without a sink, findings are only reported and their items stay uncached.
    #[serde(default)]
    pub sink_url: Option<String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub analyze_template: serde_json::Value,
    #[serde(default)]
    pub min_probability: f64,
    #[serde(default)]
    pub sink_template: serde_json::Value,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub max_item_size: Option<u64>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_millis() as u64
}

impl ScannerConfig {
    /// Loads and validates a configuration from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScanError> {
        let path = path.as_ref();
        info!("Loading scanner configuration from: {}", path.display());
        let text = std::fs::read_to_string(path).map_err(|e| {
            ScanError::config(format!("failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text).map_err(|e| match e {
            ScanError::Config(msg) => ScanError::Config(format!("{} ({})", msg, path.display())),
            other => other,
        })
    }

    /// Parses and validates a YAML document. JSON is accepted as well.
    pub fn from_yaml(text: &str) -> Result<Self, ScanError> {
        let config: ScannerConfig = serde_yml::from_str(text)
            .map_err(|e| ScanError::config(format!("failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the configuration from `SCANNER_TEMPLATE`. Returns `Ok(None)` when
    /// the variable is unset.
    pub fn from_env() -> Result<Option<Self>, ScanError> {
        let raw = match std::env::var(SCANNER_TEMPLATE_ENV) {
            Ok(raw) if !raw.trim().is_empty() => raw,
            _ => return Ok(None),
        };
        debug!("Reading scanner configuration from {}.", SCANNER_TEMPLATE_ENV);
        let config: ScannerConfig = serde_json::from_str(&raw).map_err(|e| {
            ScanError::config(format!("{} is not a valid configuration: {}", SCANNER_TEMPLATE_ENV, e))
        })?;
        config.validate()?;
        Ok(Some(config))
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        let mut errors = Vec::new();

        if self.kind.trim().is_empty() {
            errors.push("`kind` must name an object-store backend.".to_string());
        }
        if self.container.trim().is_empty() {
            errors.push("`container` must not be empty.".to_string());
        }
        if let Err(e) = service_url("analyzer", &self.analyzer_url) {
            errors.push(e.to_string());
        }
        if let Some(sink_url) = &self.sink_url {
            if let Err(e) = service_url("sink", sink_url) {
                errors.push(e.to_string());
            }
        }
        if self.concurrency == 0 {
            errors.push("`concurrency` must be at least 1.".to_string());
        }
        if self.page_size == 0 {
            errors.push("`page_size` must be at least 1.".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_probability) {
            errors.push(format!(
                "`min_probability` must lie in [0, 1], got {}.",
                self.min_probability
            ));
        }
        match &self.cache {
            CacheConfig::File { path } if path.as_os_str().is_empty() => {
                errors.push("file cache requires a `path`.".to_string());
            }
            CacheConfig::Redis { address, .. } if address.trim().is_empty() => {
                errors.push("redis cache requires an `address`.".to_string());
            }
            _ => {}
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ScanError::config(errors.join(" ")))
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// The per-run analyze template; item text is filled in per call.
    pub fn analyze_request(&self) -> AnalyzeRequest {
        AnalyzeRequest::template(self.analyze_template.clone(), self.min_probability)
    }
}
