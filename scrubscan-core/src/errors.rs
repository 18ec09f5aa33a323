//! errors.rs - Custom error types for the scrubscan-core library.
//!
//! Two layers are distinguished. [`ScanError`] is run-level: it stops the
//! process (bad configuration, an unreachable downstream service, or a listing
//! failure while walking a container). [`ItemError`] is per item: it is
//! recorded in the run report and the walk moves on to the next item.
//!
//! License: MIT OR APACHE 2.0

use thiserror::Error;

/// Run-level failures. Any of these aborts the scan.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ScanError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Connection to {service} failed: {source}")]
    Connection {
        service: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Walking container '{container}' failed: {source}")]
    Walk {
        container: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ScanError {
    pub fn config(msg: impl Into<String>) -> Self {
        ScanError::Config(msg.into())
    }

    pub fn connection(service: impl Into<String>, source: anyhow::Error) -> Self {
        ScanError::Connection {
            service: service.into(),
            source,
        }
    }
}

/// Failures confined to a single item. The item's fingerprint is never
/// committed to the cache when one of these occurs.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ItemError {
    #[error("content not supported: {0}")]
    Unsupported(String),

    #[error("object has no fingerprint; it cannot be tracked across runs")]
    MissingFingerprint,

    #[error("failed to read item content: {0:#}")]
    Read(anyhow::Error),

    #[error("fingerprint cache lookup failed: {0:#}")]
    CacheGet(anyhow::Error),

    #[error("analyze call failed: {0:#}")]
    Analyze(anyhow::Error),

    #[error("forwarding results to sink failed: {0:#}")]
    Forward(anyhow::Error),
}

impl ItemError {
    /// Short, stable label used in reports and log lines.
    pub fn stage(&self) -> &'static str {
        match self {
            ItemError::Unsupported(_) => "unsupported",
            ItemError::MissingFingerprint => "missing-fingerprint",
            ItemError::Read(_) => "read",
            ItemError::CacheGet(_) => "cache-get",
            ItemError::Analyze(_) => "analyze",
            ItemError::Forward(_) => "forward",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_error_stage_labels() {
        let err = ItemError::Forward(anyhow::anyhow!("sink down"));
        assert_eq!(err.stage(), "forward");
        assert!(err.to_string().contains("sink down"));
    }

    #[test]
    fn test_walk_error_names_container() {
        let err = ScanError::Walk {
            container: "reports".to_string(),
            source: anyhow::anyhow!("listing denied"),
        };
        assert_eq!(err.to_string(), "Walking container 'reports' failed: listing denied");
    }
}
