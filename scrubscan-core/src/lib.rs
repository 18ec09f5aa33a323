// scrubscan-core/src/lib.rs
//! # ScrubScan Core Library
//!
//! `scrubscan-core` walks a container in an object store, sends each item's
//! text to a remote analyzer, and forwards the findings, stripped of the
//! matched content, to a downstream sink. A fingerprint cache remembers which
//! exact contents were fully processed, so repeated runs only touch new or
//! changed items and retry the ones that failed.
//!
//! ## Modules
//!
//! * `store`: The `ObjectStore` trait and the S3, Azure Blob, local-directory and in-memory backends.
//! * `cache`: The `FingerprintCache` trait with in-memory, JSON-file and Redis backends.
//! * `walker`: Paginated traversal onto a bounded pool of item tasks.
//! * `analyzer`: The `Analyzer` trait and its HTTP client.
//! * `sink`: The `Sink` trait and its HTTP client.
//! * `forwarder`: Scrubs matched text and delivers findings to the sink.
//! * `orchestrator`: The per-item pipeline and the `Scanner` that runs it.
//! * `report`: Per-item and per-run outcomes.
//! * `config` / `bootstrap`: Configuration loading and startup wiring.
//! * `errors`: Run-level and per-item error types.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use scrubscan_core::{build_scanner, ScannerConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = ScannerConfig::load_from_file("scrubscan.yaml")?;
//! let (scanner, container) = build_scanner(&config).await?;
//! let report = scanner.run(&container).await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```
//!
//! ---
//! License: MIT OR Apache-2.0

pub mod analyzer;
pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod content;
pub mod errors;
pub mod finding;
pub mod fingerprint;
pub mod forwarder;
pub mod orchestrator;
pub mod report;
pub mod sink;
pub mod store;
pub mod transport;
pub mod walker;

pub use analyzer::{Analyzer, HttpAnalyzer};
pub use bootstrap::{build_scanner, connect_store, ensure_container, open_cache};
pub use cache::{FileCache, FingerprintCache, MemoryCache, RedisCache};
pub use config::{CacheConfig, ScannerConfig, SCANNER_TEMPLATE_ENV};
pub use content::ContentFilter;
pub use errors::{ItemError, ScanError};

/// Re-exports the wire types and the PII-safe logging helpers.
pub use finding::{
    describe_finding,
    redact_sensitive,
    AnalyzeRequest,
    AnalyzeResponse,
    Finding,
    Location,
    SinkFinding,
    SinkRequest,
};

pub use fingerprint::content_fingerprint;
pub use forwarder::ResultForwarder;
pub use orchestrator::Scanner;
pub use report::{ItemOutcome, ItemReport, RunReport};
pub use sink::{HttpSink, Sink};
pub use store::{Container, Credentials, Item, ObjectStore, Page};
pub use walker::{BoundedWalker, WalkOutput};
