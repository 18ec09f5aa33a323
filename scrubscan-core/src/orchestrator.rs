//! The scan orchestrator.
//!
//! Per item, strictly in order:
//! 1. Content-type check
//! 2. Fingerprint cache gate (hit = skip)
//! 3. Read content
//! 4. Analyze
//! 5. Forward scrubbed findings (only when there are any and a sink is set)
//! 6. Commit the fingerprint
//!
//! A failure at any stage ends that item only. The fingerprint is committed
//! only after every earlier stage succeeded, so the next run retries exactly
//! the items that did not finish. Without a sink, items with findings are
//! reported but never committed.

use std::sync::Arc;

use chrono::Utc;
use log::{error, info, warn};
use uuid::Uuid;

use crate::analyzer::Analyzer;
use crate::cache::FingerprintCache;
use crate::content::ContentFilter;
use crate::errors::{ItemError, ScanError};
use crate::finding::{log_findings, AnalyzeRequest, SinkFinding};
use crate::forwarder::ResultForwarder;
use crate::report::{ItemOutcome, ItemReport, RunReport};
use crate::sink::Sink;
use crate::store::{Container, Item, ObjectStore};
use crate::walker::BoundedWalker;

/// Everything an item task needs, shared read-only across workers.
#[derive(Clone)]
struct ItemPipeline {
    store: Arc<dyn ObjectStore>,
    cache: Arc<dyn FingerprintCache>,
    analyzer: Arc<dyn Analyzer>,
    forwarder: Option<ResultForwarder>,
    template: AnalyzeRequest,
    filter: ContentFilter,
}

/// What a successful item run produced, before it becomes a report.
enum Processed {
    Skipped,
    Scanned {
        findings: Vec<SinkFinding>,
        forwarded: bool,
        warning: Option<String>,
    },
}

impl ItemPipeline {
    async fn process(&self, item: Item) -> ItemReport {
        let path = item.path();
        let (outcome, warning) = match self.scan_item(&item, &path).await {
            Ok(Processed::Skipped) => (ItemOutcome::Skipped, None),
            Ok(Processed::Scanned { findings, forwarded, warning }) => {
                (ItemOutcome::Scanned { findings, forwarded }, warning)
            }
            Err(e) => {
                error!("[{}] {} failed: {}", path, e.stage(), e);
                (
                    ItemOutcome::Failed {
                        stage: e.stage().to_string(),
                        error: e.to_string(),
                    },
                    None,
                )
            }
        };
        ItemReport {
            path,
            fingerprint: item.fingerprint,
            outcome,
            warning,
        }
    }

    async fn scan_item(&self, item: &Item, path: &str) -> Result<Processed, ItemError> {
        self.filter.check_item(item).map_err(ItemError::Unsupported)?;
        if item.fingerprint.is_empty() {
            return Err(ItemError::MissingFingerprint);
        }

        // A lookup error aborts the item rather than risking a double scan.
        let cached = self.cache.get(&item.fingerprint).await.map_err(ItemError::CacheGet)?;
        if cached.is_some_and(|marker| !marker.is_empty()) {
            info!("Item was already scanned {}", path);
            return Ok(Processed::Skipped);
        }
        info!("Fingerprint not cached, scanning {}", path);

        let raw = self.store.open(item).await.map_err(ItemError::Read)?;
        let content = self.filter.decode(raw).map_err(ItemError::Unsupported)?;

        let response = self
            .analyzer
            .analyze(&self.template.with_text(content))
            .await
            .map_err(ItemError::Analyze)?;
        let findings = response.results;
        log_findings(path, &findings);

        let reported: Vec<SinkFinding> = ResultForwarder::build_request(path, findings.clone()).findings;
        let forwarded = match (&self.forwarder, findings.is_empty()) {
            (_, true) => false,
            (Some(forwarder), false) => {
                forwarder.forward(path, findings).await.map_err(ItemError::Forward)?;
                true
            }
            // Findings that reached no sink are not done; leave the item uncached.
            (None, false) => {
                warn!("[{}] no sink configured, fingerprint {} left uncached", path, item.fingerprint);
                return Ok(Processed::Scanned {
                    findings: reported,
                    forwarded: false,
                    warning: Some("findings were not forwarded (no sink); item stays uncached".to_string()),
                });
            }
        };

        // The item is done; a failed commit only costs a redundant re-scan later.
        let warning = match self.cache.set(&item.fingerprint, &item.name).await {
            Ok(()) => None,
            Err(e) => {
                warn!("[{}] failed to cache fingerprint {}: {:#}", path, item.fingerprint, e);
                Some(format!("cache commit failed: {:#}", e))
            }
        };

        Ok(Processed::Scanned {
            findings: reported,
            forwarded,
            warning,
        })
    }
}

/// Drives one scan run over a container.
pub struct Scanner {
    pipeline: ItemPipeline,
    walker: BoundedWalker,
}

impl Scanner {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        cache: Arc<dyn FingerprintCache>,
        analyzer: Arc<dyn Analyzer>,
        template: AnalyzeRequest,
    ) -> Self {
        Self {
            pipeline: ItemPipeline {
                store,
                cache,
                analyzer,
                forwarder: None,
                template,
                filter: ContentFilter::default(),
            },
            walker: BoundedWalker::default(),
        }
    }

    /// Forwards findings to `sink`. Without a sink, findings are only reported
    /// and their items are scanned again on the next run.
    pub fn with_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.pipeline.forwarder = Some(ResultForwarder::new(sink));
        self
    }

    pub fn with_filter(mut self, filter: ContentFilter) -> Self {
        self.pipeline.filter = filter;
        self
    }

    pub fn with_walker(mut self, walker: BoundedWalker) -> Self {
        self.walker = walker;
        self
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        Arc::clone(&self.pipeline.store)
    }

    /// Scans every item of `container` once.
    ///
    /// Per-item failures are recorded in the report. Only a listing failure
    /// is returned as an error.
    pub async fn run(&self, container: &Container) -> Result<RunReport, ScanError> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(
            "Starting run {} on '{}' with {} workers.",
            run_id,
            container.name,
            self.walker.concurrency()
        );

        let pipeline = Arc::new(self.pipeline.clone());
        let output = self
            .walker
            .walk(self.store(), container, move |item| {
                let pipeline = Arc::clone(&pipeline);
                async move { pipeline.process(item).await }
            })
            .await?;

        let report = RunReport {
            run_id,
            container: container.name.clone(),
            started_at,
            finished_at: Utc::now(),
            items: output.results,
            lost_tasks: output.panicked,
        };
        info!("Finished {}", report.summary());
        Ok(report)
    }
}
