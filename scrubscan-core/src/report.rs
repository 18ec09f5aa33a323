//! Per-run diagnostics. Each item task returns an [`ItemReport`]; the
//! orchestrator aggregates them into a [`RunReport`].

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::finding::SinkFinding;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Fingerprint already cached; nothing was read or analyzed.
    Skipped,
    /// Analyzed; findings (without matched text) and whether they reached a sink.
    Scanned {
        findings: Vec<SinkFinding>,
        forwarded: bool,
    },
    Failed {
        stage: String,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemReport {
    pub path: String,
    pub fingerprint: String,
    pub outcome: ItemOutcome,
    /// Non-fatal problem after the item was processed (a failed cache commit).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl ItemReport {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, ItemOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub container: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub items: Vec<ItemReport>,
    /// Item tasks that panicked and produced no report.
    pub lost_tasks: usize,
}

impl RunReport {
    pub fn scanned(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Scanned { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed { .. }))
    }

    pub fn total_findings(&self) -> usize {
        self.items
            .iter()
            .map(|i| match &i.outcome {
                ItemOutcome::Scanned { findings, .. } => findings.len(),
                _ => 0,
            })
            .sum()
    }

    pub fn warnings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items
            .iter()
            .filter_map(|i| i.warning.as_deref().map(|w| (i.path.as_str(), w)))
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|i| i.is_failed())
    }

    pub fn item(&self, path: &str) -> Option<&ItemReport> {
        self.items.iter().find(|i| i.path == path)
    }

    pub fn summary(&self) -> String {
        format!(
            "run {} on '{}': {} scanned, {} skipped, {} failed, {} findings",
            self.run_id,
            self.container,
            self.scanned(),
            self.skipped(),
            self.failed() + self.lost_tasks,
            self.total_findings()
        )
    }

    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.items.iter().filter(|i| pred(&i.outcome)).count()
    }
}
