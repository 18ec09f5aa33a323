//! Data structures exchanged with the analyzer and the sink, plus the
//! PII-safe logging helpers used whenever a finding is reported.

use lazy_static::lazy_static;
use log::{debug, info};
use serde::{Deserialize, Serialize};

lazy_static! {
    /// Set once from the environment: allows matched text in debug logs.
    static ref PII_DEBUG_ALLOWED: bool = {
        std::env::var("SCRUBSCAN_ALLOW_DEBUG_PII")
            .map(|s| s.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    };
}

/// Span of a finding inside the scanned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Location {
    pub start: u64,
    pub end: u64,
    pub length: u64,
}

/// A single analyzer finding. `text` holds the matched sensitive content and
/// must be cleared before the finding leaves the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub field_type: String,
    #[serde(default)]
    pub text: String,
    pub probability: f64,
    #[serde(default)]
    pub location: Location,
}

/// Body of one analyze call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    pub template: serde_json::Value,
    pub min_probability: f64,
    pub text: String,
}

impl AnalyzeRequest {
    /// Builds the per-run template. `text` is filled in per item.
    pub fn template(template: serde_json::Value, min_probability: f64) -> Self {
        Self {
            template,
            min_probability,
            text: String::new(),
        }
    }

    /// Copies the template and substitutes the item's content.
    pub fn with_text(&self, text: String) -> Self {
        Self {
            template: self.template.clone(),
            min_probability: self.min_probability,
            text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub results: Vec<Finding>,
}

/// A finding as it is allowed to cross into the sink: there is no text field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkFinding {
    pub field_type: String,
    pub probability: f64,
    pub location: Location,
}

impl From<Finding> for SinkFinding {
    fn from(finding: Finding) -> Self {
        Self {
            field_type: finding.field_type,
            probability: finding.probability,
            location: finding.location,
        }
    }
}

/// Body of one sink call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkRequest {
    pub findings: Vec<SinkFinding>,
    pub source_path: String,
}

/// Overwrites the matched text of every finding with an empty string.
pub fn scrub_findings(findings: &mut [Finding]) {
    for finding in findings.iter_mut() {
        finding.text.clear();
    }
}

pub fn redact_sensitive(s: &str) -> String {
    const MAX_LEN: usize = 8;
    if s.len() <= MAX_LEN {
        "[REDACTED]".to_string()
    } else {
        format!("[REDACTED: {} chars]", s.len())
    }
}

fn get_loggable_content(sensitive_content: &str) -> String {
    if *PII_DEBUG_ALLOWED {
        sensitive_content.to_string()
    } else {
        redact_sensitive(sensitive_content)
    }
}

fn describe(field_type: &str, probability: f64, location: &Location) -> String {
    format!(
        "Found: {:?}, probability: {:.6}, Location: start:{} end:{} length:{}",
        field_type, probability, location.start, location.end, location.length
    )
}

/// Formats the one-line summary of a finding. Matched text is never part of it.
pub fn describe_finding(finding: &Finding) -> String {
    describe(&finding.field_type, finding.probability, &finding.location)
}

impl SinkFinding {
    pub fn describe(&self) -> String {
        describe(&self.field_type, self.probability, &self.location)
    }
}

pub fn log_findings(source_path: &str, findings: &[Finding]) {
    for finding in findings {
        info!("[{}] {}", source_path, describe_finding(finding));
        if !finding.text.is_empty() {
            debug!(
                "[{}] matched text for {}: '{}'",
                source_path,
                finding.field_type,
                get_loggable_content(&finding.text)
            );
        }
    }
}
