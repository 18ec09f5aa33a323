//! Result forwarder: the only path by which findings leave the process.
//!
//! Matched text is cleared here, at the boundary, before the sink request is
//! built. Nothing upstream is trusted to have done it.

use std::sync::Arc;

use anyhow::Result;
use log::info;

use crate::finding::{scrub_findings, Finding, SinkFinding, SinkRequest};
use crate::sink::Sink;

#[derive(Clone)]
pub struct ResultForwarder {
    sink: Arc<dyn Sink>,
}

impl ResultForwarder {
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self { sink }
    }

    /// Builds the scrubbed sink request for `source_path`.
    pub fn build_request(source_path: &str, mut findings: Vec<Finding>) -> SinkRequest {
        scrub_findings(&mut findings);
        SinkRequest {
            findings: findings.into_iter().map(SinkFinding::from).collect(),
            source_path: source_path.to_string(),
        }
    }

    /// Scrubs and delivers findings in one sink call. Returns how many were sent.
    pub async fn forward(&self, source_path: &str, findings: Vec<Finding>) -> Result<usize> {
        let request = Self::build_request(source_path, findings);
        let count = request.findings.len();
        self.sink.apply(&request).await?;
        info!("[{}] {} results were sent to the sink successfully.", source_path, count);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::Location;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        bodies: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Sink for RecordingSink {
        async fn apply(&self, request: &SinkRequest) -> Result<()> {
            self.bodies.lock().await.push(serde_json::to_string(request)?);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_forward_never_sends_matched_text() -> Result<()> {
        let sink = Arc::new(RecordingSink::default());
        let forwarder = ResultForwarder::new(sink.clone());
        let findings = vec![Finding {
            field_type: "PHONE_NUMBER".to_string(),
            text: "(555) 253-0000".to_string(),
            probability: 1.0,
            location: Location { start: 153, end: 163, length: 10 },
        }];

        assert_eq!(forwarder.forward("test/file1", findings).await?, 1);

        let bodies = sink.bodies.lock().await;
        assert_eq!(bodies.len(), 1);
        assert!(!bodies[0].contains("555"));
        assert!(!bodies[0].contains("\"text\""));
        assert!(bodies[0].contains("\"sourcePath\":\"test/file1\""));
        Ok(())
    }
}
