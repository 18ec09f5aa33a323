//! Downstream sink receiving scrubbed findings.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;
use reqwest::{Client, Url};

use crate::errors::ScanError;
use crate::finding::SinkRequest;
use crate::transport::{build_client, endpoint, service_url};

#[async_trait]
pub trait Sink: Send + Sync {
    /// Delivers one request. An `Ok` is the sink's acknowledgment.
    async fn apply(&self, request: &SinkRequest) -> Result<()>;
}

/// JSON-over-HTTP sink client: `POST {base}/init` once, then `POST {base}/apply`.
pub struct HttpSink {
    client: Client,
    base: Url,
}

impl HttpSink {
    /// Builds the client and initialises the sink with its template. The init
    /// call doubles as the single connection attempt.
    pub async fn connect(
        address: &str,
        connect_timeout: Duration,
        template: &serde_json::Value,
    ) -> Result<Self, ScanError> {
        let base = service_url("sink", address)?;
        let client = build_client("sink", connect_timeout)?;
        let body = if template.is_null() {
            serde_json::json!({})
        } else {
            template.clone()
        };

        client
            .post(endpoint(&base, "init"))
            .timeout(connect_timeout)
            .json(&body)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| ScanError::connection("sink", e.into()))?;

        info!("Connected to sink service at {}.", base);
        Ok(Self { client, base })
    }
}

#[async_trait]
impl Sink for HttpSink {
    async fn apply(&self, request: &SinkRequest) -> Result<()> {
        self.client
            .post(endpoint(&self.base, "apply"))
            .json(request)
            .send()
            .await
            .context("sink request could not be sent")?
            .error_for_status()
            .context("sink rejected the request")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::{Location, SinkFinding};
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_connect_sends_template_to_init() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let init = server
            .mock("POST", "/init")
            .match_body(Matcher::Json(json!({"table": "findings"})))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        HttpSink::connect(&server.url(), Duration::from_secs(1), &json!({"table": "findings"}))
            .await
            .map_err(anyhow::Error::new)?;
        init.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_connect_failure_is_connection_error() {
        let mut server = mockito::Server::new_async().await;
        let _init = server.mock("POST", "/init").with_status(500).create_async().await;
        let result = HttpSink::connect(&server.url(), Duration::from_secs(1), &serde_json::Value::Null).await;
        assert!(matches!(result, Err(ScanError::Connection { .. })));
    }

    #[tokio::test]
    async fn test_apply_posts_request() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let _init = server.mock("POST", "/init").with_status(200).create_async().await;
        let apply = server
            .mock("POST", "/apply")
            .match_body(Matcher::Json(json!({
                "findings": [{
                    "fieldType": "PHONE_NUMBER",
                    "probability": 1.0,
                    "location": {"start": 153, "end": 163, "length": 10}
                }],
                "sourcePath": "test/file1"
            })))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let sink = HttpSink::connect(&server.url(), Duration::from_secs(1), &serde_json::Value::Null)
            .await
            .map_err(anyhow::Error::new)?;
        let request = SinkRequest {
            findings: vec![SinkFinding {
                field_type: "PHONE_NUMBER".to_string(),
                probability: 1.0,
                location: Location { start: 153, end: 163, length: 10 },
            }],
            source_path: "test/file1".to_string(),
        };
        sink.apply(&request).await?;
        apply.assert_async().await;
        Ok(())
    }
}
