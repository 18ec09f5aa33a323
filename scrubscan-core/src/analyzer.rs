//! Analysis dispatcher: one remote analyze call per unscanned item.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;
use reqwest::{Client, Url};

use crate::errors::ScanError;
use crate::finding::{AnalyzeRequest, AnalyzeResponse};
use crate::transport::{build_client, endpoint, service_url};

#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Issues exactly one analyze call. No retries.
    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse>;
}

/// JSON-over-HTTP analyzer client: `POST {base}/analyze`.
pub struct HttpAnalyzer {
    client: Client,
    base: Url,
}

impl HttpAnalyzer {
    /// Builds the client and makes a single `GET {base}/health` check bounded
    /// by `connect_timeout`. A failed health check is a [`ScanError::Connection`].
    pub async fn connect(address: &str, connect_timeout: Duration) -> Result<Self, ScanError> {
        let base = service_url("analyzer", address)?;
        let client = build_client("analyzer", connect_timeout)?;

        client
            .get(endpoint(&base, "health"))
            .timeout(connect_timeout)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|e| ScanError::connection("analyzer", e.into()))?;

        info!("Connected to analyzer service at {}.", base);
        Ok(Self { client, base })
    }
}

#[async_trait]
impl Analyzer for HttpAnalyzer {
    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse> {
        let resp = self
            .client
            .post(endpoint(&self.base, "analyze"))
            .json(request)
            .send()
            .await
            .context("analyze request could not be sent")?
            .error_for_status()
            .context("analyzer rejected the request")?;

        resp.json::<AnalyzeResponse>()
            .await
            .context("analyzer returned an unreadable response")
    }
}
