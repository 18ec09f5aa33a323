//! HTTP plumbing shared by the analyzer and sink clients.
//!
//! Connection-level settings (connect timeout) are fixed once when the client
//! is built; individual calls never override them.

use std::time::Duration;

use reqwest::{Client, Url};

use crate::errors::ScanError;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Parses a service address into a base URL that `join` appends to.
/// Bare `host:port` addresses are treated as plain HTTP.
pub fn service_url(service: &str, address: &str) -> Result<Url, ScanError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(ScanError::config(format!("{} service address is empty", service)));
    }
    let with_scheme = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };
    let mut url = Url::parse(&with_scheme).map_err(|e| {
        ScanError::config(format!("invalid {} service address '{}': {}", service, address, e))
    })?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(ScanError::config(format!(
            "invalid {} service address '{}'",
            service, address
        )));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

pub fn endpoint(base: &Url, route: &str) -> Url {
    // `base` always ends with '/', and routes are plain relative segments.
    base.join(route).unwrap_or_else(|_| base.clone())
}

pub fn build_client(service: &str, connect_timeout: Duration) -> Result<Client, ScanError> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .user_agent(concat!("scrubscan/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| ScanError::connection(service, e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_url_adds_scheme_and_slash() {
        let url = service_url("analyzer", "localhost:3000").unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/");
        assert_eq!(endpoint(&url, "analyze").as_str(), "http://localhost:3000/analyze");
    }

    #[test]
    fn test_service_url_keeps_base_path() {
        let url = service_url("sink", "https://binder.internal/v1").unwrap();
        assert_eq!(endpoint(&url, "apply").as_str(), "https://binder.internal/v1/apply");
    }

    #[test]
    fn test_service_url_rejects_empty_address() {
        assert!(matches!(service_url("analyzer", "  "), Err(ScanError::Config(_))));
    }
}
