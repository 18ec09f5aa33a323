//! Azure Blob Storage backend speaking the Blob REST API directly.
//!
//! Requests are authorised with Shared Key: an HMAC-SHA256 over the canonical
//! request, keyed with the base64-decoded account key. Setting an `endpoint`
//! credential (e.g. `http://127.0.0.1:10000/devstoreaccount1`) targets the
//! storage emulator with path-style addressing.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use reqwest::{Client, Method, StatusCode, Url};
use sha2::Sha256;

use crate::errors::ScanError;
use crate::store::{required, Container, Credentials, Item, ObjectStore, Page};

const API_VERSION: &str = "2021-08-06";

lazy_static! {
    static ref BLOB_RE: Regex = Regex::new(r"(?s)<Blob>(.*?)</Blob>").unwrap();
    static ref NAME_RE: Regex = Regex::new(r"(?s)<Name>(.*?)</Name>").unwrap();
    static ref ETAG_RE: Regex = Regex::new(r"(?s)<Etag>(.*?)</Etag>").unwrap();
    static ref LENGTH_RE: Regex = Regex::new(r"<Content-Length>(\d+)</Content-Length>").unwrap();
    static ref NEXT_MARKER_RE: Regex = Regex::new(r"(?s)<NextMarker>(.*?)</NextMarker>").unwrap();
    static ref ENTITY_RE: Regex = Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|lt|gt|quot|apos|amp);").unwrap();
}

pub struct AzureBlobStore {
    client: Client,
    account: String,
    key: Vec<u8>,
    endpoint: Url,
}

impl AzureBlobStore {
    /// Expects `account` and a base64 `key`; `endpoint` is optional.
    pub fn connect(credentials: &Credentials) -> Result<Self, ScanError> {
        let account = required(credentials, "azure", "account")?.to_string();
        let key = general_purpose::STANDARD
            .decode(required(credentials, "azure", "key")?)
            .map_err(|e| ScanError::config(format!("azure storage key is not valid base64: {}", e)))?;

        let endpoint = match credentials.get("endpoint").map(|e| e.trim()).filter(|e| !e.is_empty()) {
            Some(endpoint) => endpoint.to_string(),
            None => format!("https://{}.blob.core.windows.net", account),
        };
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| ScanError::config(format!("invalid azure endpoint '{}': {}", endpoint, e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(ScanError::config(format!("invalid azure endpoint '{}'", endpoint)));
        }

        let client = Client::builder()
            .build()
            .map_err(|e| ScanError::connection("azure blob storage", e.into()))?;

        Ok(Self {
            client,
            account,
            key,
            endpoint,
        })
    }

    fn url(&self, path: &[&str], query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| anyhow!("azure endpoint cannot carry a path"))?;
            segments.pop_if_empty();
            for part in path {
                for segment in part.split('/') {
                    segments.push(segment);
                }
            }
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Builds the Shared Key string-to-sign for one request.
    fn string_to_sign(
        &self,
        method: &Method,
        url: &Url,
        content_length: usize,
        content_type: &str,
        ms_headers: &[(String, String)],
    ) -> String {
        let length = if content_length == 0 {
            String::new()
        } else {
            content_length.to_string()
        };
        let standard = [
            method.as_str(),
            "", // Content-Encoding
            "", // Content-Language
            length.as_str(),
            "", // Content-MD5
            content_type,
            "", // Date (x-ms-date is used instead)
            "", // If-Modified-Since
            "", // If-Match
            "", // If-None-Match
            "", // If-Unmodified-Since
            "", // Range
        ];
        let mut out = standard.join("\n");
        out.push('\n');

        for (name, value) in ms_headers {
            out.push_str(&format!("{}:{}\n", name, value));
        }

        out.push_str(&format!("/{}{}", self.account, url.path()));
        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_lowercase(), v.into_owned()))
            .collect();
        params.sort();
        for (name, value) in params {
            out.push_str(&format!("\n{}:{}", name, value));
        }
        out
    }

    fn sign(&self, string_to_sign: &str) -> Result<String> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key)
            .map_err(|e| anyhow!("invalid azure key: {}", e))?;
        mac.update(string_to_sign.as_bytes());
        Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
        extra_headers: &[(&str, &str)],
    ) -> Result<reqwest::Response> {
        let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let mut ms_headers: Vec<(String, String)> = vec![
            ("x-ms-date".to_string(), date),
            ("x-ms-version".to_string(), API_VERSION.to_string()),
        ];
        ms_headers.extend(extra_headers.iter().map(|(k, v)| (k.to_lowercase(), v.to_string())));
        ms_headers.sort();

        let content_type = if body.is_some() { "application/octet-stream" } else { "" };
        let content_length = body.as_ref().map_or(0, Vec::len);
        let string_to_sign = self.string_to_sign(&method, &url, content_length, content_type, &ms_headers);
        let authorization = format!("SharedKey {}:{}", self.account, self.sign(&string_to_sign)?);

        let writes = method == Method::PUT || method == Method::DELETE;
        let mut request = self
            .client
            .request(method, url)
            .header("Authorization", authorization);
        for (name, value) in &ms_headers {
            request = request.header(name.as_str(), value.as_str());
        }
        match body {
            Some(body) => {
                request = request
                    .header("Content-Type", content_type)
                    .header("Content-Length", content_length.to_string())
                    .body(body);
            }
            None if writes => {
                request = request.header("Content-Length", "0");
            }
            None => {}
        }

        request.send().await.context("azure blob request failed")
    }
}

/// Reads `x-ms-error-code` and the body of a failed response into an error.
async fn response_error(resp: reqwest::Response, action: &str) -> anyhow::Error {
    let status = resp.status();
    let code = error_code(&resp);
    let body = resp.text().await.unwrap_or_default();
    anyhow!("{} failed with HTTP {} ({}): {}", action, status, code, body.trim())
}

fn error_code(resp: &reqwest::Response) -> String {
    resp.headers()
        .get("x-ms-error-code")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Decodes the predefined entities and numeric character references in one
/// pass. List Blobs encodes control characters in names as `&#xNN;`.
fn xml_unescape(s: &str) -> String {
    ENTITY_RE
        .replace_all(s, |caps: &regex::Captures| {
            let entity = &caps[1];
            let decoded = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "amp" => Some('&'),
                _ => {
                    let code = match entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => entity[1..].parse::<u32>().ok(),
                    };
                    code.and_then(char::from_u32)
                }
            };
            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Parses a List Blobs response body into a page of items.
fn parse_list_blobs(container: &str, xml: &str) -> Result<Page> {
    let mut items = Vec::new();
    for blob in BLOB_RE.captures_iter(xml) {
        let body = &blob[1];
        let name = NAME_RE
            .captures(body)
            .map(|c| xml_unescape(&c[1]))
            .ok_or_else(|| anyhow!("blob entry without a name"))?;
        let fingerprint = ETAG_RE
            .captures(body)
            .map(|c| xml_unescape(&c[1]).trim_matches('"').to_string())
            .unwrap_or_default();
        let size = LENGTH_RE
            .captures(body)
            .and_then(|c| c[1].parse::<u64>().ok())
            .unwrap_or(0);
        items.push(Item {
            container: container.to_string(),
            name,
            fingerprint,
            size,
        });
    }

    let next = NEXT_MARKER_RE
        .captures(xml)
        .map(|c| xml_unescape(c[1].trim()))
        .filter(|m| !m.is_empty());
    Ok(Page { items, next })
}

#[async_trait]
impl ObjectStore for AzureBlobStore {
    fn kind(&self) -> &str {
        "azure"
    }

    async fn create_container(&self, name: &str) -> Result<Container> {
        let url = self.url(&[name], &[("restype", "container")])?;
        let resp = self.send(Method::PUT, url, None, &[]).await?;
        match resp.status() {
            s if s.is_success() => Ok(Container::new(name)),
            StatusCode::CONFLICT if error_code(&resp) == "ContainerAlreadyExists" => {
                debug!("Container '{}' already exists, reusing it.", name);
                Ok(Container::new(name))
            }
            _ => Err(response_error(resp, &format!("creating container '{}'", name)).await),
        }
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        let url = self.url(&[name], &[("restype", "container")])?;
        let resp = self.send(Method::DELETE, url, None, &[]).await?;
        if !resp.status().is_success() {
            return Err(response_error(resp, &format!("removing container '{}'", name)).await);
        }
        Ok(())
    }

    async fn list_page(
        &self,
        container: &Container,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<Page> {
        let max_results = page_size.to_string();
        let mut query = vec![
            ("restype", "container"),
            ("comp", "list"),
            ("maxresults", max_results.as_str()),
        ];
        if let Some(marker) = cursor {
            query.push(("marker", marker));
        }
        let url = self.url(&[&container.name], &query)?;
        let resp = self.send(Method::GET, url, None, &[]).await?;
        if !resp.status().is_success() {
            return Err(response_error(resp, &format!("listing container '{}'", container.name)).await);
        }
        let xml = resp.text().await.context("Failed to read List Blobs response")?;
        parse_list_blobs(&container.name, &xml)
    }

    async fn open(&self, item: &Item) -> Result<Vec<u8>> {
        let url = self.url(&[&item.container, &item.name], &[])?;
        let resp = self.send(Method::GET, url, None, &[]).await?;
        if !resp.status().is_success() {
            return Err(response_error(resp, &format!("reading '{}'", item.path())).await);
        }
        let bytes = resp
            .bytes()
            .await
            .with_context(|| format!("Failed to read body of {}", item.path()))?;
        Ok(bytes.to_vec())
    }

    async fn put(&self, container: &Container, name: &str, content: Vec<u8>) -> Result<Item> {
        if name.is_empty() {
            bail!("empty blob name");
        }
        let size = content.len() as u64;
        let url = self.url(&[&container.name, name], &[])?;
        let resp = self
            .send(Method::PUT, url, Some(content), &[("x-ms-blob-type", "BlockBlob")])
            .await?;
        if !resp.status().is_success() {
            return Err(response_error(resp, &format!("uploading '{}/{}'", container.name, name)).await);
        }
        let fingerprint = resp
            .headers()
            .get("ETag")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .trim_matches('"')
            .to_string();
        Ok(Item {
            container: container.name.clone(),
            name: name.to_string(),
            fingerprint,
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::azure_credentials;
    use mockito::Matcher;

    // Public storage emulator credentials.
    const EMULATOR_KEY: &str =
        "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

    fn emulator_store() -> AzureBlobStore {
        let mut creds = azure_credentials("devstoreaccount1", EMULATOR_KEY);
        creds.insert("endpoint".to_string(), "http://127.0.0.1:10000/devstoreaccount1".to_string());
        AzureBlobStore::connect(&creds).unwrap()
    }

    #[test]
    fn test_connect_rejects_non_base64_key() {
        let creds = azure_credentials("acct", "not base64!!");
        assert!(matches!(AzureBlobStore::connect(&creds), Err(ScanError::Config(_))));
    }

    #[test]
    fn test_default_endpoint_uses_account_host() {
        let store = AzureBlobStore::connect(&azure_credentials("acct", EMULATOR_KEY)).unwrap();
        let url = store.url(&["test"], &[("restype", "container")]).unwrap();
        assert_eq!(url.as_str(), "https://acct.blob.core.windows.net/test?restype=container");
    }

    #[test]
    fn test_emulator_url_keeps_account_path_and_nested_names() {
        let store = emulator_store();
        let url = store.url(&["test", "dir/file 1.txt"], &[]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:10000/devstoreaccount1/test/dir/file%201.txt");
    }

    #[test]
    fn test_string_to_sign_layout() {
        let store = emulator_store();
        let url = store
            .url(&["test"], &[("restype", "container"), ("comp", "list"), ("maxresults", "100")])
            .unwrap();
        let headers = vec![
            ("x-ms-date".to_string(), "Mon, 01 Jan 2024 00:00:00 GMT".to_string()),
            ("x-ms-version".to_string(), API_VERSION.to_string()),
        ];
        let sts = store.string_to_sign(&Method::GET, &url, 0, "", &headers);
        let expected = format!(
            "GET\n\n\n\n\n\n\n\n\n\n\n\nx-ms-date:Mon, 01 Jan 2024 00:00:00 GMT\nx-ms-version:{}\n/devstoreaccount1/devstoreaccount1/test\ncomp:list\nmaxresults:100\nrestype:container",
            API_VERSION
        );
        assert_eq!(sts, expected);
    }

    #[test]
    fn test_signature_is_deterministic_base64() {
        let store = emulator_store();
        let a = store.sign("payload").unwrap();
        assert_eq!(a, store.sign("payload").unwrap());
        assert_ne!(a, store.sign("other").unwrap());
        assert_eq!(general_purpose::STANDARD.decode(&a).unwrap().len(), 32);
    }

    #[test]
    fn test_parse_list_blobs_with_marker() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults ServiceEndpoint="http://127.0.0.1:10000/devstoreaccount1/" ContainerName="test">
  <MaxResults>2</MaxResults>
  <Blobs>
    <Blob><Name>file1</Name><Properties><Etag>0x8D1A2B3C4D5E6F7</Etag><Content-Length>51</Content-Length></Properties></Blob>
    <Blob><Name>a &amp; b.txt</Name><Properties><Etag>"0x8D000000000000A"</Etag><Content-Length>3</Content-Length></Properties></Blob>
  </Blobs>
  <NextMarker>2!48!MDAwMDE</NextMarker>
</EnumerationResults>"#;
        let page = parse_list_blobs("test", xml).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].fingerprint, "0x8D1A2B3C4D5E6F7");
        assert_eq!(page.items[0].size, 51);
        assert_eq!(page.items[1].name, "a & b.txt");
        assert_eq!(page.items[1].fingerprint, "0x8D000000000000A");
        assert_eq!(page.next.as_deref(), Some("2!48!MDAwMDE"));
    }

    #[test]
    fn test_xml_unescape_handles_numeric_references() {
        assert_eq!(xml_unescape("bell&#x7;.txt"), "bell\u{7}.txt");
        assert_eq!(xml_unescape("tab&#9;name"), "tab\tname");
        assert_eq!(xml_unescape("&amp;lt;"), "&lt;");
        assert_eq!(xml_unescape("&#xD800;"), "&#xD800;");
    }

    #[test]
    fn test_parse_list_blobs_last_page() {
        let xml = "<EnumerationResults><Blobs></Blobs><NextMarker /></EnumerationResults>";
        let page = parse_list_blobs("test", xml).unwrap();
        assert!(page.items.is_empty());
        assert!(page.next.is_none());
    }

    fn mock_store(server: &mockito::Server) -> AzureBlobStore {
        let mut creds = azure_credentials("devstoreaccount1", EMULATOR_KEY);
        creds.insert("endpoint".to_string(), server.url());
        AzureBlobStore::connect(&creds).unwrap()
    }

    #[tokio::test]
    async fn test_create_existing_container_returns_reference() {
        let mut server = mockito::Server::new_async().await;
        let conflict = server
            .mock("PUT", "/test")
            .match_query(Matcher::UrlEncoded("restype".into(), "container".into()))
            .match_header("authorization", Matcher::Regex("^SharedKey devstoreaccount1:".into()))
            .with_status(409)
            .with_header("x-ms-error-code", "ContainerAlreadyExists")
            .create_async()
            .await;

        let container = mock_store(&server).create_container("test").await.unwrap();
        assert_eq!(container, Container::new("test"));
        conflict.assert_async().await;
    }

    #[tokio::test]
    async fn test_create_container_other_conflict_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/test")
            .match_query(Matcher::Any)
            .with_status(409)
            .with_header("x-ms-error-code", "ContainerBeingDeleted")
            .create_async()
            .await;

        let err = mock_store(&server).create_container("test").await.unwrap_err();
        assert!(err.to_string().contains("ContainerBeingDeleted"));
    }

    #[tokio::test]
    async fn test_list_page_follows_marker() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/test")
            .match_query(Matcher::Regex("^restype=container&comp=list&maxresults=2$".into()))
            .with_status(200)
            .with_body(
                "<EnumerationResults><Blobs>\
                 <Blob><Name>file1</Name><Properties><Etag>0x1</Etag><Content-Length>51</Content-Length></Properties></Blob>\
                 <Blob><Name>bell&#x7;.txt</Name><Properties><Etag>0x2</Etag><Content-Length>4</Content-Length></Properties></Blob>\
                 </Blobs><NextMarker>2!48!MDAwMDE</NextMarker></EnumerationResults>",
            )
            .create_async()
            .await;
        let second = server
            .mock("GET", "/test")
            .match_query(Matcher::UrlEncoded("marker".into(), "2!48!MDAwMDE".into()))
            .with_status(200)
            .with_body(
                "<EnumerationResults><Blobs>\
                 <Blob><Name>file3</Name><Properties><Etag>0x3</Etag><Content-Length>1</Content-Length></Properties></Blob>\
                 </Blobs><NextMarker /></EnumerationResults>",
            )
            .create_async()
            .await;

        let store = mock_store(&server);
        let container = Container::new("test");
        let page = store.list_page(&container, None, 2).await.unwrap();
        let names: Vec<_> = page.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["file1", "bell\u{7}.txt"]);
        assert_eq!(page.next.as_deref(), Some("2!48!MDAwMDE"));

        let last = store.list_page(&container, page.next.as_deref(), 2).await.unwrap();
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.items[0].fingerprint, "0x3");
        assert!(last.next.is_none());

        first.assert_async().await;
        second.assert_async().await;
    }
}
