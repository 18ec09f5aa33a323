//! Uniform access to heterogeneous object-storage backends.
//!
//! Every backend implements [`ObjectStore`]. Callers obtain one through
//! [`connect`], which dispatches on the configured kind and validates the
//! credential map for that kind. Listing is exposed page by page through the
//! trait and as a lazy item sequence through [`walk`].
//!
//! License: MIT OR APACHE 2.0

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info};
use serde::Serialize;

use crate::errors::ScanError;

pub mod azure;
pub mod local;
pub mod memory;
pub mod s3;

pub use azure::AzureBlobStore;
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use s3::S3Store;

/// Credential map handed to [`connect`]. Its shape depends on the kind.
pub type Credentials = HashMap<String, String>;

/// A named collection of items in one object-store location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Container {
    pub name: String,
}

impl Container {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// One object inside a container. Content is only fetched through
/// [`ObjectStore::open`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    pub container: String,
    pub name: String,
    /// Content-derived identity token (ETag or content hash).
    pub fingerprint: String,
    pub size: u64,
}

impl Item {
    /// The `container/name` path used in logs, reports and sink requests.
    pub fn path(&self) -> String {
        format!("{}/{}", self.container, self.name)
    }
}

/// One listing page. `next` is the opaque cursor for the following page.
#[derive(Debug, Default)]
pub struct Page {
    pub items: Vec<Item>,
    pub next: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn kind(&self) -> &str;

    /// Creates the container, or returns a reference to it if it already exists.
    async fn create_container(&self, name: &str) -> Result<Container>;

    async fn remove_container(&self, name: &str) -> Result<()>;

    /// Lists at most `page_size` items, starting after `cursor`.
    async fn list_page(
        &self,
        container: &Container,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<Page>;

    /// Reads the full content of an item. A failure discards anything read so far.
    async fn open(&self, item: &Item) -> Result<Vec<u8>>;

    /// Writes an object, replacing any previous content under the same name.
    async fn put(&self, container: &Container, name: &str, content: Vec<u8>) -> Result<Item>;
}

/// Lazy, paginated traversal of a container. Resumable only from the start.
pub struct Walk {
    store: Arc<dyn ObjectStore>,
    container: Container,
    page_size: usize,
    buffer: VecDeque<Item>,
    cursor: Option<String>,
    exhausted: bool,
    pages: usize,
}

impl Walk {
    /// Yields the next item, fetching a new page when the buffer runs dry.
    /// Returns `Ok(None)` once the listing is exhausted.
    pub async fn next_item(&mut self) -> Result<Option<Item>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }
            if self.exhausted {
                return Ok(None);
            }

            let page = self
                .store
                .list_page(&self.container, self.cursor.as_deref(), self.page_size)
                .await?;
            self.pages += 1;
            debug!(
                "Listed page {} of '{}': {} items, more: {}",
                self.pages,
                self.container.name,
                page.items.len(),
                page.next.is_some()
            );

            self.buffer.extend(page.items);
            match page.next {
                Some(next) => self.cursor = Some(next),
                None => self.exhausted = true,
            }
        }
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages
    }
}

pub fn walk(store: Arc<dyn ObjectStore>, container: Container, page_size: usize) -> Walk {
    Walk {
        store,
        container,
        page_size: page_size.max(1),
        buffer: VecDeque::new(),
        cursor: None,
        exhausted: false,
        pages: 0,
    }
}

/// Connects to the backend named by `kind`.
///
/// Supported kinds: `s3`, `azure` (aliases `azure-blob`, `azureblob`),
/// `local` and `memory`. An unknown kind or a missing/malformed credential is
/// a [`ScanError::Config`].
pub async fn connect(kind: &str, credentials: &Credentials) -> Result<Arc<dyn ObjectStore>, ScanError> {
    let store: Arc<dyn ObjectStore> = match kind.trim().to_ascii_lowercase().as_str() {
        "s3" => Arc::new(S3Store::connect(credentials).await?),
        "azure" | "azure-blob" | "azureblob" => Arc::new(AzureBlobStore::connect(credentials)?),
        "local" => Arc::new(LocalStore::connect(credentials)?),
        "memory" => Arc::new(MemoryStore::new()),
        "" => return Err(ScanError::config("storage kind must be set")),
        other => return Err(ScanError::config(format!("unknown storage kind '{}'", other))),
    };
    info!("Connected to {} object store.", store.kind());
    Ok(store)
}

/// Builds the credential map for an S3 location.
pub fn s3_credentials(access_key_id: &str, secret_key: &str, region: &str) -> Credentials {
    HashMap::from([
        ("access_key_id".to_string(), access_key_id.to_string()),
        ("secret_key".to_string(), secret_key.to_string()),
        ("region".to_string(), region.to_string()),
    ])
}

/// Builds the credential map for an Azure Blob Storage account.
pub fn azure_credentials(account: &str, key: &str) -> Credentials {
    HashMap::from([
        ("account".to_string(), account.to_string()),
        ("key".to_string(), key.to_string()),
    ])
}

pub(crate) fn required<'a>(credentials: &'a Credentials, kind: &str, key: &str) -> Result<&'a str, ScanError> {
    match credentials.get(key).map(|v| v.trim()) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ScanError::config(format!(
            "{} storage requires the '{}' credential",
            kind, key
        ))),
    }
}
