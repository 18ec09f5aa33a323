//! In-process object store. Fingerprints are content hashes, so rewriting an
//! object with different bytes changes its fingerprint exactly like an ETag.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::fingerprint::content_fingerprint;
use crate::store::{Container, Item, ObjectStore, Page};

#[derive(Default)]
pub struct MemoryStore {
    containers: RwLock<HashMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn to_item(container: &str, name: &str, content: &[u8]) -> Item {
    Item {
        container: container.to_string(),
        name: name.to_string(),
        fingerprint: content_fingerprint(content),
        size: content.len() as u64,
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn kind(&self) -> &str {
        "memory"
    }

    async fn create_container(&self, name: &str) -> Result<Container> {
        let mut containers = self.containers.write().await;
        containers.entry(name.to_string()).or_default();
        Ok(Container::new(name))
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        let mut containers = self.containers.write().await;
        containers
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| anyhow!("container '{}' not found", name))
    }

    async fn list_page(
        &self,
        container: &Container,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<Page> {
        let containers = self.containers.read().await;
        let objects = containers
            .get(&container.name)
            .ok_or_else(|| anyhow!("container '{}' not found", container.name))?;

        let lower = match cursor {
            Some(after) => Bound::Excluded(after.to_string()),
            None => Bound::Unbounded,
        };
        let mut remaining = objects.range((lower, Bound::Unbounded));
        let items: Vec<Item> = remaining
            .by_ref()
            .take(page_size)
            .map(|(name, content)| to_item(&container.name, name, content))
            .collect();

        let next = match (remaining.next(), items.last()) {
            (Some(_), Some(last)) => Some(last.name.clone()),
            _ => None,
        };
        Ok(Page { items, next })
    }

    async fn open(&self, item: &Item) -> Result<Vec<u8>> {
        let containers = self.containers.read().await;
        containers
            .get(&item.container)
            .and_then(|objects| objects.get(&item.name))
            .cloned()
            .ok_or_else(|| anyhow!("object '{}' not found", item.path()))
    }

    async fn put(&self, container: &Container, name: &str, content: Vec<u8>) -> Result<Item> {
        let mut containers = self.containers.write().await;
        let objects = containers
            .get_mut(&container.name)
            .ok_or_else(|| anyhow!("container '{}' not found", container.name))?;
        let item = to_item(&container.name, name, &content);
        objects.insert(name.to_string(), content);
        Ok(item)
    }
}
