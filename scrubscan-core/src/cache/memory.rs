use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::cache::FingerprintCache;

/// Process-local cache. Entries last as long as the value.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl FingerprintCache for MemoryCache {
    async fn get(&self, fingerprint: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(fingerprint).cloned())
    }

    async fn set(&self, fingerprint: &str, marker: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(fingerprint.to_string(), marker.to_string());
        Ok(())
    }

    async fn remove(&self, fingerprint: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(fingerprint).is_some())
    }
}
