//! JSON-file backed fingerprint cache, persisted across runs.
//!
//! The whole map is rewritten on every change: serialized into a sibling
//! `.tmp` file under an exclusive lock, then renamed over the original.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::cache::FingerprintCache;

const CACHE_FILE_TMP_SUFFIX: &str = ".tmp";

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct CacheFile {
    entries: BTreeMap<String, String>,
}

impl CacheFile {
    fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let mut f = OpenOptions::new().read(true).open(path)?;
        fs2::FileExt::lock_shared(&f)?;
        let mut raw = Vec::new();
        f.read_to_end(&mut raw)?;
        fs2::FileExt::unlock(&f)?;

        if raw.is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_slice(&raw)
            .with_context(|| format!("Fingerprint cache {} is corrupt", path.display()))
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(self)?;

        let tmp_path = tmp_path_for(path);
        {
            let mut tmp = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            fs2::FileExt::lock_exclusive(&tmp)?;
            tmp.write_all(&json)?;
            tmp.flush()?;
            fs2::FileExt::unlock(&tmp)?;
        }

        fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(CACHE_FILE_TMP_SUFFIX);
    path.with_file_name(name)
}

pub struct FileCache {
    path: PathBuf,
    state: Mutex<CacheFile>,
}

impl FileCache {
    /// Opens the cache file, starting empty if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = CacheFile::load(&path)?;
        info!(
            "Loaded {} fingerprint cache entries from {}.",
            state.entries.len(),
            path.display()
        );
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `next` to disk and hands it back once it is durable.
    async fn persist(&self, next: CacheFile) -> Result<CacheFile> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || next.save(&path).map(|()| next))
            .await
            .map_err(|e| anyhow!("cache persist task failed: {}", e))?
            .with_context(|| format!("Failed to write fingerprint cache {}", self.path.display()))
    }
}

#[async_trait]
impl FingerprintCache for FileCache {
    async fn get(&self, fingerprint: &str) -> Result<Option<String>> {
        Ok(self.state.lock().await.entries.get(fingerprint).cloned())
    }

    async fn set(&self, fingerprint: &str, marker: &str) -> Result<()> {
        // The lock is held across the write so concurrent commits land in order.
        // Memory only changes once the new map is on disk.
        let mut state = self.state.lock().await;
        if state.entries.get(fingerprint).map(String::as_str) == Some(marker) {
            return Ok(());
        }
        let mut next = state.clone();
        next.entries.insert(fingerprint.to_string(), marker.to_string());
        *state = self.persist(next).await?;
        debug!("Cached fingerprint {} for '{}'.", fingerprint, marker);
        Ok(())
    }

    async fn remove(&self, fingerprint: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        if !state.entries.contains_key(fingerprint) {
            return Ok(false);
        }
        let mut next = state.clone();
        next.entries.remove(fingerprint);
        *state = self.persist(next).await?;
        Ok(true)
    }
}
