//! Filesystem-backed object store. A container is a directory under `root`;
//! item names are `/`-separated paths relative to that directory.

use std::collections::HashMap;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::Mutex;

use crate::errors::ScanError;
use crate::fingerprint::{content_fingerprint, reader_fingerprint};
use crate::store::{required, Container, Credentials, Item, ObjectStore, Page};

pub struct LocalStore {
    root: PathBuf,
    /// Sorted names per container, taken on the first page of a walk and
    /// reused for the following pages.
    listings: Mutex<HashMap<String, Arc<Vec<String>>>>,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            listings: Mutex::new(HashMap::new()),
        }
    }

    pub fn connect(credentials: &Credentials) -> Result<Self, ScanError> {
        let root = PathBuf::from(required(credentials, "local", "root")?);
        if !root.is_dir() {
            return Err(ScanError::config(format!(
                "local storage root '{}' is not a directory",
                root.display()
            )));
        }
        Ok(Self::new(root))
    }

    fn container_dir(&self, name: &str) -> Result<PathBuf> {
        Ok(self.root.join(safe_relative(name)?))
    }
}

/// Rejects absolute paths and `..` so names cannot escape the container.
fn safe_relative(name: &str) -> Result<PathBuf> {
    let path = Path::new(name);
    if name.is_empty() {
        bail!("empty object name");
    }
    for component in path.components() {
        match component {
            Component::Normal(_) => {}
            _ => bail!("object name '{}' must be a plain relative path", name),
        }
    }
    Ok(path.to_path_buf())
}

/// Relative `/`-joined names of every regular file under `dir`, sorted.
fn collect_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)
            .with_context(|| format!("Failed to list directory {}", current.display()))?
        {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                let relative = entry.path().strip_prefix(dir)?.to_path_buf();
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                names.push(name);
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Describes one file. A file that cannot be hashed is still listed, with
/// an empty fingerprint, so that it fails on its own instead of failing the page.
fn describe_entry(dir: &Path, container: &str, name: &str) -> Item {
    let hashed = File::open(dir.join(name)).and_then(|file| {
        let size = file.metadata()?.len();
        Ok((reader_fingerprint(file)?, size))
    });
    let (fingerprint, size) = match hashed {
        Ok(hashed) => hashed,
        Err(e) => {
            warn!("Failed to fingerprint {}/{}: {}", container, name, e);
            (String::new(), 0)
        }
    };
    Item {
        container: container.to_string(),
        name: name.to_string(),
        fingerprint,
        size,
    }
}

fn page_sync(dir: &Path, container: &str, names: &[String], cursor: Option<&str>, page_size: usize) -> Page {
    let start = match cursor {
        Some(after) => names.partition_point(|n| n.as_str() <= after),
        None => 0,
    };
    let end = (start + page_size).min(names.len());
    let items: Vec<Item> = names[start..end]
        .iter()
        .map(|name| describe_entry(dir, container, name))
        .collect();

    let next = if end < names.len() {
        items.last().map(|i| i.name.clone())
    } else {
        None
    };
    Page { items, next }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn kind(&self) -> &str {
        "local"
    }

    async fn create_container(&self, name: &str) -> Result<Container> {
        let dir = self.container_dir(name)?;
        match tokio::fs::create_dir(&dir).await {
            Ok(()) => Ok(Container::new(name)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists && dir.is_dir() => {
                debug!("Container '{}' already exists, reusing it.", name);
                Ok(Container::new(name))
            }
            Err(e) => Err(e).with_context(|| format!("Failed to create container {}", dir.display())),
        }
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        let dir = self.container_dir(name)?;
        tokio::fs::remove_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to remove container {}", dir.display()))
    }

    async fn list_page(
        &self,
        container: &Container,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<Page> {
        let dir = self.container_dir(&container.name)?;
        let snapshot = match cursor {
            Some(_) => self.listings.lock().await.get(&container.name).cloned(),
            None => None,
        };
        let name = container.name.clone();
        let cursor = cursor.map(str::to_string);
        let (names, page) = tokio::task::spawn_blocking(move || -> Result<(Arc<Vec<String>>, Page)> {
            let names = match snapshot {
                Some(names) => names,
                None => {
                    if !dir.is_dir() {
                        bail!("container '{}' not found", name);
                    }
                    Arc::new(collect_names(&dir)?)
                }
            };
            let page = page_sync(&dir, &name, &names, cursor.as_deref(), page_size);
            Ok((names, page))
        })
        .await
        .map_err(|e| anyhow!("listing task failed: {}", e))??;

        let mut listings = self.listings.lock().await;
        if page.next.is_some() {
            listings.insert(container.name.clone(), names);
        } else {
            listings.remove(&container.name);
        }
        Ok(page)
    }

    async fn open(&self, item: &Item) -> Result<Vec<u8>> {
        let path = self.container_dir(&item.container)?.join(safe_relative(&item.name)?);
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    async fn put(&self, container: &Container, name: &str, content: Vec<u8>) -> Result<Item> {
        let path = self.container_dir(&container.name)?.join(safe_relative(name)?);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(Item {
            container: container.name.clone(),
            name: name.to_string(),
            fingerprint: content_fingerprint(&content),
            size: content.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_store_lists_nested_names_in_order() -> Result<()> {
        let root = TempDir::new()?;
        let store = LocalStore::new(root.path());
        let c = store.create_container("bucket").await?;
        store.put(&c, "b.txt", b"b".to_vec()).await?;
        store.put(&c, "a/inner.txt", b"a".to_vec()).await?;
        store.put(&c, "c.txt", b"c".to_vec()).await?;

        let first = store.list_page(&c, None, 2).await?;
        let names: Vec<_> = first.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a/inner.txt", "b.txt"]);

        let second = store.list_page(&c, first.next.as_deref(), 2).await?;
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].name, "c.txt");
        assert!(second.next.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_create_existing_container_returns_reference() -> Result<()> {
        let root = TempDir::new()?;
        let store = LocalStore::new(root.path());
        store.create_container("bucket").await?;
        assert_eq!(store.create_container("bucket").await?, Container::new("bucket"));
        Ok(())
    }

    #[tokio::test]
    async fn test_put_rejects_escaping_names() -> Result<()> {
        let root = TempDir::new()?;
        let store = LocalStore::new(root.path());
        let c = store.create_container("bucket").await?;
        assert!(store.put(&c, "../outside", b"x".to_vec()).await.is_err());
        Ok(())
    }

    #[test]
    fn test_connect_requires_existing_root() {
        let creds = HashMap::from([("root".to_string(), "/definitely/not/here".to_string())]);
        assert!(matches!(LocalStore::connect(&creds), Err(ScanError::Config(_))));
    }

    #[tokio::test]
    async fn test_listing_hashes_without_reading_through_open() -> Result<()> {
        let root = TempDir::new()?;
        let store = LocalStore::new(root.path());
        let c = store.create_container("bucket").await?;
        let put = store.put(&c, "file1", b"Please call me.".to_vec()).await?;

        let page = store.list_page(&c, None, 10).await?;
        assert_eq!(page.items, vec![put]);
        Ok(())
    }

    #[tokio::test]
    async fn test_later_pages_use_the_first_page_snapshot() -> Result<()> {
        let root = TempDir::new()?;
        let store = LocalStore::new(root.path());
        let c = store.create_container("bucket").await?;
        for name in ["a", "b", "c"] {
            store.put(&c, name, name.as_bytes().to_vec()).await?;
        }

        let first = store.list_page(&c, None, 2).await?;
        // Written mid-walk; sorts after the cursor but is not in the snapshot.
        store.put(&c, "bb", b"late".to_vec()).await?;
        let second = store.list_page(&c, first.next.as_deref(), 2).await?;
        let names: Vec<_> = second.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["c"]);
        assert!(second.next.is_none());

        // A new walk sees it.
        let fresh = store.list_page(&c, None, 10).await?;
        assert_eq!(fresh.items.len(), 4);
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unhashable_entry_does_not_fail_the_page() -> Result<()> {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let root = TempDir::new()?;
        let store = LocalStore::new(root.path());
        let c = store.create_container("bucket").await?;
        store.put(&c, "good.txt", b"fine".to_vec()).await?;
        std::fs::write(root.path().join("bucket").join(OsStr::from_bytes(b"bad\xff.txt")), b"x")?;

        let page = store.list_page(&c, None, 10).await?;
        assert_eq!(page.items.len(), 2);
        let good = page.items.iter().find(|i| i.name == "good.txt").expect("good.txt listed");
        assert_eq!(good.fingerprint, content_fingerprint(b"fine"));
        let bad = page.items.iter().find(|i| i.name != "good.txt").expect("bad entry listed");
        assert!(bad.fingerprint.is_empty());
        Ok(())
    }
}
