//! Bounded walker: paginated container traversal feeding a fixed-size pool.
//!
//! One task is spawned per item. A semaphore caps in-flight tasks at the pool
//! size; the permit is acquired *before* spawning, so the listing loop blocks
//! while the pool is saturated. [`BoundedWalker::walk`] returns only once the
//! listing is exhausted and every spawned task has been joined.

use std::future::Future;
use std::sync::Arc;

use log::{debug, error, warn};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use crate::errors::ScanError;
use crate::store::{self, Container, Item, ObjectStore};

pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Results of every task that ran to completion, plus a count of tasks that panicked.
#[derive(Debug)]
pub struct WalkOutput<T> {
    pub results: Vec<T>,
    pub panicked: usize,
}

impl<T> Default for WalkOutput<T> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            panicked: 0,
        }
    }
}

impl<T> WalkOutput<T> {
    fn record(&mut self, joined: Result<T, JoinError>) {
        match joined {
            Ok(result) => self.results.push(result),
            Err(e) => {
                error!("Item task did not complete: {}", e);
                self.panicked += 1;
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BoundedWalker {
    concurrency: usize,
    page_size: usize,
}

impl Default for BoundedWalker {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY, DEFAULT_PAGE_SIZE)
    }
}

impl BoundedWalker {
    /// Zero values are clamped to one.
    pub fn new(concurrency: usize, page_size: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            page_size: page_size.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Walks `container`, running `task` for every item on the pool.
    ///
    /// A listing failure stops submission, drains the tasks already running,
    /// and is returned as [`ScanError::Walk`]. Task outcomes are never errors
    /// at this level; callers encode per-item failures in `T`.
    pub async fn walk<F, Fut, T>(
        &self,
        object_store: Arc<dyn ObjectStore>,
        container: &Container,
        task: F,
    ) -> Result<WalkOutput<T>, ScanError>
    where
        F: Fn(Item) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut output = WalkOutput::default();
        let mut listing = store::walk(object_store, container.clone(), self.page_size);
        let mut submitted = 0usize;

        let listing_result = loop {
            let item = match listing.next_item().await {
                Ok(Some(item)) => item,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };

            // Blocks here while all workers are busy.
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => break Err(anyhow::anyhow!("worker pool closed: {}", e)),
            };
            let fut = task(item);
            tasks.spawn(async move {
                let _permit = permit;
                fut.await
            });
            submitted += 1;

            while let Some(joined) = tasks.try_join_next() {
                output.record(joined);
            }
        };

        if listing_result.is_err() {
            warn!(
                "Listing of '{}' failed; waiting for {} in-flight item tasks.",
                container.name,
                tasks.len()
            );
        }
        while let Some(joined) = tasks.join_next().await {
            output.record(joined);
        }

        debug!(
            "Walk of '{}' finished: {} items submitted over {} pages.",
            container.name,
            submitted,
            listing.pages_fetched()
        );

        listing_result.map_err(|source| ScanError::Walk {
            container: container.name.clone(),
            source,
        })?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Page};
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn seeded_store(count: usize) -> Result<(Arc<dyn ObjectStore>, Container)> {
        let store = MemoryStore::new();
        let container = store.create_container("test").await?;
        for i in 0..count {
            store.put(&container, &format!("file{:03}", i), format!("content {}", i).into_bytes()).await?;
        }
        Ok((Arc::new(store), container))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_never_exceeds_pool_size() -> Result<()> {
        let (store, container) = seeded_store(24).await?;
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let walker = BoundedWalker::new(3, 5);
        let output = walker
            .walk(store, &container, |item| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    item.name
                }
            })
            .await?;

        assert_eq!(output.results.len(), 24);
        assert_eq!(output.panicked, 0);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 2, "tasks should overlap");
        assert_eq!(in_flight.load(Ordering::SeqCst), 0, "walk returned before tasks finished");
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_container_completes() -> Result<()> {
        let (store, container) = seeded_store(0).await?;
        let output = BoundedWalker::default().walk(store, &container, |item| async move { item }).await?;
        assert!(output.results.is_empty());
        Ok(())
    }

    /// Serves one good page, then fails the listing call.
    struct BrokenListing {
        inner: MemoryStore,
    }

    #[async_trait]
    impl ObjectStore for BrokenListing {
        fn kind(&self) -> &str {
            "broken"
        }
        async fn create_container(&self, name: &str) -> Result<Container> {
            self.inner.create_container(name).await
        }
        async fn remove_container(&self, name: &str) -> Result<()> {
            self.inner.remove_container(name).await
        }
        async fn list_page(&self, container: &Container, cursor: Option<&str>, page_size: usize) -> Result<Page> {
            if cursor.is_some() {
                bail!("listing denied");
            }
            self.inner.list_page(container, cursor, page_size).await
        }
        async fn open(&self, item: &Item) -> Result<Vec<u8>> {
            self.inner.open(item).await
        }
        async fn put(&self, container: &Container, name: &str, content: Vec<u8>) -> Result<Item> {
            self.inner.put(container, name, content).await
        }
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_walk_after_draining() -> Result<()> {
        let inner = MemoryStore::new();
        let container = inner.create_container("test").await?;
        for i in 0..5 {
            inner.put(&container, &format!("f{}", i), b"x".to_vec()).await?;
        }
        let store: Arc<dyn ObjectStore> = Arc::new(BrokenListing { inner });
        let finished = Arc::new(AtomicUsize::new(0));

        let result = BoundedWalker::new(2, 2)
            .walk(store, &container, |_item| {
                let finished = Arc::clone(&finished);
                async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    finished.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;

        assert!(matches!(result, Err(ScanError::Walk { .. })));
        assert_eq!(finished.load(Ordering::SeqCst), 2, "first page tasks must still complete");
        Ok(())
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_abort_walk() -> Result<()> {
        let (store, container) = seeded_store(4).await?;
        let output = BoundedWalker::new(2, 10)
            .walk(store, &container, |item| async move {
                if item.name == "file001" {
                    panic!("boom");
                }
                item.name
            })
            .await?;
        assert_eq!(output.results.len(), 3);
        assert_eq!(output.panicked, 1);
        Ok(())
    }
}
