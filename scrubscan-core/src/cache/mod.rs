//! Fingerprint cache: a key/value store deciding skip-vs-scan per item.
//!
//! Key = item fingerprint, value = an opaque marker (the item's name). An
//! entry means "this exact content was fully processed". Entries never expire;
//! only [`FingerprintCache::remove`] deletes them.

use anyhow::Result;
use async_trait::async_trait;

pub mod file;
pub mod memory;
pub mod redis_cache;

pub use file::FileCache;
pub use memory::MemoryCache;
pub use redis_cache::RedisCache;

#[async_trait]
pub trait FingerprintCache: Send + Sync {
    /// Returns the marker stored for `fingerprint`, or `None` on a miss.
    async fn get(&self, fingerprint: &str) -> Result<Option<String>>;

    /// Commits an entry. Writing the same key twice is harmless.
    async fn set(&self, fingerprint: &str, marker: &str) -> Result<()>;

    /// Deletes an entry. Returns whether it existed.
    async fn remove(&self, fingerprint: &str) -> Result<bool>;
}
