//! Redis-backed fingerprint cache. Every scanner pointed at the same server
//! shares one view of what was already processed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::cache::FingerprintCache;

pub struct RedisCache {
    connection: MultiplexedConnection,
}

/// Turns `host:port` into a connection URL for database `db`. Full
/// `redis://` and `rediss://` URLs are used as given.
pub fn redis_url(address: &str, db: i64) -> String {
    let address = address.trim();
    if address.starts_with("redis://") || address.starts_with("rediss://") {
        address.to_string()
    } else {
        format!("redis://{}/{}", address.trim_end_matches('/'), db)
    }
}

impl RedisCache {
    /// Opens one multiplexed connection; commands clone it.
    pub async fn connect(address: &str, db: i64) -> Result<Self> {
        let client = redis::Client::open(redis_url(address, db))
            .with_context(|| format!("Invalid Redis address '{}'", address))?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .with_context(|| format!("Failed to connect to Redis at {}", address))?;
        info!("Connected to Redis fingerprint cache at {}.", address);
        Ok(Self { connection })
    }
}

#[async_trait]
impl FingerprintCache for RedisCache {
    async fn get(&self, fingerprint: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        let marker: Option<String> = conn.get(fingerprint).await?;
        Ok(marker)
    }

    async fn set(&self, fingerprint: &str, marker: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.set::<_, _, ()>(fingerprint, marker).await?;
        debug!("Cached fingerprint {} for '{}'.", fingerprint, marker);
        Ok(())
    }

    async fn remove(&self, fingerprint: &str) -> Result<bool> {
        let mut conn = self.connection.clone();
        let removed: i64 = conn.del(fingerprint).await?;
        Ok(removed > 0)
    }
}
