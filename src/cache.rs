//! Cache / opaque-token store over Redis.
//!
//! All volatile state lives here: verification and reset codes, login codes,
//! TOTP secrets, 2FA attempt counters, the access-token denylist, and the
//! L1/L2 authorization caches. Writes are always set-with-expiry and
//! idempotent; deletes are idempotent.

use redis::{aio::ConnectionManager, AsyncCommands};

/// Thin wrapper holding a multiplexed Redis connection
#[derive(Clone)]
pub struct CacheStore {
    conn: ConnectionManager,
}

impl CacheStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Connect and prime the connection manager
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self::new(conn))
    }

    /// Atomic set-with-expiry
    pub async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_seconds).await?;
        Ok(())
    }

    /// Set without expiry (long-lived 2FA configuration keys)
    pub async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    /// Idempotent delete
    pub async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    pub async fn exists(&self, key: &str) -> anyhow::Result<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(key).await?)
    }

    /// Increment a counter, setting the expiry only when the key is created.
    ///
    /// Backs the per-user 2FA attempt counters; the window starts at the
    /// first failure and is not extended by later ones.
    pub async fn incr_with_expiry(&self, key: &str, ttl_seconds: u64) -> anyhow::Result<i64> {
        let mut conn = self.conn.clone();
        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .cmd("EXPIRE")
            .arg(key)
            .arg(ttl_seconds as i64)
            .arg("NX")
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    /// Delete every key matching `pattern` (SCAN + DEL), returning the count.
    ///
    /// Used by PDP cache invalidation; best-effort by contract.
    pub async fn delete_pattern(&self, pattern: &str) -> anyhow::Result<u64> {
        let mut scan_conn = self.conn.clone();
        let keys: Vec<String> = {
            let mut iter = scan_conn.scan_match::<_, String>(pattern).await?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.clone();
        conn.del::<_, ()>(&keys).await?;
        Ok(keys.len() as u64)
    }
}
