//! Redis-backed counter store.
//!
//! Allows multiple application instances to share admission state through a
//! single keyspace. Slower than the in-process store, but counters survive
//! restarts and coordinate a fleet. Expiry is delegated to Redis TTLs.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::info;

use crate::error::Result;

use super::backend::CounterStore;

/// Shared counter store over a Redis connection.
///
/// The connection manager reconnects on its own; transient failures surface
/// as errors from the trait methods and are the caller's concern (the
/// decision engine degrades to fail-open).
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., "redis://127.0.0.1/")
    ///
    /// # Errors
    /// Returns an error if the connection cannot be established; callers
    /// treat this as a fatal configuration problem at startup.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;

        info!("Connected to Redis counter store");

        Ok(Self { connection })
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_seconds(ttl)).await?;
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64> {
        let mut conn = self.connection.clone();

        // MULTI/EXEC keeps the increment and the expiry refresh atomic.
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .incr(key, 1u64)
            .expire(key, ttl_seconds(ttl) as i64)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count)
    }
}

/// Redis expiries are whole seconds; sub-second TTLs round up to one.
fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}
