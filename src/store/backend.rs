//! Counter store trait for abstracting local and shared backends.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Trait for counter store implementations.
///
/// This trait abstracts over the process-local `MemoryStore` and the
/// Redis-backed `RedisStore` so the decision engine works with either. The
/// backend is selected once at configuration time and does not change per
/// request.
///
/// Entries disappear on their own once their time-to-live passes; the store,
/// not the engine, performs garbage collection. An absent entry means
/// "never observed or expired".
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read the value stored at `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Unconditionally overwrite `key` with `value`, expiring after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Atomically increment the integer counter at `key`, refreshing its
    /// expiry to `ttl`, and return the new count. An absent or expired entry
    /// counts from zero.
    ///
    /// The engine only calls this when atomic counting is opted into; the
    /// default evaluation path uses `get`/`set`.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64>;
}
