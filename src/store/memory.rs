//! Process-local counter store.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::Result;

use super::backend::CounterStore;

/// Minimum interval between sweeps of expired entries.
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-process counter store.
///
/// Fast and dependency-free: state lives in the current process, is lost on
/// restart, and is not shared with other instances. Expired entries are
/// dropped lazily on read and swept opportunistically so abandoned
/// identifiers do not accumulate.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    last_purge: Mutex<Option<Instant>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sweep expired entries, at most once per `PURGE_INTERVAL`.
    fn maybe_purge(&self, now: Instant) {
        {
            let mut last_purge = self.last_purge.lock();
            match *last_purge {
                Some(last) if now.duration_since(last) < PURGE_INTERVAL => return,
                _ => *last_purge = Some(now),
            }
        }
        self.entries.retain(|_, entry| !entry.is_expired(now));
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        self.maybe_purge(now);

        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }

        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        self.maybe_purge(now);

        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );

        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64> {
        let now = Instant::now();
        self.maybe_purge(now);

        // The entry guard holds the shard lock, making the update atomic
        // with respect to concurrent increments of the same key.
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: "0".to_string(),
            expires_at: now + ttl,
        });

        let current = if entry.is_expired(now) {
            0
        } else {
            entry.value.parse::<u64>().unwrap_or(0)
        };
        let next = current.saturating_add(1);

        entry.value = next.to_string();
        entry.expires_at = now + ttl;

        Ok(next)
    }
}
