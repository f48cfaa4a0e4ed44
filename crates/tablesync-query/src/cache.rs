//! Page cache with TTL expiration and LRU eviction.
//!
//! Entries are keyed by the full query key (namespace plus serialized table
//! state), so two views of the same parameters always share a page. Each
//! entry remembers the request generation that produced it; a slower, older
//! response never overwrites a newer one.
//!
//! Hits, misses and evictions are emitted as `tracing::debug` events.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tablesync_core::FetchResult;
use tracing::debug;

/// Configuration for the page cache.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// How long a page stays usable (default: 5 minutes).
    pub ttl: Duration,
    /// Maximum number of pages kept (default: 64).
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_entries: 64,
        }
    }
}

struct CacheEntry<T> {
    page: Arc<FetchResult<T>>,
    generation: u64,
    inserted_at: Instant,
    /// Nanos since cache creation.
    last_accessed_nanos: AtomicU64,
}

impl<T> CacheEntry<T> {
    fn new(page: Arc<FetchResult<T>>, generation: u64, epoch: Instant) -> Self {
        let now = Instant::now();
        Self {
            page,
            generation,
            inserted_at: now,
            last_accessed_nanos: AtomicU64::new(nanos_since(epoch, now)),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() > ttl
    }

    fn touch(&self, epoch: Instant) {
        self.last_accessed_nanos
            .store(nanos_since(epoch, Instant::now()), Ordering::Relaxed);
    }
}

fn nanos_since(epoch: Instant, now: Instant) -> u64 {
    u64::try_from(now.duration_since(epoch).as_nanos()).unwrap_or(u64::MAX)
}

/// Counters since the cache was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Bounded page cache. Not internally synchronized; the orchestrator keeps
/// it behind its own lock.
pub struct QueryCache<T> {
    entries: HashMap<String, CacheEntry<T>>,
    config: CacheConfig,
    epoch: Instant,
    stats: CacheStats,
}

impl<T> QueryCache<T> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            config,
            epoch: Instant::now(),
            stats: CacheStats::default(),
        }
    }

    /// Look up a page. Expired entries are removed and count as misses.
    pub fn get(&mut self, key: &str) -> Option<Arc<FetchResult<T>>> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(self.config.ttl),
            None => {
                self.stats.misses += 1;
                debug!(
                    key,
                    cache_hits = self.stats.hits,
                    cache_misses = self.stats.misses,
                    "query cache miss"
                );
                return None;
            }
        };

        if expired {
            self.entries.remove(key);
            self.stats.misses += 1;
            debug!(
                key,
                cache_hits = self.stats.hits,
                cache_misses = self.stats.misses,
                "query cache miss (expired)"
            );
            return None;
        }

        let entry = self.entries.get(key)?;
        entry.touch(self.epoch);
        self.stats.hits += 1;
        debug!(
            key,
            cache_hits = self.stats.hits,
            cache_misses = self.stats.misses,
            "query cache hit"
        );
        Some(entry.page.clone())
    }

    /// Store a page produced by request `generation`.
    ///
    /// Returns false, leaving the cache untouched, when the existing entry
    /// came from a newer request.
    pub fn insert(&mut self, key: &str, page: Arc<FetchResult<T>>, generation: u64) -> bool {
        if let Some(existing) = self.entries.get(key) {
            if existing.generation > generation {
                debug!(
                    key,
                    generation,
                    cached_generation = existing.generation,
                    "older page not cached"
                );
                return false;
            }
            self.entries
                .insert(key.to_string(), CacheEntry::new(page, generation, self.epoch));
            return true;
        }

        if self.entries.len() >= self.config.max_entries {
            self.evict_lru();
        }
        self.entries
            .insert(key.to_string(), CacheEntry::new(page, generation, self.epoch));
        true
    }

    /// Drop every key starting with `prefix`, e.g. a table's namespace.
    pub fn invalidate_prefix(&mut self, prefix: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        before - self.entries.len()
    }

    fn evict_lru(&mut self) {
        let lru_key = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed_nanos.load(Ordering::Relaxed))
            .map(|(key, _)| key.clone());

        if let Some(key) = lru_key {
            self.entries.remove(&key);
            self.stats.evictions += 1;
            debug!(
                evicted_key = %key,
                cache_evictions = self.stats.evictions,
                "query cache LRU eviction"
            );
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
