//! Resource snapshot cache using moka
//!
//! Stores the last good value per resource key so that views can render
//! immediately while a revalidation is in flight.

use dashmap::DashMap;
use moka::sync::Cache;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Default time-to-live for cached snapshots
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Statistics for cache monitoring
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Approximate number of entries in cache
    pub entry_count: u64,
    /// Number of keys with request sequence tracking
    pub tracked_keys: usize,
}

/// One cached snapshot
#[derive(Clone)]
pub struct CacheEntry {
    /// Resource key
    pub key: Arc<str>,
    /// Opaque value
    pub data: Arc<dyn Any + Send + Sync>,
    /// When the value was stored
    pub stored_at: Instant,
}

impl CacheEntry {
    /// Age of the entry
    #[inline]
    #[must_use]
    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }

    /// Downcast the opaque value
    #[inline]
    #[must_use]
    pub fn value<T: Clone + 'static>(&self) -> Option<T> {
        self.data.downcast_ref::<T>().cloned()
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("stored_at", &self.stored_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct KeySequence {
    issued: u64,
    accepted: u64,
}

/// Keyed resource snapshot store
///
/// - Entries older than the TTL read as absent (lazy expiry, checked on read)
/// - `invalidate` removes entries by key substring
/// - Per-key request sequences let concurrent fetchers discard stale
///   out-of-order resolutions
///
/// Stores are unbounded unless built with a capacity. A bounded store may
/// evict live entries, which then read as absent before their TTL.
///
/// Cloning is cheap; clones share the same underlying store.
#[derive(Debug, Clone)]
pub struct CacheStore {
    inner: Cache<String, CacheEntry>,
    sequences: Arc<DashMap<String, KeySequence>>,
    ttl: Duration,
}

impl CacheStore {
    /// Create store with TTL and an optional max capacity
    #[must_use]
    pub fn new(ttl: Duration, max_capacity: Option<u64>) -> Self {
        let mut builder = Cache::builder().time_to_live(ttl);
        if let Some(capacity) = max_capacity {
            builder = builder.max_capacity(capacity);
        }
        Self {
            inner: builder.build(),
            sequences: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Create unbounded store with TTL
    #[inline]
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::new(ttl, None)
    }

    /// Configured time-to-live
    #[inline]
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get the raw entry, absent if missing or expired
    #[must_use]
    pub fn get_entry(&self, key: &str) -> Option<CacheEntry> {
        let entry = self.inner.get(key)?;
        if entry.age() >= self.ttl {
            tracing::trace!(key, "cache entry expired");
            return None;
        }
        Some(entry)
    }

    /// Get a typed value, absent if missing, expired or of another type
    #[inline]
    #[must_use]
    pub fn get<T: Clone + Send + Sync + 'static>(&self, key: &str) -> Option<T> {
        self.get_entry(key).and_then(|entry| entry.value::<T>())
    }

    /// Check if a live entry exists for key
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get_entry(key).is_some()
    }

    /// Store a value, overwriting any previous entry and resetting its age
    pub fn set<T: Send + Sync + 'static>(&self, key: &str, value: T) {
        let entry = CacheEntry {
            key: Arc::from(key),
            data: Arc::new(value),
            stored_at: Instant::now(),
        };
        self.inner.insert(key.to_string(), entry);
    }

    /// Remove every entry whose key contains `pattern`, or all entries
    ///
    /// Returns the number of entries removed. Removal is visible to the
    /// next read as soon as this returns.
    pub fn invalidate(&self, pattern: Option<&str>) -> usize {
        // Per-key removal keeps entries written right after this call visible
        let matching: Vec<Arc<String>> = self
            .inner
            .iter()
            .map(|(key, _)| key)
            .filter(|key| pattern.map_or(true, |p| key.contains(p)))
            .collect();

        for key in &matching {
            self.inner.invalidate(key.as_str());
        }

        tracing::debug!(?pattern, count = matching.len(), "invalidated cache entries");
        matching.len()
    }

    /// Issue the next request sequence number for key
    pub fn begin_request(&self, key: &str) -> u64 {
        let mut seq = self.sequences.entry(key.to_string()).or_default();
        seq.issued += 1;
        seq.issued
    }

    /// Store `value` if `seq` is not older than the accepted resolution
    ///
    /// Returns `false` (and leaves the cache untouched) when a more recent
    /// request for the same key has already been accepted.
    pub fn commit<T: Send + Sync + 'static>(&self, key: &str, seq: u64, value: T) -> bool {
        let mut tracked = self.sequences.entry(key.to_string()).or_default();
        if seq < tracked.accepted {
            tracing::debug!(key, seq, accepted = tracked.accepted, "discarding stale resolution");
            return false;
        }
        tracked.accepted = seq;
        tracked.issued = tracked.issued.max(seq);
        // Written while the sequence guard is held so commits for one key serialize
        self.set(key, value);
        true
    }

    /// Accept a resolution with `seq` without writing a value
    ///
    /// Used for failed resolutions: older requests resolving later are then
    /// discarded by `commit`. Returns `false` when a more recent request has
    /// already been accepted.
    pub fn accept(&self, key: &str, seq: u64) -> bool {
        let mut tracked = self.sequences.entry(key.to_string()).or_default();
        if seq < tracked.accepted {
            tracing::debug!(key, seq, accepted = tracked.accepted, "discarding stale resolution");
            return false;
        }
        tracked.accepted = seq;
        tracked.issued = tracked.issued.max(seq);
        true
    }

    /// Most recently accepted request sequence for key (0 if none)
    #[inline]
    #[must_use]
    pub fn accepted_sequence(&self, key: &str) -> u64 {
        self.sequences.get(key).map_or(0, |seq| seq.accepted)
    }

    /// Check if a resolution with `seq` would still be accepted
    #[inline]
    #[must_use]
    pub fn is_current(&self, key: &str, seq: u64) -> bool {
        seq >= self.accepted_sequence(key)
    }

    /// Get cache statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.inner.entry_count(),
            tracked_keys: self.sequences.len(),
        }
    }
}

impl Default for CacheStore {
    /// Create unbounded store with default TTL (30s)
    fn default() -> Self {
        Self::new(DEFAULT_TTL, None)
    }
}
