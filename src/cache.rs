// In-memory TTL cache
// Thin wrapper over moka with a per-entry lifetime chosen at insert time

use moka::sync::Cache;
use moka::Expiry;
use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    ttl: Duration,
}

/// Every write restarts the clock with the TTL carried by the entry.
struct EntryTtl;

impl<K, V> Expiry<K, Entry<V>> for EntryTtl {
    fn expire_after_create(&self, _key: &K, entry: &Entry<V>, _created_at: Instant) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &K,
        entry: &Entry<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Key/value store where each entry expires `ttl` after its last write.
///
/// Expired entries are never returned by [`TtlCache::get`]; [`TtlCache::sweep`]
/// additionally purges them to bound memory. There is no size limit.
pub struct TtlCache<K, V> {
    name: &'static str,
    entries: Cache<K, Entry<V>>,
    closed: AtomicBool,
}

impl<K, V> TtlCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Cache::builder().name(name).expire_after(EntryTtl).build(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if self.is_closed() {
            return None;
        }
        self.entries.get(key).map(|entry| entry.value)
    }

    /// Insert or overwrite, resetting the expiration to now + `ttl`.
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        if self.is_closed() {
            log::debug!("Ignoring write to closed {} cache", self.name);
            return;
        }
        self.entries.insert(key, Entry { value, ttl });
    }

    /// Purge expired entries.
    ///
    /// Purging follows moka's timer wheel, so entries go roughly a second
    /// after they expire. `get` hides expired entries regardless.
    pub fn sweep(&self) {
        if self.is_closed() {
            return;
        }
        self.entries.run_pending_tasks();
        log::debug!("Swept {} cache, {} entries left", self.name, self.entries.entry_count());
    }

    /// Drop all entries and refuse further use. Safe to call more than once.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.entries.invalidate_all();
        self.entries.run_pending_tasks();
        log::debug!("Closed {} cache", self.name);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Entry count as of the last housekeeping run
    #[cfg(test)]
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }

    #[cfg(test)]
    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }
}
