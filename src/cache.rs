//! Time-to-live cache for resolved entities.
//!
//! A [`TtlCache`] is a map from keys to values that each carry an absolute
//! expiry. Reads recheck the expiry, so an expired entry is never returned,
//! and a background task per cache removes expired entries every `ttl`.
//!
//! There is no size bound and no LRU: eviction is purely time based.
//!
//! # Concurrency
//!
//! The map is guarded by a reader/writer lock: lookups share it, while
//! inserts and sweeps take it exclusively. The lock is never held across an
//! `.await`.
//!
//! Concurrent misses for the same key are not coalesced: each caller fetches
//! from upstream and the last write wins. All misses go through
//! [`TtlCache::get_or_try_insert_with`], which is where a single-flight
//! guard would go.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use soundgate::cache::TtlCache;
//!
//! let cache = TtlCache::new(Duration::from_secs(60));
//! cache.insert("artist".to_owned(), 42);
//! assert_eq!(cache.get("artist"), Some(42));
//! ```

use std::{
    borrow::Borrow,
    collections::HashMap,
    future::Future,
    hash::Hash,
    sync::{Arc, PoisonError, RwLock, Weak},
    time::Duration,
};

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};

/// A cached value and the moment it stops being valid.
#[derive(Clone, Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

type Entries<K, V> = RwLock<HashMap<K, Entry<V>>>;

/// Keyed cache with per-entry expiry and a background sweeper.
pub struct TtlCache<K, V> {
    entries: Arc<Entries<K, V>>,
    ttl: Duration,

    /// Stops the sweeper when the cache is dropped.
    _sweeper: DropGuard,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache whose entries live for `ttl`, and starts sweeping it
    /// every `ttl`.
    ///
    /// A zero `ttl` caches nothing and starts no sweeper.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        let entries = Arc::new(RwLock::new(HashMap::new()));
        let shutdown = CancellationToken::new();

        if !ttl.is_zero() {
            tokio::spawn(Self::sweep_periodically(
                Arc::downgrade(&entries),
                ttl,
                shutdown.clone(),
            ));
        }

        Self {
            entries,
            ttl,
            _sweeper: shutdown.drop_guard(),
        }
    }

    /// The time-to-live of entries inserted with [`TtlCache::insert`].
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a clone of the value for `key`, unless it is absent or has
    /// expired.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(Instant::now()))
            .map(|entry| entry.value.clone())
    }

    /// Inserts `value` for the cache-wide time-to-live, replacing any
    /// existing entry.
    pub fn insert(&self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.ttl);
    }

    /// Inserts `value` to expire after `ttl`, replacing any existing entry.
    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Entry { value, expires_at });
    }

    /// Removes the entry for `key`, returning its value if it had not expired.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .filter(|entry| !entry.is_expired(Instant::now()))
            .map(|entry| entry.value)
    }

    /// Returns the cached value for `key`, or fetches, caches and returns it.
    ///
    /// Nothing is cached when `fetch` fails.
    ///
    /// # Errors
    ///
    /// Returns the error of `fetch`.
    pub async fn get_or_try_insert_with<Q, F, Fut, E>(&self, key: &Q, fetch: F) -> Result<V, E>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = K> + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            trace!("cache hit");
            return Ok(value);
        }

        trace!("cache miss");
        let value = fetch().await?;
        self.insert(key.to_owned(), value.clone());
        Ok(value)
    }

    /// Removes all expired entries, returning how many were removed.
    pub fn sweep(&self) -> usize {
        sweep(&self.entries)
    }

    /// Number of stored entries, including expired ones that have not been
    /// swept yet.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn sweep_periodically(
        entries: Weak<Entries<K, V>>,
        period: Duration,
        shutdown: CancellationToken,
    ) {
        // The first tick of a plain `interval` completes immediately, which
        // would sweep an empty map.
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let Some(entries) = entries.upgrade() else {
                        break;
                    };

                    let removed = sweep(&entries);
                    if removed > 0 {
                        trace!("swept {removed} expired cache entries");
                    }
                }
            }
        }
    }
}

fn sweep<K, V>(entries: &Entries<K, V>) -> usize
where
    K: Eq + Hash,
{
    let now = Instant::now();
    let mut entries = entries.write().unwrap_or_else(PoisonError::into_inner);
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(now));
    before - entries.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_are_served_until_they_expire() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("artist".to_owned(), 1);

        time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("artist"), Some(1));

        time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.get("artist"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn reads_recheck_expiry_before_the_sweep() {
        let cache = TtlCache::new(Duration::from_secs(3600));
        cache.insert_with_ttl("artist".to_owned(), 1, Duration::from_secs(5));

        time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.get("artist"), None);
        // Still stored: the sweeper only runs every hour.
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn remove_returns_live_values_only() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("live".to_owned(), 1);
        cache.insert_with_ttl("stale".to_owned(), 2, Duration::from_secs(5));

        time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.remove("live"), Some(1));
        assert_eq!(cache.remove("live"), None);
        // Expired entries are dropped all the same.
        assert_eq!(cache.remove("stale"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_removes_expired_entries_within_one_period() {
        let cache = TtlCache::new(Duration::from_secs(10));
        cache.insert("a".to_owned(), 1);
        cache.insert("b".to_owned(), 2);
        assert_eq!(cache.len(), 2);

        // Sleeping lets the paused clock auto-advance and the sweeper run.
        time::sleep(Duration::from_secs(21)).await;
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_keeps_live_entries() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert_with_ttl("short".to_owned(), 1, Duration::from_secs(1));
        cache.insert("long".to_owned(), 2);

        time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.get("long"), Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn insert_overwrites_and_refreshes_expiry() {
        let cache = TtlCache::new(Duration::from_secs(10));
        cache.insert("artist".to_owned(), 1);
        time::advance(Duration::from_secs(8)).await;
        cache.insert("artist".to_owned(), 2);
        time::advance(Duration::from_secs(8)).await;

        assert_eq!(cache.get("artist"), Some(2));
    }

    #[tokio::test]
    async fn failed_fetch_caches_nothing() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(60));
        let result: Result<u32, &str> = cache
            .get_or_try_insert_with("artist", || async { Err("upstream down") })
            .await;

        assert_eq!(result, Err("upstream down"));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn fetch_runs_only_on_miss() {
        let cache: TtlCache<String, u32> = TtlCache::new(Duration::from_secs(60));
        let mut fetches = 0;

        for _ in 0..3 {
            let value: Result<u32, ()> = cache
                .get_or_try_insert_with("artist", || {
                    fetches += 1;
                    async { Ok(7) }
                })
                .await;
            assert_eq!(value, Ok(7));
        }

        assert_eq!(fetches, 1);
    }

    #[test]
    fn zero_ttl_needs_no_runtime_and_caches_nothing() {
        let cache = TtlCache::new(Duration::ZERO);
        cache.insert("artist".to_owned(), 1);
        assert_eq!(cache.get("artist"), None);
    }
}
