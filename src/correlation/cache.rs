//! Time-bounded cache of pending exchanges.
//!
//! # Responsibilities
//! - Hold a pending exchange between the REQUEST and RESPONSE workflows
//! - Hand each entry out at most once (`take` is lookup + remove)
//! - Expire unclaimed entries after their TTL so orphans cannot pile up
//!
//! # Design Decisions
//! - DashMap shards the key space; unrelated keys never contend on one lock
//! - Expired entries are never returned, even before the reaper runs
//! - A live key is never overwritten: the first exchange keeps it and the
//!   second store is refused
//! - A miss is a normal outcome: the responder may simply be early
//! - Owned instance created at component start, not a process-wide static

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::exchange::monitor::CompletionMonitor;
use crate::http::response::ResponseHandle;
use crate::observability::metrics;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("correlation key {0:?} already holds a pending exchange")]
    KeyInUse(String),
}

/// The ingress side of an exchange, parked until a responder claims it.
#[derive(Debug, Clone)]
pub struct PendingExchange {
    pub monitor: Arc<CompletionMonitor>,
    pub response: ResponseHandle,
}

#[derive(Debug)]
struct CacheEntry {
    exchange: PendingExchange,
    /// `None` when `now + ttl` overflows; such entries never expire.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Sharded key → pending-exchange map with per-entry expiry.
#[derive(Debug, Clone)]
pub struct CorrelationCache {
    entries: Arc<DashMap<String, CacheEntry>>,
    default_ttl: Duration,
}

impl CorrelationCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Store with the default TTL.
    pub fn store(&self, key: impl Into<String>, exchange: PendingExchange) -> Result<(), StoreError> {
        self.store_with_ttl(key, exchange, self.default_ttl)
    }

    /// Store with an explicit TTL.
    ///
    /// Fails with [`StoreError::KeyInUse`] while a live entry holds `key`; an
    /// expired entry is replaced.
    pub fn store_with_ttl(
        &self,
        key: impl Into<String>,
        exchange: PendingExchange,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let key = key.into();
        let now = Instant::now();
        let entry = CacheEntry {
            exchange,
            expires_at: now.checked_add(ttl),
        };

        let result = match self.entries.entry(key.clone()) {
            Entry::Occupied(occupied) if !occupied.get().is_expired(now) => {
                Err(StoreError::KeyInUse(key.clone()))
            }
            Entry::Occupied(mut occupied) => {
                occupied.insert(entry);
                Ok(())
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                Ok(())
            }
        };

        match &result {
            Ok(()) => metrics::record_cache_op("store", "inserted"),
            Err(_) => {
                tracing::warn!(key = %key, "Correlation key reused while an exchange was still pending");
                metrics::record_cache_op("store", "rejected");
            }
        }
        metrics::record_cache_size(self.entries.len());
        result
    }

    /// Atomically remove and return the entry for `key`.
    ///
    /// Concurrent callers for the same key: at most one gets the exchange.
    /// Returns `None` for unknown and expired keys alike.
    pub fn take(&self, key: &str) -> Option<PendingExchange> {
        let result = match self.entries.remove(key) {
            Some((_, entry)) if entry.is_expired(Instant::now()) => {
                metrics::record_cache_op("take", "expired");
                None
            }
            Some((_, entry)) => {
                metrics::record_cache_op("take", "hit");
                Some(entry.exchange)
            }
            None => {
                metrics::record_cache_op("take", "miss");
                None
            }
        };
        metrics::record_cache_size(self.entries.len());
        result
    }

    /// Diagnostic only: racing with `take` makes the answer stale immediately.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(Instant::now()))
    }

    /// Diagnostic only: drop an entry without handing it out.
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        metrics::record_cache_size(self.entries.len());
        removed
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            tracing::debug!(purged, remaining = self.entries.len(), "Purged expired correlation entries");
        }
        metrics::record_cache_size(self.entries.len());
        purged
    }

    /// Drop everything; used when the owning component stops.
    pub fn clear(&self) {
        let dropped = self.entries.len();
        self.entries.clear();
        if dropped > 0 {
            tracing::info!(dropped, "Correlation cache cleared with exchanges still pending");
        }
        metrics::record_cache_size(0);
    }

    /// Periodically purge expired entries until shutdown.
    pub fn spawn_reaper(&self, interval: Duration, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        cache.purge_expired();
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Correlation reaper received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    fn pending() -> PendingExchange {
        PendingExchange {
            monitor: Arc::new(CompletionMonitor::new()),
            response: ResponseHandle::new(),
        }
    }

    #[test]
    fn test_store_then_take_once() {
        let cache = CorrelationCache::new(Duration::from_secs(60));
        let exchange = pending();
        let monitor = Arc::clone(&exchange.monitor);

        cache.store("abc", exchange).unwrap();
        assert!(cache.contains_key("abc"));

        let taken = cache.take("abc").unwrap();
        assert!(Arc::ptr_eq(&taken.monitor, &monitor));
        assert!(cache.take("abc").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_take_unknown_key_is_none() {
        let cache = CorrelationCache::new(Duration::from_secs(60));
        assert!(cache.take("nobody-stored-this").is_none());
    }

    #[test]
    fn test_expired_entry_is_not_returned() {
        let cache = CorrelationCache::new(Duration::from_secs(60));
        cache.store_with_ttl("abc", pending(), Duration::from_millis(20)).unwrap();
        thread::sleep(Duration::from_millis(40));
        assert!(!cache.contains_key("abc"));
        assert!(cache.take("abc").is_none());
        // take removed the expired entry as well.
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let cache = CorrelationCache::new(Duration::from_secs(60));
        cache.store_with_ttl("short", pending(), Duration::from_millis(10)).unwrap();
        cache.store("long", pending()).unwrap();
        thread::sleep(Duration::from_millis(30));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains_key("long"));
    }

    #[test]
    fn test_store_refuses_live_key_and_keeps_first_exchange() {
        let cache = CorrelationCache::new(Duration::from_secs(60));
        let first = pending();
        let monitor = Arc::clone(&first.monitor);
        cache.store("k", first).unwrap();

        assert_eq!(cache.store("k", pending()), Err(StoreError::KeyInUse("k".to_string())));
        assert_eq!(cache.len(), 1);
        assert!(Arc::ptr_eq(&cache.take("k").unwrap().monitor, &monitor));
    }

    #[test]
    fn test_store_reuses_expired_key() {
        let cache = CorrelationCache::new(Duration::from_secs(60));
        cache.store_with_ttl("k", pending(), Duration::from_millis(10)).unwrap();
        thread::sleep(Duration::from_millis(30));

        let second = pending();
        let monitor = Arc::clone(&second.monitor);
        cache.store("k", second).unwrap();
        assert!(Arc::ptr_eq(&cache.take("k").unwrap().monitor, &monitor));
    }

    #[test]
    fn test_huge_ttl_does_not_overflow() {
        let cache = CorrelationCache::new(Duration::MAX);
        cache.store("k", pending()).unwrap();
        assert!(cache.take("k").is_some());
    }

    #[test]
    fn test_concurrent_take_hands_out_once() {
        let cache = CorrelationCache::new(Duration::from_secs(60));
        cache.store("contended", pending()).unwrap();

        let threads = 16;
        let barrier = Arc::new(Barrier::new(threads));
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let cache = cache.clone();
                let barrier = Arc::clone(&barrier);
                let winners = Arc::clone(&winners);
                thread::spawn(move || {
                    barrier.wait();
                    if cache.take("contended").is_some() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = CorrelationCache::new(Duration::from_secs(60));
        cache.store("a", pending()).unwrap();
        cache.store("b", pending()).unwrap();
        assert!(cache.remove("a"));
        assert!(!cache.remove("a"));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_reaper_purges_and_stops_on_shutdown() {
        let cache = CorrelationCache::new(Duration::from_millis(10));
        cache.store("orphan", pending()).unwrap();

        let (tx, rx) = broadcast::channel(1);
        let reaper = cache.spawn_reaper(Duration::from_millis(20), rx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.is_empty());

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), reaper)
            .await
            .unwrap()
            .unwrap();
    }
}
