use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::time::interval;
use tracing::debug;

use crate::clock::Clock;
use crate::config::CACHE_SWEEP_INTERVAL_SECS;

// ---------------------------------------------------------------------------
// CacheEntry
// ---------------------------------------------------------------------------

/// One stored upstream response. The TTL is fixed when the entry is written.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub stored_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl CacheEntry {
    pub fn new(
        status: u16,
        headers: Vec<(String, String)>,
        body: Bytes,
        stored_at: DateTime<Utc>,
        ttl_secs: u64,
    ) -> Self {
        Self { status, headers, body, stored_at, ttl_secs }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.stored_at + chrono::Duration::seconds(self.ttl_secs as i64)
    }

    #[inline]
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at()
    }
}

// ---------------------------------------------------------------------------
// ResponseCache
// ---------------------------------------------------------------------------

/// Request key → response store with per-entry TTL.
///
/// Reads never return an entry past its TTL: stale entries are dropped on the
/// read that discovers them, and a background sweep clears the rest. The map
/// is bounded; inserting into a full map purges expired entries first and then
/// evicts the oldest one.
pub struct ResponseCache {
    entries: DashMap<String, CacheEntry>,
    clock: Arc<dyn Clock>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new(clock: Arc<dyn Clock>, max_entries: usize) -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
            clock,
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Fresh entry for `key`, if any.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let now = self.clock.now();
        // Clone out so the shard guard is released before any removal below.
        let found = self.entries.get(key).map(|e| e.value().clone());

        match found {
            Some(entry) if entry.is_fresh(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry)
            }
            Some(_) => {
                self.entries.remove_if(key, |_, e| !e.is_fresh(now));
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key, "[CACHE] expired entry dropped on read");
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: String, entry: CacheEntry) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.purge_expired();
            if self.entries.len() >= self.max_entries {
                self.evict_oldest();
            }
        }
        self.entries.insert(key, entry);
    }

    #[cfg(test)]
    pub fn contains_fresh(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.entries.get(key).is_some_and(|e| e.is_fresh(now))
    }

    /// Drop every entry whose TTL has elapsed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_fresh(now));
        before.saturating_sub(self.entries.len())
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|e| e.value().stored_at)
            .map(|e| e.key().clone());
        if let Some(key) = oldest {
            debug!(key = %key, "[CACHE] evicting oldest entry (store full)");
            self.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

/// Background task: sweeps expired entries so idle keys do not linger.
pub async fn run_sweeper(cache: Arc<ResponseCache>) {
    let mut ticker = interval(Duration::from_secs(CACHE_SWEEP_INTERVAL_SECS));
    ticker.tick().await; // nothing to sweep at startup

    loop {
        ticker.tick().await;
        let removed = cache.purge_expired();
        if removed > 0 {
            debug!(removed, remaining = cache.len(), "[CACHE] sweep complete");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 15, 0, 0).unwrap()
    }

    fn entry(at: DateTime<Utc>, ttl: u64) -> CacheEntry {
        CacheEntry::new(200, vec![], Bytes::from_static(b"{}"), at, ttl)
    }

    #[test]
    fn entry_is_served_until_ttl_elapses() {
        let clock = ManualClock::at(start());
        let cache = ResponseCache::new(clock.clone(), 16);
        cache.insert("k".to_string(), entry(start(), 20));

        clock.advance(chrono::Duration::seconds(19));
        assert!(cache.get("k").is_some());

        clock.advance(chrono::Duration::seconds(1));
        assert!(cache.get("k").is_none(), "entry must not be served at stored_at + ttl");
        assert_eq!(cache.len(), 0, "expired entry dropped on read");
    }

    #[test]
    fn hit_and_miss_counters() {
        let clock = ManualClock::at(start());
        let cache = ResponseCache::new(clock, 16);
        assert!(cache.get("absent").is_none());
        cache.insert("k".to_string(), entry(start(), 60));
        assert!(cache.get("k").is_some());
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn full_store_purges_expired_before_evicting() {
        let clock = ManualClock::at(start());
        let cache = ResponseCache::new(clock.clone(), 2);
        cache.insert("short".to_string(), entry(start(), 10));
        cache.insert("long".to_string(), entry(start(), 300));

        clock.advance(chrono::Duration::seconds(30));
        cache.insert("new".to_string(), entry(clock.now(), 300));

        assert!(cache.contains_fresh("long"));
        assert!(cache.contains_fresh("new"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn full_store_evicts_oldest_when_nothing_expired() {
        let clock = ManualClock::at(start());
        let cache = ResponseCache::new(clock.clone(), 2);
        cache.insert("first".to_string(), entry(start(), 300));
        clock.advance(chrono::Duration::seconds(1));
        cache.insert("second".to_string(), entry(clock.now(), 300));
        clock.advance(chrono::Duration::seconds(1));
        cache.insert("third".to_string(), entry(clock.now(), 300));

        assert!(!cache.contains_fresh("first"));
        assert!(cache.contains_fresh("second"));
        assert!(cache.contains_fresh("third"));
    }

    #[test]
    fn purge_counts_removed_entries() {
        let clock = ManualClock::at(start());
        let cache = ResponseCache::new(clock.clone(), 16);
        cache.insert("a".to_string(), entry(start(), 10));
        cache.insert("b".to_string(), entry(start(), 10));
        cache.insert("c".to_string(), entry(start(), 100));
        clock.advance(chrono::Duration::seconds(50));
        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(cache.len(), 1);
    }
}
