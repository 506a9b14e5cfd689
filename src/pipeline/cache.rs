//! In-memory TTL cache of per-source results.
//!
//! Entries are never deleted: once older than the TTL they are ignored by
//! `get` and overwritten by the next successful acquisition.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::models::Record;

/// Default freshness window (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// A cached result set with the moment it was stored.
#[derive(Debug, Clone)]
struct CacheEntry {
    records: Arc<Vec<Record>>,
    fetched_at: Instant,
    fetched_at_utc: DateTime<Utc>,
}

impl CacheEntry {
    fn new(records: Arc<Vec<Record>>) -> Self {
        Self {
            records,
            fetched_at: Instant::now(),
            fetched_at_utc: Utc::now(),
        }
    }

    fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.age() < ttl
    }
}

/// Counters reported on the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub keys: usize,
    pub fresh: usize,
}

/// Source id → most recent successful result.
///
/// Sharded, so reads and writes for different sources don't contend. Writes
/// to the same source are last-write-wins.
#[derive(Debug)]
pub struct TtlCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl TtlCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Fresh records for `source_id`, or `None` on a miss.
    pub fn get(&self, source_id: &str) -> Option<Arc<Vec<Record>>> {
        let fresh = self
            .entries
            .get(source_id)
            .filter(|entry| entry.is_fresh(self.ttl))
            .map(|entry| entry.records.clone());

        match fresh {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        fresh
    }

    /// Store records for `source_id`, replacing any previous entry.
    pub fn set(&self, source_id: &str, records: Arc<Vec<Record>>) {
        self.entries
            .insert(source_id.to_string(), CacheEntry::new(records));
    }

    /// When each entry, fresh or stale, was stored.
    pub fn fetched_at(&self) -> BTreeMap<String, DateTime<Utc>> {
        self.entries
            .iter()
            .map(|e| (e.key().clone(), e.fetched_at_utc))
            .collect()
    }

    #[cfg(test)]
    fn peek(&self, source_id: &str) -> Option<CacheEntry> {
        self.entries.get(source_id).map(|e| e.clone())
    }

    /// Ids with an entry, fresh or stale, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            keys: self.entries.len(),
            fresh: self
                .entries
                .iter()
                .filter(|e| e.is_fresh(self.ttl))
                .count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(titles: &[&str]) -> Arc<Vec<Record>> {
        Arc::new(titles.iter().map(|t| Record::titled(*t)).collect())
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_within_ttl_miss_after() {
        let cache = TtlCache::new(Duration::from_secs(300));
        cache.set("nikora", records(&["milk"]));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(cache.get("nikora").unwrap().len(), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("nikora").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_retained_and_overwritten() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("libre", records(&["old"]));
        tokio::time::advance(Duration::from_secs(120)).await;

        assert!(cache.get("libre").is_none());
        assert_eq!(cache.keys(), vec!["libre"]);
        assert!(cache.peek("libre").unwrap().age() >= Duration::from_secs(120));

        cache.set("libre", records(&["new", "newer"]));
        let fresh = cache.get("libre").unwrap();
        assert_eq!(fresh[0].title.as_deref(), Some("new"));
        assert_eq!(fresh.len(), 2);
    }

    #[tokio::test]
    async fn test_fetched_at_per_key() {
        let cache = TtlCache::default();
        let before = Utc::now();
        cache.set("nikora", records(&["milk"]));
        cache.set("libre", records(&["bread"]));

        let fetched = cache.fetched_at();
        assert_eq!(fetched.keys().collect::<Vec<_>>(), vec!["libre", "nikora"]);
        assert!(fetched["nikora"] >= before);
    }

    #[tokio::test]
    async fn test_missing_key_is_miss() {
        let cache = TtlCache::default();
        assert!(cache.get("unknown").is_none());
        assert_eq!(cache.ttl(), DEFAULT_TTL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_count_hits_misses_and_freshness() {
        let cache = TtlCache::new(Duration::from_secs(10));
        cache.set("a", records(&["x"]));
        tokio::time::advance(Duration::from_secs(11)).await;
        cache.set("b", records(&["y"]));

        cache.get("a");
        cache.get("b");
        cache.get("c");

        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 2,
                keys: 2,
                fresh: 1
            }
        );
    }

    #[tokio::test]
    async fn test_concurrent_sets_last_write_wins() {
        let cache = Arc::new(TtlCache::default());
        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let title = format!("r{}", i);
                cache.set("shared", records(&[title.as_str()]));
                cache.set(&format!("own-{}", i), records(&[title.as_str()]));
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(cache.get("shared").unwrap().len(), 1);
        assert_eq!(cache.keys().len(), 17);
    }
}
