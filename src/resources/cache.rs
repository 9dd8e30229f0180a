use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    time::Duration,
};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::ResourceContent;

pub const DEFAULT_MAX_ENTRIES: usize = 1_000;
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct CacheEntry {
    content: Arc<ResourceContent>,
    created: Instant,
    ttl: Duration,
    accesses: AtomicU64,
    sequence: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created) >= self.ttl
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub total_accesses: u64,
    pub average_accesses: f64,
    pub default_ttl_secs: u64,
}

/// Bounded URI-keyed store with per-entry TTL.
///
/// Expired entries are invisible to `get` and removed by it; [`ResourceCache::sweep_expired`]
/// removes the ones nobody asks for again. When full, inserting a new key evicts the
/// entry inserted earliest, preferring the least accessed among equally old entries.
pub struct ResourceCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    max_entries: usize,
    default_ttl: Duration,
    next_sequence: AtomicU64,
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_TTL)
    }
}

impl ResourceCache {
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
            default_ttl,
            next_sequence: AtomicU64::new(0),
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn get(&self, uri: &str) -> Option<Arc<ResourceContent>> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            let entry = entries.get(uri)?;
            if !entry.is_expired(now) {
                let accesses = entry.accesses.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(uri, accesses, "resource cache hit");
                return Some(Arc::clone(&entry.content));
            }
        }

        let mut entries = self.entries.write();
        if entries.get(uri).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(uri);
            debug!(uri, "dropped expired cache entry");
        }
        None
    }

    pub fn set(&self, uri: &str, content: Arc<ResourceContent>, ttl: Duration) {
        let entry = CacheEntry {
            content,
            created: Instant::now(),
            ttl,
            accesses: AtomicU64::new(0),
            sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
        };

        let mut entries = self.entries.write();
        if !entries.contains_key(uri) && entries.len() >= self.max_entries {
            if let Some(victim) = eviction_candidate(&entries) {
                entries.remove(&victim);
                debug!(uri = %victim, "evicted resource from cache");
            }
        }
        entries.insert(uri.to_string(), entry);
        debug!(uri, cache_size = entries.len(), ttl_secs = ttl.as_secs(), "cached resource");
    }

    /// Removes every expired entry and returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));

        let removed = before - entries.len();
        if removed > 0 {
            debug!(expired_count = removed, cache_size = entries.len(), "swept expired cache entries");
        }
        removed
    }

    /// Sweeps every `period` until `stop` fires or the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration, stop: CancellationToken) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(cache) = cache.upgrade() else { break };
                        cache.sweep_expired();
                    }
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read();
        let total_accesses: u64 = entries
            .values()
            .map(|entry| entry.accesses.load(Ordering::Relaxed))
            .sum();
        let average_accesses = if entries.is_empty() {
            0.0
        } else {
            total_accesses as f64 / entries.len() as f64
        };

        CacheStats {
            entries: entries.len(),
            max_entries: self.max_entries,
            total_accesses,
            average_accesses,
            default_ttl_secs: self.default_ttl.as_secs(),
        }
    }
}

fn eviction_candidate(entries: &HashMap<String, CacheEntry>) -> Option<String> {
    entries
        .iter()
        .min_by_key(|(_, entry)| {
            (
                entry.created,
                entry.accesses.load(Ordering::Relaxed),
                entry.sequence,
            )
        })
        .map(|(uri, _)| uri.clone())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn content(uri: &str) -> Arc<ResourceContent> {
        Arc::new(ResourceContent::json(uri, "test", json!({ "uri": uri })))
    }

    #[tokio::test(start_paused = true)]
    async fn entry_is_visible_until_ttl_then_removed() {
        let cache = ResourceCache::new(10, Duration::from_secs(60));
        cache.set("/widget/1", content("/widget/1"), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(9)).await;
        let hit = cache.get("/widget/1").expect("entry still fresh");
        assert_eq!(hit.uri, "/widget/1");

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(cache.len(), 1);
        assert!(cache.get("/widget/1").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn inserting_past_capacity_evicts_exactly_one() {
        let cache = ResourceCache::new(3, DEFAULT_TTL);
        for index in 0..4 {
            let uri = format!("/widget/{index}");
            cache.set(&uri, content(&uri), DEFAULT_TTL);
            tokio::time::advance(Duration::from_millis(1)).await;
        }

        assert_eq!(cache.len(), 3);
        assert!(cache.get("/widget/3").is_some());
        assert!(cache.get("/widget/0").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn oldest_insert_is_evicted_even_if_accessed() {
        let cache = ResourceCache::new(2, DEFAULT_TTL);
        cache.set("/old", content("/old"), DEFAULT_TTL);
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.set("/new", content("/new"), DEFAULT_TTL);
        for _ in 0..5 {
            cache.get("/old");
        }

        cache.set("/newest", content("/newest"), DEFAULT_TTL);
        assert!(cache.get("/old").is_none());
        assert!(cache.get("/new").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn equal_age_ties_break_on_fewest_accesses() {
        let cache = ResourceCache::new(3, DEFAULT_TTL);
        for uri in ["/a", "/b", "/c"] {
            cache.set(uri, content(uri), DEFAULT_TTL);
        }
        cache.get("/a");
        cache.get("/b");
        cache.get("/b");

        cache.set("/d", content("/d"), DEFAULT_TTL);
        assert!(cache.get("/c").is_none());
        assert!(cache.get("/a").is_some());
        assert!(cache.get("/b").is_some());
        assert!(cache.get("/d").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn overwriting_existing_key_at_capacity_keeps_others() {
        let cache = ResourceCache::new(2, DEFAULT_TTL);
        cache.set("/a", content("/a"), DEFAULT_TTL);
        cache.set("/b", content("/b"), DEFAULT_TTL);

        cache.set("/a", content("/a"), DEFAULT_TTL);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("/b").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_expired_entries() {
        let cache = ResourceCache::new(10, DEFAULT_TTL);
        cache.set("/short", content("/short"), Duration::from_secs(5));
        cache.set("/long", content("/long"), Duration::from_secs(500));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("/long").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn background_sweeper_runs_periodically() {
        let cache = Arc::new(ResourceCache::new(10, DEFAULT_TTL));
        let stop = CancellationToken::new();
        let sweeper = cache.spawn_sweeper(DEFAULT_SWEEP_INTERVAL, stop.clone());
        cache.set("/short", content("/short"), Duration::from_secs(5));

        tokio::time::sleep(DEFAULT_SWEEP_INTERVAL + Duration::from_secs(1)).await;
        assert!(cache.is_empty());

        stop.cancel();
        sweeper.await.expect("sweeper exits cleanly");
    }

    #[tokio::test]
    async fn stats_summarise_accesses() {
        let cache = ResourceCache::new(10, Duration::from_secs(120));
        assert_eq!(cache.stats().average_accesses, 0.0);

        cache.set("/a", content("/a"), DEFAULT_TTL);
        cache.set("/b", content("/b"), DEFAULT_TTL);
        cache.get("/a");
        cache.get("/a");
        cache.get("/a");
        cache.get("/b");

        let stats = cache.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.max_entries, 10);
        assert_eq!(stats.total_accesses, 4);
        assert_eq!(stats.average_accesses, 2.0);
        assert_eq!(stats.default_ttl_secs, 120);

        let serialized = serde_json::to_value(&stats).expect("stats serialize");
        assert_eq!(serialized["maxEntries"], 10);
        assert_eq!(serialized["totalAccesses"], 4);
        assert_eq!(serialized["defaultTtlSecs"], 120);
        assert!(serialized.get("max_entries").is_none());
    }
}
