//! Response cache with per-entry expiry
//!
//! Entries are keyed by [`Fingerprint`]. Reads never evict; expired entries
//! are simply reported as absent until [`ResponseCache::evict_expired`] (or
//! the background sweeper) removes them.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::fingerprint::{Fingerprint, RequestKey};

/// Cached response for one fingerprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub response_text: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Tokens a hit on this entry saves (prompt + response)
    pub token_cost_saved: usize,
}

impl CacheEntry {
    pub fn new(
        response_text: impl Into<String>,
        token_cost_saved: usize,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            response_text: response_text.into(),
            created_at,
            // Saturate rather than overflow chrono's representable range
            expires_at: created_at
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            token_cost_saved,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Best near-duplicate candidate
#[derive(Debug, Clone, PartialEq)]
pub struct NearMatch {
    pub fingerprint: Fingerprint,
    pub entry: CacheEntry,
    pub similarity: f32,
}

#[derive(Debug, Clone)]
struct StoredEntry {
    key: RequestKey,
    entry: CacheEntry,
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub hits: u64,
    pub near_hits: u64,
    pub misses: u64,
    pub tokens_saved: u64,
}

/// Content-addressed response cache
pub struct ResponseCache {
    entries: DashMap<Fingerprint, StoredEntry>,
    ttl: Duration,
    max_entries: usize,
    /// Held across the capacity check, eviction and insert
    insert_lock: Mutex<()>,
    hits: AtomicU64,
    near_hits: AtomicU64,
    misses: AtomicU64,
    tokens_saved: AtomicU64,
}

impl ResponseCache {
    /// Create a new cache with entry TTL and max size
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
            insert_lock: Mutex::new(()),
            hits: AtomicU64::new(0),
            near_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            tokens_saved: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Exact lookup at the current time
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        self.lookup_at(fingerprint, Utc::now())
    }

    /// Exact lookup; expired entries read as absent
    pub fn lookup_at(&self, fingerprint: &Fingerprint, now: DateTime<Utc>) -> Option<CacheEntry> {
        let found = self
            .entries
            .get(fingerprint)
            .filter(|stored| !stored.entry.is_expired(now))
            .map(|stored| stored.entry.clone());

        match &found {
            Some(entry) => {
                self.hits.fetch_add(1, AtomicOrdering::Relaxed);
                self.tokens_saved
                    .fetch_add(entry.token_cost_saved as u64, AtomicOrdering::Relaxed);
            }
            None => {
                self.misses.fetch_add(1, AtomicOrdering::Relaxed);
            }
        }
        found
    }

    /// Insert or supersede the entry for `key`'s fingerprint
    pub fn store(&self, key: RequestKey, entry: CacheEntry) -> Fingerprint {
        let fingerprint = key.fingerprint();
        let _guard = self.insert_lock.lock();

        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&fingerprint) {
            self.evict_oldest();
        }

        debug!("Caching response for {}", fingerprint);
        self.entries
            .insert(fingerprint.clone(), StoredEntry { key, entry });
        fingerprint
    }

    /// Build an entry stamped now with the configured TTL and store it
    pub fn store_response(
        &self,
        key: RequestKey,
        response_text: impl Into<String>,
        token_cost_saved: usize,
    ) -> Fingerprint {
        let entry = CacheEntry::new(response_text, token_cost_saved, Utc::now(), self.ttl);
        self.store(key, entry)
    }

    /// Closest compatible entry by word-level similarity, at the current time
    pub fn near_duplicate_lookup(&self, key: &RequestKey, similarity_threshold: f32) -> Option<NearMatch> {
        self.near_duplicate_lookup_at(key, similarity_threshold, Utc::now())
    }

    /// Closest compatible entry whose similarity exceeds the threshold.
    ///
    /// Only entries for the same model and parameters are considered. Ties on
    /// similarity go to the most recently created entry, then to the lowest
    /// fingerprint.
    pub fn near_duplicate_lookup_at(
        &self,
        key: &RequestKey,
        similarity_threshold: f32,
        now: DateTime<Utc>,
    ) -> Option<NearMatch> {
        let mut best: Option<NearMatch> = None;

        for item in self.entries.iter() {
            let stored = item.value();
            if stored.entry.is_expired(now) || !stored.key.is_compatible(key) {
                continue;
            }
            let similarity = TextDiff::from_words(key.content.as_str(), stored.key.content.as_str()).ratio();
            if similarity <= similarity_threshold {
                continue;
            }
            let candidate = NearMatch {
                fingerprint: item.key().clone(),
                entry: stored.entry.clone(),
                similarity,
            };
            best = match best {
                Some(current) if prefer(&current, &candidate) != Ordering::Greater => Some(current),
                _ => Some(candidate),
            };
        }

        if let Some(found) = &best {
            self.near_hits.fetch_add(1, AtomicOrdering::Relaxed);
            self.tokens_saved
                .fetch_add(found.entry.token_cost_saved as u64, AtomicOrdering::Relaxed);
            debug!("Near-duplicate hit {} (similarity {:.3})", found.fingerprint, found.similarity);
        }
        best
    }

    /// Remove every entry with `expires_at <= now`; returns how many went
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, stored| !stored.entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!("Evicted {} expired cache entries", removed);
        }
        removed
    }

    /// Periodically evict expired entries until the cache is dropped
    pub fn spawn_sweeper(self: &Arc<Self>, interval: std::time::Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                cache.evict_expired(Utc::now());
            }
            info!("Cache sweeper stopped");
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let now = Utc::now();
        let total_entries = self.entries.len();
        let valid_entries = self
            .entries
            .iter()
            .filter(|item| !item.value().entry.is_expired(now))
            .count();

        CacheStats {
            total_entries,
            valid_entries,
            expired_entries: total_entries.saturating_sub(valid_entries),
            hits: self.hits.load(AtomicOrdering::Relaxed),
            near_hits: self.near_hits.load(AtomicOrdering::Relaxed),
            misses: self.misses.load(AtomicOrdering::Relaxed),
            tokens_saved: self.tokens_saved.load(AtomicOrdering::Relaxed),
        }
    }

    /// Evict the oldest entry
    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by(|a, b| {
                a.value()
                    .entry
                    .created_at
                    .cmp(&b.value().entry.created_at)
                    .then_with(|| a.key().cmp(b.key()))
            })
            .map(|item| item.key().clone());

        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

/// `Greater` when `candidate` should replace `current`
fn prefer(current: &NearMatch, candidate: &NearMatch) -> Ordering {
    candidate
        .similarity
        .total_cmp(&current.similarity)
        .then_with(|| candidate.entry.created_at.cmp(&current.entry.created_at))
        .then_with(|| current.fingerprint.cmp(&candidate.fingerprint))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::fingerprint::RequestParams;

    fn key(text: &str) -> RequestKey {
        RequestKey::new("gpt-4", text, RequestParams::default())
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_store_then_lookup_until_expiry() {
        let cache = ResponseCache::new(Duration::seconds(60), 100);
        let entry = CacheEntry::new("Rust is a systems language.", 120, t0(), Duration::seconds(60));
        let fp = cache.store(key("What is Rust?"), entry.clone());

        assert_eq!(cache.lookup_at(&fp, t0() + Duration::seconds(59)), Some(entry));
        assert_eq!(cache.lookup_at(&fp, t0() + Duration::seconds(60)), None);
        // lookup never evicts
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_newer_store_supersedes() {
        let cache = ResponseCache::new(Duration::seconds(60), 100);
        let fp = cache.store(key("q"), CacheEntry::new("first", 1, t0(), Duration::seconds(60)));
        cache.store(
            key("q"),
            CacheEntry::new("second", 1, t0() + Duration::seconds(1), Duration::seconds(60)),
        );

        let found = cache.lookup_at(&fp, t0() + Duration::seconds(2)).unwrap();
        assert_eq!(found.response_text, "second");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evict_expired_is_idempotent() {
        let cache = ResponseCache::new(Duration::seconds(60), 100);
        cache.store(key("a"), CacheEntry::new("a", 1, t0(), Duration::seconds(10)));
        cache.store(key("b"), CacheEntry::new("b", 1, t0(), Duration::seconds(100)));

        let later = t0() + Duration::seconds(10);
        assert_eq!(cache.evict_expired(later), 1);
        assert_eq!(cache.evict_expired(later), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = ResponseCache::new(Duration::seconds(600), 2);
        let first = cache.store(key("one"), CacheEntry::new("1", 1, t0(), Duration::seconds(600)));
        cache.store(
            key("two"),
            CacheEntry::new("2", 1, t0() + Duration::seconds(1), Duration::seconds(600)),
        );
        cache.store(
            key("three"),
            CacheEntry::new("3", 1, t0() + Duration::seconds(2), Duration::seconds(600)),
        );

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.lookup_at(&first, t0()), None);
    }

    #[test]
    fn test_near_duplicate_lookup() {
        let cache = ResponseCache::new(Duration::seconds(600), 100);
        cache.store(
            key("please explain how the rust borrow checker works in detail"),
            CacheEntry::new("answer", 50, t0(), Duration::seconds(600)),
        );

        let probe = key("please explain how the rust borrow checker works in depth");
        let found = cache.near_duplicate_lookup_at(&probe, 0.8, t0()).unwrap();
        assert_eq!(found.entry.response_text, "answer");
        assert!(found.similarity >= 0.8 && found.similarity < 1.0);

        let unrelated = key("what is the capital of france");
        assert!(cache.near_duplicate_lookup_at(&unrelated, 0.8, t0()).is_none());
    }

    #[test]
    fn test_near_duplicate_requires_similarity_above_threshold() {
        let cache = ResponseCache::new(Duration::seconds(600), 100);
        cache.store(key("alpha beta gamma delta"), CacheEntry::new("answer", 5, t0(), Duration::seconds(600)));

        let probe = key("alpha beta gamma epsilon");
        let similarity = TextDiff::from_words("alpha beta gamma epsilon", "alpha beta gamma delta").ratio();

        assert!(cache.near_duplicate_lookup_at(&probe, similarity, t0()).is_none());
        let found = cache.near_duplicate_lookup_at(&probe, similarity - 0.01, t0()).unwrap();
        assert_eq!(found.similarity, similarity);
    }

    #[test]
    fn test_expiry_saturates_instead_of_overflowing() {
        let entry = CacheEntry::new("a", 1, t0(), Duration::days(365 * 300_000));
        assert_eq!(entry.expires_at, DateTime::<Utc>::MAX_UTC);
        assert!(!entry.is_expired(t0()));
    }

    #[test]
    fn test_concurrent_stores_respect_capacity() {
        let cache = Arc::new(ResponseCache::new(Duration::seconds(600), 4));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        cache.store_response(key(&format!("thread {} request {}", t, i)), "r", 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(cache.len() <= 4);
    }

    #[test]
    fn test_near_duplicate_never_crosses_models() {
        let cache = ResponseCache::new(Duration::seconds(600), 100);
        cache.store(key("identical text"), CacheEntry::new("gpt-4 answer", 5, t0(), Duration::seconds(600)));

        let other_model = RequestKey::new("gpt-3.5-turbo", "identical text", RequestParams::default());
        assert!(cache.near_duplicate_lookup_at(&other_model, 0.5, t0()).is_none());
    }

    #[test]
    fn test_near_duplicate_tie_prefers_most_recent() {
        let cache = ResponseCache::new(Duration::seconds(600), 100);
        cache.store(key("alpha beta gamma x"), CacheEntry::new("older", 1, t0(), Duration::seconds(600)));
        cache.store(
            key("alpha beta gamma y"),
            CacheEntry::new("newer", 1, t0() + Duration::seconds(5), Duration::seconds(600)),
        );

        let probe = key("alpha beta gamma z");
        let found = cache
            .near_duplicate_lookup_at(&probe, 0.5, t0() + Duration::seconds(6))
            .unwrap();
        assert_eq!(found.entry.response_text, "newer");
    }

    #[test]
    fn test_stats_track_hits_and_misses() {
        let cache = ResponseCache::new(Duration::seconds(600), 100);
        let fp = cache.store(key("q"), CacheEntry::new("a", 40, t0(), Duration::seconds(600)));
        cache.lookup_at(&fp, t0());
        cache.lookup_at(&key("other").fingerprint(), t0());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.tokens_saved, 40);
        assert_eq!(stats.total_entries, 1);
    }

    #[tokio::test]
    async fn test_sweeper_removes_expired_entries() {
        let cache = Arc::new(ResponseCache::new(Duration::seconds(600), 100));
        cache.store(
            key("stale"),
            CacheEntry::new("old", 1, Utc::now() - Duration::seconds(10), Duration::seconds(1)),
        );

        let handle = cache.spawn_sweeper(std::time::Duration::from_millis(20));
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(cache.is_empty());
        handle.abort();
    }
}
