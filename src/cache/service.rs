//! Multi-tier cache facade
//!
//! L1 (hot) and L2 (warm) are in-memory tiers guarded by their own mutex;
//! the optional cold tier sits behind the [`ColdStore`] trait. A tier lock is
//! never held across an await point and two tier locks are never held at
//! the same time.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::cold::ColdStore;
use super::error::{CacheError, CacheResult};
use super::keys::{glob_to_regex, SEARCH_KEY_PREFIX};
use super::models::{CacheConfig, CacheEntry, CacheEvent, CacheStats, CacheTier};
use super::tier::{Lookup, StoredEntry, Tier};
use crate::metrics::{CACHE_ENTRIES, CACHE_OPERATIONS_TOTAL};

/// Lookups kept for the rolling latency average
const LATENCY_SAMPLES: usize = 1000;

/// Keys reported in [`CacheStats::hot_keys`]
const HOT_KEY_COUNT: usize = 10;

/// L2 accesses after which a re-`set` key is placed in L1
const L1_ADMISSION_ACCESSES: u64 = 2;

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    promotions: AtomicU64,
    demotions: AtomicU64,
}

struct CacheInner {
    config: CacheConfig,
    l1: Mutex<Tier>,
    l2: Mutex<Tier>,
    cold: Option<Arc<dyn ColdStore>>,
    counters: Counters,
    latencies: Mutex<VecDeque<u64>>,
    events: broadcast::Sender<CacheEvent>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for CacheInner {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}

/// Layered cache for search results and query expansions
///
/// Cheap to clone; clones share all tiers.
#[derive(Clone)]
pub struct SearchCache {
    inner: Arc<CacheInner>,
}

impl std::fmt::Debug for SearchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let l1_entries = self.inner.l1.lock().len();
        let l2_entries = self.inner.l2.lock().len();
        f.debug_struct("SearchCache")
            .field("l1_entries", &l1_entries)
            .field("l2_entries", &l2_entries)
            .field("cold", &self.inner.cold.is_some())
            .finish()
    }
}

impl SearchCache {
    /// Cache without a cold tier
    pub fn new(config: CacheConfig) -> Self {
        Self::build(config, None)
    }

    /// Cache backed by a cold tier, used when `persistence_enabled` is set
    pub fn with_cold_store(config: CacheConfig, cold: Arc<dyn ColdStore>) -> Self {
        Self::build(config, Some(cold))
    }

    fn build(config: CacheConfig, cold: Option<Arc<dyn ColdStore>>) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let inner = CacheInner {
            l1: Mutex::new(Tier::new(CacheTier::L1, &config.l1)),
            l2: Mutex::new(Tier::new(CacheTier::L2, &config.l2)),
            cold,
            counters: Counters::default(),
            latencies: Mutex::new(VecDeque::with_capacity(LATENCY_SAMPLES)),
            events,
            sweeper: Mutex::new(None),
            config,
        };

        info!(
            l1_capacity = inner.config.l1.capacity,
            l2_capacity = inner.config.l2.capacity,
            persistence = inner.config.persistence_enabled,
            "Search cache initialized"
        );
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Receive [`CacheEvent`]s published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    /// Typed read; a value that does not deserialize counts as a miss
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_value(key).await?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                let err = CacheError::from(e);
                warn!(key = %key, error = %err, "Cached value did not deserialize, treating as miss");
                None
            }
        }
    }

    /// Raw JSON read through L1, L2 and the cold tier
    pub async fn get_value(&self, key: &str) -> Option<Value> {
        let started = std::time::Instant::now();
        let value = self.lookup(key).await;
        self.record_latency(started.elapsed());
        value
    }

    async fn lookup(&self, key: &str) -> Option<Value> {
        let now = Instant::now();

        let l1 = self.inner.l1.lock().lookup(key, now);
        match l1 {
            Lookup::Hit { value, .. } => {
                self.record_hit(key, CacheTier::L1);
                return Some(value);
            }
            Lookup::Expired(entry) => self.record_expired(&entry.key, CacheTier::L1),
            Lookup::Miss => {}
        }

        let l2 = self.inner.l2.lock().lookup(key, now);
        match l2 {
            Lookup::Hit { value, access_count } => {
                self.record_hit(key, CacheTier::L2);
                if access_count > self.inner.config.promotion_threshold {
                    self.promote(key, now).await;
                }
                return Some(value);
            }
            Lookup::Expired(entry) => self.record_expired(&entry.key, CacheTier::L2),
            Lookup::Miss => {}
        }

        if let Some(cold) = self.cold_tier() {
            match cold.get(key).await {
                Ok(Some(value)) => {
                    self.record_hit(key, CacheTier::Cold);
                    let size = serialized_size(&value);
                    let ttl = self.inner.config.l2.ttl();
                    let entry = CacheEntry::new(key, value.clone(), ttl, size, now);
                    self.insert_l2(entry).await;
                    if let Err(e) = cold.delete(key).await {
                        warn!(key = %key, error = %e, "Cold tier delete after promotion failed");
                    }
                    return Some(value);
                }
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "Cold tier read failed, treating as miss"),
            }
        }

        self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
        CACHE_OPERATIONS_TOTAL.with_label_values(&["all", "miss"]).inc();
        self.publish(CacheEvent::Miss {
            key: key.to_string(),
        });
        None
    }

    /// Store a value; `ttl` defaults to the TTL of the receiving tier
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<()> {
        self.set_with_metadata(key, value, ttl, None).await
    }

    /// Store a value with caller metadata
    ///
    /// Payloads up to `max_l1_entry_bytes` go to L1 when the key was already
    /// hot in L2 or holds a full-query result; everything else goes to L2.
    pub async fn set_with_metadata<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        metadata: Option<BTreeMap<String, String>>,
    ) -> CacheResult<()> {
        let value = serde_json::to_value(value)?;
        let size = serialized_size(&value);
        let now = Instant::now();

        let l2_accesses = self.inner.l2.lock().access_count(key).unwrap_or(0);
        let hot = l2_accesses >= L1_ADMISSION_ACCESSES || key.starts_with(SEARCH_KEY_PREFIX);
        let tier = if size <= self.inner.config.max_l1_entry_bytes && hot {
            CacheTier::L1
        } else {
            CacheTier::L2
        };

        let ttl = ttl.unwrap_or_else(|| match tier {
            CacheTier::L1 => self.inner.config.l1.ttl(),
            _ => self.inner.config.l2.ttl(),
        });
        let mut entry = CacheEntry::new(key, value, ttl, size, now);
        entry.metadata = metadata;

        if tier == CacheTier::L1 {
            self.inner.l2.lock().remove(key);
            self.insert_l1(entry).await;
        } else {
            self.inner.l1.lock().remove(key);
            self.insert_l2(entry).await;
        }

        CACHE_OPERATIONS_TOTAL
            .with_label_values(&[&tier.to_string(), "set"])
            .inc();
        self.publish(CacheEvent::Set {
            key: key.to_string(),
            tier,
        });
        self.update_gauges();
        Ok(())
    }

    /// Read several keys; results are in key order
    pub async fn mget<T: DeserializeOwned>(&self, keys: &[&str]) -> Vec<Option<T>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await);
        }
        values
    }

    /// Store several values with a shared TTL
    pub async fn mset<T: Serialize>(&self, entries: &[(String, T)], ttl: Option<Duration>) -> CacheResult<()> {
        for (key, value) in entries {
            self.set(key, value, ttl).await?;
        }
        Ok(())
    }

    /// Remove a key from every tier
    pub async fn delete(&self, key: &str) -> bool {
        let from_l1 = self.inner.l1.lock().remove(key).is_some();
        let from_l2 = self.inner.l2.lock().remove(key).is_some();

        let mut from_cold = false;
        if let Some(cold) = self.cold_tier() {
            match cold.delete(key).await {
                Ok(removed) => from_cold = removed,
                Err(e) => warn!(key = %key, error = %e, "Cold tier delete failed"),
            }
        }

        let removed = from_l1 || from_l2 || from_cold;
        if removed {
            self.publish(CacheEvent::Deleted {
                key: key.to_string(),
            });
            self.update_gauges();
        }
        removed
    }

    /// Remove every key matching a glob; returns the number of keys removed
    pub async fn delete_pattern(&self, pattern: &str) -> CacheResult<usize> {
        let matching = self.keys(Some(pattern)).await?;
        let mut removed = 0;
        for key in &matching {
            if self.delete(key).await {
                removed += 1;
            }
        }
        debug!(pattern = %pattern, removed, "Deleted keys by pattern");
        Ok(removed)
    }

    /// Whether a live entry exists; does not count as an access
    pub async fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        if self.inner.l1.lock().contains_live(key, now) {
            return true;
        }
        if self.inner.l2.lock().contains_live(key, now) {
            return true;
        }
        match self.cold_tier() {
            Some(cold) => matches!(cold.get(key).await, Ok(Some(_))),
            None => false,
        }
    }

    /// Make an entry expire `ttl` from now
    pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        if self.inner.l1.lock().expire(key, ttl, now) {
            return true;
        }
        if self.inner.l2.lock().expire(key, ttl, now) {
            return true;
        }

        let Some(cold) = self.cold_tier() else {
            return false;
        };
        match cold.get(key).await {
            Ok(Some(value)) => cold.put(key, value, ttl).await.is_ok(),
            _ => false,
        }
    }

    /// Drop every entry in every tier
    pub async fn clear(&self) {
        let l1 = self.inner.l1.lock().clear();
        let l2 = self.inner.l2.lock().clear();
        if let Some(cold) = self.cold_tier() {
            if let Err(e) = cold.clear().await {
                warn!(error = %e, "Cold tier clear failed");
            }
        }
        self.update_gauges();
        info!(l1, l2, "Cache cleared");
    }

    /// Unexpired keys, optionally filtered by a glob, sorted
    pub async fn keys(&self, pattern: Option<&str>) -> CacheResult<Vec<String>> {
        let matcher = pattern.map(glob_to_regex).transpose()?;
        let now = Instant::now();
        let mut keys: BTreeSet<String> = BTreeSet::new();
        keys.extend(self.inner.l1.lock().live_keys(now));
        keys.extend(self.inner.l2.lock().live_keys(now));

        if let Some(cold) = self.cold_tier() {
            match cold.keys().await {
                Ok(cold_keys) => keys.extend(cold_keys),
                Err(e) => warn!(error = %e, "Cold tier key listing failed"),
            }
        }

        Ok(keys
            .into_iter()
            .filter(|key| matcher.as_ref().map_or(true, |re| re.is_match(key)))
            .collect())
    }

    /// Preload entries; returns how many were stored
    pub async fn warm_cache(&self, seed: Vec<(String, Value)>) -> usize {
        let mut stored = 0;
        for (key, value) in seed {
            match self.set(&key, &value, None).await {
                Ok(()) => stored += 1,
                Err(e) => warn!(key = %key, error = %e, "Skipping warm-up entry"),
            }
        }
        info!(stored, "Cache warmed");
        stored
    }

    /// Remove expired entries from L1 and L2
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut purged = 0;
        for tier in [&self.inner.l1, &self.inner.l2] {
            let (name, expired) = {
                let mut guard = tier.lock();
                (guard.name(), guard.purge_expired(now))
            };
            for entry in &expired {
                self.record_expired(&entry.key, name);
            }
            purged += expired.len();
        }

        if purged > 0 {
            debug!(purged, "Purged expired cache entries");
            self.update_gauges();
        }
        purged
    }

    /// Spawn the background expiry sweep
    ///
    /// The task holds only a weak reference and stops once the cache is
    /// dropped. Calling this again replaces the running sweep.
    pub fn start_sweeper(&self) {
        let interval = Duration::from_secs(self.inner.config.sweep_interval_secs.max(1));
        self.start_sweeper_every(interval);
    }

    /// Spawn the expiry sweep with an explicit period
    pub fn start_sweeper_every(&self, period: Duration) {
        let weak: Weak<CacheInner> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                SearchCache { inner }.purge_expired();
            }
            debug!("Cache sweeper stopped");
        });

        if let Some(previous) = self.inner.sweeper.lock().replace(handle) {
            previous.abort();
        }
    }

    pub fn stop_sweeper(&self) {
        if let Some(handle) = self.inner.sweeper.lock().take() {
            handle.abort();
        }
    }

    pub async fn get_stats(&self) -> CacheStats {
        let (l1_entries, l1_size, mut hot_keys) = {
            let l1 = self.inner.l1.lock();
            let hot: Vec<(String, u64)> = l1.entries().map(|e| (e.key.clone(), e.access_count)).collect();
            (l1.len(), l1.total_size(), hot)
        };
        let (l2_entries, l2_size) = {
            let l2 = self.inner.l2.lock();
            hot_keys.extend(l2.entries().map(|e| (e.key.clone(), e.access_count)));
            (l2.len(), l2.total_size())
        };

        let cold_entries = match self.cold_tier() {
            Some(cold) => cold.len().await.unwrap_or_else(|e| {
                warn!(error = %e, "Cold tier size unavailable");
                0
            }),
            None => 0,
        };

        hot_keys.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        hot_keys.truncate(HOT_KEY_COUNT);

        let hits = self.inner.counters.hits.load(Ordering::Relaxed);
        let misses = self.inner.counters.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        let average_access_micros = {
            let samples = self.inner.latencies.lock();
            if samples.is_empty() {
                0.0
            } else {
                samples.iter().sum::<u64>() as f64 / samples.len() as f64
            }
        };

        CacheStats {
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            evictions: self.inner.counters.evictions.load(Ordering::Relaxed),
            expirations: self.inner.counters.expirations.load(Ordering::Relaxed),
            promotions: self.inner.counters.promotions.load(Ordering::Relaxed),
            demotions: self.inner.counters.demotions.load(Ordering::Relaxed),
            total_size: l1_size + l2_size,
            l1_entries,
            l2_entries,
            cold_entries,
            average_access_micros,
            hot_keys,
        }
    }

    fn cold_tier(&self) -> Option<&Arc<dyn ColdStore>> {
        if self.inner.config.persistence_enabled {
            self.inner.cold.as_ref()
        } else {
            None
        }
    }

    async fn promote(&self, key: &str, now: Instant) {
        let entry = self.inner.l2.lock().remove(key);
        let Some(entry) = entry else {
            return;
        };

        self.inner.counters.promotions.fetch_add(1, Ordering::Relaxed);
        CACHE_OPERATIONS_TOTAL.with_label_values(&["l1", "promoted"]).inc();
        self.publish(CacheEvent::Promoted {
            key: key.to_string(),
        });
        debug!(key = %key, access_count = entry.access_count, "Promoted to L1");

        let victim = self.inner.l1.lock().insert(entry, now);
        self.handle_l1_victim(victim).await;
        self.update_gauges();
    }

    async fn insert_l1(&self, entry: StoredEntry) {
        let now = Instant::now();
        let victim = self.inner.l1.lock().insert(entry, now);
        self.handle_l1_victim(victim).await;
    }

    async fn insert_l2(&self, entry: StoredEntry) {
        let now = Instant::now();
        let victim = self.inner.l2.lock().insert(entry, now);
        self.handle_l2_victim(victim).await;
    }

    /// L1 victims read more than once move down to L2
    async fn handle_l1_victim(&self, victim: Option<StoredEntry>) {
        let Some(victim) = victim else {
            return;
        };
        self.record_eviction(&victim.key, CacheTier::L1);

        if victim.access_count > 1 {
            self.inner.counters.demotions.fetch_add(1, Ordering::Relaxed);
            CACHE_OPERATIONS_TOTAL.with_label_values(&["l2", "demoted"]).inc();
            self.publish(CacheEvent::Demoted {
                key: victim.key.clone(),
            });
            let now = Instant::now();
            let l2_victim = self.inner.l2.lock().insert(victim, now);
            self.handle_l2_victim(l2_victim).await;
        }
    }

    /// L2 victims that were ever read go to the cold tier
    async fn handle_l2_victim(&self, victim: Option<StoredEntry>) {
        let Some(victim) = victim else {
            return;
        };
        self.record_eviction(&victim.key, CacheTier::L2);

        if victim.access_count == 0 {
            return;
        }
        let Some(cold) = self.cold_tier() else {
            return;
        };

        let ttl = victim.remaining_ttl(Instant::now());
        if ttl.is_zero() {
            return;
        }
        match cold.put(&victim.key, victim.value, ttl).await {
            Ok(()) => debug!(key = %victim.key, "Moved L2 victim to cold tier"),
            Err(e) => warn!(key = %victim.key, error = %e, "Cold tier write failed, entry dropped"),
        }
    }

    fn record_hit(&self, key: &str, tier: CacheTier) {
        self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
        CACHE_OPERATIONS_TOTAL
            .with_label_values(&[&tier.to_string(), "hit"])
            .inc();
        self.publish(CacheEvent::Hit {
            key: key.to_string(),
            tier,
        });
    }

    fn record_eviction(&self, key: &str, tier: CacheTier) {
        self.inner.counters.evictions.fetch_add(1, Ordering::Relaxed);
        CACHE_OPERATIONS_TOTAL
            .with_label_values(&[&tier.to_string(), "evicted"])
            .inc();
        self.publish(CacheEvent::Evicted {
            key: key.to_string(),
            tier,
        });
    }

    fn record_expired(&self, key: &str, tier: CacheTier) {
        self.inner.counters.expirations.fetch_add(1, Ordering::Relaxed);
        CACHE_OPERATIONS_TOTAL
            .with_label_values(&[&tier.to_string(), "expired"])
            .inc();
        self.publish(CacheEvent::Expired {
            key: key.to_string(),
            tier,
        });
    }

    fn record_latency(&self, elapsed: Duration) {
        let mut samples = self.inner.latencies.lock();
        if samples.len() >= LATENCY_SAMPLES {
            samples.pop_front();
        }
        samples.push_back(elapsed.as_micros() as u64);
    }

    fn publish(&self, event: CacheEvent) {
        // No subscribers is not an error
        let _ = self.inner.events.send(event);
    }

    fn update_gauges(&self) {
        let l1 = self.inner.l1.lock().len();
        let l2 = self.inner.l2.lock().len();
        CACHE_ENTRIES.with_label_values(&["l1"]).set(l1 as f64);
        CACHE_ENTRIES.with_label_values(&["l2"]).set(l2 as f64);
    }
}

fn serialized_size(value: &Value) -> usize {
    serde_json::to_vec(value).map(|bytes| bytes.len()).unwrap_or(0)
}
