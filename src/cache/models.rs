use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use strum::{Display, EnumString};
use tokio::time::Instant;

/// A cached value with its bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub key: String,
    pub value: T,
    pub ttl: Duration,
    pub access_count: u64,
    pub last_accessed: Instant,
    pub created: Instant,
    /// Serialized size in bytes
    pub size: usize,
    pub metadata: Option<BTreeMap<String, String>>,
}

impl<T> CacheEntry<T> {
    pub fn new(key: impl Into<String>, value: T, ttl: Duration, size: usize, now: Instant) -> Self {
        Self {
            key: key.into(),
            value,
            ttl,
            access_count: 0,
            last_accessed: now,
            created: now,
            size,
            metadata: None,
        }
    }

    /// `now - created > ttl`
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created) > self.ttl
    }

    pub fn remaining_ttl(&self, now: Instant) -> Duration {
        self.ttl
            .saturating_sub(now.saturating_duration_since(self.created))
    }

    /// Record a read
    pub fn touch(&mut self, now: Instant) {
        self.access_count += 1;
        self.last_accessed = now;
    }

    /// Adaptive retention score; the lowest-scoring entry is evicted first
    ///
    /// `10*ln(1+access_count) + max(0, 100 - secs_since_access)
    ///  - sqrt(size_kb) + max(0, remaining_ttl_secs)`
    pub fn adaptive_score(&self, now: Instant) -> f64 {
        let frequency = 10.0 * (1.0 + self.access_count as f64).ln();
        let idle = now.saturating_duration_since(self.last_accessed).as_secs_f64();
        let recency = (100.0 - idle).max(0.0);
        let size_penalty = (self.size as f64 / 1024.0).sqrt();
        let remaining = self.remaining_ttl(now).as_secs_f64().max(0.0);
        frequency + recency - size_penalty + remaining
    }
}

/// How a full tier picks its victim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum EvictionStrategy {
    /// Least recently accessed
    Lru,
    /// Least frequently accessed
    Lfu,
    /// Closest to expiry
    Ttl,
    /// Largest payload
    Size,
    /// Lowest [`CacheEntry::adaptive_score`]
    Adaptive,
}

/// Cache layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CacheTier {
    L1,
    L2,
    Cold,
}

/// Settings for one in-memory tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    pub capacity: usize,
    pub ttl_secs: u64,
    pub strategy: EvictionStrategy,
}

impl TierConfig {
    pub fn hot() -> Self {
        Self {
            capacity: 100,
            ttl_secs: 300,
            strategy: EvictionStrategy::Lfu,
        }
    }

    pub fn warm() -> Self {
        Self {
            capacity: 1000,
            ttl_secs: 3600,
            strategy: EvictionStrategy::Lru,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Search cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub l1: TierConfig,
    pub l2: TierConfig,
    /// Write accessed L2 victims to the cold tier
    pub persistence_enabled: bool,
    pub sweep_interval_secs: u64,
    /// Largest payload admitted to L1
    pub max_l1_entry_bytes: usize,
    /// L2 hits needed before an entry moves to L1
    pub promotion_threshold: u64,
    pub event_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1: TierConfig::hot(),
            l2: TierConfig::warm(),
            persistence_enabled: false,
            sweep_interval_secs: 60,
            max_l1_entry_bytes: 10 * 1024,
            promotion_threshold: 5,
            event_capacity: 1024,
        }
    }
}

/// Structured notifications published on every cache state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CacheEvent {
    Hit { key: String, tier: CacheTier },
    Miss { key: String },
    Set { key: String, tier: CacheTier },
    Evicted { key: String, tier: CacheTier },
    Promoted { key: String },
    Demoted { key: String },
    Expired { key: String, tier: CacheTier },
    Deleted { key: String },
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub evictions: u64,
    pub expirations: u64,
    pub promotions: u64,
    pub demotions: u64,
    /// Bytes held in L1 and L2
    pub total_size: usize,
    pub l1_entries: usize,
    pub l2_entries: usize,
    pub cold_entries: usize,
    /// Rolling average over the most recent lookups
    pub average_access_micros: f64,
    /// Most accessed keys, highest first
    pub hot_keys: Vec<(String, u64)>,
}

impl CacheStats {
    pub fn entries(&self) -> usize {
        self.l1_entries + self.l2_entries + self.cold_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_is_strictly_after_ttl() {
        let now = Instant::now();
        let entry = CacheEntry::new("k", 1, Duration::from_secs(10), 8, now);
        assert!(!entry.is_expired(now + Duration::from_secs(10)));
        assert!(entry.is_expired(now + Duration::from_secs(11)));
        assert_eq!(entry.remaining_ttl(now + Duration::from_secs(4)), Duration::from_secs(6));
    }

    #[test]
    fn test_adaptive_score_prefers_frequent_entries() {
        let now = Instant::now();
        let cold = CacheEntry::new("a", (), Duration::from_secs(60), 1024, now);
        let mut hot = CacheEntry::new("b", (), Duration::from_secs(60), 1024, now);
        for _ in 0..10 {
            hot.touch(now);
        }
        assert!(hot.adaptive_score(now) > cold.adaptive_score(now));
    }

    #[test]
    fn test_adaptive_score_penalizes_size() {
        let now = Instant::now();
        let small = CacheEntry::new("a", (), Duration::from_secs(60), 1024, now);
        let large = CacheEntry::new("b", (), Duration::from_secs(60), 1024 * 1024, now);
        assert!(small.adaptive_score(now) > large.adaptive_score(now));
    }

    #[test]
    fn test_default_tiers() {
        let config = CacheConfig::default();
        assert_eq!(config.l1.capacity, 100);
        assert_eq!(config.l1.strategy, EvictionStrategy::Lfu);
        assert_eq!(config.l2.ttl(), Duration::from_secs(3600));
        assert_eq!(config.l2.strategy, EvictionStrategy::Lru);
    }
}
