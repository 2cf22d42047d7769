//! Multi-tier adaptive cache for search results
//!
//! Two bounded in-memory tiers (L1 hot, L2 warm) with configurable eviction,
//! plus an optional cold tier behind [`ColdStore`]. Entries move between the
//! tiers based on how often they are read.

mod cold;
mod error;
mod keys;
mod models;
mod service;
mod tier;

pub use cold::{ColdStore, InMemoryColdStore};
pub use error::{CacheError, CacheResult};
pub use keys::{
    expansion_cache_key, glob_to_regex, query_cache_key, EXPANSION_KEY_PREFIX, SEARCH_KEY_PREFIX,
};
pub use models::{
    CacheConfig, CacheEntry, CacheEvent, CacheStats, CacheTier, EvictionStrategy, TierConfig,
};
pub use service::SearchCache;
