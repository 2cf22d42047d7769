//! Search service configuration

use serde::{Deserialize, Serialize};

/// Search service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Cache full responses under `search:` keys
    pub cache_enabled: bool,

    /// Lifetime of a cached response in seconds
    pub cache_ttl_secs: u64,

    /// Maximum suggestions returned by `suggest`
    pub suggestion_limit: usize,

    /// Run the cache expiry sweep in the background
    pub background_sweep: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl_secs: 300,
            suggestion_limit: 10,
            background_sweep: true,
        }
    }
}

impl SearchConfig {
    pub fn cache_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Builder for SearchConfig
#[derive(Debug, Default)]
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.config.cache_enabled = enabled;
        self
    }

    pub fn cache_ttl_secs(mut self, secs: u64) -> Self {
        self.config.cache_ttl_secs = secs;
        self
    }

    pub fn suggestion_limit(mut self, limit: usize) -> Self {
        self.config.suggestion_limit = limit;
        self
    }

    pub fn background_sweep(mut self, enabled: bool) -> Self {
        self.config.background_sweep = enabled;
        self
    }

    pub fn build(self) -> SearchConfig {
        self.config
    }
}
