use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::cache::CacheConfig;
use crate::error::{AppError, Result};
use crate::fuzzy::FuzzyOptions;
use crate::query::QueryConfig;
use crate::ranking::RankingConfig;
use crate::search::SearchConfig;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Search service configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Query parser configuration
    #[serde(default)]
    pub query: QueryConfig,

    /// Fuzzy matcher defaults
    #[serde(default)]
    pub fuzzy: FuzzyOptions,

    /// Ranking configuration
    #[serde(default)]
    pub ranking: RankingConfig,

    /// Cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/default.toml".to_string());
        Self::build(config::File::with_name(&config_path).required(false))
    }

    /// Load configuration with `path` as the override file; the file must exist
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::build(config::File::from(path.as_ref()).required(true))
    }

    fn build<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config: Config = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            // Override with config file
            .add_source(file)
            // Override with environment variables (prefix: KB_SEARCH)
            .add_source(
                config::Environment::with_prefix("KB_SEARCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the components cannot run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(AppError::Configuration(msg.to_string()));

        if self.cache.l1.capacity == 0 || self.cache.l2.capacity == 0 {
            return invalid("cache tier capacity must be at least 1");
        }
        if self.ranking.k1 < 0.0 {
            return invalid("ranking.k1 must not be negative");
        }
        if !(0.0..=1.0).contains(&self.ranking.b) {
            return invalid("ranking.b must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.fuzzy.min_similarity) {
            return invalid("fuzzy.min_similarity must be within [0, 1]");
        }
        if self.query.max_length == 0 {
            return invalid("query.max_length must be at least 1");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Service name
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            service_name: default_service_name(),
            prometheus_enabled: true,
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "incident-kb-search".to_string()
}

fn default_true() -> bool {
    true
}
