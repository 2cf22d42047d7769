//! Caller-facing request and response types

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use validator::Validate;

use crate::cache::CacheStats;
use crate::query::ParseWarning;
use crate::ranking::{RankingProfile, SearchResult};

/// Largest page a caller may request
pub const MAX_LIMIT: u64 = 1000;

/// Result ordering applied after ranking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SortOrder {
    #[default]
    Relevance,
    Usage,
    Recent,
    SuccessRate,
}

/// Options of a single search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SearchOptions {
    #[validate(range(min = 1, max = 1000))]
    pub limit: u64,

    pub offset: u64,

    /// Only entries in this category
    pub category: Option<String>,

    /// Only entries carrying every one of these tags
    pub tags: Vec<String>,

    pub sort: SortOrder,

    /// Treat every positive term as fuzzy
    pub fuzzy: bool,

    /// Skip automatic profile selection
    pub profile: Option<RankingProfile>,

    pub include_explanation: bool,

    pub include_highlights: bool,

    /// Read and write the full-query cache
    pub use_cache: bool,

    /// Tracking only; never affects results or cache keys
    pub session_id: Option<String>,

    /// Tracking only; never affects results or cache keys
    pub user_id: Option<String>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            offset: 0,
            category: None,
            tags: Vec::new(),
            sort: SortOrder::Relevance,
            fuzzy: false,
            profile: None,
            include_explanation: true,
            include_highlights: true,
            use_cache: true,
            session_id: None,
            user_id: None,
        }
    }
}

impl SearchOptions {
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_tags(mut self, tags: Vec<impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_fuzzy(mut self, fuzzy: bool) -> Self {
        self.fuzzy = fuzzy;
        self
    }

    pub fn with_profile(mut self, profile: RankingProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// The options that change the result, normalized for hashing
    pub fn cache_key_options(&self) -> CacheKeyOptions {
        let mut tags: Vec<String> = self.tags.iter().map(|t| t.trim().to_lowercase()).collect();
        tags.sort();
        tags.dedup();

        CacheKeyOptions {
            limit: self.limit,
            offset: self.offset,
            category: self.category.as_ref().map(|c| c.trim().to_lowercase()),
            tags,
            sort: self.sort,
            fuzzy: self.fuzzy,
            profile: self.profile,
            include_explanation: self.include_explanation,
            include_highlights: self.include_highlights,
        }
    }
}

/// Result-affecting subset of [`SearchOptions`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheKeyOptions {
    pub limit: u64,
    pub offset: u64,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub sort: SortOrder,
    pub fuzzy: bool,
    pub profile: Option<RankingProfile>,
    pub include_explanation: bool,
    pub include_highlights: bool,
}

/// One page of search results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,

    /// Matches before pagination
    pub total_hits: usize,

    pub query: String,

    pub profile: RankingProfile,

    pub processing_time_ms: u64,

    pub from_cache: bool,

    pub offset: u64,

    pub limit: u64,

    pub warnings: Vec<ParseWarning>,
}

/// Service-wide numbers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchStatistics {
    /// Indexed documents
    pub index_size: usize,
    pub vocabulary_size: usize,
    /// Entries across all cache tiers
    pub cache_size: usize,
    pub total_queries: u64,
    pub average_query_time_ms: f64,
    pub cache: CacheStats,
}
