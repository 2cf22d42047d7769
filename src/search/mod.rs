//! Knowledge base search service
//!
//! Ties the query parser, the ranking engine and the multi-tier cache
//! together behind [`SearchService`]:
//!
//! ```text
//! query ──► QueryParser ──► ParsedQuery ──► RankingEngine ──► SearchResult
//!                                              │    ▲
//!                                              ▼    │
//!                                         KnowledgeIndex
//!           SearchCache  ◄── full responses, term expansions
//! ```

pub mod config;
pub mod options;
pub mod service;

pub use config::{SearchConfig, SearchConfigBuilder};
pub use options::{
    CacheKeyOptions, SearchOptions, SearchResponse, SearchStatistics, SortOrder, MAX_LIMIT,
};
pub use service::SearchService;
