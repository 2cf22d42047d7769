//! Incident knowledge-base search
//!
//! Ranking and caching core for a knowledge base of incident resolutions:
//! a query language parser, fuzzy term matching, BM25 field-weighted
//! ranking with snippets, and a multi-tier response cache, composed by
//! [`SearchService`].
//!
//! ```no_run
//! use incident_kb_search::{Config, Document, SearchOptions, SearchService};
//!
//! # async fn run() -> Result<(), incident_kb_search::SearchError> {
//! let documents = vec![Document::new(
//!     "kb-1",
//!     "VSAM S0C7 Error Resolution",
//!     "Job abends with S0C7 reading a VSAM file",
//!     "Check the packed decimal fields in the copybook",
//!     "VSAM",
//! )];
//! let (service, _index) = SearchService::in_memory(&Config::default(), documents);
//! let response = service.search("\"S0C7\" AND VSAM", &SearchOptions::default()).await?;
//! assert_eq!(response.results[0].document.id, "kb-1");
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod fuzzy;
pub mod metrics;
pub mod models;
pub mod query;
pub mod ranking;
pub mod search;
pub mod text;

pub use cache::{CacheConfig, CacheStats, SearchCache};
pub use config::Config;
pub use error::{AppError, Result};
pub use fuzzy::{FuzzyMatcher, FuzzyOptions};
pub use models::{Document, DocumentField};
pub use query::{ParsedQuery, QueryParser};
pub use ranking::{
    InMemoryIndex, KnowledgeIndex, RankingEngine, RankingProfile, SearchError, SearchResult,
};
pub use search::{SearchOptions, SearchResponse, SearchService, SortOrder};
