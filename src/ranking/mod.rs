//! Relevance ranking
//!
//! Executes a [`ParsedQuery`](crate::query::ParsedQuery) against a
//! [`KnowledgeIndex`] with field-weighted BM25, blends in usage, success and
//! recency signals, and produces highlights and an explanation per result.

mod bm25;
mod engine;
mod error;
mod index;
mod models;
mod snippet;
mod weights;

pub use bm25::{Bm25, Signals};
pub use engine::RankingEngine;
pub use error::{IndexError, SearchError};
pub use index::{CollectionStats, InMemoryIndex, KnowledgeIndex, Posting};
pub use models::{
    Highlight, MatchType, RankOptions, RankingConfig, ResultMetadata, ResultSource, SearchResult,
};
pub use snippet::{field_highlights, SnippetSettings};
pub use weights::{is_system_identifier, RankingProfile, RankingWeights};
