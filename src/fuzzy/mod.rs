//! Fuzzy term matching
//!
//! Combines edit-distance, character-similarity and phonetic algorithms
//! into a single weighted similarity per vocabulary term. Used by the
//! ranking engine for query expansion and by the search service for
//! spell suggestions.

pub mod algorithms;
mod error;
mod matcher;
mod models;
pub mod phonetic;

pub use error::FuzzyMatchError;
pub use matcher::FuzzyMatcher;
pub use models::{
    Algorithm, FuzzyCacheStats, FuzzyMatch, FuzzyOptions, Transformation, TransformationKind,
    MAX_RESULTS_CAP, MIN_TERM_LENGTH,
};
