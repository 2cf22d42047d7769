use serde::{Deserialize, Serialize};
use strum::Display;

use super::bm25::Bm25;
use super::snippet::SnippetSettings;
use super::weights::{RankingProfile, RankingWeights};
use crate::models::{Document, DocumentField};

/// Why a document matched, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MatchType {
    /// Matched through a fuzzy expansion
    Fuzzy,
    Wildcard,
    /// Query used explicit boolean syntax
    Boolean,
    Phrase,
    Field,
    /// Every positive term matched
    Exact,
    Partial,
}

/// Where a result was served from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResultSource {
    #[default]
    Index,
    Cache,
}

/// A matched span and the snippet around it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub field: DocumentField,
    /// Byte offset into the field text
    pub start: usize,
    pub end: usize,
    /// The matched text as written in the document
    pub text: String,
    /// Snippet window with matches wrapped in highlight tags
    pub context: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub processing_time_ms: u64,
    pub source: ResultSource,
    /// Share of positive terms matched, weighted by expansion quality
    pub confidence: f64,
    /// A term with no index hit was replaced by fuzzy expansions
    pub fallback_used: bool,
}

/// A ranked document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub document: Document,
    pub score: f64,
    pub match_type: MatchType,
    pub highlights: Vec<Highlight>,
    pub explanation: Option<String>,
    pub metadata: ResultMetadata,
}

/// Ranking engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    pub k1: f64,
    pub b: f64,
    /// Expand non-fuzzy terms that have no index hit
    pub fuzzy_fallback: bool,
    /// Similarity floor for fuzzy expansions
    pub min_similarity: f64,
    /// Vocabulary keys a wildcard may expand to
    pub max_wildcard_expansions: usize,
    pub wildcard_weight: f64,
    pub phrase_bonus: f64,
    /// Recency decay constant in days
    pub recency_days: f64,
    /// Snippet window in bytes
    pub snippet_length: usize,
    /// Fields with highlights per result
    pub max_snippets: usize,
    pub highlight_pre_tag: String,
    pub highlight_post_tag: String,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            k1: 1.2,
            b: 0.75,
            fuzzy_fallback: true,
            min_similarity: 0.6,
            max_wildcard_expansions: 50,
            wildcard_weight: 0.9,
            phrase_bonus: 1.2,
            recency_days: 180.0,
            snippet_length: 160,
            max_snippets: 3,
            highlight_pre_tag: "<mark>".to_string(),
            highlight_post_tag: "</mark>".to_string(),
        }
    }
}

impl RankingConfig {
    pub fn bm25(&self) -> Bm25 {
        Bm25 {
            k1: self.k1,
            b: self.b,
        }
    }

    pub fn snippet_settings(&self) -> SnippetSettings {
        SnippetSettings {
            length: self.snippet_length,
            pre_tag: self.highlight_pre_tag.clone(),
            post_tag: self.highlight_post_tag.clone(),
        }
    }
}

/// Per-search ranking choices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankOptions {
    /// Overrides automatic profile selection
    pub profile: Option<RankingProfile>,
    /// Overrides the profile's weights
    pub weights: Option<RankingWeights>,
    pub include_highlights: bool,
    pub include_explanation: bool,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            profile: None,
            weights: None,
            include_highlights: true,
            include_explanation: true,
        }
    }
}
