use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumIter, EnumString};

/// Hard ceiling on results returned by a single lookup
pub const MAX_RESULTS_CAP: usize = 20;

/// Terms shorter than this are skipped unless `skip_short_terms` is off
pub const MIN_TERM_LENGTH: usize = 3;

/// Similarity algorithms the matcher can combine
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Algorithm {
    Levenshtein,
    DamerauLevenshtein,
    Jaro,
    JaroWinkler,
    Soundex,
    Metaphone,
}

impl Algorithm {
    pub const ALL: [Algorithm; 6] = [
        Algorithm::Levenshtein,
        Algorithm::DamerauLevenshtein,
        Algorithm::Jaro,
        Algorithm::JaroWinkler,
        Algorithm::Soundex,
        Algorithm::Metaphone,
    ];

    /// Whether the algorithm produces an edit distance
    pub fn is_distance_based(self) -> bool {
        matches!(self, Algorithm::Levenshtein | Algorithm::DamerauLevenshtein)
    }

    /// Weight used when the options carry none for this algorithm
    pub fn default_weight(self) -> f64 {
        match self {
            Algorithm::Levenshtein => 1.0,
            Algorithm::DamerauLevenshtein => 1.0,
            Algorithm::Jaro => 0.8,
            Algorithm::JaroWinkler => 1.2,
            Algorithm::Soundex => 0.5,
            Algorithm::Metaphone => 0.5,
        }
    }
}

/// Kind of single-character edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransformationKind {
    Insertion,
    Deletion,
    Substitution,
    Transposition,
}

/// One step of an edit script from the query term to the candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transformation {
    pub kind: TransformationKind,
    /// Character position in the query term
    pub position: usize,
    pub from: Option<char>,
    pub to: Option<char>,
}

/// A vocabulary term similar to the query term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzyMatch {
    /// Vocabulary entry as supplied (trimmed)
    pub term: String,

    /// Edit distance (smallest of the distance algorithms, Levenshtein otherwise)
    pub distance: usize,

    /// Weighted similarity across the selected algorithms
    pub similarity: f64,

    /// Agreement between algorithms: `1 - stddev` of their scores
    pub confidence: f64,

    /// Algorithm with the highest individual score
    pub algorithm: Algorithm,

    pub transformations: Vec<Transformation>,
}

/// Options for a fuzzy lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzyOptions {
    pub algorithms: Vec<Algorithm>,
    pub weights: BTreeMap<Algorithm, f64>,
    pub min_similarity: f64,
    pub max_distance: usize,
    pub max_results: usize,
    pub skip_short_terms: bool,
}

impl Default for FuzzyOptions {
    fn default() -> Self {
        Self {
            algorithms: Algorithm::ALL.to_vec(),
            weights: Algorithm::ALL
                .iter()
                .map(|a| (*a, a.default_weight()))
                .collect(),
            min_similarity: 0.6,
            max_distance: 2,
            max_results: 10,
            skip_short_terms: true,
        }
    }
}

impl FuzzyOptions {
    /// Options used when completing or correcting user input
    pub fn spell_correction() -> Self {
        Self {
            algorithms: vec![
                Algorithm::Levenshtein,
                Algorithm::DamerauLevenshtein,
                Algorithm::JaroWinkler,
            ],
            min_similarity: 0.7,
            skip_short_terms: false,
            ..Self::default()
        }
    }

    /// Algorithms to run; falls back to all of them when none are selected
    pub fn effective_algorithms(&self) -> Vec<Algorithm> {
        if self.algorithms.is_empty() {
            Algorithm::ALL.to_vec()
        } else {
            let mut algorithms = self.algorithms.clone();
            algorithms.dedup();
            algorithms
        }
    }

    pub fn weight(&self, algorithm: Algorithm) -> f64 {
        self.weights
            .get(&algorithm)
            .copied()
            .unwrap_or_else(|| algorithm.default_weight())
            .max(0.0)
    }

    /// Effective result cap
    pub fn result_limit(&self) -> usize {
        self.max_results.clamp(1, MAX_RESULTS_CAP)
    }

    /// Memo key: term, algorithm set and thresholds
    pub(crate) fn memo_key(&self, term: &str) -> String {
        let algorithms = self
            .effective_algorithms()
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "{}|{}|{:.3}|{}",
            term, algorithms, self.min_similarity, self.max_distance
        )
    }
}

/// Memo table statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FuzzyCacheStats {
    pub memo_keys: usize,
    pub memo_entries: usize,
    pub phonetic_entries: usize,
    pub lookups: u64,
    pub memo_hits: u64,
}
