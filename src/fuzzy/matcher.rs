use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

use super::algorithms::{
    damerau_levenshtein, distance_similarity, edit_script, jaro, jaro_winkler, levenshtein,
};
use super::error::FuzzyMatchError;
use super::models::{Algorithm, FuzzyCacheStats, FuzzyMatch, FuzzyOptions, MIN_TERM_LENGTH};
use super::phonetic::{code_similarity, metaphone, soundex};
use crate::metrics::FUZZY_LOOKUPS_TOTAL;

/// Candidates memoized per (term, algorithms, thresholds) key
const MAX_MEMO_ENTRIES_PER_KEY: usize = 1000;

/// Distinct memo keys kept before the table is reset
const MAX_MEMO_KEYS: usize = 512;

/// Phonetic codes kept per algorithm before the table is reset
const MAX_PHONETIC_ENTRIES: usize = 10_000;

/// Jaro-Winkler score above which two unrelated terms count as variants
const VARIANT_THRESHOLD: f64 = 0.8;

/// Mainframe vocabulary that means the same thing
static SYNONYM_GROUPS: Lazy<HashMap<&'static str, usize>> = Lazy::new(|| {
    let groups: &[&[&str]] = &[
        &["abend", "abnormal end", "abnormal termination", "crash"],
        &["jcl", "job control language"],
        &["vsam", "virtual storage access method"],
        &["db2", "database", "rdbms"],
        &["cics", "customer information control system", "transaction server"],
        &["ims", "information management system"],
        &["dataset", "data set", "file"],
        &["error", "failure", "fault", "problem"],
        &["timeout", "time out", "timed out"],
        &["s0c7", "data exception"],
        &["s0c4", "protection exception"],
        &["s322", "time limit exceeded"],
        &["sb37", "space abend", "out of space"],
        &["racf", "security"],
        &["tso", "time sharing option"],
        &["ispf", "interactive system productivity facility"],
    ];

    let mut map = HashMap::new();
    for (group, members) in groups.iter().enumerate() {
        for member in members.iter() {
            map.insert(*member, group);
        }
    }
    map
});

/// Raw per-algorithm scores for one (term, candidate) pair
#[derive(Debug, Clone)]
struct PairScores {
    scores: Vec<(Algorithm, f64)>,
    distance: usize,
}

/// Multi-algorithm fuzzy matcher with memoization
///
/// Shared between concurrent searches; all tables are concurrent maps and
/// nothing blocks across an await point.
#[derive(Debug, Default)]
pub struct FuzzyMatcher {
    defaults: FuzzyOptions,
    memo: DashMap<String, HashMap<String, PairScores>>,
    soundex_codes: DashMap<String, String>,
    metaphone_codes: DashMap<String, String>,
    lookups: AtomicU64,
    memo_hits: AtomicU64,
}

impl FuzzyMatcher {
    pub fn new(defaults: FuzzyOptions) -> Self {
        Self {
            defaults,
            ..Self::default()
        }
    }

    pub fn defaults(&self) -> &FuzzyOptions {
        &self.defaults
    }

    /// Vocabulary terms similar to `term`, best first
    ///
    /// The term itself is never returned. Malformed vocabulary entries are
    /// skipped. Results are capped at `min(max_results, 20)`.
    pub fn find_matches<S: AsRef<str>>(
        &self,
        term: &str,
        vocabulary: &[S],
        options: Option<&FuzzyOptions>,
    ) -> Vec<FuzzyMatch> {
        let options = options.unwrap_or(&self.defaults);
        let normalized = normalize_term(term);
        if normalized.is_empty() {
            return Vec::new();
        }

        let term_len = normalized.chars().count();
        if options.skip_short_terms && term_len < MIN_TERM_LENGTH {
            trace!(term = %normalized, "Term too short for fuzzy matching");
            return Vec::new();
        }

        self.lookups.fetch_add(1, Ordering::Relaxed);
        FUZZY_LOOKUPS_TOTAL.inc();

        let algorithms = options.effective_algorithms();
        let uses_distance = algorithms.iter().any(|a| a.is_distance_based());
        let memo_key = options.memo_key(&normalized);

        let mut seen = HashSet::new();
        let mut fresh: Vec<(String, PairScores)> = Vec::new();
        let mut scored: Vec<(String, String, PairScores)> = Vec::new();

        for raw in vocabulary {
            let raw = raw.as_ref();
            let candidate = match validate_entry(raw) {
                Ok(candidate) => candidate,
                Err(e) => {
                    debug!(error = %e, "Skipping vocabulary entry");
                    continue;
                }
            };

            if candidate == normalized || !seen.insert(candidate.clone()) {
                continue;
            }

            let candidate_len = candidate.chars().count();
            if options.skip_short_terms && candidate_len < MIN_TERM_LENGTH {
                continue;
            }
            if uses_distance && term_len.abs_diff(candidate_len) > options.max_distance {
                continue;
            }

            let cached = self
                .memo
                .get(&memo_key)
                .and_then(|entries| entries.get(&candidate).cloned());

            let scores = match cached {
                Some(scores) => {
                    self.memo_hits.fetch_add(1, Ordering::Relaxed);
                    scores
                }
                None => {
                    let scores = self.score_pair(&normalized, &candidate, &algorithms);
                    fresh.push((candidate.clone(), scores.clone()));
                    scores
                }
            };

            scored.push((raw.trim().to_string(), candidate, scores));
        }

        self.remember(&memo_key, fresh);

        let mut matches: Vec<(FuzzyMatch, String)> = scored
            .into_iter()
            .filter_map(|(original, candidate, scores)| {
                let m = combine(original, &scores, options);
                let within_distance = !uses_distance || m.distance <= options.max_distance;
                (m.similarity >= options.min_similarity && within_distance).then_some((m, candidate))
            })
            .collect();

        matches.sort_by(|(a, _), (b, _)| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| b.confidence.total_cmp(&a.confidence))
                .then_with(|| a.term.cmp(&b.term))
        });
        matches.truncate(options.result_limit());

        matches
            .into_iter()
            .map(|(mut m, candidate)| {
                m.transformations = edit_script(&normalized, &candidate);
                m
            })
            .collect()
    }

    /// Similarity of two terms under a single algorithm
    pub fn similarity(&self, a: &str, b: &str, algorithm: Algorithm) -> f64 {
        let a = normalize_term(a);
        let b = normalize_term(b);
        self.score_one(&a, &b, algorithm).0
    }

    /// Completions and corrections for user input
    ///
    /// Prefix completions come first, shortest first, followed by fuzzy
    /// corrections not already listed.
    pub fn suggest<S: AsRef<str>>(&self, term: &str, vocabulary: &[S], max: usize) -> Vec<String> {
        let normalized = normalize_term(term);
        if normalized.is_empty() || max == 0 {
            return Vec::new();
        }

        let mut completions: Vec<&str> = vocabulary
            .iter()
            .map(|v| v.as_ref().trim())
            .filter(|v| {
                let lower = v.to_lowercase();
                lower.starts_with(&normalized) && lower != normalized
            })
            .collect();
        completions.sort_by(|a, b| {
            a.chars()
                .count()
                .cmp(&b.chars().count())
                .then_with(|| a.cmp(b))
        });

        let mut seen = HashSet::new();
        let mut suggestions = Vec::new();
        for completion in completions {
            if seen.insert(completion.to_lowercase()) {
                suggestions.push(completion.to_string());
            }
            if suggestions.len() >= max {
                return suggestions;
            }
        }

        let corrections =
            self.find_matches(&normalized, vocabulary, Some(&FuzzyOptions::spell_correction()));
        for correction in corrections {
            if suggestions.len() >= max {
                break;
            }
            if seen.insert(correction.term.to_lowercase()) {
                suggestions.push(correction.term);
            }
        }

        suggestions
    }

    /// Whether two terms name the same thing
    pub fn are_variants(&self, a: &str, b: &str) -> bool {
        let a = normalize_term(a);
        let b = normalize_term(b);
        if a.is_empty() || b.is_empty() {
            return false;
        }
        if a == b {
            return true;
        }

        if let (Some(x), Some(y)) = (SYNONYM_GROUPS.get(a.as_str()), SYNONYM_GROUPS.get(b.as_str())) {
            if x == y {
                return true;
            }
        }

        jaro_winkler(&a, &b) > VARIANT_THRESHOLD
    }

    pub fn cache_stats(&self) -> FuzzyCacheStats {
        FuzzyCacheStats {
            memo_keys: self.memo.len(),
            memo_entries: self.memo.iter().map(|e| e.value().len()).sum(),
            phonetic_entries: self.soundex_codes.len() + self.metaphone_codes.len(),
            lookups: self.lookups.load(Ordering::Relaxed),
            memo_hits: self.memo_hits.load(Ordering::Relaxed),
        }
    }

    /// Drop all memoized scores and phonetic codes
    pub fn clear_cache(&self) {
        self.memo.clear();
        self.soundex_codes.clear();
        self.metaphone_codes.clear();
    }

    fn remember(&self, memo_key: &str, fresh: Vec<(String, PairScores)>) {
        if fresh.is_empty() {
            return;
        }

        if !self.memo.contains_key(memo_key) && self.memo.len() >= MAX_MEMO_KEYS {
            debug!(keys = MAX_MEMO_KEYS, "Fuzzy memo table full, resetting");
            self.memo.clear();
        }

        let mut entries = self.memo.entry(memo_key.to_string()).or_default();
        for (candidate, scores) in fresh {
            if entries.len() >= MAX_MEMO_ENTRIES_PER_KEY {
                break;
            }
            entries.insert(candidate, scores);
        }
    }

    fn score_pair(&self, term: &str, candidate: &str, algorithms: &[Algorithm]) -> PairScores {
        let mut scores = Vec::with_capacity(algorithms.len());
        let mut distance: Option<usize> = None;

        for &algorithm in algorithms {
            let (score, d) = self.score_one(term, candidate, algorithm);
            if let Some(d) = d {
                distance = Some(distance.map_or(d, |current| current.min(d)));
            }
            scores.push((algorithm, score));
        }

        PairScores {
            scores,
            distance: distance.unwrap_or_else(|| levenshtein(term, candidate)),
        }
    }

    fn score_one(&self, a: &str, b: &str, algorithm: Algorithm) -> (f64, Option<usize>) {
        match algorithm {
            Algorithm::Levenshtein => {
                let d = levenshtein(a, b);
                (distance_similarity(d, a, b), Some(d))
            }
            Algorithm::DamerauLevenshtein => {
                let d = damerau_levenshtein(a, b);
                (distance_similarity(d, a, b), Some(d))
            }
            Algorithm::Jaro => (jaro(a, b), None),
            Algorithm::JaroWinkler => (jaro_winkler(a, b), None),
            Algorithm::Soundex => (
                code_similarity(
                    &cached_code(&self.soundex_codes, a, soundex),
                    &cached_code(&self.soundex_codes, b, soundex),
                ),
                None,
            ),
            Algorithm::Metaphone => (
                code_similarity(
                    &cached_code(&self.metaphone_codes, a, metaphone),
                    &cached_code(&self.metaphone_codes, b, metaphone),
                ),
                None,
            ),
        }
    }
}

fn cached_code(table: &DashMap<String, String>, word: &str, encode: fn(&str) -> String) -> String {
    if let Some(code) = table.get(word) {
        return code.clone();
    }

    let code = encode(word);
    if table.len() >= MAX_PHONETIC_ENTRIES {
        table.clear();
    }
    table.insert(word.to_string(), code.clone());
    code
}

fn combine(term: String, pair: &PairScores, options: &FuzzyOptions) -> FuzzyMatch {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    for &(algorithm, score) in &pair.scores {
        let weight = options.weight(algorithm);
        weighted += weight * score;
        total_weight += weight;
    }

    let count = pair.scores.len().max(1) as f64;
    let mean = pair.scores.iter().map(|(_, s)| s).sum::<f64>() / count;
    let similarity = if total_weight > 0.0 {
        weighted / total_weight
    } else {
        mean
    };

    let variance = pair
        .scores
        .iter()
        .map(|(_, s)| (s - mean).powi(2))
        .sum::<f64>()
        / count;
    let confidence = (1.0 - variance.sqrt()).max(0.0);

    let algorithm = pair
        .scores
        .iter()
        .fold(None::<(Algorithm, f64)>, |best, &(a, s)| match best {
            Some((_, top)) if top >= s => best,
            _ => Some((a, s)),
        })
        .map(|(a, _)| a)
        .unwrap_or(Algorithm::Levenshtein);

    FuzzyMatch {
        term,
        distance: pair.distance,
        similarity: similarity.clamp(0.0, 1.0),
        confidence,
        algorithm,
        transformations: Vec::new(),
    }
}

fn normalize_term(term: &str) -> String {
    term.trim().to_lowercase()
}

fn validate_entry(raw: &str) -> Result<String, FuzzyMatchError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(FuzzyMatchError::MalformedEntry {
            entry: raw.to_string(),
            reason: "blank entry",
        });
    }
    if trimmed.chars().any(char::is_control) {
        return Err(FuzzyMatchError::MalformedEntry {
            entry: raw.to_string(),
            reason: "contains control characters",
        });
    }
    Ok(trimmed.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocabulary() -> Vec<&'static str> {
        vec!["database", "dataset", "datastore", "vsam", "cobol", "jcl", "abend"]
    }

    #[test]
    fn test_typo_finds_database() {
        let matcher = FuzzyMatcher::default();
        let matches = matcher.find_matches("databse", &vocabulary(), None);

        assert_eq!(matches[0].term, "database");
        assert_eq!(matches[0].distance, 1);
        assert!(matches[0].similarity >= 0.8);
        assert!(matches[0].confidence > 0.0 && matches[0].confidence <= 1.0);
        assert_eq!(matches[0].transformations.len(), 1);
    }

    #[test]
    fn test_never_returns_query_term() {
        let matcher = FuzzyMatcher::default();
        let matches = matcher.find_matches("VSAM", &vocabulary(), None);
        assert!(matches.iter().all(|m| !m.term.eq_ignore_ascii_case("vsam")));
    }

    #[test]
    fn test_short_terms_skipped_by_default() {
        let matcher = FuzzyMatcher::default();
        assert!(matcher.find_matches("jc", &vocabulary(), None).is_empty());
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let matcher = FuzzyMatcher::default();
        let vocab = vec!["   ", "data\u{0}base", "database"];
        let matches = matcher.find_matches("databse", &vocab, None);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].term, "database");
    }

    #[test]
    fn test_results_respect_distance_and_similarity() {
        let matcher = FuzzyMatcher::default();
        let options = FuzzyOptions::default();
        for m in matcher.find_matches("dataset", &vocabulary(), Some(&options)) {
            assert!(m.distance <= options.max_distance);
            assert!(m.similarity >= options.min_similarity);
        }
    }

    #[test]
    fn test_memo_is_reused() {
        let matcher = FuzzyMatcher::default();
        let first = matcher.find_matches("databse", &vocabulary(), None);
        let second = matcher.find_matches("databse", &vocabulary(), None);

        assert_eq!(first, second);
        let stats = matcher.cache_stats();
        assert_eq!(stats.lookups, 2);
        assert!(stats.memo_hits > 0);
        assert_eq!(stats.memo_keys, 1);
    }

    #[test]
    fn test_suggest_prefers_prefix_completions() {
        let matcher = FuzzyMatcher::default();
        let suggestions = matcher.suggest("data", &vocabulary(), 5);
        assert_eq!(suggestions[..3], ["dataset", "database", "datastore"]);
    }

    #[test]
    fn test_suggest_allows_short_input() {
        let matcher = FuzzyMatcher::default();
        let suggestions = matcher.suggest("jc", &vocabulary(), 3);
        assert_eq!(suggestions, vec!["jcl"]);
    }

    #[test]
    fn test_are_variants() {
        let matcher = FuzzyMatcher::default();
        assert!(matcher.are_variants("ABEND", "abnormal end"));
        assert!(matcher.are_variants("db2", "database"));
        assert!(matcher.are_variants("dataset", "datasets"));
        assert!(!matcher.are_variants("vsam", "cobol"));
        assert!(!matcher.are_variants("", "vsam"));
    }

    #[test]
    fn test_single_algorithm_similarity() {
        let matcher = FuzzyMatcher::default();
        assert_eq!(matcher.similarity("Robert", "Rupert", Algorithm::Soundex), 1.0);
        assert!((matcher.similarity("databse", "database", Algorithm::Levenshtein) - 0.875).abs() < 1e-9);
    }
}
