//! Property tests for the similarity algorithms and the fuzzy matcher
//!
//! - Levenshtein is a metric: identity, symmetry, triangle inequality
//! - Damerau-Levenshtein never exceeds Levenshtein
//! - Jaro-Winkler stays in [0, 1] and never drops below Jaro

use incident_kb_search::fuzzy::algorithms::{damerau_levenshtein, jaro, jaro_winkler, levenshtein};
use incident_kb_search::fuzzy::{FuzzyMatcher, FuzzyOptions};
use proptest::prelude::*;

const EPSILON: f64 = 1e-9;

fn word() -> impl Strategy<Value = String> {
    "[a-e0-9é]{0,10}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn prop_levenshtein_identity(a in word(), b in word()) {
        prop_assert_eq!(levenshtein(&a, &a), 0);
        prop_assert_eq!(levenshtein(&a, &b) == 0, a == b);
    }

    #[test]
    fn prop_levenshtein_symmetry(a in word(), b in word()) {
        prop_assert_eq!(levenshtein(&a, &b), levenshtein(&b, &a));
    }

    #[test]
    fn prop_levenshtein_triangle_inequality(a in word(), b in word(), c in word()) {
        prop_assert!(levenshtein(&a, &c) <= levenshtein(&a, &b) + levenshtein(&b, &c));
    }

    #[test]
    fn prop_levenshtein_bounded_by_longer_length(a in word(), b in word()) {
        let longer = a.chars().count().max(b.chars().count());
        prop_assert!(levenshtein(&a, &b) <= longer);
    }

    #[test]
    fn prop_damerau_never_exceeds_levenshtein(a in word(), b in word()) {
        prop_assert!(damerau_levenshtein(&a, &b) <= levenshtein(&a, &b));
    }

    #[test]
    fn prop_jaro_winkler_range(a in word(), b in word()) {
        let score = jaro_winkler(&a, &b);
        prop_assert!((-EPSILON..=1.0 + EPSILON).contains(&score), "{} vs {}: {}", a, b, score);
    }

    #[test]
    fn prop_jaro_winkler_at_least_jaro(a in word(), b in word()) {
        prop_assert!(jaro_winkler(&a, &b) + EPSILON >= jaro(&a, &b));
    }

    /// The matcher never offers the query term back as its own match
    #[test]
    fn prop_matches_exclude_the_term(term in "[a-e]{3,8}", vocabulary in prop::collection::vec("[a-e]{3,8}", 0..20)) {
        let matcher = FuzzyMatcher::new(FuzzyOptions::default());
        let matches = matcher.find_matches(&term, &vocabulary, None);
        prop_assert!(matches.len() <= 20);
        prop_assert!(matches.iter().all(|m| m.term != term));
        prop_assert!(matches.iter().all(|m| (0.0..=1.0 + EPSILON).contains(&m.similarity)));
    }
}

#[test]
fn test_transposition_costs_one_edit() {
    assert_eq!(damerau_levenshtein("vsam", "vasm"), 1);
    assert_eq!(levenshtein("vsam", "vasm"), 2);
}

#[test]
fn test_misspelled_term_finds_database() {
    let matcher = FuzzyMatcher::new(FuzzyOptions::default());
    let vocabulary = ["database", "dataset", "deadlock", "tablespace"];

    let matches = matcher.find_matches("databse", &vocabulary, None);
    let best = matches.first().expect("a match for databse");
    assert_eq!(best.term, "database");
    assert!(best.similarity > 0.6);
}

#[test]
fn test_suggest_prefers_completions() {
    let matcher = FuzzyMatcher::new(FuzzyOptions::default());
    let suggestions = matcher.suggest("JC", &["JCL", "JCL-ERROR", "COBOL"], 10);

    assert_eq!(&suggestions[..2], &["JCL".to_string(), "JCL-ERROR".to_string()]);
    if let Some(position) = suggestions.iter().position(|s| s == "COBOL") {
        assert!(position >= 2);
    }
}

#[test]
fn test_memo_serves_repeated_lookups() {
    let matcher = FuzzyMatcher::new(FuzzyOptions::default());
    let vocabulary = ["database", "dataset"];

    let first = matcher.find_matches("databse", &vocabulary, None);
    let second = matcher.find_matches("databse", &vocabulary, None);
    assert_eq!(first, second);
    assert!(matcher.cache_stats().memo_hits >= 1);

    matcher.clear_cache();
    assert_eq!(matcher.cache_stats().memo_keys, 0);
}
