//! Integration tests for the query language

use incident_kb_search::query::*;
use proptest::prelude::*;

fn sorted_sets(parsed: &ParsedQuery) -> SearchTerms {
    let mut terms = parsed.extract_search_terms();
    for bucket in [
        &mut terms.required,
        &mut terms.optional,
        &mut terms.prohibited,
        &mut terms.phrases,
    ] {
        bucket.sort();
        bucket.dedup();
    }
    terms
}

#[test]
fn test_mixed_query_classification() {
    let parsed = QueryParser::default().parse("title:vsam AND \"status 35\"", None);
    assert_eq!(parsed.query_type, QueryType::Mixed);
    assert!(parsed.explicit_boolean);
}

#[test]
fn test_quoted_identifier_and_keyword() {
    let parsed = QueryParser::default().parse("\"S0C7\" AND VSAM", None);
    let terms = parsed.extract_search_terms();
    assert_eq!(terms.phrases, vec!["s0c7"]);
    assert_eq!(terms.required, vec!["vsam"]);
}

#[test]
fn test_unterminated_quote_is_closed() {
    let parsed = QueryParser::default().parse("\"dataset not found", None);
    assert_eq!(parsed.terms.len(), 1);
    assert_eq!(parsed.terms[0].text, "dataset not found");
    assert!(matches!(
        parsed.warnings[0],
        ParseWarning::UnterminatedQuote(_)
    ));
}

#[test]
fn test_explicit_options_override_defaults() {
    let options = QueryOptions {
        default_operator: DefaultOperator::Or,
        minimum_should_match: Some(2),
        ..QueryOptions::default()
    };
    let parser = QueryParser::default();
    let parsed = parser.parse("vsam cics db2", Some(&options));
    assert_eq!(parsed.options.minimum_should_match, Some(2));
    assert_eq!(parsed.extract_search_terms().optional.len(), 3);

    let parsed = parser.parse("vsam cics db2", None);
    assert_eq!(parsed.options, parser.config().defaults);
}

#[test]
fn test_field_boosts_from_options() {
    let mut options = QueryOptions::default();
    options.field_boosts.insert("title".to_string(), 2.0);
    let parsed = QueryParser::default().parse("title:vsam", Some(&options));
    assert_eq!(parsed.options.field_boosts["title"], 2.0);
}

#[test]
fn test_suggest_offers_fields_and_operators() {
    let parser = QueryParser::default();
    let fields = QueryParser::known_fields();
    assert!(parser.suggest("vsam o", &fields).contains(&"vsam OR".to_string()));
    assert!(parser.suggest("cat", &fields).contains(&"category:".to_string()));
}

#[test]
fn test_parse_never_panics_on_garbage() {
    let parser = QueryParser::default();
    for query in ["((((", "))))", "\"", "~~~", "^^", "AND OR NOT", ":::", "\\", "*", "+-+-"] {
        let parsed = parser.parse(query, None);
        assert_eq!(parsed.original, query);
    }
}

fn clause() -> impl Strategy<Value = String> {
    (
        prop::sample::select(vec!["", "+", "-"]),
        prop::sample::select(vec!["vsam", "cics", "abend", "dataset", "jcl", "status"]),
    )
        .prop_map(|(prefix, word)| format!("{prefix}{word}"))
}

fn query() -> impl Strategy<Value = String> {
    (
        clause(),
        prop::collection::vec(
            (prop::sample::select(vec![" ", " AND ", " OR "]), clause()),
            0..5,
        ),
    )
        .prop_map(|(first, rest)| {
            let mut query = first;
            for (joiner, clause) in rest {
                query.push_str(joiner);
                query.push_str(&clause);
            }
            query
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Serializing and re-parsing keeps the required, optional and prohibited sets
    #[test]
    fn prop_round_trip_preserves_term_sets(query in query()) {
        let parser = QueryParser::default();
        let first = parser.parse(&query, None);
        let second = parser.parse(&first.to_query_string(), None);
        prop_assert_eq!(sorted_sets(&first), sorted_sets(&second), "query: {}", query);
    }

    /// Parsing is total and every term is lowercased
    #[test]
    fn prop_terms_are_lowercase(query in "[A-Za-z0-9 ()\"*~^:+-]{0,40}") {
        let parsed = QueryParser::default().parse(&query, None);
        for term in &parsed.terms {
            prop_assert_eq!(term.text.clone(), term.text.to_lowercase());
        }
    }
}
