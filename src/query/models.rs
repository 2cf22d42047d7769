use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};
use thiserror::Error;

/// Overall shape of a parsed query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QueryType {
    Simple,
    Boolean,
    Phrase,
    Field,
    Mixed,
}

/// How a term participates in matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TermOperator {
    And,
    Or,
    Not,
    Phrase,
}

/// Operator joining adjacent terms with no explicit keyword
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum DefaultOperator {
    #[default]
    And,
    Or,
}

/// Position of the `*` in a wildcard term
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Wildcard {
    /// `term*`
    Prefix,
    /// `*term`
    Suffix,
    /// `*term*`
    Contains,
}

impl Wildcard {
    /// Whether `candidate` matches the wildcard pattern built from `text`
    pub fn matches(self, text: &str, candidate: &str) -> bool {
        match self {
            Wildcard::Prefix => candidate.starts_with(text),
            Wildcard::Suffix => candidate.ends_with(text),
            Wildcard::Contains => candidate.contains(text),
        }
    }
}

/// A single term of a parsed query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTerm {
    /// Lowercased term text; space separated words for phrases
    pub text: String,
    pub field: Option<String>,
    pub operator: TermOperator,
    pub boost: f64,
    pub fuzzy: bool,
    pub fuzzy_distance: Option<u8>,
    /// Phrase slop
    pub proximity: Option<u32>,
    pub wildcard: Option<Wildcard>,
    pub required: bool,
    pub prohibited: bool,
}

impl QueryTerm {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            field: None,
            operator: TermOperator::Or,
            boost: 1.0,
            fuzzy: false,
            fuzzy_distance: None,
            proximity: None,
            wildcard: None,
            required: false,
            prohibited: false,
        }
    }

    pub fn is_phrase(&self) -> bool {
        self.operator == TermOperator::Phrase
    }

    /// Neither prohibited nor empty
    pub fn is_positive(&self) -> bool {
        !self.prohibited && !self.text.is_empty()
    }
}

/// Comparison applied by a hard filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    Prefix,
    NotEquals,
}

/// A hard constraint on a document attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub field: String,
    pub operator: FilterOperator,
    /// Lowercased value
    pub value: String,
}

impl QueryFilter {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: impl Into<String>) -> Self {
        Self {
            field: field.into().to_lowercase(),
            operator,
            value: value.into().to_lowercase(),
        }
    }

    /// Apply the filter to a single attribute value
    pub fn accepts(&self, candidate: &str) -> bool {
        let candidate = candidate.to_lowercase();
        match self.operator {
            FilterOperator::Equals => candidate == self.value,
            FilterOperator::Prefix => candidate.starts_with(&self.value),
            FilterOperator::NotEquals => candidate != self.value,
        }
    }
}

/// Resolved per-query options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    /// Distance used by a bare `~`
    pub fuzzy_distance: u8,
    pub phrase_slop: u32,
    pub minimum_should_match: Option<usize>,
    pub field_boosts: BTreeMap<String, f64>,
    pub default_operator: DefaultOperator,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            fuzzy_distance: 2,
            phrase_slop: 0,
            minimum_should_match: None,
            field_boosts: BTreeMap::new(),
            default_operator: DefaultOperator::And,
        }
    }
}

/// Non-fatal problems found while parsing; the parser always recovers
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParseWarning {
    #[error("Unterminated quote at position {0}, closed at end of input")]
    UnterminatedQuote(usize),

    #[error("Unclosed parenthesis, closed at end of input")]
    UnbalancedParenthesis,

    #[error("Unmatched closing parenthesis ignored")]
    StrayParenthesis,

    #[error("Unknown field '{0}' kept as filter")]
    UnknownField(String),

    #[error("Invalid modifier '{modifier}' on '{term}' ignored")]
    InvalidModifier { term: String, modifier: String },

    #[error("Dangling operator '{0}' ignored")]
    DanglingOperator(String),

    #[error("Empty group ignored")]
    EmptyGroup,

    #[error("Empty term '{0}' ignored")]
    EmptyTerm(String),

    #[error("Nesting deeper than {0} groups flattened")]
    DepthExceeded(usize),
}

impl ParseWarning {
    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ParseWarning::UnterminatedQuote(_) => "unterminated_quote",
            ParseWarning::UnbalancedParenthesis => "unbalanced_parenthesis",
            ParseWarning::StrayParenthesis => "stray_parenthesis",
            ParseWarning::UnknownField(_) => "unknown_field",
            ParseWarning::InvalidModifier { .. } => "invalid_modifier",
            ParseWarning::DanglingOperator(_) => "dangling_operator",
            ParseWarning::EmptyGroup => "empty_group",
            ParseWarning::EmptyTerm(_) => "empty_term",
            ParseWarning::DepthExceeded(_) => "depth_exceeded",
        }
    }
}

/// The compiled form of a query string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuery {
    pub original: String,
    pub query_type: QueryType,
    pub terms: Vec<QueryTerm>,
    pub filters: Vec<QueryFilter>,
    pub options: QueryOptions,
    /// Whether boolean operators, `+`/`-` prefixes or groups were used
    pub explicit_boolean: bool,
    pub warnings: Vec<ParseWarning>,
}

/// Terms partitioned by role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTerms {
    pub required: Vec<String>,
    pub optional: Vec<String>,
    pub prohibited: Vec<String>,
    pub phrases: Vec<String>,
}

impl ParsedQuery {
    /// Partition terms into required, optional, prohibited and phrase buckets
    ///
    /// Positive phrases go to `phrases`; prohibited phrases to `prohibited`.
    pub fn extract_search_terms(&self) -> SearchTerms {
        let mut buckets = SearchTerms::default();
        for term in &self.terms {
            if term.prohibited {
                buckets.prohibited.push(term.text.clone());
            } else if term.is_phrase() {
                buckets.phrases.push(term.text.clone());
            } else if term.required {
                buckets.required.push(term.text.clone());
            } else {
                buckets.optional.push(term.text.clone());
            }
        }
        buckets
    }

    /// Terms that contribute to scoring
    pub fn positive_terms(&self) -> impl Iterator<Item = &QueryTerm> {
        self.terms.iter().filter(|t| t.is_positive())
    }

    pub fn has_fuzzy_terms(&self) -> bool {
        self.terms.iter().any(|t| t.fuzzy && !t.prohibited)
    }

    pub fn has_wildcard_terms(&self) -> bool {
        self.terms.iter().any(|t| t.wildcard.is_some() && !t.prohibited)
    }

    /// Field to values map of field terms and filters
    pub fn field_values(&self) -> BTreeMap<String, Vec<String>> {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for term in &self.terms {
            if let Some(field) = &term.field {
                map.entry(field.clone()).or_default().push(term.text.clone());
            }
        }
        for filter in &self.filters {
            map.entry(filter.field.clone())
                .or_default()
                .push(filter.value.clone());
        }
        map
    }

    /// Serialize back to query syntax
    ///
    /// Re-parsing the output yields the same required, optional and
    /// prohibited term sets regardless of the default operator.
    pub fn to_query_string(&self) -> String {
        let mut parts = Vec::new();
        let mut optional = Vec::new();

        for term in &self.terms {
            let rendered = render_term(term);
            if term.prohibited {
                parts.push(format!("-{rendered}"));
            } else if term.required {
                parts.push(format!("+{rendered}"));
            } else {
                optional.push(rendered);
            }
        }

        match optional.len() {
            0 => {}
            1 => parts.push(format!("({0} OR {0})", optional[0])),
            _ => parts.push(format!("({})", optional.join(" OR "))),
        }

        for filter in &self.filters {
            let value = escape(&filter.value);
            parts.push(match filter.operator {
                FilterOperator::Equals => format!("{}:{}", filter.field, value),
                FilterOperator::Prefix => format!("{}:{}*", filter.field, value),
                FilterOperator::NotEquals => format!("-{}:{}", filter.field, value),
            });
        }

        parts.join(" ")
    }
}

/// Validation outcome for a raw query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

fn render_term(term: &QueryTerm) -> String {
    let mut out = String::new();
    if let Some(field) = &term.field {
        out.push_str(field);
        out.push(':');
    }

    if term.is_phrase() {
        out.push('"');
        out.push_str(&term.text.replace('\\', "\\\\").replace('"', "\\\""));
        out.push('"');
        if let Some(slop) = term.proximity {
            out.push_str(&format!("~{slop}"));
        }
    } else {
        let text = escape(&term.text);
        match term.wildcard {
            Some(Wildcard::Prefix) => out.push_str(&format!("{text}*")),
            Some(Wildcard::Suffix) => out.push_str(&format!("*{text}")),
            Some(Wildcard::Contains) => out.push_str(&format!("*{text}*")),
            None => out.push_str(&text),
        }
        if term.fuzzy {
            out.push('~');
            if let Some(distance) = term.fuzzy_distance {
                out.push_str(&distance.to_string());
            }
        }
    }

    if (term.boost - 1.0).abs() > f64::EPSILON {
        out.push_str(&format!("^{}", term.boost));
    }
    out
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let keyword = matches!(text.to_ascii_uppercase().as_str(), "AND" | "OR" | "NOT");
    for (i, c) in text.chars().enumerate() {
        let special = matches!(c, '\\' | '"' | '(' | ')' | ':' | '~' | '^' | '*' | '+' | '-' | '!' | '&' | '|')
            || c.is_whitespace();
        if special || (keyword && i == 0) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_accepts() {
        let filter = QueryFilter::new("category", FilterOperator::Equals, "JCL");
        assert!(filter.accepts("jcl"));
        assert!(!filter.accepts("vsam"));

        let filter = QueryFilter::new("id", FilterOperator::Prefix, "kb-");
        assert!(filter.accepts("KB-12"));

        let filter = QueryFilter::new("category", FilterOperator::NotEquals, "db2");
        assert!(filter.accepts("cics"));
        assert!(!filter.accepts("DB2"));
    }

    #[test]
    fn test_wildcard_matches() {
        assert!(Wildcard::Prefix.matches("data", "database"));
        assert!(Wildcard::Suffix.matches("base", "database"));
        assert!(Wildcard::Contains.matches("tab", "database"));
        assert!(!Wildcard::Prefix.matches("base", "database"));
    }

    #[test]
    fn test_escape_keywords_and_specials() {
        assert_eq!(escape("and"), "\\and");
        assert_eq!(escape("a:b"), "a\\:b");
        assert_eq!(escape("s0c7"), "s0c7");
    }

    #[test]
    fn test_warning_kinds() {
        assert_eq!(ParseWarning::EmptyGroup.kind(), "empty_group");
        assert_eq!(
            ParseWarning::UnknownField("severity".into()).to_string(),
            "Unknown field 'severity' kept as filter"
        );
    }
}
