use std::collections::BTreeMap;
use tracing::debug;

use super::lexer::{Glyph, Lexeme, Lexer};
use super::models::{
    DefaultOperator, FilterOperator, ParseWarning, ParsedQuery, QueryFilter, QueryOptions,
    QueryTerm, QueryType, TermOperator, ValidationResult, Wildcard,
};
use crate::metrics::PARSE_WARNINGS_TOTAL;
use crate::models::DocumentField;

/// Default maximum query length in characters
pub const DEFAULT_MAX_QUERY_LENGTH: usize = 1000;

/// Default maximum group nesting
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Fields that only make sense as exact-match filters
const FILTER_ONLY_FIELDS: &[&str] = &["id"];

const OPERATOR_KEYWORDS: &[&str] = &["AND", "OR", "NOT"];

/// Query parser settings
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub max_length: usize,
    pub max_depth: usize,
    /// Options applied when `parse` is called without explicit ones
    pub defaults: QueryOptions,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_QUERY_LENGTH,
            max_depth: DEFAULT_MAX_DEPTH,
            defaults: QueryOptions::default(),
        }
    }
}

/// Compiles query strings into [`ParsedQuery`] values
///
/// Parsing never fails: malformed input is repaired and reported through
/// [`ParseWarning`]s on the result.
#[derive(Debug, Clone, Default)]
pub struct QueryParser {
    config: QueryConfig,
}

#[derive(Debug, Clone)]
enum Node {
    Term(QueryTerm),
    Filter {
        field: String,
        value: String,
        prefix: bool,
    },
    Not(Box<Node>),
    Required(Box<Node>),
    And(Vec<Node>),
    Or(Vec<Node>),
}

#[derive(Debug, Clone, Copy)]
struct Context {
    negations: usize,
    all_and: bool,
    plus: bool,
}

impl QueryParser {
    pub fn new(config: QueryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Parse a query string
    pub fn parse(&self, query: &str, options: Option<&QueryOptions>) -> ParsedQuery {
        let options = options.cloned().unwrap_or_else(|| self.config.defaults.clone());
        let mut warnings = Vec::new();

        let lexemes = Lexer::new(query, &mut warnings).tokenize();
        let mut state = ParseState {
            lexemes,
            pos: 0,
            max_depth: self.config.max_depth.max(1),
            flattened: 0,
            depth_warned: false,
            explicit_boolean: false,
            options: &options,
            warnings: &mut warnings,
        };
        let root = state.parse_query();
        let explicit_boolean = state.explicit_boolean;

        let mut terms = Vec::new();
        let mut filters = Vec::new();
        if let Some(root) = root {
            linearize(
                root,
                Context {
                    negations: 0,
                    all_and: true,
                    plus: false,
                },
                &mut terms,
                &mut filters,
            );
        }

        if terms.is_empty() && filters.is_empty() {
            let raw = query.trim().to_lowercase();
            if !raw.is_empty() {
                debug!(query = %raw, "Query yielded no terms, using raw text");
                let mut term = QueryTerm::new(raw);
                term.required = true;
                term.operator = TermOperator::And;
                terms.push(term);
            }
        }

        for warning in &warnings {
            PARSE_WARNINGS_TOTAL.with_label_values(&[warning.kind()]).inc();
        }

        let query_type = classify(&terms, &filters, explicit_boolean);
        ParsedQuery {
            original: query.to_string(),
            query_type,
            terms,
            filters,
            options,
            explicit_boolean,
            warnings,
        }
    }

    /// Check a query without failing
    pub fn validate(&self, query: &str) -> ValidationResult {
        let mut errors = Vec::new();
        let trimmed = query.trim();

        if trimmed.is_empty() {
            errors.push("Query is empty".to_string());
        }
        if query.chars().count() > self.config.max_length {
            errors.push(format!(
                "Query exceeds maximum length of {} characters",
                self.config.max_length
            ));
        }

        let mut warnings = Vec::new();
        if errors.is_empty() {
            let parsed = self.parse(query, None);
            if !parsed.terms.is_empty() && parsed.terms.iter().all(|t| t.prohibited) {
                errors.push("Query contains only prohibited terms".to_string());
            }
            warnings = parsed.warnings.iter().map(|w| w.to_string()).collect();
        }

        ValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    /// Field to values map for the field-qualified parts of a query
    pub fn parse_field_query(&self, query: &str) -> BTreeMap<String, Vec<String>> {
        self.parse(query, None).field_values()
    }

    /// Completions of the last fragment of a partially typed query
    ///
    /// Offers operator keywords and `field:` prefixes; returns the full
    /// completed query strings.
    pub fn suggest(&self, partial: &str, fields: &[&str]) -> Vec<String> {
        let split = partial
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace() || *c == '(')
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        let (head, fragment) = partial.split_at(split);
        if fragment.is_empty() || fragment.contains(':') || fragment.contains('"') {
            return Vec::new();
        }

        let lower = fragment.to_lowercase();
        let has_left_operand = !head.trim().is_empty() && !head.trim_end().ends_with('(');
        let mut suggestions: Vec<String> = Vec::new();

        for keyword in OPERATOR_KEYWORDS {
            if *keyword != "NOT" && !has_left_operand {
                continue;
            }
            let keyword_lower = keyword.to_lowercase();
            if keyword_lower.starts_with(&lower) && keyword_lower != lower {
                suggestions.push(format!("{head}{keyword}"));
            }
        }

        for field in fields {
            let field = field.to_lowercase();
            if field.starts_with(&lower) {
                let completion = format!("{head}{field}:");
                if !suggestions.contains(&completion) {
                    suggestions.push(completion);
                }
            }
        }

        suggestions
    }

    /// Names accepted before `:` in field terms
    pub fn known_fields() -> Vec<&'static str> {
        let mut fields = vec!["title", "problem", "solution", "tags", "category"];
        fields.extend_from_slice(FILTER_ONLY_FIELDS);
        fields
    }
}

struct ParseState<'a> {
    lexemes: Vec<Lexeme>,
    pos: usize,
    max_depth: usize,
    flattened: usize,
    depth_warned: bool,
    explicit_boolean: bool,
    options: &'a QueryOptions,
    warnings: &'a mut Vec<ParseWarning>,
}

impl<'a> ParseState<'a> {
    fn peek(&self) -> Option<&Lexeme> {
        self.lexemes.get(self.pos)
    }

    fn advance(&mut self) -> Option<Lexeme> {
        let lexeme = self.lexemes.get(self.pos).cloned();
        if lexeme.is_some() {
            self.pos += 1;
        }
        lexeme
    }

    fn warn(&mut self, warning: ParseWarning) {
        self.warnings.push(warning);
    }

    fn parse_query(&mut self) -> Option<Node> {
        let mut nodes = Vec::new();
        loop {
            if let Some(node) = self.parse_or(0) {
                nodes.push(node);
            }
            match self.peek() {
                None => break,
                Some(Lexeme::Close) => {
                    self.advance();
                    self.warn(ParseWarning::StrayParenthesis);
                }
                Some(_) => {}
            }
        }

        if self.flattened > 0 {
            self.warn(ParseWarning::UnbalancedParenthesis);
        }
        self.join_adjacent(nodes)
    }

    fn join_adjacent(&self, mut nodes: Vec<Node>) -> Option<Node> {
        match nodes.len() {
            0 => None,
            1 => nodes.pop(),
            _ => Some(match self.options.default_operator {
                DefaultOperator::And => Node::And(nodes),
                DefaultOperator::Or => Node::Or(nodes),
            }),
        }
    }

    fn parse_or(&mut self, depth: usize) -> Option<Node> {
        let mut branches = Vec::new();
        loop {
            let branch = self.parse_and(depth);
            if let Some(branch) = branch {
                branches.push(branch);
            }

            if !matches!(self.peek(), Some(Lexeme::Or)) {
                break;
            }
            self.advance();
            self.explicit_boolean = true;
            if branches.is_empty() || !self.operand_follows() {
                self.warn(ParseWarning::DanglingOperator("OR".into()));
            }
        }

        match branches.len() {
            0 => None,
            1 => branches.pop(),
            _ => Some(Node::Or(branches)),
        }
    }

    fn parse_and(&mut self, depth: usize) -> Option<Node> {
        // Chains of explicitly AND-ed nodes, split at implicit adjacency
        let mut chains: Vec<Vec<Node>> = vec![Vec::new()];
        let mut explicit_and = false;

        loop {
            match self.peek() {
                None | Some(Lexeme::Or) => break,
                Some(Lexeme::Close) => {
                    if self.flattened > 0 {
                        self.flattened -= 1;
                        self.advance();
                        continue;
                    }
                    break;
                }
                Some(Lexeme::And) => {
                    self.advance();
                    self.explicit_boolean = true;
                    let has_left = chains.iter().any(|c| !c.is_empty());
                    if !has_left || !self.operand_follows() {
                        self.warn(ParseWarning::DanglingOperator("AND".into()));
                    }
                    explicit_and = true;
                }
                Some(_) => {
                    if let Some(node) = self.parse_unary(depth) {
                        let current_empty = chains.last().map_or(true, |c| c.is_empty());
                        let implicit_or = self.options.default_operator == DefaultOperator::Or
                            && !explicit_and
                            && !current_empty;
                        if implicit_or {
                            chains.push(Vec::new());
                        }
                        if let Some(chain) = chains.last_mut() {
                            chain.push(node);
                        }
                        explicit_and = false;
                    }
                }
            }
        }

        let mut chains: Vec<Node> = chains
            .into_iter()
            .filter_map(|mut chain| match chain.len() {
                0 => None,
                1 => chain.pop(),
                _ => Some(Node::And(chain)),
            })
            .collect();

        match chains.len() {
            0 => None,
            1 => chains.pop(),
            _ => Some(Node::Or(chains)),
        }
    }

    fn operand_follows(&self) -> bool {
        !matches!(
            self.peek(),
            None | Some(Lexeme::Or) | Some(Lexeme::And) | Some(Lexeme::Close)
        )
    }

    /// A run of prefixes folds into one negation parity and one `+` flag
    fn parse_unary(&mut self, depth: usize) -> Option<Node> {
        let mut negations = 0usize;
        let mut required = false;
        let mut last = None;
        loop {
            match self.peek() {
                Some(Lexeme::Not) | Some(Lexeme::Minus) => {
                    negations += 1;
                    last = Some("NOT");
                }
                Some(Lexeme::Plus) => {
                    required = true;
                    last = Some("+");
                }
                _ => break,
            }
            self.advance();
            self.explicit_boolean = true;
        }

        let Some(mut node) = self.parse_primary(depth) else {
            if let Some(operator) = last {
                self.warn(ParseWarning::DanglingOperator(operator.into()));
            }
            return None;
        };

        if required {
            node = Node::Required(Box::new(node));
        }
        if negations % 2 == 1 {
            node = Node::Not(Box::new(node));
        }
        Some(node)
    }

    fn parse_primary(&mut self, depth: usize) -> Option<Node> {
        while matches!(self.peek(), Some(Lexeme::Open)) && depth >= self.max_depth {
            self.advance();
            self.flattened += 1;
            if !self.depth_warned {
                self.depth_warned = true;
                self.warn(ParseWarning::DepthExceeded(self.max_depth));
            }
        }

        match self.peek()? {
            Lexeme::Open => {
                self.advance();
                self.explicit_boolean = true;
                let inner = self.parse_or(depth + 1);
                if matches!(self.peek(), Some(Lexeme::Close)) {
                    self.advance();
                } else {
                    self.warn(ParseWarning::UnbalancedParenthesis);
                }
                if inner.is_none() {
                    self.warn(ParseWarning::EmptyGroup);
                }
                inner
            }
            Lexeme::Word(_) | Lexeme::Phrase { .. } => match self.advance()? {
                Lexeme::Word(glyphs) => self.interpret_word(&glyphs),
                Lexeme::Phrase { field, text, suffix } => self.interpret_phrase(field, &text, &suffix),
                _ => None,
            },
            _ => None,
        }
    }

    fn interpret_word(&mut self, glyphs: &[Glyph]) -> Option<Node> {
        let raw: String = glyphs.iter().map(|(c, _)| *c).collect();
        let (field, rest) = split_field(glyphs);

        let modifier_start = rest
            .iter()
            .position(|(c, escaped)| !escaped && (*c == '~' || *c == '^'))
            .unwrap_or(rest.len());
        let (base, modifiers) = rest.split_at(modifier_start);

        let leading = base.iter().take_while(|(c, e)| *c == '*' && !e).count();
        let trailing = base[leading..]
            .iter()
            .rev()
            .take_while(|(c, e)| *c == '*' && !e)
            .count();
        let core = &base[leading..base.len() - trailing];
        let wildcard = match (leading > 0, trailing > 0) {
            (true, true) => Some(Wildcard::Contains),
            (true, false) => Some(Wildcard::Suffix),
            (false, true) => Some(Wildcard::Prefix),
            (false, false) => None,
        };

        let text = clean_text(core);
        if text.is_empty() {
            self.warn(ParseWarning::EmptyTerm(raw));
            return None;
        }

        if let Some(field) = field {
            if !is_searchable_field(&field) {
                if !FILTER_ONLY_FIELDS.contains(&field.as_str()) {
                    self.warn(ParseWarning::UnknownField(field.clone()));
                }
                return Some(Node::Filter {
                    field,
                    value: text,
                    prefix: wildcard == Some(Wildcard::Prefix),
                });
            }
            let mut term = self.modified_term(text, &raw, modifiers, false);
            term.wildcard = wildcard;
            term.field = Some(field);
            return Some(Node::Term(term));
        }

        let mut term = self.modified_term(text, &raw, modifiers, false);
        term.wildcard = wildcard;
        Some(Node::Term(term))
    }

    fn interpret_phrase(&mut self, field: Option<String>, text: &str, suffix: &[Glyph]) -> Option<Node> {
        let normalized = crate::text::normalize(text);
        if normalized.is_empty() {
            self.warn(ParseWarning::EmptyTerm(format!("\"{text}\"")));
            return None;
        }

        if let Some(field) = &field {
            if !is_searchable_field(field) {
                if !FILTER_ONLY_FIELDS.contains(&field.as_str()) {
                    self.warn(ParseWarning::UnknownField(field.clone()));
                }
                return Some(Node::Filter {
                    field: field.clone(),
                    value: normalized,
                    prefix: false,
                });
            }
        }

        let raw = format!("\"{text}\"");
        let mut term = self.modified_term(normalized, &raw, suffix, true);
        term.operator = TermOperator::Phrase;
        term.field = field;
        Some(Node::Term(term))
    }

    /// Apply `~N` and `^W` modifiers to a new term
    fn modified_term(&mut self, text: String, raw: &str, modifiers: &[Glyph], phrase: bool) -> QueryTerm {
        let mut term = QueryTerm::new(text);
        if phrase && self.options.phrase_slop > 0 {
            term.proximity = Some(self.options.phrase_slop);
        }

        let mut i = 0;
        while i < modifiers.len() {
            let marker = modifiers[i].0;
            let end = modifiers[i + 1..]
                .iter()
                .position(|(c, escaped)| !escaped && (*c == '~' || *c == '^'))
                .map(|p| i + 1 + p)
                .unwrap_or(modifiers.len());
            let value: String = modifiers[i + 1..end].iter().map(|(c, _)| *c).collect();

            let applied = match marker {
                '~' if phrase => match value.parse::<u32>() {
                    Ok(slop) => {
                        term.proximity = Some(slop);
                        true
                    }
                    Err(_) => false,
                },
                '~' if value.is_empty() => {
                    term.fuzzy = true;
                    term.fuzzy_distance = None;
                    true
                }
                '~' => match value.parse::<u8>() {
                    Ok(distance) => {
                        term.fuzzy = true;
                        term.fuzzy_distance = Some(distance);
                        true
                    }
                    Err(_) => false,
                },
                '^' => match value.parse::<f64>() {
                    Ok(boost) if boost.is_finite() && boost >= 0.0 => {
                        term.boost = boost;
                        true
                    }
                    _ => false,
                },
                _ => false,
            };

            if !applied {
                self.warn(ParseWarning::InvalidModifier {
                    term: raw.to_string(),
                    modifier: format!("{marker}{value}"),
                });
            }
            i = end;
        }

        term
    }
}

/// Split `field:value`; the field name must start with a letter
fn split_field(glyphs: &[Glyph]) -> (Option<String>, &[Glyph]) {
    let Some(colon) = glyphs.iter().position(|(c, escaped)| *c == ':' && !escaped) else {
        return (None, glyphs);
    };
    let name = &glyphs[..colon];
    let valid = !name.is_empty()
        && name[0].0.is_alphabetic()
        && name
            .iter()
            .all(|(c, escaped)| !escaped && (c.is_alphanumeric() || *c == '_'));
    if !valid || colon + 1 >= glyphs.len() {
        return (None, glyphs);
    }
    let field = name.iter().map(|(c, _)| c.to_ascii_lowercase()).collect();
    (Some(field), &glyphs[colon + 1..])
}

fn is_token_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '#' | '@' | '$')
}

/// Lowercase and strip leading/trailing punctuation; a signed number keeps its sign
fn clean_text(glyphs: &[Glyph]) -> String {
    let text: String = glyphs.iter().map(|(c, _)| *c).collect();
    if crate::text::is_negative_number(&text) {
        return text;
    }
    text.trim_matches(|c: char| !is_token_char(c)).to_lowercase()
}

fn is_searchable_field(field: &str) -> bool {
    DocumentField::from_name(field).is_some()
}

fn linearize(node: Node, ctx: Context, terms: &mut Vec<QueryTerm>, filters: &mut Vec<QueryFilter>) {
    match node {
        Node::Term(mut term) => {
            let prohibited = ctx.negations % 2 == 1;
            term.prohibited = prohibited;
            term.required = !prohibited && (ctx.plus || ctx.all_and);
            if term.operator != TermOperator::Phrase {
                term.operator = if prohibited {
                    TermOperator::Not
                } else if term.required {
                    TermOperator::And
                } else {
                    TermOperator::Or
                };
            }
            terms.push(term);
        }
        Node::Filter { field, value, prefix } => {
            let operator = if ctx.negations % 2 == 1 {
                FilterOperator::NotEquals
            } else if prefix {
                FilterOperator::Prefix
            } else {
                FilterOperator::Equals
            };
            filters.push(QueryFilter::new(field, operator, value));
        }
        Node::Not(inner) => linearize(
            *inner,
            Context {
                negations: ctx.negations + 1,
                ..ctx
            },
            terms,
            filters,
        ),
        Node::Required(inner) => linearize(*inner, Context { plus: true, ..ctx }, terms, filters),
        Node::And(children) => {
            for child in children {
                linearize(child, ctx, terms, filters);
            }
        }
        Node::Or(children) => {
            let inner = Context {
                negations: ctx.negations,
                all_and: false,
                plus: false,
            };
            for child in children {
                linearize(child, inner, terms, filters);
            }
        }
    }
}

fn classify(terms: &[QueryTerm], filters: &[QueryFilter], explicit_boolean: bool) -> QueryType {
    let has_phrase = terms.iter().any(|t| t.is_phrase());
    let has_field = !filters.is_empty() || terms.iter().any(|t| t.field.is_some());
    let kinds = [has_phrase, explicit_boolean, has_field]
        .iter()
        .filter(|k| **k)
        .count();

    if kinds >= 2 {
        QueryType::Mixed
    } else if has_phrase {
        QueryType::Phrase
    } else if explicit_boolean {
        QueryType::Boolean
    } else if has_field {
        QueryType::Field
    } else {
        QueryType::Simple
    }
}
