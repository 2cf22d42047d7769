//! Query language
//!
//! Boolean operators, phrases, field terms, fuzzy/boost modifiers and
//! wildcards compiled into a flat [`ParsedQuery`].

mod lexer;
mod models;
mod parser;

pub use models::{
    DefaultOperator, FilterOperator, ParseWarning, ParsedQuery, QueryFilter, QueryOptions,
    QueryTerm, QueryType, SearchTerms, TermOperator, ValidationResult, Wildcard,
};
pub use parser::{QueryConfig, QueryParser, DEFAULT_MAX_DEPTH, DEFAULT_MAX_QUERY_LENGTH};
