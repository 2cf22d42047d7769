//! Field weights and ranking profiles

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::models::DocumentField;
use crate::query::ParsedQuery;

/// Abend codes: system `S0C7`, `SB37`; user `U4038`
static ABEND_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(s[0-9a-f]{3}|u\d{4})$").expect("abend pattern is valid"));

/// Message identifiers: `IEF450I`, `DFHAC2001`, `IGD17101I`
static MESSAGE_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z]{3}[a-z]{0,3}\d{3,5}[a-z]?$").expect("message id pattern is valid")
});

/// SQL codes: `-911`, `sqlcode`, `sqlstate`
static SQL_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(-\d{3,4}|sqlcode|sqlstate|sqlcode-?\d+)$").expect("sql code pattern is valid")
});

const DOMAIN_KEYWORDS: &[&str] = &[
    "jcl", "cobol", "cics", "db2", "vsam", "ims", "abend", "dataset", "jes", "jes2", "tso",
    "ispf", "racf", "sms", "idcams", "iefbr14", "proc", "proclib", "sysout", "syslog",
    "copybook", "mainframe", "zos", "z/os", "mvs", "batch", "gdg",
];

/// Queries with at least this many positive terms favour recall
const RECALL_TERM_COUNT: usize = 4;

/// A single term up to this length is treated as an identifier lookup
const SHORT_TERM_LENGTH: usize = 4;

/// Per-field multipliers plus weights of the non-lexical signals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingWeights {
    pub title: f64,
    pub problem: f64,
    pub solution: f64,
    pub tags: f64,
    pub category: f64,
    pub usage: f64,
    pub recency: f64,
    pub success_rate: f64,
}

impl RankingWeights {
    pub fn field(&self, field: DocumentField) -> f64 {
        match field {
            DocumentField::Title => self.title,
            DocumentField::Problem => self.problem,
            DocumentField::Solution => self.solution,
            DocumentField::Tags => self.tags,
            DocumentField::Category => self.category,
        }
    }
}

impl Default for RankingWeights {
    fn default() -> Self {
        RankingProfile::Balanced.weights()
    }
}

/// Named weight sets
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RankingProfile {
    #[default]
    Balanced,
    /// Identifier lookups; title and tags dominate
    Precision,
    /// Long queries; fields weighted evenly
    Recall,
    /// Mainframe vocabulary; tags and category count more
    DomainFocused,
}

impl RankingProfile {
    pub fn weights(self) -> RankingWeights {
        let (title, problem, solution, tags, category, usage, recency, success_rate) = match self {
            RankingProfile::Balanced => (3.0, 2.0, 1.5, 2.0, 1.0, 0.1, 0.05, 0.15),
            RankingProfile::Precision => (4.0, 2.0, 1.0, 3.0, 1.5, 0.05, 0.02, 0.1),
            RankingProfile::Recall => (2.0, 2.0, 2.0, 1.5, 1.0, 0.15, 0.05, 0.15),
            RankingProfile::DomainFocused => (3.0, 2.5, 1.5, 3.5, 2.5, 0.1, 0.05, 0.2),
        };
        RankingWeights {
            title,
            problem,
            solution,
            tags,
            category,
            usage,
            recency,
            success_rate,
        }
    }

    /// Pick a profile from the shape of the query
    pub fn select(parsed: &ParsedQuery) -> Self {
        let terms: Vec<&str> = parsed.positive_terms().map(|t| t.text.as_str()).collect();
        if terms.is_empty() {
            return RankingProfile::Balanced;
        }

        let words: Vec<&str> = terms
            .iter()
            .flat_map(|t| t.split_whitespace())
            .collect();

        let identifier = words.iter().any(|w| is_system_identifier(w));
        let single_short = terms.len() == 1 && terms[0].chars().count() <= SHORT_TERM_LENGTH;
        if identifier || single_short {
            RankingProfile::Precision
        } else if terms.len() >= RECALL_TERM_COUNT {
            RankingProfile::Recall
        } else if words.iter().any(|w| DOMAIN_KEYWORDS.contains(w)) {
            RankingProfile::DomainFocused
        } else {
            RankingProfile::Balanced
        }
    }
}

/// Abend code, message id or SQL code
pub fn is_system_identifier(term: &str) -> bool {
    let term = term.to_lowercase();
    let abend = ABEND_CODE.is_match(&term) && term.bytes().any(|b| b.is_ascii_digit());
    abend || MESSAGE_ID.is_match(&term) || SQL_CODE.is_match(&term)
}
