//! Domain-aware tokenization
//!
//! Mainframe knowledge entries are full of identifiers that a naive
//! whitespace/punctuation splitter would destroy: abend codes (`S0C7`),
//! message ids (`IEF450I`), dataset names (`SYS1.PROCLIB`) and hyphenated
//! error codes (`JCL-ERROR`). A token keeps such an identifier whole and also
//! exposes its parts, so both `jcl-error` and `error` find it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\p{L}\p{N}#@$]+(?:[-_.][\p{L}\p{N}#@$]+)*").expect("token pattern is valid")
});

/// A token with byte offsets into the original text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Lowercased token text
    pub text: String,

    /// Byte offset of the first character
    pub start: usize,

    /// Byte offset one past the last character
    pub end: usize,

    /// Components of a compound token (empty for simple tokens)
    pub parts: Vec<Token>,
}

impl Token {
    fn leaf(original: &str, start: usize, end: usize) -> Self {
        Self {
            text: original.to_lowercase(),
            start,
            end,
            parts: Vec::new(),
        }
    }

    /// Whether this token was joined with `-`, `_` or `.`
    pub fn is_compound(&self) -> bool {
        !self.parts.is_empty()
    }
}

/// Trim, lowercase and collapse internal whitespace
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split text into tokens, keeping compound identifiers whole
pub fn tokenize(text: &str) -> Vec<Token> {
    TOKEN_PATTERN
        .find_iter(text)
        .map(|m| {
            if let Some(start) = negative_number_start(text, m.start(), m.as_str()) {
                let mut token = Token::leaf(&text[start..m.end()], start, m.end());
                token.parts = vec![Token::leaf(m.as_str(), m.start(), m.end())];
                return token;
            }
            let mut token = Token::leaf(m.as_str(), m.start(), m.end());
            token.parts = split_parts(m.as_str(), m.start());
            token
        })
        .collect()
}

/// Start of a signed number such as the SQL code `-911`
///
/// The sign only counts when it opens a word, so `abc-911` stays a compound.
fn negative_number_start(text: &str, start: usize, digits: &str) -> Option<usize> {
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let sign = start.checked_sub(1)?;
    if text.as_bytes()[sign] != b'-' {
        return None;
    }
    let opens_word = text[..sign]
        .chars()
        .next_back()
        .map_or(true, |c| !(c.is_alphanumeric() || matches!(c, '#' | '@' | '$' | '-' | '_' | '.')));
    opens_word.then_some(sign)
}

/// Whether `text` is a signed integer like `-911`
pub fn is_negative_number(text: &str) -> bool {
    text.strip_prefix('-')
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

fn split_parts(slice: &str, base: usize) -> Vec<Token> {
    let mut parts = Vec::new();
    let mut start = 0;

    for (i, c) in slice.char_indices() {
        if matches!(c, '-' | '_' | '.') {
            if i > start {
                parts.push(Token::leaf(&slice[start..i], base + start, base + i));
            }
            start = i + c.len_utf8();
        }
    }
    if start < slice.len() {
        parts.push(Token::leaf(&slice[start..], base + start, base + slice.len()));
    }

    if parts.len() < 2 {
        parts.clear();
    }
    parts
}

/// Every key a field should be indexed under: whole tokens plus compound parts
pub fn index_terms(text: &str) -> Vec<String> {
    let mut terms = Vec::new();
    for token in tokenize(text) {
        for part in &token.parts {
            if part.text != token.text {
                terms.push(part.text.clone());
            }
        }
        terms.push(token.text);
    }
    terms
}

/// Flat sequence of parts used for phrase matching
pub fn part_sequence(text: &str) -> Vec<String> {
    let mut sequence = Vec::new();
    for token in tokenize(text) {
        if token.is_compound() {
            sequence.extend(token.parts.into_iter().map(|p| p.text));
        } else {
            sequence.push(token.text);
        }
    }
    sequence
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  VSAM   Status\tCode 35 "), "vsam status code 35");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_identifiers_stay_whole() {
        let tokens = tokenize("Job failed with S0C7 after IEF450I in SYS1.PROCLIB");
        let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["job", "failed", "with", "s0c7", "after", "ief450i", "in", "sys1.proclib"]
        );
    }

    #[test]
    fn test_compound_parts_have_offsets() {
        let text = "See JCL-ERROR now";
        let tokens = tokenize(text);
        let compound = &tokens[1];

        assert_eq!(compound.text, "jcl-error");
        assert_eq!(&text[compound.start..compound.end], "JCL-ERROR");
        assert_eq!(compound.parts.len(), 2);
        assert_eq!(&text[compound.parts[1].start..compound.parts[1].end], "ERROR");
    }

    #[test]
    fn test_sentence_punctuation_is_not_part_of_token() {
        let tokens = tokenize("Restart the VSAM. Then retry.");
        assert_eq!(tokens[2].text, "vsam");
        assert!(!tokens[2].is_compound());
    }

    #[test]
    fn test_sql_code_keeps_its_sign() {
        let tokens = tokenize("DB2 SQLCODE -911 deadlock");
        assert_eq!(tokens[2].text, "-911");
        assert_eq!(tokens[2].start, 12);
        assert_eq!(tokens[2].parts[0].text, "911");

        let terms = index_terms("SQLCODE=-911");
        assert!(terms.contains(&"-911".to_string()));
        assert!(terms.contains(&"911".to_string()));

        assert_eq!(tokenize("abc-911")[0].text, "abc-911");
        assert!(is_negative_number("-911"));
        assert!(!is_negative_number("-"));
        assert!(!is_negative_number("-9a"));
    }

    #[test]
    fn test_index_terms_include_parts() {
        let terms = index_terms("JCL-ERROR");
        assert!(terms.contains(&"jcl-error".to_string()));
        assert!(terms.contains(&"jcl".to_string()));
        assert!(terms.contains(&"error".to_string()));
    }

    #[test]
    fn test_part_sequence_splits_compounds() {
        assert_eq!(part_sequence("JCL-ERROR on step"), vec!["jcl", "error", "on", "step"]);
    }
}
