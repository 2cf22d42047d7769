//! Query lexer
//!
//! Splits on whitespace while keeping quoted spans and parentheses as their
//! own lexemes. Backslash-escaped characters are carried with an `escaped`
//! flag so later stages never treat them as syntax.

use super::models::ParseWarning;

/// A character and whether it was escaped
pub(crate) type Glyph = (char, bool);

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Lexeme {
    Open,
    Close,
    And,
    Or,
    Not,
    Plus,
    Minus,
    Word(Vec<Glyph>),
    Phrase {
        field: Option<String>,
        text: String,
        suffix: Vec<Glyph>,
    },
}

pub(crate) struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    warnings: &'a mut Vec<ParseWarning>,
}

impl<'a> Lexer<'a> {
    pub(crate) fn new(input: &str, warnings: &'a mut Vec<ParseWarning>) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            warnings,
        }
    }

    pub(crate) fn tokenize(mut self) -> Vec<Lexeme> {
        let mut lexemes = Vec::new();

        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += 1;
                continue;
            }

            match c {
                '(' => {
                    self.pos += 1;
                    lexemes.push(Lexeme::Open);
                }
                ')' => {
                    self.pos += 1;
                    lexemes.push(Lexeme::Close);
                }
                '"' => lexemes.push(self.read_phrase(None)),
                '+' | '-' | '!' if self.prefix_applies() => {
                    if c == '-' && self.negative_number_follows() {
                        lexemes.push(self.read_word());
                    } else {
                        self.pos += 1;
                        lexemes.push(match c {
                            '+' => Lexeme::Plus,
                            '-' => Lexeme::Minus,
                            _ => Lexeme::Not,
                        });
                    }
                }
                '+' | '-' => {
                    self.pos += 1;
                    self.warnings
                        .push(ParseWarning::DanglingOperator(c.to_string()));
                }
                '!' => {
                    self.pos += 1;
                    lexemes.push(Lexeme::Not);
                }
                '&' if self.peek_at(1) == Some('&') => {
                    self.pos += 2;
                    lexemes.push(Lexeme::And);
                }
                '|' if self.peek_at(1) == Some('|') => {
                    self.pos += 2;
                    lexemes.push(Lexeme::Or);
                }
                _ => {
                    let lexeme = self.read_word();
                    lexemes.push(keyword(lexeme));
                }
            }
        }

        lexemes
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    /// A prefix operator must be glued to what follows
    fn prefix_applies(&self) -> bool {
        matches!(self.peek_at(1), Some(next) if !next.is_whitespace() && next != ')')
    }

    /// `-911`: a minus followed only by digits up to the end of the word
    fn negative_number_follows(&self) -> bool {
        let mut offset = 1;
        let mut digits = 0;
        while let Some(c) = self.peek_at(offset) {
            if c.is_ascii_digit() {
                digits += 1;
            } else if c.is_whitespace() || c == ')' || c == '(' {
                break;
            } else {
                return false;
            }
            offset += 1;
        }
        digits > 0
    }

    fn read_word(&mut self) -> Lexeme {
        let mut glyphs: Vec<Glyph> = Vec::new();

        while let Some(c) = self.peek() {
            if c == '\\' {
                self.pos += 1;
                if let Some(escaped) = self.peek() {
                    glyphs.push((escaped, true));
                    self.pos += 1;
                }
                continue;
            }
            if c.is_whitespace() || c == '(' || c == ')' {
                break;
            }
            if c == '"' {
                if let Some(field) = field_prefix(&glyphs) {
                    return self.read_phrase(Some(field));
                }
                break;
            }
            glyphs.push((c, false));
            self.pos += 1;
        }

        Lexeme::Word(glyphs)
    }

    fn read_phrase(&mut self, field: Option<String>) -> Lexeme {
        let start = self.pos;
        self.pos += 1;

        let mut text = String::new();
        let mut terminated = false;
        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                '\\' => {
                    if let Some(escaped) = self.peek() {
                        text.push(escaped);
                        self.pos += 1;
                    }
                }
                '"' => {
                    terminated = true;
                    break;
                }
                _ => text.push(c),
            }
        }

        if !terminated {
            self.warnings.push(ParseWarning::UnterminatedQuote(start));
        }

        let mut suffix = Vec::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == '(' || c == ')' || c == '"' {
                break;
            }
            suffix.push((c, false));
            self.pos += 1;
        }

        Lexeme::Phrase { field, text, suffix }
    }
}

/// `field:` at the end of the glyphs read so far, for `field:"a phrase"`
fn field_prefix(glyphs: &[Glyph]) -> Option<String> {
    let (last, escaped) = glyphs.last()?;
    if *last != ':' || *escaped || glyphs.len() < 2 {
        return None;
    }
    let name = &glyphs[..glyphs.len() - 1];
    let valid = name[0].0.is_alphabetic()
        && name
            .iter()
            .all(|(c, escaped)| !escaped && (c.is_alphanumeric() || *c == '_'));
    valid.then(|| name.iter().map(|(c, _)| c.to_ascii_lowercase()).collect())
}

fn keyword(lexeme: Lexeme) -> Lexeme {
    let Lexeme::Word(glyphs) = &lexeme else {
        return lexeme;
    };
    if glyphs.iter().any(|(_, escaped)| *escaped) {
        return lexeme;
    }
    let word: String = glyphs.iter().map(|(c, _)| c.to_ascii_uppercase()).collect();
    match word.as_str() {
        "AND" => Lexeme::And,
        "OR" => Lexeme::Or,
        "NOT" => Lexeme::Not,
        _ => lexeme,
    }
}
