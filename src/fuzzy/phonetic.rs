//! Phonetic codes (Soundex, Metaphone)
//!
//! Only ASCII letters contribute to a code; digits and punctuation are
//! dropped, so `S0C7` encodes like `SC`.

use super::algorithms::levenshtein_similarity;

const SOUNDEX_LENGTH: usize = 4;
const METAPHONE_MAX_LENGTH: usize = 4;

fn ascii_letters(word: &str) -> Vec<char> {
    word.chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn is_vowel(c: char) -> bool {
    matches!(c, 'A' | 'E' | 'I' | 'O' | 'U')
}

fn soundex_digit(c: char) -> Option<char> {
    match c {
        'B' | 'F' | 'P' | 'V' => Some('1'),
        'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => Some('2'),
        'D' | 'T' => Some('3'),
        'L' => Some('4'),
        'M' | 'N' => Some('5'),
        'R' => Some('6'),
        _ => None,
    }
}

/// American Soundex: first letter plus three digits, zero padded
///
/// Returns an empty string when the word has no ASCII letters.
pub fn soundex(word: &str) -> String {
    let letters = ascii_letters(word);
    let Some(&first) = letters.first() else {
        return String::new();
    };

    let mut code = String::with_capacity(SOUNDEX_LENGTH);
    code.push(first);
    let mut last = soundex_digit(first);

    for &c in &letters[1..] {
        // H and W do not separate letters with the same code
        if matches!(c, 'H' | 'W') {
            continue;
        }
        match soundex_digit(c) {
            Some(digit) => {
                if last != Some(digit) {
                    code.push(digit);
                    if code.len() == SOUNDEX_LENGTH {
                        break;
                    }
                }
                last = Some(digit);
            }
            None => last = None,
        }
    }

    while code.len() < SOUNDEX_LENGTH {
        code.push('0');
    }
    code
}

/// Simplified original Metaphone, truncated to four symbols
pub fn metaphone(word: &str) -> String {
    let w = ascii_letters(word);
    if w.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    let mut i = 0;

    match (w[0], w.get(1).copied()) {
        ('K' | 'G' | 'P', Some('N')) | ('W', Some('R')) => i = 1,
        ('A', Some('E')) => {
            out.push('E');
            i = 2;
        }
        ('X', _) => {
            out.push('S');
            i = 1;
        }
        ('W', Some('H')) => {
            out.push('W');
            i = 2;
        }
        _ => {}
    }

    while i < w.len() && out.len() < METAPHONE_MAX_LENGTH {
        let c = w[i];
        let prev = if i > 0 { Some(w[i - 1]) } else { None };
        let next = w.get(i + 1).copied();
        let next2 = w.get(i + 2).copied();
        let next_is_vowel = next.is_some_and(is_vowel);

        if prev == Some(c) && c != 'C' {
            i += 1;
            continue;
        }

        match c {
            'A' | 'E' | 'I' | 'O' | 'U' => {
                if i == 0 {
                    out.push(c);
                }
            }
            'B' => {
                if !(prev == Some('M') && next.is_none()) {
                    out.push('B');
                }
            }
            'C' => {
                if next == Some('I') && next2 == Some('A') {
                    out.push('X');
                } else if next == Some('H') {
                    out.push(if prev == Some('S') { 'K' } else { 'X' });
                    i += 1;
                } else if matches!(next, Some('I' | 'E' | 'Y')) {
                    if prev != Some('S') {
                        out.push('S');
                    }
                } else {
                    out.push('K');
                }
            }
            'D' => {
                if next == Some('G') && matches!(next2, Some('E' | 'I' | 'Y')) {
                    out.push('J');
                    i += 1;
                } else {
                    out.push('T');
                }
            }
            'G' => {
                if next == Some('H') {
                    if i == 0 {
                        out.push('K');
                    }
                    i += 1;
                } else if next == Some('N') && (next2.is_none() || (next2 == Some('E') && w.get(i + 3) == Some(&'D'))) {
                    // silent in -GN and -GNED
                } else if matches!(next, Some('I' | 'E' | 'Y')) {
                    out.push('J');
                } else {
                    out.push('K');
                }
            }
            'H' => {
                if next_is_vowel && !matches!(prev, Some('C' | 'S' | 'P' | 'T' | 'G')) {
                    out.push('H');
                }
            }
            'K' => {
                if prev != Some('C') {
                    out.push('K');
                }
            }
            'P' => {
                if next == Some('H') {
                    out.push('F');
                    i += 1;
                } else {
                    out.push('P');
                }
            }
            'Q' => out.push('K'),
            'S' => {
                if next == Some('H') {
                    out.push('X');
                    i += 1;
                } else if next == Some('I') && matches!(next2, Some('O' | 'A')) {
                    out.push('X');
                } else {
                    out.push('S');
                }
            }
            'T' => {
                if next == Some('I') && matches!(next2, Some('O' | 'A')) {
                    out.push('X');
                } else if next == Some('H') {
                    out.push('0');
                    i += 1;
                } else if !(next == Some('C') && next2 == Some('H')) {
                    out.push('T');
                }
            }
            'V' => out.push('F'),
            'W' | 'Y' => {
                if next_is_vowel {
                    out.push(c);
                }
            }
            'X' => {
                out.push('K');
                out.push('S');
            }
            'Z' => out.push('S'),
            'F' | 'J' | 'L' | 'M' | 'N' | 'R' => out.push(c),
            _ => {}
        }
        i += 1;
    }

    out.truncate(METAPHONE_MAX_LENGTH);
    out
}

/// Similarity of two phonetic codes
///
/// Identical codes score 1.0; otherwise the codes are compared by edit
/// distance. Words with no encodable letters carry no phonetic signal.
pub fn code_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    levenshtein_similarity(a, b)
}
