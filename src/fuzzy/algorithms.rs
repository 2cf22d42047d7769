//! Edit-distance and character-similarity algorithms
//!
//! All functions work on `char`s, not bytes, so accented text and non-ASCII
//! identifiers are measured correctly. Inputs are expected to be normalized
//! (lowercased, trimmed) by the caller.

use std::collections::HashMap;

use super::models::{Transformation, TransformationKind};

/// Jaro score below which the Winkler prefix bonus is not applied
pub const WINKLER_BOOST_THRESHOLD: f64 = 0.7;

/// Longest common prefix the Winkler bonus rewards
pub const WINKLER_PREFIX_CAP: usize = 4;

/// Winkler prefix scaling factor
pub const WINKLER_SCALING: f64 = 0.1;

/// Classic Levenshtein distance (insert, delete, substitute)
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let b_len = b_chars.len();

    let mut dp: Vec<usize> = (0..=b_len).collect();
    for (i, ac) in a.chars().enumerate() {
        let mut prev = dp[0];
        dp[0] = i + 1;

        for (j, &bc) in b_chars.iter().enumerate() {
            let temp = dp[j + 1];
            let cost = if ac == bc { 0 } else { 1 };
            dp[j + 1] = (dp[j + 1] + 1).min(dp[j] + 1).min(prev + cost);
            prev = temp;
        }
    }

    dp[b_len]
}

/// Damerau-Levenshtein distance with unrestricted adjacent transpositions
///
/// Uses the Lowrance-Wagner formulation: a `(m+2)x(n+2)` matrix whose first
/// row and column hold a `m + n` sentinel, plus a last-seen table per
/// character. Unlike optimal string alignment this is a true metric.
pub fn damerau_levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (m, n) = (a.len(), b.len());

    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let sentinel = m + n;
    let mut d = vec![vec![0usize; n + 2]; m + 2];
    d[0][0] = sentinel;
    for i in 0..=m {
        d[i + 1][0] = sentinel;
        d[i + 1][1] = i;
    }
    for j in 0..=n {
        d[0][j + 1] = sentinel;
        d[1][j + 1] = j;
    }

    let mut last_row: HashMap<char, usize> = HashMap::new();
    for i in 1..=m {
        let mut last_match_col = 0;
        for j in 1..=n {
            let i1 = last_row.get(&b[j - 1]).copied().unwrap_or(0);
            let j1 = last_match_col;
            let cost = if a[i - 1] == b[j - 1] {
                last_match_col = j;
                0
            } else {
                1
            };

            d[i + 1][j + 1] = (d[i][j] + cost)
                .min(d[i + 1][j] + 1)
                .min(d[i][j + 1] + 1)
                .min(d[i1][j1] + (i - i1 - 1) + 1 + (j - j1 - 1));
        }
        last_row.insert(a[i - 1], i);
    }

    d[m + 1][n + 1]
}

/// Turn an edit distance into a similarity in `[0, 1]`
pub fn distance_similarity(distance: usize, a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    (1.0 - distance as f64 / max_len as f64).max(0.0)
}

/// `1 - levenshtein / max(len)`
pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    distance_similarity(levenshtein(a, b), a, b)
}

/// Jaro similarity
pub fn jaro(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (m, n) = (a.len(), b.len());

    if m == 0 && n == 0 {
        return 1.0;
    }
    if m == 0 || n == 0 {
        return 0.0;
    }

    let window = (m.max(n) / 2).saturating_sub(1);
    let mut a_matched = vec![false; m];
    let mut b_matched = vec![false; n];
    let mut matches = 0usize;

    for i in 0..m {
        let lo = i.saturating_sub(window);
        let hi = (i + window + 1).min(n);
        for j in lo..hi {
            if !b_matched[j] && a[i] == b[j] {
                a_matched[i] = true;
                b_matched[j] = true;
                matches += 1;
                break;
            }
        }
    }

    if matches == 0 {
        return 0.0;
    }

    let mut transpositions = 0usize;
    let mut k = 0usize;
    for i in 0..m {
        if a_matched[i] {
            while !b_matched[k] {
                k += 1;
            }
            if a[i] != b[k] {
                transpositions += 1;
            }
            k += 1;
        }
    }

    let matches = matches as f64;
    let half_transpositions = transpositions as f64 / 2.0;
    (matches / m as f64 + matches / n as f64 + (matches - half_transpositions) / matches) / 3.0
}

/// Jaro-Winkler similarity: Jaro plus a bonus for a shared prefix
pub fn jaro_winkler(a: &str, b: &str) -> f64 {
    let base = jaro(a, b);
    if base < WINKLER_BOOST_THRESHOLD {
        return base;
    }

    let prefix = a
        .chars()
        .zip(b.chars())
        .take(WINKLER_PREFIX_CAP)
        .take_while(|(x, y)| x == y)
        .count();

    (base + prefix as f64 * WINKLER_SCALING * (1.0 - base)).min(1.0)
}

/// One minimal edit script turning `a` into `b`
///
/// Backtraces an optimal-string-alignment matrix, so adjacent swaps are
/// reported as a single transposition. Positions refer to `a`.
pub fn edit_script(a: &str, b: &str) -> Vec<Transformation> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (m, n) = (a.len(), b.len());

    let mut d = vec![vec![0usize; n + 1]; m + 1];
    for (i, row) in d.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=n {
        d[0][j] = j;
    }
    for i in 1..=m {
        for j in 1..=n {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            let mut best = (d[i - 1][j] + 1).min(d[i][j - 1] + 1).min(d[i - 1][j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                best = best.min(d[i - 2][j - 2] + 1);
            }
            d[i][j] = best;
        }
    }

    let mut script = Vec::new();
    let (mut i, mut j) = (m, n);
    while i > 0 || j > 0 {
        if i > 1
            && j > 1
            && a[i - 1] == b[j - 2]
            && a[i - 2] == b[j - 1]
            && a[i - 1] != b[j - 1]
            && d[i][j] == d[i - 2][j - 2] + 1
        {
            script.push(Transformation {
                kind: TransformationKind::Transposition,
                position: i - 2,
                from: Some(a[i - 2]),
                to: Some(a[i - 1]),
            });
            i -= 2;
            j -= 2;
            continue;
        }

        if i > 0 && j > 0 {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            if d[i][j] == d[i - 1][j - 1] + cost {
                if cost == 1 {
                    script.push(Transformation {
                        kind: TransformationKind::Substitution,
                        position: i - 1,
                        from: Some(a[i - 1]),
                        to: Some(b[j - 1]),
                    });
                }
                i -= 1;
                j -= 1;
                continue;
            }
        }

        if i > 0 && d[i][j] == d[i - 1][j] + 1 {
            script.push(Transformation {
                kind: TransformationKind::Deletion,
                position: i - 1,
                from: Some(a[i - 1]),
                to: None,
            });
            i -= 1;
        } else {
            script.push(Transformation {
                kind: TransformationKind::Insertion,
                position: i,
                from: None,
                to: Some(b[j - 1]),
            });
            j -= 1;
        }
    }

    script.reverse();
    script
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("vsam", "vsam"), 0);
        assert_eq!(levenshtein("databse", "database"), 1);
    }

    #[test]
    fn test_levenshtein_unicode() {
        assert_eq!(levenshtein("cafe", "café"), 1);
    }

    #[test]
    fn test_damerau_counts_transposition_once() {
        assert_eq!(damerau_levenshtein("ca", "ac"), 1);
        assert_eq!(levenshtein("ca", "ac"), 2);
        assert_eq!(damerau_levenshtein("ca", "abc"), 2);
        assert_eq!(damerau_levenshtein("cobol", "cbool"), 1);
        assert_eq!(damerau_levenshtein("", "jcl"), 3);
    }

    #[test]
    fn test_jaro_reference_values() {
        assert!((jaro("martha", "marhta") - 0.944).abs() < 0.001);
        assert!((jaro("dixon", "dicksonx") - 0.767).abs() < 0.001);
        assert_eq!(jaro("abc", "xyz"), 0.0);
        assert_eq!(jaro("", ""), 1.0);
    }

    #[test]
    fn test_jaro_winkler_reference_values() {
        assert!((jaro_winkler("martha", "marhta") - 0.961).abs() < 0.001);
        assert!((jaro_winkler("dixon", "dicksonx") - 0.813).abs() < 0.001);
    }

    #[test]
    fn test_jaro_winkler_not_boosted_below_threshold() {
        let a = "abcdxyz";
        let b = "abcdqrs";
        let base = jaro(a, b);
        if base < WINKLER_BOOST_THRESHOLD {
            assert_eq!(jaro_winkler(a, b), base);
        }
    }

    #[test]
    fn test_edit_script_operations() {
        let script = edit_script("databse", "database");
        assert_eq!(script.len(), 1);
        assert_eq!(script[0].kind, TransformationKind::Insertion);
        assert_eq!(script[0].to, Some('a'));

        let script = edit_script("cbool", "cobol");
        assert_eq!(script.len(), 1);
        assert_eq!(script[0].kind, TransformationKind::Transposition);

        let script = edit_script("vsam", "vsom");
        assert_eq!(script[0].kind, TransformationKind::Substitution);
        assert_eq!(script[0].position, 2);

        assert!(edit_script("same", "same").is_empty());
    }

    #[test]
    fn test_distance_similarity_bounds() {
        assert_eq!(distance_similarity(0, "", ""), 1.0);
        assert_eq!(levenshtein_similarity("abc", "xyz"), 0.0);
        assert!((levenshtein_similarity("databse", "database") - 0.875).abs() < 1e-9);
    }
}
