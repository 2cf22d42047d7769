//! Snippet windows and highlight spans

use std::collections::BTreeSet;

use super::models::Highlight;
use crate::models::{Document, DocumentField};
use crate::text::tokenize;

/// Highlighting settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnippetSettings {
    /// Window size in bytes
    pub length: usize,
    pub pre_tag: String,
    pub post_tag: String,
}

impl Default for SnippetSettings {
    fn default() -> Self {
        Self {
            length: 160,
            pre_tag: "<mark>".to_string(),
            post_tag: "</mark>".to_string(),
        }
    }
}

/// Byte spans of tokens (or compound parts) whose text is in `keys`
fn matched_spans(text: &str, keys: &BTreeSet<String>) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    for token in tokenize(text) {
        if keys.contains(&token.text) {
            spans.push((token.start, token.end));
            continue;
        }
        spans.extend(
            token
                .parts
                .iter()
                .filter(|part| keys.contains(&part.text))
                .map(|part| (part.start, part.end)),
        );
    }
    spans
}

fn floor_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Window of at most `length` bytes containing the most spans
///
/// Spans must be sorted by start. Returns byte bounds on char boundaries.
fn densest_window(text: &str, spans: &[(usize, usize)], length: usize) -> (usize, usize) {
    let mut best = (0, 0usize);
    for (i, &(start, _)) in spans.iter().enumerate() {
        let limit = start + length;
        let count = spans[i..].iter().take_while(|(_, end)| *end <= limit).count();
        if count > best.1 {
            best = (i, count);
        }
    }

    let (first, count) = best;
    let cluster_start = spans[first].0;
    let cluster_end = if count == 0 {
        spans[first].1
    } else {
        spans[first + count - 1].1
    };

    let slack = length.saturating_sub(cluster_end - cluster_start);
    let start = floor_boundary(text, cluster_start.saturating_sub(slack / 2));
    let end = floor_boundary(text, start + length).max(cluster_end.min(text.len()));
    (start, end)
}

/// Highlights for one field, empty when nothing in it matched
pub fn field_highlights(
    document: &Document,
    field: DocumentField,
    keys: &BTreeSet<String>,
    settings: &SnippetSettings,
) -> Vec<Highlight> {
    let text = document.field_text(field);
    let spans = matched_spans(&text, keys);
    if spans.is_empty() {
        return Vec::new();
    }

    let (start, end) = densest_window(&text, &spans, settings.length.max(1));
    let inside: Vec<(usize, usize)> = spans
        .into_iter()
        .filter(|&(s, e)| s >= start && e <= end)
        .collect();

    let mut context = String::with_capacity(end - start + inside.len() * 13);
    let mut cursor = start;
    for &(s, e) in &inside {
        context.push_str(&text[cursor..s]);
        context.push_str(&settings.pre_tag);
        context.push_str(&text[s..e]);
        context.push_str(&settings.post_tag);
        cursor = e;
    }
    context.push_str(&text[cursor..end]);

    inside
        .into_iter()
        .map(|(s, e)| Highlight {
            field,
            start: s,
            end: e,
            text: text[s..e].to_string(),
            context: context.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(words: &[&str]) -> BTreeSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_marks_matched_tokens() {
        let doc = Document::new("kb-1", "VSAM Status 35 on open", "", "", "");
        let highlights = field_highlights(&doc, DocumentField::Title, &keys(&["vsam", "35"]), &SnippetSettings::default());

        assert_eq!(highlights.len(), 2);
        assert_eq!(highlights[0].text, "VSAM");
        assert_eq!((highlights[0].start, highlights[0].end), (0, 4));
        assert_eq!(highlights[1].text, "35");
        assert_eq!(highlights[0].context, "<mark>VSAM</mark> Status <mark>35</mark> on open");
    }

    #[test]
    fn test_compound_parts_are_marked() {
        let doc = Document::new("kb-2", "Submit gives JCL-ERROR", "", "", "");
        let highlights = field_highlights(&doc, DocumentField::Title, &keys(&["error"]), &SnippetSettings::default());

        assert_eq!(highlights.len(), 1);
        assert_eq!(highlights[0].text, "ERROR");
        assert!(highlights[0].context.ends_with("JCL-<mark>ERROR</mark>"));
    }

    #[test]
    fn test_window_follows_densest_cluster() {
        let filler = "lorem ipsum ".repeat(30);
        let problem = format!("abend once {filler} abend abend abend here");
        let doc = Document::new("kb-3", "", problem, "", "");
        let settings = SnippetSettings {
            length: 40,
            ..SnippetSettings::default()
        };

        let highlights = field_highlights(&doc, DocumentField::Problem, &keys(&["abend"]), &settings);
        assert_eq!(highlights.len(), 3);
        assert!(highlights.iter().all(|h| h.start > 100));
        assert!(highlights[0].context.len() <= 40 + 3 * 13);
    }

    #[test]
    fn test_window_is_char_boundary_safe() {
        let problem = format!("{} vsam {}", "é".repeat(50), "ü".repeat(50));
        let doc = Document::new("kb-4", "", problem, "", "");
        let settings = SnippetSettings {
            length: 21,
            ..SnippetSettings::default()
        };

        let highlights = field_highlights(&doc, DocumentField::Problem, &keys(&["vsam"]), &settings);
        assert_eq!(highlights.len(), 1);
        assert!(highlights[0].context.contains("<mark>vsam</mark>"));
    }

    #[test]
    fn test_no_match_no_highlight() {
        let doc = Document::new("kb-5", "Title", "", "", "");
        assert!(field_highlights(&doc, DocumentField::Title, &keys(&["vsam"]), &SnippetSettings::default()).is_empty());
    }
}
