//! BM25 term weighting and the non-lexical blend

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::weights::RankingWeights;
use crate::models::Document;

/// Success signal used when a document has no feedback yet
const UNKNOWN_SUCCESS_RATE: f64 = 0.5;

/// BM25 saturation and length normalization parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25 {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25 {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

impl Bm25 {
    /// `ln(1 + (N - n + 0.5) / (n + 0.5))`; always positive
    pub fn idf(&self, document_count: usize, document_frequency: usize) -> f64 {
        let n = document_frequency as f64;
        let total = document_count as f64;
        (1.0 + (total - n + 0.5) / (n + 0.5)).ln()
    }

    /// Saturated term frequency with length normalization
    pub fn term_weight(&self, frequency: u32, length: u32, average_length: f64) -> f64 {
        if frequency == 0 {
            return 0.0;
        }
        let tf = frequency as f64;
        let relative = if average_length > 0.0 {
            length as f64 / average_length
        } else {
            1.0
        };
        tf * (self.k1 + 1.0) / (tf + self.k1 * (1.0 - self.b + self.b * relative))
    }
}

/// Usage, success and recency signals in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signals {
    pub usage: f64,
    pub success: f64,
    pub recency: f64,
}

impl Signals {
    pub fn of(document: &Document, now: DateTime<Utc>, recency_days: f64) -> Self {
        let log_usage = (1.0 + document.usage_count as f64).ln();
        let age_days = (now - document.updated_at).num_seconds().max(0) as f64 / 86_400.0;
        let recency = if recency_days > 0.0 {
            (-age_days / recency_days).exp()
        } else {
            0.0
        };

        Self {
            usage: log_usage / (1.0 + log_usage),
            success: document.success_rate().unwrap_or(UNKNOWN_SUCCESS_RATE),
            recency,
        }
    }

    /// `lexical · (1 + w_usage·u + w_success·s + w_recency·r)`
    pub fn blend(&self, lexical: f64, weights: &RankingWeights) -> f64 {
        lexical
            * (1.0
                + weights.usage * self.usage
                + weights.success_rate * self.success
                + weights.recency * self.recency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_idf_prefers_rare_terms() {
        let bm25 = Bm25::default();
        assert!(bm25.idf(100, 1) > bm25.idf(100, 50));
        assert!(bm25.idf(100, 100) > 0.0);
    }

    #[test]
    fn test_term_weight_saturates() {
        let bm25 = Bm25::default();
        let once = bm25.term_weight(1, 10, 10.0);
        let many = bm25.term_weight(20, 10, 10.0);
        assert!(many > once);
        assert!(many < bm25.k1 + 1.0);
        assert_eq!(bm25.term_weight(0, 10, 10.0), 0.0);
    }

    #[test]
    fn test_term_weight_penalizes_long_fields() {
        let bm25 = Bm25::default();
        assert!(bm25.term_weight(1, 5, 10.0) > bm25.term_weight(1, 40, 10.0));
    }

    #[test]
    fn test_signals() {
        let now = Utc::now();
        let mut doc = Document::new("kb-1", "t", "p", "s", "c");
        doc.updated_at = now;

        let fresh = Signals::of(&doc, now, 180.0);
        assert_eq!(fresh.usage, 0.0);
        assert_eq!(fresh.success, 0.5);
        assert!((fresh.recency - 1.0).abs() < 1e-9);

        doc.updated_at = now - Duration::days(180);
        let doc = doc.with_usage(100, 9, 1);
        let old = Signals::of(&doc, now, 180.0);
        assert!((old.recency - (-1.0f64).exp()).abs() < 1e-6);
        assert!(old.usage > 0.8 && old.usage < 1.0);
        assert_eq!(old.success, 0.9);
    }

    #[test]
    fn test_blend_never_lowers_lexical_score() {
        let signals = Signals {
            usage: 0.5,
            success: 0.5,
            recency: 0.5,
        };
        let weights = RankingWeights::default();
        assert!(signals.blend(2.0, &weights) > 2.0);
        assert_eq!(signals.blend(0.0, &weights), 0.0);
    }
}
