use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::Path;
use strum::{Display, EnumIter, EnumString};

/// Number of searchable fields on a knowledge entry
pub const FIELD_COUNT: usize = 5;

/// Per-field counters indexed by [`DocumentField::index`]
pub type FieldCounts = [u32; FIELD_COUNT];

/// A knowledge-base entry as handed over by the storage layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable identifier
    pub id: String,

    /// Short title
    pub title: String,

    /// Problem statement / symptoms
    #[serde(default)]
    pub problem: String,

    /// Resolution steps
    #[serde(default)]
    pub solution: String,

    /// Category (e.g. "JCL", "VSAM", "DB2")
    #[serde(default)]
    pub category: String,

    /// Ordered tags
    #[serde(default)]
    pub tags: Vec<String>,

    /// How many times the entry was opened from search
    #[serde(default)]
    pub usage_count: u64,

    /// Times the entry was marked as having solved the problem
    #[serde(default)]
    pub success_count: u64,

    /// Times the entry was marked as not helpful
    #[serde(default)]
    pub failure_count: u64,

    /// Creation timestamp
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Create a new entry with zeroed usage statistics
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        problem: impl Into<String>,
        solution: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            problem: problem.into(),
            solution: solution.into(),
            category: category.into(),
            tags: Vec::new(),
            usage_count: 0,
            success_count: 0,
            failure_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set tags
    pub fn with_tags(mut self, tags: Vec<impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(|t| t.into()).collect();
        self
    }

    /// Set usage statistics
    pub fn with_usage(mut self, usage: u64, success: u64, failure: u64) -> Self {
        self.usage_count = usage;
        self.success_count = success;
        self.failure_count = failure;
        self
    }

    /// Text of a single field; tags are joined with spaces
    pub fn field_text(&self, field: DocumentField) -> Cow<'_, str> {
        match field {
            DocumentField::Title => Cow::Borrowed(&self.title),
            DocumentField::Problem => Cow::Borrowed(&self.problem),
            DocumentField::Solution => Cow::Borrowed(&self.solution),
            DocumentField::Category => Cow::Borrowed(&self.category),
            DocumentField::Tags => Cow::Owned(self.tags.join(" ")),
        }
    }

    /// Read a JSON array of entries from disk
    pub fn load_all(path: impl AsRef<Path>) -> crate::Result<Vec<Document>> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// `success / (success + failure)`, `None` without feedback
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            None
        } else {
            Some(self.success_count as f64 / total as f64)
        }
    }
}

/// Searchable fields of a [`Document`]
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum DocumentField {
    Title,
    Problem,
    Solution,
    #[strum(to_string = "tags", serialize = "tag")]
    Tags,
    Category,
}

impl DocumentField {
    /// All fields in scoring/highlighting order
    pub const ALL: [DocumentField; FIELD_COUNT] = [
        DocumentField::Title,
        DocumentField::Problem,
        DocumentField::Solution,
        DocumentField::Tags,
        DocumentField::Category,
    ];

    /// Position in [`FieldCounts`] arrays
    pub fn index(self) -> usize {
        match self {
            DocumentField::Title => 0,
            DocumentField::Problem => 1,
            DocumentField::Solution => 2,
            DocumentField::Tags => 3,
            DocumentField::Category => 4,
        }
    }

    /// Resolve a user-supplied field name
    pub fn from_name(name: &str) -> Option<Self> {
        name.trim().parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_parse_case_insensitively() {
        assert_eq!(DocumentField::from_name("Title"), Some(DocumentField::Title));
        assert_eq!(DocumentField::from_name("TAG"), Some(DocumentField::Tags));
        assert_eq!(DocumentField::from_name("tags"), Some(DocumentField::Tags));
        assert_eq!(DocumentField::from_name("severity"), None);
        assert_eq!(DocumentField::Solution.to_string(), "solution");
    }

    #[test]
    fn test_field_index_matches_all_order() {
        for (i, field) in DocumentField::ALL.iter().enumerate() {
            assert_eq!(field.index(), i);
        }
    }

    #[test]
    fn test_success_rate() {
        let doc = Document::new("kb-1", "t", "p", "s", "c");
        assert_eq!(doc.success_rate(), None);

        let doc = doc.with_usage(10, 3, 1);
        assert_eq!(doc.success_rate(), Some(0.75));
    }

    #[test]
    fn test_load_all() {
        use crate::error::AppError;
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": "kb-1", "title": "VSAM S0C7", "created_at": "2026-09-01T00:00:00Z", "updated_at": "2026-09-01T00:00:00Z"}}]"#
        )
        .unwrap();
        let documents = Document::load_all(file.path()).unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].title, "VSAM S0C7");

        let missing = Document::load_all(file.path().with_extension("missing")).unwrap_err();
        assert!(matches!(missing, AppError::Io(_)));

        let mut broken = tempfile::NamedTempFile::new().unwrap();
        write!(broken, "[{{").unwrap();
        let invalid = Document::load_all(broken.path()).unwrap_err();
        assert_eq!(invalid.error_code(), "SERIALIZATION_ERROR");
    }

    #[test]
    fn test_tags_field_text() {
        let doc = Document::new("kb-1", "t", "p", "s", "c").with_tags(vec!["jcl", "abend"]);
        assert_eq!(doc.field_text(DocumentField::Tags), "jcl abend");
    }
}
