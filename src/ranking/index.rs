//! Inverted index abstraction and the in-memory implementation

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::error::IndexError;
use crate::models::{Document, DocumentField, FieldCounts, FIELD_COUNT};
use crate::text::index_terms;

/// One document's entry in a term's posting list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// Position of the document in the current snapshot
    pub doc: usize,

    /// Occurrences of the term per field
    pub term_frequency: FieldCounts,

    /// Indexed terms per field
    pub field_lengths: FieldCounts,
}

impl Posting {
    pub fn frequency(&self, field: DocumentField) -> u32 {
        self.term_frequency[field.index()]
    }

    pub fn length(&self, field: DocumentField) -> u32 {
        self.field_lengths[field.index()]
    }
}

/// Collection-wide numbers needed for scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub document_count: usize,

    /// Mean indexed terms per field, indexed by [`DocumentField::index`]
    pub average_field_lengths: [f64; FIELD_COUNT],

    /// Bumped whenever the document set is replaced
    pub generation: u64,
}

impl CollectionStats {
    pub fn average_length(&self, field: DocumentField) -> f64 {
        self.average_field_lengths[field.index()]
    }
}

/// Read access to a knowledge-base index, implemented by the storage layer
///
/// Posting positions refer to the document order of [`snapshot`].
///
/// [`snapshot`]: KnowledgeIndex::snapshot
#[async_trait]
pub trait KnowledgeIndex: Send + Sync {
    /// Read-only view of every indexed document
    async fn snapshot(&self) -> Result<Arc<Vec<Document>>, IndexError>;

    /// Posting list of a normalized term; unknown terms yield an empty list
    async fn postings(&self, term: &str) -> Result<Arc<Vec<Posting>>, IndexError>;

    async fn collection_stats(&self) -> Result<CollectionStats, IndexError>;

    /// Every indexed term, sorted
    async fn vocabulary(&self) -> Result<Arc<Vec<String>>, IndexError>;

    /// Compact internal structures; safe to call at any time
    async fn optimize(&self) -> Result<(), IndexError>;
}

#[derive(Debug)]
struct IndexState {
    documents: Arc<Vec<Document>>,
    postings: HashMap<String, Arc<Vec<Posting>>>,
    vocabulary: Arc<Vec<String>>,
    stats: CollectionStats,
}

impl IndexState {
    fn build(documents: Vec<Document>, generation: u64) -> Self {
        let mut postings: HashMap<String, Vec<Posting>> = HashMap::new();
        let mut length_totals = [0u64; FIELD_COUNT];

        for (position, document) in documents.iter().enumerate() {
            let mut lengths: FieldCounts = [0; FIELD_COUNT];
            let mut frequencies: HashMap<String, FieldCounts> = HashMap::new();

            for field in DocumentField::ALL {
                let terms = index_terms(&document.field_text(field));
                lengths[field.index()] = terms.len() as u32;
                length_totals[field.index()] += terms.len() as u64;
                for term in terms {
                    frequencies.entry(term).or_insert([0; FIELD_COUNT])[field.index()] += 1;
                }
            }

            for (term, term_frequency) in frequencies {
                postings.entry(term).or_default().push(Posting {
                    doc: position,
                    term_frequency,
                    field_lengths: lengths,
                });
            }
        }

        let count = documents.len();
        let average_field_lengths = length_totals.map(|total| {
            if count == 0 {
                0.0
            } else {
                total as f64 / count as f64
            }
        });

        let mut vocabulary: Vec<String> = postings.keys().cloned().collect();
        vocabulary.sort();

        let postings = postings
            .into_iter()
            .map(|(term, mut list)| {
                list.sort_by_key(|p| p.doc);
                (term, Arc::new(list))
            })
            .collect();

        Self {
            documents: Arc::new(documents),
            postings,
            vocabulary: Arc::new(vocabulary),
            stats: CollectionStats {
                document_count: count,
                average_field_lengths,
                generation,
            },
        }
    }
}

/// [`KnowledgeIndex`] over a document set held in memory
///
/// Readers always see one complete state; `replace_documents` swaps the
/// whole state at once.
#[derive(Debug)]
pub struct InMemoryIndex {
    state: RwLock<Arc<IndexState>>,
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl InMemoryIndex {
    pub fn new(documents: Vec<Document>) -> Self {
        let state = IndexState::build(documents, 1);
        info!(
            documents = state.stats.document_count,
            terms = state.vocabulary.len(),
            "Knowledge index built"
        );
        Self {
            state: RwLock::new(Arc::new(state)),
        }
    }

    /// Reindex from scratch; returns the new generation
    pub fn replace_documents(&self, documents: Vec<Document>) -> u64 {
        let generation = self.generation() + 1;
        let state = IndexState::build(documents, generation);
        info!(
            generation,
            documents = state.stats.document_count,
            terms = state.vocabulary.len(),
            "Knowledge index replaced"
        );
        *self.state.write() = Arc::new(state);
        generation
    }

    pub fn generation(&self) -> u64 {
        self.state.read().stats.generation
    }

    pub fn len(&self) -> usize {
        self.state.read().stats.document_count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn current(&self) -> Arc<IndexState> {
        self.state.read().clone()
    }
}

#[async_trait]
impl KnowledgeIndex for InMemoryIndex {
    async fn snapshot(&self) -> Result<Arc<Vec<Document>>, IndexError> {
        Ok(self.current().documents.clone())
    }

    async fn postings(&self, term: &str) -> Result<Arc<Vec<Posting>>, IndexError> {
        Ok(self
            .current()
            .postings
            .get(term)
            .cloned()
            .unwrap_or_default())
    }

    async fn collection_stats(&self) -> Result<CollectionStats, IndexError> {
        Ok(self.current().stats.clone())
    }

    async fn vocabulary(&self) -> Result<Arc<Vec<String>>, IndexError> {
        Ok(self.current().vocabulary.clone())
    }

    async fn optimize(&self) -> Result<(), IndexError> {
        let state = self.current();
        debug!(
            generation = state.stats.generation,
            terms = state.vocabulary.len(),
            "In-memory index needs no compaction"
        );
        Ok(())
    }
}
