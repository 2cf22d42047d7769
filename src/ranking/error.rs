//! Error types for ranking and index access

/// Failures reported by a [`KnowledgeIndex`](super::KnowledgeIndex) implementation
#[derive(Debug, Clone, thiserror::Error)]
pub enum IndexError {
    /// Backend could not be reached
    #[error("Index unavailable: {0}")]
    Unavailable(String),

    /// Backend returned data that does not fit together
    #[error("Index inconsistent: {0}")]
    Inconsistent(String),
}

/// Errors returned from a search
///
/// An empty result list is not an error.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The index failed while the query was executing; not retried
    #[error("Index access failed for query '{query}' after {elapsed_ms} ms: {cause}")]
    IndexAccess {
        query: String,
        elapsed_ms: u64,
        #[source]
        cause: IndexError,
    },

    /// Caller-supplied options were rejected before any work was done
    #[error("Invalid search options: {0}")]
    InvalidOptions(String),
}

impl SearchError {
    pub(crate) fn index_access(query: &str, started: std::time::Instant, cause: IndexError) -> Self {
        SearchError::IndexAccess {
            query: query.to_string(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            cause,
        }
    }
}

impl From<validator::ValidationErrors> for SearchError {
    fn from(err: validator::ValidationErrors) -> Self {
        SearchError::InvalidOptions(err.to_string())
    }
}
