//! Error types for cache operations

/// Result type for cache operations
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Cache failures
///
/// None of these reach the caller of a search: the search service logs them
/// and treats the lookup as a miss.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Value could not be converted to or from JSON
    #[error("Cache serialization failed: {0}")]
    Serialization(String),

    /// Cold tier backend failure
    #[error("Cold store failure: {0}")]
    ColdStore(String),

    /// Key pattern could not be compiled
    #[error("Invalid key pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}
