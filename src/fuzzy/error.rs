use thiserror::Error;

/// Problems with individual vocabulary entries; the entry is skipped
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FuzzyMatchError {
    #[error("Malformed vocabulary entry {entry:?}: {reason}")]
    MalformedEntry { entry: String, reason: &'static str },
}
