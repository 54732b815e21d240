use thiserror::Error;

/// Failure of a backing store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write; carries the id of the
    /// record already holding the key.
    #[error("duplicate key, existing record {0}")]
    DuplicateKey(String),

    #[error("record rejected: {0}")]
    InvalidRecord(String),

    /// The calling task was asked to stop while waiting on the store.
    #[error("interrupted")]
    Interrupted,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
