use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Debug, Error)]
pub enum IndexerError {
    /// A requested canonical row is absent.
    #[error("row not found: {0}")]
    NotFound(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A live index row points at a canonical row that does not exist.
    #[error("index row {index_key} points at missing canonical row {canonical_key}")]
    IndexDivergence {
        index_key: String,
        canonical_key: String,
    },

    /// Blocks strictly between `lower` and `upper` are missing.
    #[error("gap found between block {upper} and block {lower}")]
    BlockGap { upper: u64, lower: u64 },

    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("bulk write has {keys} keys but {mutations} mutations")]
    BulkLengthMismatch { keys: usize, mutations: usize },

    #[error("storage error: {0}")]
    Storage(#[from] rocksdb::Error),

    #[error("storage error: {0}")]
    StorageLayout(String),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl IndexerError {
    /// Failures the caller may retry with the same (idempotent) batch.
    pub fn is_transient(&self) -> bool {
        matches!(self, IndexerError::DeadlineExceeded(_))
    }

    /// Failures that must stop ingestion instead of being skipped.
    pub fn is_consistency_fault(&self) -> bool {
        matches!(
            self,
            IndexerError::BlockGap { .. } | IndexerError::IndexDivergence { .. }
        )
    }
}
