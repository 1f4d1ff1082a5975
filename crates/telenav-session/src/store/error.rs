//! Store error types.

use telenav_types::{BlockId, EntityError, PageId};
use thiserror::Error;

/// Store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Block does not exist.
    #[error("block not found: {0}")]
    BlockNotFound(BlockId),

    /// Page does not exist.
    #[error("page not found: {0}")]
    PageNotFound(PageId),

    /// Page exists but under another block.
    #[error("page {page} does not belong to block {block}")]
    PageNotInBlock { page: PageId, block: BlockId },

    /// Entity failed validation before being written.
    #[error("invalid entity: {0}")]
    Invalid(#[from] EntityError),

    /// SQLite error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON column could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Row held a value outside the domain (bad enum text and the like).
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
