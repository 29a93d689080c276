//! Error taxonomy for the document store.
//!
//! `OptimisticLock` and `DuplicateKey` are expected, recoverable outcomes a
//! caller is meant to retry around; everything else aborts the containing
//! transaction and is logged as a hard failure.

use std::io;

/// Which write-path operation raised an [`Error::OptimisticLock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Save,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Save => write!(f, "save"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("optimistic lock failed on {doc_id:?} during {operation}: given revision {given_rev}, actual revision {actual_rev}")]
    OptimisticLock { doc_id: String, given_rev: u64, actual_rev: u64, operation: Operation },

    #[error("duplicate key {key_name:?} on {doc_id:?}: already claimed by {conflicting_doc_id:?}")]
    DuplicateKey { doc_id: String, conflicting_doc_id: String, key_name: String },

    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("storage engine error: {0}")]
    Engine(#[from] io::Error),

    #[error("codec error: {0}")]
    Codec(String),
}

pub type CResult<T> = Result<T, Error>;

impl Error {
    pub fn integrity(msg: impl Into<String>) -> Self {
        Error::Integrity(msg.into())
    }

    pub fn codec(msg: impl Into<String>) -> Self {
        Error::Codec(msg.into())
    }

    /// True for the two expected, retryable outcomes of a write.
    pub fn is_expected(&self) -> bool {
        self.is_optimistic_lock() || self.is_duplicate_key()
    }

    pub fn is_optimistic_lock(&self) -> bool {
        matches!(self, Error::OptimisticLock { .. })
    }

    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Error::DuplicateKey { .. })
    }

    pub fn is_integrity(&self) -> bool {
        matches!(self, Error::Integrity(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }
}
