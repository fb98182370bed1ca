//! Storage layer error types
//!
//! All errors that can occur while talking to the tree store are defined here.
//! We use `thiserror` for ergonomic error definition and better error messages

use std::path::PathBuf;

use thiserror::Error;

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// error from the underlying Git library
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// I/O error (filesystem level)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// repo is not initialized
    #[error("repository not initialized: {0}")]
    NotInitialized(PathBuf),

    /// repo is empty (no commits)
    #[error("repository is empty: no commits found")]
    EmptyRepository,

    /// the requested anchor does not exist or does not name a commit
    #[error("anchor not found: {0}")]
    AnchorNotFound(String),

    /// a storage path that cannot be represented in a tree
    #[error("invalid storage path: '{0}'")]
    InvalidPath(String),

    /// the tree entry has an unexpected type
    #[error("unexpected entry type at {path}: expected {expected}, found {found}")]
    UnexpectedEntryType {
        path: String,
        expected: String,
        found: String,
    },

    /// the reference moved between pinning a batch and committing it
    #[error("concurrent modification: {reference} was updated by another writer")]
    ConcurrentModification { reference: String },

    /// internal error that shouldn't happen
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::AnchorNotFound(_) | StorageError::NotInitialized(_) | StorageError::EmptyRepository
        )
    }

    /// check if this error is a conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::ConcurrentModification { .. })
    }

    /// check if this error is recoverable by retry
    pub fn is_retriable(&self) -> bool {
        matches!(self, StorageError::ConcurrentModification { .. })
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
