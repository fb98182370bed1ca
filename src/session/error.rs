//! Session error types.

use thiserror::Error;

use crate::codec::CodecError;
use crate::conventions::ConventionError;
use crate::storage::StorageError;

/// Errors surfaced by read and write sessions and by the store facade.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("convention error: {0}")]
    Convention(#[from] ConventionError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A different object is already staged at this path in the session.
    #[error("identifier already in use: another object is staged at '{path}'")]
    IdentifierAlreadyInUse { path: String },

    #[error("file at '{path}' is not valid UTF-8")]
    InvalidUtf8 { path: String },

    /// A write-session extension refused the operation.
    #[error("extension '{name}' failed: {message}")]
    Extension { name: &'static str, message: String },
}

impl SessionError {
    pub fn is_not_found(&self) -> bool {
        match self {
            SessionError::Storage(e) => e.is_not_found(),
            SessionError::Convention(e) => e.is_not_found(),
            _ => false,
        }
    }

    pub fn is_conflict(&self) -> bool {
        match self {
            SessionError::IdentifierAlreadyInUse { .. } => true,
            SessionError::Storage(e) => e.is_conflict(),
            _ => false,
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
