//! Codec errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// no registered codec decodes this path
    #[error("no codec can decode '{0}'")]
    UnsupportedPath(String),

    /// no registered codec encodes this value
    #[error("no codec can encode the value staged at '{path}'")]
    UnsupportedType { path: String },

    /// a typed codec was handed a value of another type
    #[error("value is not a {expected}")]
    TypeMismatch { expected: &'static str },
}

pub type CodecResult<T> = Result<T, CodecError>;
