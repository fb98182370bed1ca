//! Convention errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConventionError {
    /// the path template does not follow `prefix/{id}suffix`
    #[error("invalid path template for {type_name}: '{template}' ({reason})")]
    InvalidTemplate {
        type_name: &'static str,
        template: String,
        reason: String,
    },

    /// the document has no identity and none could be assigned
    #[error("{type_name} has no identity")]
    MissingIdentity { type_name: &'static str },

    /// the identity contains characters that cannot appear in a path
    #[error("invalid identity '{identity}' for {type_name}")]
    InvalidIdentity { type_name: &'static str, identity: String },

    /// lookup of a type that was never registered
    #[error("type not registered: {0}")]
    NotRegistered(String),

    /// a path that does not belong to the given type
    #[error("path '{path}' does not match the template of {type_name}")]
    PathMismatch { type_name: &'static str, path: String },
}

impl ConventionError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConventionError::NotRegistered(_))
    }
}

pub type ConventionResult<T> = Result<T, ConventionError>;
