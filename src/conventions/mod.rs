//! Conventions: where each document type lives and how it is identified.
//!
//! A type declares its path template and identity accessor by implementing
//! [`Document`]. The [`Conventions`] registry parses the template once,
//! caches a [`DocumentType`] for it and answers path ↔ type ↔ identity
//! questions for the rest of the crate.

mod document;
mod error;
mod identity;
mod registry;
mod template;

pub use document::{attachment_path, Attachments, Document, SharedDocument};
pub(crate) use document::short_type_name;
pub use error::{ConventionError, ConventionResult};
pub use identity::Identity;
pub use registry::{Conventions, DocumentType};
pub use template::PathTemplate;
