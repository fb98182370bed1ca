//! Sessions: the unit of work over the tree store.
//!
//! - [`ReadSession`]: the store's current snapshot, shared and fully cached
//! - [`HistoricalReadSession`]: any past anchor, loaded on demand
//! - [`WriteSession`]: staged stores and deletes committed as one anchor,
//!   with [`WriteSessionExtension`] hooks around every step
//!
//! Every session decodes through a [`DocumentSet`], the identity map that
//! makes repeated loads of unchanged files return the same instance.

mod document_set;
mod error;
mod extension;
mod historical;
mod identity;
mod read;
pub(crate) mod visitors;
mod write;

pub use document_set::{DocumentSet, Fingerprint};
pub use error::{SessionError, SessionResult};
pub use extension::{ExtensionContext, StagedDocument, WriteSessionExtension};
pub use historical::HistoricalReadSession;
pub use identity::{IdentityAllocations, LinearIdentityGenerator};
pub use read::{DocumentReader, ReadSession};
pub use write::WriteSession;
