//! anchordb - A Git-backed Document Store
//!
//! Typed documents are stored as files in a git repository. Every committed
//! write session becomes one commit (an *anchor*), so the full history of the
//! store is preserved in `.git/` and any past state can be read back.
//!
//! # Example
//!
//! ```no_run
//! use anchordb::{Document, DocumentReader, DocumentStore, Identity};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Serialize, Deserialize)]
//! struct Machine {
//!     id: u64,
//!     name: String,
//! }
//!
//! impl Document for Machine {
//!     const PATH_TEMPLATE: &'static str = "machines/{id}.json";
//!
//!     fn identity(&self) -> Identity {
//!         Identity::from(self.id)
//!     }
//!
//!     fn assign_identity(&mut self, identity: Identity) {
//!         self.id = identity.as_u64().unwrap_or_default();
//!     }
//! }
//!
//! let store = DocumentStore::open("./my_store").unwrap();
//!
//! let mut session = store.open_write_session().unwrap();
//! let machine = session.store(Machine { id: 0, name: "web".into() }).unwrap();
//! session.commit("Added machine").unwrap();
//!
//! let read = store.open_read_session().unwrap();
//! let loaded = read.load::<Machine>(machine.id).unwrap();
//! assert!(loaded.is_some());
//! ```

pub mod codec;
pub mod conventions;
pub mod db;
pub mod diagnostics;
pub mod session;
pub mod storage;

#[cfg(test)]
mod testing;

pub use conventions::{Attachments, Conventions, Document, DocumentType, Identity};
pub use db::{DocumentStore, StoreConfig};
pub use diagnostics::{Counter, Statistics, StatisticsSnapshot, Timing};
pub use session::{
    DocumentReader, ExtensionContext, HistoricalReadSession, ReadSession, SessionError, SessionResult,
    StagedDocument, WriteSession, WriteSessionExtension,
};
pub use storage::{Anchor, AnchorId, GitSignature};
