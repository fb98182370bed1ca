//! storage layer for anchordb
//!
//! this module is the tree store: a complete abstraction over git for
//! versioned document storage. The upper layers (conventions, codec, sessions)
//! use this API and never touch git2 directly.
//!
//!  # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     GitRepository                           │
//! │   (anchors, history, visitation, exclusive write batches)   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │    tree     │       │    batch    │       │    refs     │
//!  │ (walk/edit) │       │  (staging)  │       │   (HEAD)    │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//!         │                     │                     │
//!         └─────────────────────┼─────────────────────┘
//!                               │
//!                               ▼
//!                        ┌─────────────┐
//!                        │   commit    │
//!                        │  (anchors)  │
//!                        └─────────────┘
//!  ```
//!
//! # Usage
//!
//! ```ignore
//! use anchordb::storage::GitRepository;
//!
//! let repo = GitRepository::open_or_init("./my_store")?;
//!
//! let mut batch = repo.batch()?;
//! batch.put("machines/m1.json", br#"{"id":"m1"}"#)?;
//! let anchor = batch.commit("Added machine")?;
//! drop(batch);
//!
//! let contents = repo.read_file(&repo.current_anchor()?, "machines/m1.json")?;
//! ```

mod batch;
mod blob;
mod commit;
mod error;
pub mod path;
mod refs;
mod repository;
mod tree;
mod types;
mod visitor;

// Re-export public API
pub use batch::StorageBatch;
pub use blob::StoredFile;
pub use commit::Anchor;
pub use error::{StorageError, StorageResult};
pub use repository::{GitRepository, RepositoryOptions};
pub use types::{AnchorId, BlobId, GitSignature, Signature, TreeId};
pub use visitor::StorageVisitor;
