//! The traversal contract between the tree store and its callers.

use crate::storage::blob::StoredFile;
use crate::storage::error::StorageError;

/// Receives a depth-first walk of one anchor's tree.
///
/// The root directory (`""`) is always entered. Every other directory is
/// offered to [`should_traverse_directory`](Self::should_traverse_directory)
/// before it is entered. [`visit_directory`](Self::visit_directory) is called
/// once per entered directory after its subdirectories, with the complete
/// list of files in that directory, so sibling files can be resolved by name.
pub trait StorageVisitor {
    /// Error produced by the visitor; storage failures convert into it.
    type Error: From<StorageError>;

    fn should_traverse_directory(&mut self, path: &str) -> bool;

    fn visit_directory(&mut self, path: &str, files: &[StoredFile<'_>]) -> Result<(), Self::Error>;
}
