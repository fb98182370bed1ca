//!  Reference management.
//!
//!  The store keeps a single line of history on `main`; `HEAD` is a symbolic
//!  reference to it. Writers advance `HEAD`, readers resolve it to find the
//!  current anchor.

use git2::{ErrorCode, Repository};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::AnchorId;

/// Manages Git references.
pub struct RefManager;

impl RefManager {
    /// the branch carrying the store's history
    pub const MAIN: &'static str = "main";

    /// full ref path of the main branch
    pub fn main_ref() -> String {
        format!("refs/heads/{}", Self::MAIN)
    }

    /// Get the current HEAD commit.
    pub fn head_commit(repo: &Repository) -> StorageResult<AnchorId> {
        let head = repo.head().map_err(|e| {
            if e.code() == ErrorCode::UnbornBranch {
                StorageError::EmptyRepository
            } else {
                StorageError::Git(e)
            }
        })?;

        let commit = head.peel_to_commit()?;
        Ok(AnchorId::new(commit.id()))
    }

    /// Name of the branch HEAD points at, if HEAD is symbolic.
    pub fn head_branch(repo: &Repository) -> StorageResult<Option<String>> {
        let head = repo.find_reference("HEAD")?;
        Ok(head
            .symbolic_target()
            .and_then(|target| target.strip_prefix("refs/heads/"))
            .map(str::to_string))
    }
}
