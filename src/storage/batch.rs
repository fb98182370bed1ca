//! Atomic write batches.
//!
//! A batch owns the repository's exclusive write lock from the moment it is
//! opened until it is dropped. Staged files only exist as loose blobs plus an
//! in-memory change list; nothing reachable from a ref changes until
//! [`StorageBatch::commit`] writes the new tree and advances `HEAD` in one
//! reference update.

use std::collections::BTreeMap;
use std::io::Write;

use parking_lot::{ArcMutexGuard, RawMutex};
use tracing::{debug, info, warn};

use crate::diagnostics::Timing;
use crate::storage::blob::write_blob;
use crate::storage::commit::{get_anchor, Anchor, CommitBuilder};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::path;
use crate::storage::repository::GitRepository;
use crate::storage::tree::TreeMutator;
use crate::storage::types::{BlobId, GitSignature};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StagedChange {
    Put(BlobId),
    Delete,
}

/// The staged file set of one write session.
pub struct StorageBatch {
    repository: GitRepository,
    base: Anchor,
    staged: BTreeMap<String, StagedChange>,
    _lock: ArcMutexGuard<RawMutex, ()>,
}

impl StorageBatch {
    /// Block until the write lock is free, then pin the batch at the current anchor.
    pub(crate) fn open(repository: GitRepository) -> StorageResult<Self> {
        let lock = repository.batch_lock();
        let base = repository.current_anchor()?;
        debug!(anchor = %base.id, "opened write batch");

        Ok(Self {
            repository,
            base,
            staged: BTreeMap::new(),
            _lock: lock,
        })
    }

    /// the anchor this batch builds on
    pub fn anchor(&self) -> &Anchor {
        &self.base
    }

    /// true when nothing is staged
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// number of staged puts and deletes
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    /// paths with a staged change, in path order
    pub fn staged_paths(&self) -> impl Iterator<Item = &str> {
        self.staged.keys().map(String::as_str)
    }

    /// true when `file_path` has a staged put
    pub fn is_put(&self, file_path: &str) -> bool {
        matches!(self.staged.get(&path::normalize(file_path)), Some(StagedChange::Put(_)))
    }

    /// stage `contents` at `file_path`
    pub fn put(&mut self, file_path: &str, contents: &[u8]) -> StorageResult<()> {
        let file_path = path::validate(file_path)?;
        let blob = {
            let _timer = self.repository.statistics().measure(Timing::Staging);
            self.repository.with_repo(|repo| write_blob(repo, contents))?
        };
        self.staged.insert(file_path, StagedChange::Put(blob));
        Ok(())
    }

    /// stage the bytes produced by `write` at `file_path`
    ///
    /// The callback runs immediately; if it fails nothing is staged.
    pub fn put_with<E, F>(&mut self, file_path: &str, write: F) -> Result<(), E>
    where
        E: From<StorageError>,
        F: FnOnce(&mut dyn Write) -> Result<(), E>,
    {
        let mut buffer = Vec::new();
        write(&mut buffer)?;
        self.put(file_path, &buffer).map_err(E::from)
    }

    /// stage removal of `file_path`; removing a missing file is a no-op at commit
    pub fn delete(&mut self, file_path: &str) -> StorageResult<()> {
        let file_path = path::validate(file_path)?;
        self.staged.insert(file_path, StagedChange::Delete);
        Ok(())
    }

    /// commit the staged set with the repository's default signature
    pub fn commit(&mut self, message: &str) -> StorageResult<Option<Anchor>> {
        let signature = self.repository.signature().clone();
        self.commit_as(message, &signature)
    }

    /// commit the staged set
    ///
    /// Returns `None` when the staged changes leave the tree unchanged; no
    /// commit is created in that case. On success the batch is re-pinned at
    /// the new anchor and its staged set is empty.
    pub fn commit_as(&mut self, message: &str, signature: &GitSignature) -> StorageResult<Option<Anchor>> {
        let staged = std::mem::take(&mut self.staged);
        let statistics = self.repository.statistics().clone();
        let base = &self.base;

        let created = self.repository.with_repo(|repo| {
            let tree_id = {
                let _timer = statistics.measure(Timing::Staging);
                let mut mutator = TreeMutator::from_tree(repo, base.tree_id)?;
                for (file_path, change) in &staged {
                    match change {
                        StagedChange::Put(blob) => mutator.upsert(file_path, *blob),
                        StagedChange::Delete => {
                            mutator.remove(file_path)?;
                        }
                    }
                }
                mutator.write()?
            };

            if tree_id == base.tree_id {
                return Ok(None);
            }

            let _timer = statistics.measure(Timing::Commit);
            let id = CommitBuilder::new(repo)
                .tree(tree_id)
                .parent(base.id)
                .message(message)
                .signature(signature.clone())
                .update_ref("HEAD")
                .commit()?;
            get_anchor(repo, id).map(Some)
        })?;

        match &created {
            Some(anchor) => {
                info!(anchor = %anchor.id, parent = %self.base.id, changes = staged.len(), "committed batch");
                self.base = anchor.clone();
            }
            None => debug!(anchor = %self.base.id, "batch produced no changes, nothing committed"),
        }
        Ok(created)
    }
}

impl Drop for StorageBatch {
    fn drop(&mut self) {
        if self.staged.is_empty() {
            return;
        }
        let _timer = self.repository.statistics().measure(Timing::Reset);
        warn!(
            anchor = %self.base.id,
            staged = self.staged.len(),
            "discarding uncommitted batch"
        );
        self.staged.clear();
    }
}
