//!   Core Git repository wrapper.
//!
//!  This is the tree store: the central component of the storage layer. It
//!  wraps `git2::Repository` with thread-safe access and exposes the handful of
//!  operations the session layer needs: current anchor, anchor lookup,
//!  history, tree visitation and write batches.
//!
//! All other storage modules use this for Git access.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::{Repository, RepositoryInitOptions};
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use tracing::debug;

use crate::diagnostics::Statistics;
use crate::storage::batch::StorageBatch;
use crate::storage::blob::read_blob;
use crate::storage::commit::{self, Anchor};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::refs::RefManager;
use crate::storage::tree;
use crate::storage::types::GitSignature;
use crate::storage::visitor::StorageVisitor;

/// Settings applied when opening or creating a repository.
#[derive(Debug, Clone, Default)]
pub struct RepositoryOptions {
    /// signature used for commits that don't name their own
    pub signature: GitSignature,
    /// sink for staging/commit/reset timings
    pub statistics: Arc<Statistics>,
}

/// The main Git repository wrapper.
///
/// This provides thread-safe access to all Git operations.
/// Clone this to share across threads - it uses Arc internally.
#[derive(Clone)]
pub struct GitRepository {
    inner: Arc<GitRepositoryInner>,
}

struct GitRepositoryInner {
    repo: Mutex<Repository>,
    path: PathBuf,
    signature: GitSignature,
    statistics: Arc<Statistics>,
    /// held by the live [`StorageBatch`], if any
    batch_lock: Arc<Mutex<()>>,
}

impl GitRepository {
    /// Open an existing repository.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with(path, RepositoryOptions::default())
    }

    /// Open an existing repository with custom options.
    ///
    /// A repository without any commit gets the store's root anchor.
    pub fn open_with(path: impl AsRef<Path>, options: RepositoryOptions) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo = Repository::open(path).map_err(|_| StorageError::NotInitialized(path.to_path_buf()))?;

        let storage = Self::wrap(repo, path, options);
        storage.with_repo(|repo| match RefManager::head_commit(repo) {
            Err(StorageError::EmptyRepository) => {
                commit::create_initial_commit(repo, &storage.inner.signature)?;
                Ok(())
            }
            other => other.map(|_| ()),
        })?;

        Ok(storage)
    }

    /// Initialize a new repository.
    pub fn init(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::init_with(path, RepositoryOptions::default())
    }

    /// Initialize a new repository with custom options.
    pub fn init_with(path: impl AsRef<Path>, options: RepositoryOptions) -> StorageResult<Self> {
        let path = path.as_ref();
        let mut init = RepositoryInitOptions::new();
        init.initial_head(RefManager::MAIN);
        let repo = Repository::init_opts(path, &init)?;

        let storage = Self::wrap(repo, path, options);

        // Create initial commit
        storage.with_repo(|repo| {
            let anchor = commit::create_initial_commit(repo, &storage.inner.signature)?;
            debug!(path = %path.display(), %anchor, "initialized repository");
            Ok(())
        })?;

        Ok(storage)
    }

    /// Open or initialize a repository.
    pub fn open_or_init(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_or_init_with(path, RepositoryOptions::default())
    }

    /// Open or initialize a repository with custom options.
    pub fn open_or_init_with(path: impl AsRef<Path>, options: RepositoryOptions) -> StorageResult<Self> {
        let path = path.as_ref();
        if path.join(".git").exists() {
            Self::open_with(path, options)
        } else {
            Self::init_with(path, options)
        }
    }

    fn wrap(repo: Repository, path: &Path, options: RepositoryOptions) -> Self {
        Self {
            inner: Arc::new(GitRepositoryInner {
                repo: Mutex::new(repo),
                path: path.to_path_buf(),
                signature: options.signature,
                statistics: options.statistics,
                batch_lock: Arc::new(Mutex::new(())),
            }),
        }
    }

    /// Get the repository path.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Signature used for commits.
    pub fn signature(&self) -> &GitSignature {
        &self.inner.signature
    }

    /// Statistics sink shared with the store.
    pub fn statistics(&self) -> &Arc<Statistics> {
        &self.inner.statistics
    }

    /// Execute a function with access to the repository.
    ///
    /// Access is serialized; keep the closure short.
    pub fn with_repo<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Repository) -> StorageResult<T>,
    {
        let repo = self.inner.repo.lock();
        f(&repo)
    }

    pub(crate) fn batch_lock(&self) -> ArcMutexGuard<RawMutex, ()> {
        self.inner.batch_lock.lock_arc()
    }

    // ==================== Anchors ====================

    /// Get the current anchor (tip of main).
    pub fn current_anchor(&self) -> StorageResult<Anchor> {
        self.with_repo(|repo| {
            let id = RefManager::head_commit(repo)?;
            commit::get_anchor(repo, id)
        })
    }

    /// Look up an anchor by id.
    ///
    /// Accepts anything git can resolve to a commit: a full or abbreviated
    /// hash, a branch name or `HEAD`.
    pub fn anchor(&self, id: &str) -> StorageResult<Anchor> {
        self.with_repo(|repo| commit::resolve_anchor(repo, id))
    }

    /// All anchors reachable from the current one, newest first.
    pub fn anchors(&self) -> StorageResult<Vec<Anchor>> {
        self.with_repo(|repo| {
            let head = RefManager::head_commit(repo)?;
            commit::history(repo, head)?.collect()
        })
    }

    /// At most `limit` anchors, newest first.
    pub fn recent_anchors(&self, limit: usize) -> StorageResult<Vec<Anchor>> {
        self.with_repo(|repo| {
            let head = RefManager::head_commit(repo)?;
            commit::history(repo, head)?.take(limit).collect()
        })
    }

    // ==================== Reading ====================

    /// Walk the tree of `anchor` with `visitor`.
    pub fn visit<V: StorageVisitor>(&self, anchor: &Anchor, visitor: &mut V) -> Result<(), V::Error> {
        let repo = self.inner.repo.lock();
        let root = repo.find_tree(anchor.tree_id.raw()).map_err(StorageError::from)?;
        tree::walk(&repo, &root, "", visitor)
    }

    /// Read one file at `anchor`, if present.
    pub fn read_file(&self, anchor: &Anchor, file_path: &str) -> StorageResult<Option<Vec<u8>>> {
        self.with_repo(|repo| {
            let root = repo.find_tree(anchor.tree_id.raw())?;
            match tree::blob_at(&root, file_path)? {
                Some(id) => read_blob(repo, id).map(Some),
                None => Ok(None),
            }
        })
    }

    /// Whether a file exists at `file_path` in `anchor`, without reading it.
    pub fn contains(&self, anchor: &Anchor, file_path: &str) -> StorageResult<bool> {
        self.with_repo(|repo| {
            let root = repo.find_tree(anchor.tree_id.raw())?;
            Ok(tree::blob_at(&root, file_path)?.is_some())
        })
    }

    // ==================== Writing ====================

    /// Open a write batch.
    ///
    /// Blocks until every previously opened batch has been dropped, then pins
    /// the new batch at the anchor current at that moment.
    pub fn batch(&self) -> StorageResult<StorageBatch> {
        StorageBatch::open(self.clone())
    }
}
