//!  Anchor creation and history traversal
//!
//!  commits are the atomic units of change in Git. In anchordb:
//! - every committed write batch creates exactly one commit (an anchor)
//! - anchors are immutable and identified by their commit hash
//! - history is walked newest first from the current anchor
//!
//! this module handles commit creation, anchor lookup and history walking

use git2::{ErrorCode, Repository, Revwalk, Sort};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{AnchorId, GitSignature, Signature, TreeId};

/// An immutable handle to one historical state of the store.
#[derive(Debug, Clone)]
pub struct Anchor {
    pub id: AnchorId,
    pub tree_id: TreeId,
    pub parent_ids: Vec<AnchorId>,
    pub message: String,
    pub author: Signature,
    pub committer: Signature,
}

impl Anchor {
    /// create an Anchor from a git2::Commit
    pub(crate) fn from_git2(commit: &git2::Commit<'_>) -> Self {
        Self {
            id: AnchorId::new(commit.id()),
            tree_id: TreeId::new(commit.tree_id()),
            parent_ids: commit.parent_ids().map(AnchorId::new).collect(),
            message: commit.message().unwrap_or("").to_string(),
            author: Signature::from_git2(&commit.author()),
            committer: Signature::from_git2(&commit.committer()),
        }
    }

    /// get the first (or only) parent
    pub fn first_parent(&self) -> Option<AnchorId> {
        self.parent_ids.first().copied()
    }

    /// true for the store's root anchor
    pub fn is_root(&self) -> bool {
        self.parent_ids.is_empty()
    }

    /// get a short summary of the anchor (first line of message)
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or(&self.message)
    }
}

impl PartialEq for Anchor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Anchor {}

/// builder for creating commits with a fluent interface
pub struct CommitBuilder<'a> {
    repo: &'a Repository,
    tree_id: Option<TreeId>,
    parents: Vec<AnchorId>,
    message: String,
    signature: GitSignature,
    update_ref: Option<String>,
}

impl<'a> CommitBuilder<'a> {
    /// create a new CommitBuilder
    pub fn new(repo: &'a Repository) -> Self {
        Self {
            repo,
            tree_id: None,
            parents: Vec::new(),
            message: String::new(),
            signature: GitSignature::anchordb(),
            update_ref: None,
        }
    }

    /// set the tree for this commit
    pub fn tree(mut self, tree_id: TreeId) -> Self {
        self.tree_id = Some(tree_id);
        self
    }

    /// add a parent commit
    pub fn parent(mut self, parent: AnchorId) -> Self {
        self.parents.push(parent);
        self
    }

    /// set the commit message
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// set the author/committer signature
    pub fn signature(mut self, signature: GitSignature) -> Self {
        self.signature = signature;
        self
    }

    /// update a ref to point to this commit
    ///
    /// libgit2 refuses the update when the ref no longer points at the first
    /// parent, which surfaces as [`StorageError::ConcurrentModification`].
    pub fn update_ref(mut self, refname: impl Into<String>) -> Self {
        self.update_ref = Some(refname.into());
        self
    }

    /// create the commit and return its ID
    pub fn commit(self) -> StorageResult<AnchorId> {
        let tree_id = self
            .tree_id
            .ok_or_else(|| StorageError::Internal("commit requires a tree".to_string()))?;

        let tree = self.repo.find_tree(tree_id.raw())?;
        let sig = self.signature.to_git2_signature()?;

        let parent_commits: Vec<git2::Commit<'_>> = self
            .parents
            .iter()
            .map(|id| self.repo.find_commit(id.raw()))
            .collect::<Result<_, _>>()?;

        let parent_refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();

        let oid = self
            .repo
            .commit(self.update_ref.as_deref(), &sig, &sig, &self.message, &tree, &parent_refs)
            .map_err(|e| match e.code() {
                ErrorCode::Modified | ErrorCode::Locked => StorageError::ConcurrentModification {
                    reference: self.update_ref.clone().unwrap_or_default(),
                },
                _ => StorageError::Git(e),
            })?;

        Ok(AnchorId::new(oid))
    }
}

/// look up an anchor by id
pub fn get_anchor(repo: &Repository, id: AnchorId) -> StorageResult<Anchor> {
    let commit = repo
        .find_commit(id.raw())
        .map_err(|_| StorageError::AnchorNotFound(id.to_string()))?;

    Ok(Anchor::from_git2(&commit))
}

/// resolve any revision spec (full or short hash, branch, `HEAD`) to an anchor
pub fn resolve_anchor(repo: &Repository, spec: &str) -> StorageResult<Anchor> {
    let object = repo
        .revparse_single(spec)
        .map_err(|_| StorageError::AnchorNotFound(spec.to_string()))?;
    let commit = object
        .peel_to_commit()
        .map_err(|_| StorageError::AnchorNotFound(spec.to_string()))?;

    Ok(Anchor::from_git2(&commit))
}

/// create the root commit for a new repository
pub fn create_initial_commit(repo: &Repository, signature: &GitSignature) -> StorageResult<AnchorId> {
    let tree_id = crate::storage::tree::create_empty_tree(repo)?;

    CommitBuilder::new(repo)
        .tree(tree_id)
        .message("Initialize store")
        .signature(signature.clone())
        .update_ref("HEAD")
        .commit()
}

/// iterate over anchor history starting from an anchor, newest first
pub struct HistoryIterator<'repo> {
    repo: &'repo Repository,
    revwalk: Revwalk<'repo>,
}

impl<'repo> HistoryIterator<'repo> {
    /// create a new history iterator
    pub fn new(repo: &'repo Repository, start: AnchorId) -> StorageResult<Self> {
        let mut revwalk = repo.revwalk()?;
        revwalk.push(start.raw())?;
        revwalk.set_sorting(Sort::TIME | Sort::TOPOLOGICAL)?;

        Ok(Self { repo, revwalk })
    }
}

impl<'repo> Iterator for HistoryIterator<'repo> {
    type Item = StorageResult<Anchor>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.revwalk.next()? {
            Ok(oid) => match self.repo.find_commit(oid) {
                Ok(commit) => Some(Ok(Anchor::from_git2(&commit))),
                Err(e) => Some(Err(StorageError::Git(e))),
            },
            Err(e) => Some(Err(StorageError::Git(e))),
        }
    }
}

/// get history for an anchor
pub fn history(repo: &Repository, start: AnchorId) -> StorageResult<HistoryIterator<'_>> {
    HistoryIterator::new(repo, start)
}
