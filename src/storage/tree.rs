//!  tree walking and tree rewriting.
//!
//! in Git, a tree is a directory. In anchordb every document is a blob at a
//! convention-derived path, so a commit's tree is the whole store at that
//! anchor. Reads walk it with a [`StorageVisitor`]; writes rebuild it with a
//! [`TreeMutator`].

use std::path::Path;

use git2::build::TreeUpdateBuilder;
use git2::{FileMode, ObjectType, Repository, Tree};
use tracing::debug;

use crate::storage::blob::StoredFile;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::path;
use crate::storage::types::{BlobId, TreeId};
use crate::storage::visitor::StorageVisitor;

/// walk `tree` depth-first, calling the visitor for every entered directory
pub(crate) fn walk<V: StorageVisitor>(
    repo: &Repository,
    tree: &Tree<'_>,
    directory: &str,
    visitor: &mut V,
) -> Result<(), V::Error> {
    let mut files = Vec::new();

    for entry in tree.iter() {
        let Some(name) = entry.name() else {
            debug!(directory, id = %entry.id(), "skipping tree entry with a non utf-8 name");
            continue;
        };
        let entry_path = path::join(directory, name);

        match entry.kind() {
            Some(ObjectType::Tree) => {
                if visitor.should_traverse_directory(&entry_path) {
                    let subtree = repo.find_tree(entry.id()).map_err(StorageError::from)?;
                    walk(repo, &subtree, &entry_path, visitor)?;
                }
            }
            Some(ObjectType::Blob) => {
                files.push(StoredFile::new(repo, name, entry_path, BlobId::new(entry.id())));
            }
            // submodule links are not part of the store
            _ => {}
        }
    }

    visitor.visit_directory(directory, &files)
}

/// write an empty tree and return its id
pub fn create_empty_tree(repo: &Repository) -> StorageResult<TreeId> {
    let builder = repo.treebuilder(None)?;
    Ok(TreeId::new(builder.write()?))
}

/// find the blob stored at `file_path` in `tree`, if any
pub fn blob_at(tree: &Tree<'_>, file_path: &str) -> StorageResult<Option<BlobId>> {
    match tree.get_path(Path::new(file_path)) {
        Ok(entry) => {
            if entry.kind() != Some(ObjectType::Blob) {
                return Err(StorageError::UnexpectedEntryType {
                    path: file_path.to_string(),
                    expected: "blob (file)".to_string(),
                    found: format!("{:?}", entry.kind()),
                });
            }
            Ok(Some(BlobId::new(entry.id())))
        }
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
        Err(e) => Err(StorageError::Git(e)),
    }
}

/// a mutable view over a baseline tree for making changes
///
/// this adds up changes and produces a new tree when its final.
/// the baseline tree is not modified. Directories are created on demand and
/// libgit2 prunes directories left empty by removals.
///
/// # Usage Pattern
///
/// ```ignore
/// let mut mutator = TreeMutator::from_tree(repo, base_tree_id)?;
/// mutator.upsert("projects/acme/project.json", blob_id);
/// mutator.remove("machines/m1.json");
/// let new_tree_id = mutator.write()?;
/// ```
pub struct TreeMutator<'repo> {
    repo: &'repo Repository,
    base: Tree<'repo>,
    updates: TreeUpdateBuilder,
    pending: usize,
}

impl<'repo> TreeMutator<'repo> {
    /// create a new TreeMutator from an existing tree
    pub fn from_tree(repo: &'repo Repository, tree_id: TreeId) -> StorageResult<Self> {
        let base = repo.find_tree(tree_id.raw())?;
        Ok(Self {
            repo,
            base,
            updates: TreeUpdateBuilder::new(),
            pending: 0,
        })
    }

    /// insert or replace the file at `file_path`
    pub fn upsert(&mut self, file_path: &str, blob: BlobId) {
        self.updates.upsert(file_path, blob.raw(), FileMode::Blob);
        self.pending += 1;
    }

    /// remove the file at `file_path`; returns false if the baseline has no such file
    pub fn remove(&mut self, file_path: &str) -> StorageResult<bool> {
        if blob_at(&self.base, file_path)?.is_none() {
            return Ok(false);
        }
        self.updates.remove(file_path);
        self.pending += 1;
        Ok(true)
    }

    /// number of queued changes
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// write the new tree and return its id
    pub fn write(mut self) -> StorageResult<TreeId> {
        if self.pending == 0 {
            return Ok(TreeId::new(self.base.id()));
        }
        let oid = self.updates.create_updated(self.repo, &self.base)?;
        Ok(TreeId::new(oid))
    }
}
