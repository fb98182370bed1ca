//! File descriptors handed to visitors, and raw blob access.

use std::fmt;

use git2::Repository;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::BlobId;

/// One file of a directory as seen during a tree walk.
///
/// Content is read lazily; a visitor that only needs names or fingerprints
/// never touches the object database.
pub struct StoredFile<'repo> {
    name: String,
    path: String,
    id: BlobId,
    repo: &'repo Repository,
}

impl<'repo> StoredFile<'repo> {
    pub(crate) fn new(repo: &'repo Repository, name: impl Into<String>, path: impl Into<String>, id: BlobId) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            id,
            repo,
        }
    }

    /// file name within its directory
    pub fn name(&self) -> &str {
        &self.name
    }

    /// full storage path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// content fingerprint (the blob id)
    pub fn fingerprint(&self) -> BlobId {
        self.id
    }

    /// read the file's bytes
    pub fn contents(&self) -> StorageResult<Vec<u8>> {
        read_blob(self.repo, self.id)
    }
}

impl fmt::Debug for StoredFile<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredFile")
            .field("path", &self.path)
            .field("id", &self.id)
            .finish()
    }
}

/// write bytes into the object database
pub fn write_blob(repo: &Repository, contents: &[u8]) -> StorageResult<BlobId> {
    let oid = repo.blob(contents)?;
    Ok(BlobId::new(oid))
}

/// read a blob's bytes
pub fn read_blob(repo: &Repository, id: BlobId) -> StorageResult<Vec<u8>> {
    let blob = repo
        .find_blob(id.raw())
        .map_err(|e| StorageError::Internal(format!("missing blob {}: {}", id, e)))?;
    Ok(blob.content().to_vec())
}
