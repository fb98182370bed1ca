//! core type-safe wrappers around git primitives for the storage layer.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use git2::Oid;

/// Identifies one anchor (a commit) in the tree store.
///
/// This makes sure we don't accidentally pass a blob ID where an anchor ID
/// is expected. The inner Oid is only accessible within the storage module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AnchorId(pub(crate) Oid);

impl AnchorId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    /// raw Oid (for internal use only)
    pub(crate) fn raw(&self) -> Oid {
        self.0
    }

    /// parse AnchorId from a full hex string
    pub fn from_hex(hex: &str) -> Result<Self, git2::Error> {
        Oid::from_str(hex).map(AnchorId)
    }

    /// short form of the anchor ID
    pub fn short(&self) -> String {
        let full = self.0.to_string();
        full[..7.min(full.len())].to_string()
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Git blob identifier. Doubles as the content fingerprint of a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobId(pub(crate) Oid);

impl BlobId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Git tree identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(pub(crate) Oid);

impl TreeId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// identity used when the store creates commits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitSignature {
    pub name: String,
    pub email: String,
}

impl GitSignature {
    /// create a new signature
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// default signature for store commits
    pub fn anchordb() -> Self {
        Self::new("anchordb", "anchordb@localhost")
    }

    /// convert to git2::Signature stamped with the current time
    pub(crate) fn to_git2_signature(&self) -> Result<git2::Signature<'static>, git2::Error> {
        git2::Signature::now(&self.name, &self.email)
    }
}

impl Default for GitSignature {
    fn default() -> Self {
        Self::anchordb()
    }
}

/// A recorded author or committer of an anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub when: DateTime<Utc>,
}

impl Signature {
    pub(crate) fn from_git2(signature: &git2::Signature<'_>) -> Self {
        let when = Utc
            .timestamp_opt(signature.when().seconds(), 0)
            .single()
            .unwrap_or_else(Utc::now);

        Self {
            name: signature.name().unwrap_or("Unknown").to_string(),
            email: signature.email().unwrap_or("unknown@unknown").to_string(),
            when,
        }
    }
}
