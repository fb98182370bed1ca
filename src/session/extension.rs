//! Hooks into the write session lifecycle.

use std::sync::Arc;

use crate::conventions::{short_type_name, ConventionResult, DocumentType, Identity, SharedDocument};
use crate::session::error::SessionResult;
use crate::session::read::DocumentReader;
use crate::session::write::WriteSession;
use crate::storage::{Anchor, GitRepository, StorageBatch};

/// What a hook can reach: the session itself, its anchor and the tree store.
pub struct ExtensionContext<'a> {
    session: &'a mut WriteSession,
}

impl<'a> ExtensionContext<'a> {
    pub(crate) fn new(session: &'a mut WriteSession) -> Self {
        Self { session }
    }

    pub fn session(&mut self) -> &mut WriteSession {
        self.session
    }

    pub fn anchor(&self) -> &Anchor {
        self.session.anchor()
    }

    pub fn repository(&self) -> &GitRepository {
        self.session.repository()
    }

    /// The session's batch. Files put here directly bypass the codecs.
    pub fn batch(&mut self) -> &mut StorageBatch {
        self.session.batch_mut()
    }
}

/// A document on its way into a write session.
///
/// `before_store` hooks may change its identity; the path is resolved
/// only after every hook has run.
pub struct StagedDocument {
    value: SharedDocument,
    document_type: Arc<DocumentType>,
}

impl StagedDocument {
    pub(crate) fn new(value: SharedDocument, document_type: Arc<DocumentType>) -> Self {
        Self { value, document_type }
    }

    pub fn document_type(&self) -> &DocumentType {
        &self.document_type
    }

    pub fn type_name(&self) -> &'static str {
        self.document_type.name()
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.document_type.identity_of(&*self.value)
    }

    /// Set the identity. A document shared with the caller is copied first.
    pub fn assign_identity(&mut self, identity: Identity) -> bool {
        self.document_type.assign(&mut self.value, identity)
    }

    pub fn path(&self) -> ConventionResult<String> {
        self.document_type.path_of(&*self.value)
    }

    pub(crate) fn value(&self) -> &SharedDocument {
        &self.value
    }

    pub(crate) fn into_value(self) -> SharedDocument {
        self.value
    }
}

/// Pluggable behaviour run at fixed points of every write session.
///
/// All hooks default to doing nothing. An error from a hook aborts the
/// operation that triggered it, except from `after_commit`.
pub trait WriteSessionExtension: Send + Sync {
    fn name(&self) -> &'static str {
        short_type_name::<Self>()
    }

    fn after_open(&self, _context: &mut ExtensionContext<'_>) -> SessionResult<()> {
        Ok(())
    }

    fn before_store(&self, _context: &mut ExtensionContext<'_>, _document: &mut StagedDocument) -> SessionResult<()> {
        Ok(())
    }

    fn after_store(&self, _context: &mut ExtensionContext<'_>, _path: &str, _document: &StagedDocument) -> SessionResult<()> {
        Ok(())
    }

    fn before_delete(&self, _context: &mut ExtensionContext<'_>, _path: &str) -> SessionResult<()> {
        Ok(())
    }

    fn after_delete(&self, _context: &mut ExtensionContext<'_>, _path: &str) -> SessionResult<()> {
        Ok(())
    }

    fn before_commit(&self, _context: &mut ExtensionContext<'_>) -> SessionResult<()> {
        Ok(())
    }

    /// `anchor` is `None` when the commit changed nothing.
    ///
    /// Runs after the anchor is written. An error here is logged and the
    /// commit still succeeds.
    fn after_commit(&self, _context: &mut ExtensionContext<'_>, _anchor: Option<&Anchor>) -> SessionResult<()> {
        Ok(())
    }
}
