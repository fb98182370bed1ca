//! Write sessions: the transactional unit of work.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};
use ulid::Ulid;

use crate::codec::{CodecError, CodecRegistry};
use crate::conventions::{Attachments, Conventions, Document, DocumentType, Identity, SharedDocument};
use crate::diagnostics::{Counter, Statistics, Timing};
use crate::session::document_set::DocumentSet;
use crate::session::error::{SessionError, SessionResult};
use crate::session::extension::{ExtensionContext, StagedDocument, WriteSessionExtension};
use crate::session::read::DocumentReader;
use crate::session::visitors::{LoadBlob, LoadById, LoadByType, Loader};
use crate::storage::{path, Anchor, GitRepository, GitSignature, StorageBatch};

/// The last operation requested for a path.
#[derive(Clone)]
enum PendingChange {
    Store(SharedDocument),
    Delete,
    /// attachment removed along with its owner; restoring the owner drops it
    Cascade,
}

impl PendingChange {
    fn is_delete(&self) -> bool {
        matches!(self, PendingChange::Delete | PendingChange::Cascade)
    }
}

/// Buffers stores and deletes and commits them as one anchor.
///
/// A session holds the store's write batch, and with it the process-wide
/// write lock, from the moment it is opened until it is committed or
/// dropped. Dropping a session without committing discards everything it
/// staged.
pub struct WriteSession {
    id: Ulid,
    repository: GitRepository,
    batch: StorageBatch,
    documents: DocumentSet,
    conventions: Arc<Conventions>,
    codecs: CodecRegistry,
    statistics: Arc<Statistics>,
    extensions: Vec<Arc<dyn WriteSessionExtension>>,
    pending: BTreeMap<String, PendingChange>,
}

impl WriteSession {
    /// Acquire the write batch and run every extension's `after_open` hook.
    pub(crate) fn open(
        repository: GitRepository,
        conventions: Arc<Conventions>,
        codecs: CodecRegistry,
        statistics: Arc<Statistics>,
        extensions: Vec<Arc<dyn WriteSessionExtension>>,
    ) -> SessionResult<Self> {
        let batch = repository.batch()?;
        let documents = DocumentSet::new(batch.anchor().clone());
        statistics.increment(Counter::WriteSessionsOpened);

        let mut session = Self {
            id: Ulid::new(),
            repository,
            batch,
            documents,
            conventions,
            codecs,
            statistics,
            extensions,
            pending: BTreeMap::new(),
        };
        debug!(session = %session.id, anchor = %session.anchor().id, "opened write session");

        for extension in session.extensions.clone() {
            extension.after_open(&mut ExtensionContext::new(&mut session))?;
        }
        Ok(session)
    }

    /// Correlates this session's log lines.
    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn repository(&self) -> &GitRepository {
        &self.repository
    }

    pub(crate) fn batch_mut(&mut self) -> &mut StorageBatch {
        &mut self.batch
    }

    /// Number of paths with a pending store or delete.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn loader(&self) -> Loader<'_> {
        Loader::new(&self.documents, &self.codecs, &self.statistics)
    }

    // ==================== Staging ====================

    /// Stage `item` at its convention path.
    ///
    /// Fails with [`SessionError::IdentifierAlreadyInUse`] if a different
    /// object is already staged at that path. Returns the staged instance,
    /// which carries any identity assigned by an extension.
    pub fn store<T: Document>(&mut self, item: T) -> SessionResult<Arc<T>> {
        self.stage(Arc::new(item), false)
    }

    /// Like [`store`](Self::store) for an instance the caller keeps sharing.
    /// Storing the same instance again is a no-op.
    pub fn store_shared<T: Document>(&mut self, item: Arc<T>) -> SessionResult<Arc<T>> {
        self.stage(item, false)
    }

    /// Stage `item`, replacing whatever is staged at its path.
    pub fn store_replacing<T: Document>(&mut self, item: T) -> SessionResult<Arc<T>> {
        self.stage(Arc::new(item), true)
    }

    fn stage<T: Document>(&mut self, item: Arc<T>, force: bool) -> SessionResult<Arc<T>> {
        let document_type = self.conventions.document_type::<T>()?;
        let mut staged = StagedDocument::new(item, document_type);

        for extension in self.extensions.clone() {
            extension.before_store(&mut ExtensionContext::new(self), &mut staged)?;
        }

        let path = staged.path()?;
        self.documents.add(&path, Arc::clone(staged.value()), force)?;
        for (_, sibling) in staged.document_type().attachment_paths(&path) {
            if matches!(self.pending.get(&sibling), Some(PendingChange::Cascade)) {
                self.pending.remove(&sibling);
            }
        }
        self.pending
            .insert(path.clone(), PendingChange::Store(Arc::clone(staged.value())));
        trace!(session = %self.id, path = %path, type_name = staged.type_name(), "staged document");

        for extension in self.extensions.clone() {
            extension.after_store(&mut ExtensionContext::new(self), &path, &staged)?;
        }

        staged
            .into_value()
            .downcast::<T>()
            .map_err(|_| SessionError::from(CodecError::TypeMismatch { expected: T::type_name() }))
    }

    /// Stage removal of `item` and its attachments.
    ///
    /// Deleting something that was never stored is not an error.
    pub fn delete<T: Document>(&mut self, item: &T) -> SessionResult<()> {
        self.delete_by_id::<T>(item.identity())
    }

    pub fn delete_by_id<T: Document>(&mut self, id: impl Into<Identity>) -> SessionResult<()> {
        let document_type = self.conventions.document_type::<T>()?;
        let path = document_type.path_for(&id.into())?;
        self.unstage(&path, Some(document_type.as_ref()))
    }

    /// Stage raw bytes at `file_path`, typically an attachment sibling.
    pub fn store_binary(&mut self, file_path: &str, contents: impl Into<Vec<u8>>) -> SessionResult<()> {
        let file_path = path::validate(file_path)?;
        let value: SharedDocument = Arc::new(contents.into());
        self.documents.add(&file_path, Arc::clone(&value), true)?;
        trace!(session = %self.id, path = %file_path, "staged file");
        self.pending.insert(file_path, PendingChange::Store(value));
        Ok(())
    }

    pub fn store_text(&mut self, file_path: &str, text: &str) -> SessionResult<()> {
        self.store_binary(file_path, text.as_bytes())
    }

    /// Stage removal of the raw file at `file_path`.
    pub fn delete_attachment(&mut self, file_path: &str) -> SessionResult<()> {
        let file_path = path::validate(file_path)?;
        self.unstage(&file_path, None)
    }

    fn unstage(&mut self, file_path: &str, document_type: Option<&DocumentType>) -> SessionResult<()> {
        for extension in self.extensions.clone() {
            extension.before_delete(&mut ExtensionContext::new(self), file_path)?;
        }

        self.documents.evict(file_path);
        self.pending.insert(file_path.to_string(), PendingChange::Delete);
        if let Some(document_type) = document_type {
            for (_, sibling) in document_type.attachment_paths(file_path) {
                self.documents.evict(&sibling);
                self.pending.insert(sibling, PendingChange::Cascade);
            }
        }
        trace!(session = %self.id, path = file_path, "staged delete");

        for extension in self.extensions.clone() {
            extension.after_delete(&mut ExtensionContext::new(self), file_path)?;
        }
        Ok(())
    }

    // ==================== Reading ====================

    /// The instance staged in this session at `T`'s path for `id`, if any.
    pub fn staged<T: Document>(&self, id: impl Into<Identity>) -> SessionResult<Option<Arc<T>>> {
        let path = self.conventions.path_for::<T>(&id.into())?;
        Ok(match self.pending.get(&path) {
            Some(PendingChange::Store(value)) => Arc::clone(value).downcast::<T>().ok(),
            _ => None,
        })
    }

    /// Attachment bytes that committing the staged owner of `file_path` would write.
    fn staged_attachment(&self, file_path: &str) -> SessionResult<Option<Option<Vec<u8>>>> {
        for (owner, change) in &self.pending {
            let PendingChange::Store(value) = change else {
                continue;
            };
            let codec = self.codecs.for_value(owner, &**value)?;
            let Some((suffix, _)) = codec
                .attachments_for(owner)
                .into_iter()
                .find(|(_, sibling)| sibling == file_path)
            else {
                continue;
            };
            let mut attachments = Attachments::new();
            codec.encode(owner, &**value, &mut std::io::sink(), &mut attachments)?;
            return Ok(Some(attachments.get(suffix).map(<[u8]>::to_vec)));
        }
        Ok(None)
    }

    // ==================== Committing ====================

    /// Commit with the store's default signature.
    ///
    /// Returns the new anchor, or `None` when nothing changed. Once the
    /// anchor exists the commit stands: a failing `after_commit` hook is
    /// logged and does not turn the result into an error.
    pub fn commit(self, message: &str) -> SessionResult<Option<Anchor>> {
        let signature = self.repository.signature().clone();
        self.commit_as(message, &signature)
    }

    pub fn commit_as(mut self, message: &str, signature: &GitSignature) -> SessionResult<Option<Anchor>> {
        for extension in self.extensions.clone() {
            extension.before_commit(&mut ExtensionContext::new(&mut self))?;
        }

        self.apply_pending()?;
        let anchor = self.batch.commit_as(message, signature)?;
        match &anchor {
            Some(anchor) => info!(session = %self.id, anchor = %anchor.id, message, "committed write session"),
            None => debug!(session = %self.id, "write session committed no changes"),
        }

        for extension in self.extensions.clone() {
            if let Err(error) = extension.after_commit(&mut ExtensionContext::new(&mut self), anchor.as_ref()) {
                warn!(session = %self.id, extension = extension.name(), %error, "after_commit hook failed");
            }
        }
        self.pending.clear();
        Ok(anchor)
    }

    /// Encode every pending store into the batch and stage every pending delete.
    fn apply_pending(&mut self) -> SessionResult<()> {
        let WriteSession {
            repository,
            pending,
            batch,
            conventions,
            codecs,
            statistics,
            ..
        } = self;

        for (file_path, change) in pending.iter() {
            let value = match change {
                PendingChange::Delete => {
                    // only documents that exist at the base anchor count as deleted
                    let counted = conventions.type_of(file_path).is_some()
                        && repository.contains(batch.anchor(), file_path)?;
                    batch.delete(file_path)?;
                    if counted {
                        statistics.increment(Counter::DocumentsDeleted);
                    }
                    continue;
                }
                PendingChange::Cascade => {
                    batch.delete(file_path)?;
                    continue;
                }
                PendingChange::Store(value) => value,
            };

            let codec = codecs.for_value(file_path, &**value)?;
            let mut attachments = Attachments::new();
            batch.put_with(file_path, |output| {
                let _timer = statistics.measure(Timing::Serialization);
                codec
                    .encode(file_path, &**value, output, &mut attachments)
                    .map_err(SessionError::from)
            })?;

            let siblings = codec.attachments_for(file_path);
            if !siblings.is_empty() {
                let _timer = statistics.measure(Timing::Attachments);
                for (suffix, sibling) in siblings {
                    // an explicit store or delete of the sibling wins
                    if pending.contains_key(&sibling) {
                        continue;
                    }
                    match attachments.get(suffix) {
                        Some(contents) => batch.put(&sibling, contents)?,
                        None => batch.delete(&sibling)?,
                    }
                }
            }
            statistics.increment(Counter::DocumentsStored);
        }
        Ok(())
    }
}

impl DocumentReader for WriteSession {
    fn anchor(&self) -> &Anchor {
        self.batch.anchor()
    }

    /// Staged instances win; paths staged for deletion read as absent.
    fn load_many<T, I>(&self, ids: I) -> SessionResult<Vec<Arc<T>>>
    where
        T: Document,
        I: IntoIterator,
        I::Item: Into<Identity>,
    {
        let document_type = self.conventions.document_type::<T>()?;
        let paths = ids
            .into_iter()
            .map(|id| document_type.path_for(&id.into()))
            .collect::<Result<Vec<_>, _>>()?;

        let unresolved: Vec<String> = paths
            .iter()
            .filter(|path| !self.pending.contains_key(*path))
            .cloned()
            .collect();
        if !unresolved.is_empty() {
            let mut visitor = LoadById::new(self.loader(), unresolved);
            self.repository.visit(self.anchor(), &mut visitor)?;
        }

        Ok(paths
            .iter()
            .filter_map(|path| match self.pending.get(path) {
                Some(change) if change.is_delete() => None,
                _ => self.documents.get_as::<T>(path),
            })
            .collect())
    }

    fn query<T: Document>(&self) -> SessionResult<Vec<Arc<T>>> {
        let document_type = self.conventions.document_type::<T>()?;
        let mut visitor = LoadByType::new(self.loader(), &self.conventions, Arc::clone(&document_type));
        self.repository.visit(self.anchor(), &mut visitor)?;

        let mut documents: BTreeMap<String, Arc<T>> = visitor
            .into_found()
            .into_iter()
            .filter(|(path, _)| !self.pending.get(path).is_some_and(PendingChange::is_delete))
            .filter_map(|(path, value)| value.downcast::<T>().ok().map(|document| (path, document)))
            .collect();

        for (path, change) in &self.pending {
            if let PendingChange::Store(value) = change {
                if let Ok(document) = Arc::clone(value).downcast::<T>() {
                    documents.insert(path.clone(), document);
                }
            }
        }
        Ok(documents.into_values().collect())
    }

    fn load_binary(&self, file_path: &str) -> SessionResult<Option<Vec<u8>>> {
        let file_path = path::validate(file_path)?;
        match self.pending.get(&file_path) {
            Some(PendingChange::Delete | PendingChange::Cascade) => return Ok(None),
            Some(PendingChange::Store(value)) => {
                if let Some(bytes) = value.downcast_ref::<Vec<u8>>() {
                    return Ok(Some(bytes.clone()));
                }
                let mut output = Vec::new();
                self.codecs
                    .encode(&file_path, &**value, &mut output, &mut Attachments::new())?;
                return Ok(Some(output));
            }
            None => {}
        }
        if let Some(staged) = self.staged_attachment(&file_path)? {
            return Ok(staged);
        }

        let mut visitor = LoadBlob::new([file_path]);
        self.repository.visit(self.anchor(), &mut visitor)?;
        Ok(visitor.into_found().into_iter().next().map(|(_, bytes)| bytes))
    }
}

impl fmt::Debug for WriteSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteSession")
            .field("id", &self.id)
            .field("anchor", &self.batch.anchor().id)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl Drop for WriteSession {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            debug!(session = %self.id, pending = self.pending.len(), "discarding uncommitted write session");
        }
        self.statistics.increment(Counter::WriteSessionsClosed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Machine, Project};
    use parking_lot::Mutex;
    use tempfile::TempDir;

    fn setup() -> (TempDir, GitRepository) {
        let temp = TempDir::new().unwrap();
        let repository = GitRepository::init(temp.path()).unwrap();
        (temp, repository)
    }

    fn open_with(repository: &GitRepository, extensions: Vec<Arc<dyn WriteSessionExtension>>) -> WriteSession {
        let conventions = Arc::new(Conventions::new());
        conventions.register::<Project>().unwrap();
        conventions.register::<Machine>().unwrap();
        WriteSession::open(
            repository.clone(),
            Arc::clone(&conventions),
            CodecRegistry::new(conventions),
            Arc::new(Statistics::new()),
            extensions,
        )
        .unwrap()
    }

    fn open(repository: &GitRepository) -> WriteSession {
        open_with(repository, Vec::new())
    }

    fn read(repository: &GitRepository, file_path: &str) -> Option<String> {
        let anchor = repository.current_anchor().unwrap();
        repository
            .read_file(&anchor, file_path)
            .unwrap()
            .map(|bytes| String::from_utf8(bytes).unwrap())
    }

    #[test]
    fn test_last_operation_wins() {
        let (_temp, repository) = setup();
        let mut session = open(&repository);

        session.store(Machine::new(1, "web")).unwrap();
        session.delete_by_id::<Machine>(1u64).unwrap();
        session.store(Machine::new(1, "web again")).unwrap();
        session.store(Machine::new(2, "db")).unwrap();
        session.delete_by_id::<Machine>(2u64).unwrap();
        assert_eq!(session.pending(), 2);
        session.commit("Machines").unwrap().unwrap();

        assert!(read(&repository, "machines/1.json").unwrap().contains("web again"));
        assert!(read(&repository, "machines/2.json").is_none());
    }

    #[test]
    fn test_commit_without_changes_creates_no_anchor() {
        let (_temp, repository) = setup();
        let before = repository.current_anchor().unwrap();

        let mut session = open(&repository);
        session.delete_by_id::<Machine>(7u64).unwrap();
        assert!(session.commit("Nothing to delete").unwrap().is_none());
        assert_eq!(repository.current_anchor().unwrap().id, before.id);
    }

    #[test]
    fn test_documents_are_written_pretty() {
        let (_temp, repository) = setup();
        let mut session = open(&repository);
        session.store(Project::new("acme", "ACME")).unwrap();

        let staged = session.load_text("projects/acme/project.json").unwrap().unwrap();
        session.commit("Added project").unwrap();
        let committed = read(&repository, "projects/acme/project.json").unwrap();

        assert_eq!(staged, committed);
        assert!(committed.contains("\n  \"name\": \"ACME\""));
    }

    #[test]
    fn test_explicit_attachment_overrides_the_owner() {
        let (_temp, repository) = setup();
        let mut session = open(&repository);

        let mut project = Project::new("acme", "ACME");
        project.description = Some("# From the document".to_string());
        project.script_module = Some("function Go {}".to_string());
        session.store(project).unwrap();
        session
            .store_text("projects/acme/project.readme.md", "# Written directly")
            .unwrap();
        session.delete_attachment("projects/acme/project.module.psm1").unwrap();

        assert_eq!(
            session.load_text("projects/acme/project.readme.md").unwrap().as_deref(),
            Some("# Written directly")
        );
        assert!(session.load_binary("projects/acme/project.module.psm1").unwrap().is_none());
        session.commit("Added project").unwrap();

        assert_eq!(
            read(&repository, "projects/acme/project.readme.md").as_deref(),
            Some("# Written directly")
        );
        assert!(read(&repository, "projects/acme/project.module.psm1").is_none());
    }

    #[test]
    fn test_delete_removes_attachments() {
        let (_temp, repository) = setup();
        let mut session = open(&repository);
        let mut project = Project::new("acme", "ACME");
        project.description = Some("# ACME".to_string());
        session.store(project).unwrap();
        session.store_text("projects/acme/notes.txt", "kept").unwrap();
        session.commit("Added project").unwrap();

        let mut session = open(&repository);
        let loaded = session.load::<Project>("acme").unwrap().unwrap();
        assert_eq!(loaded.description.as_deref(), Some("# ACME"));
        session.delete(&*loaded).unwrap();
        assert!(session.load::<Project>("acme").unwrap().is_none());
        assert!(session.load_binary("projects/acme/project.readme.md").unwrap().is_none());
        session.commit("Removed project").unwrap().unwrap();

        assert!(read(&repository, "projects/acme/project.json").is_none());
        assert!(read(&repository, "projects/acme/project.readme.md").is_none());
        assert_eq!(read(&repository, "projects/acme/notes.txt").as_deref(), Some("kept"));
    }

    #[test]
    fn test_staged_returns_only_pending_stores() {
        let (_temp, repository) = setup();
        let mut session = open(&repository);
        session.store(Machine::new(1, "web")).unwrap();
        session.commit("Added web").unwrap();

        let mut session = open(&repository);
        assert!(session.load::<Machine>(1u64).unwrap().is_some());
        assert!(session.staged::<Machine>(1u64).unwrap().is_none());

        let stored = session.store(Machine::new(2, "db")).unwrap();
        let staged = session.staged::<Machine>(2u64).unwrap().unwrap();
        assert!(Arc::ptr_eq(&stored, &staged));

        let machines = session.load_many::<Machine, _>([2u64, 1]).unwrap();
        assert_eq!(machines.iter().map(|m| m.id).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[test]
    fn test_commit_updates_statistics() {
        let (_temp, repository) = setup();
        let statistics = Arc::new(Statistics::new());
        let conventions = Arc::new(Conventions::new());
        conventions.register::<Machine>().unwrap();

        let mut session = WriteSession::open(
            repository.clone(),
            Arc::clone(&conventions),
            CodecRegistry::new(Arc::clone(&conventions)),
            Arc::clone(&statistics),
            Vec::new(),
        )
        .unwrap();
        session.store(Machine::new(1, "web")).unwrap();
        session.store(Machine::new(2, "db")).unwrap();
        session.delete_by_id::<Machine>(3u64).unwrap();
        session.commit("Machines").unwrap();

        assert_eq!(statistics.count(Counter::DocumentsStored), 2);
        assert_eq!(statistics.count(Counter::DocumentsDeleted), 0);

        let mut session = WriteSession::open(
            repository.clone(),
            Arc::clone(&conventions),
            CodecRegistry::new(Arc::clone(&conventions)),
            Arc::clone(&statistics),
            Vec::new(),
        )
        .unwrap();
        session.delete_by_id::<Machine>(1u64).unwrap();
        session.delete_by_id::<Machine>(4u64).unwrap();
        session.delete_attachment("machines/notes.txt").unwrap();
        session.commit("Removed web").unwrap().unwrap();

        assert_eq!(statistics.count(Counter::DocumentsStored), 2);
        assert_eq!(statistics.count(Counter::DocumentsDeleted), 1);
        assert_eq!(statistics.count(Counter::WriteSessionsOpened), 2);
        assert_eq!(statistics.count(Counter::WriteSessionsClosed), 2);
    }

    #[test]
    fn test_deleting_a_project_does_not_count_its_attachments() {
        let (_temp, repository) = setup();
        let statistics = Arc::new(Statistics::new());
        let conventions = Arc::new(Conventions::new());
        conventions.register::<Project>().unwrap();
        let open = || {
            WriteSession::open(
                repository.clone(),
                Arc::clone(&conventions),
                CodecRegistry::new(Arc::clone(&conventions)),
                Arc::clone(&statistics),
                Vec::new(),
            )
            .unwrap()
        };

        let mut session = open();
        let mut project = Project::new("acme", "ACME");
        project.description = Some("# ACME".to_string());
        project.script_module = Some("function Go {}".to_string());
        session.store(project).unwrap();
        session.commit("Added project").unwrap();

        let mut session = open();
        session.delete_by_id::<Project>("acme").unwrap();
        session.commit("Removed project").unwrap().unwrap();

        assert_eq!(statistics.count(Counter::DocumentsDeleted), 1);
        assert!(read(&repository, "projects/acme/project.module.psm1").is_none());
    }

    #[test]
    fn test_restoring_a_deleted_owner_keeps_its_attachments() {
        let (_temp, repository) = setup();
        let mut session = open(&repository);
        let mut project = Project::new("acme", "ACME");
        project.description = Some("# ACME".to_string());
        session.store(project).unwrap();
        session.commit("Added project").unwrap();

        let mut session = open(&repository);
        let loaded = session.load::<Project>("acme").unwrap().unwrap();
        session.delete_by_id::<Project>("acme").unwrap();
        assert!(session.load_binary("projects/acme/project.readme.md").unwrap().is_none());

        let mut restored = (*loaded).clone();
        restored.description = Some("# ACME again".to_string());
        session.store(restored).unwrap();
        assert_eq!(
            session.load_text("projects/acme/project.readme.md").unwrap().as_deref(),
            Some("# ACME again")
        );
        session.commit("Restored project").unwrap().unwrap();

        assert!(read(&repository, "projects/acme/project.json").is_some());
        assert_eq!(
            read(&repository, "projects/acme/project.readme.md").as_deref(),
            Some("# ACME again")
        );
    }

    #[test]
    fn test_explicit_attachment_delete_survives_owner_restore() {
        let (_temp, repository) = setup();
        let mut session = open(&repository);
        let mut project = Project::new("acme", "ACME");
        project.description = Some("# ACME".to_string());
        session.store(project.clone()).unwrap();
        session.commit("Added project").unwrap();

        let mut session = open(&repository);
        session.delete_by_id::<Project>("acme").unwrap();
        session.delete_attachment("projects/acme/project.readme.md").unwrap();
        session.store(project).unwrap();
        session.commit("Restored project without readme").unwrap().unwrap();

        assert!(read(&repository, "projects/acme/project.json").is_some());
        assert!(read(&repository, "projects/acme/project.readme.md").is_none());
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn push(&self, event: String) {
            self.events.lock().push(event);
        }
    }

    impl WriteSessionExtension for Recorder {
        fn after_open(&self, _context: &mut ExtensionContext<'_>) -> SessionResult<()> {
            self.push("after_open".to_string());
            Ok(())
        }

        fn before_store(&self, _context: &mut ExtensionContext<'_>, document: &mut StagedDocument) -> SessionResult<()> {
            self.push(format!("before_store {}", document.type_name()));
            Ok(())
        }

        fn after_store(&self, _context: &mut ExtensionContext<'_>, path: &str, _document: &StagedDocument) -> SessionResult<()> {
            self.push(format!("after_store {path}"));
            Ok(())
        }

        fn before_delete(&self, _context: &mut ExtensionContext<'_>, path: &str) -> SessionResult<()> {
            self.push(format!("before_delete {path}"));
            Ok(())
        }

        fn after_delete(&self, _context: &mut ExtensionContext<'_>, path: &str) -> SessionResult<()> {
            self.push(format!("after_delete {path}"));
            Ok(())
        }

        fn before_commit(&self, context: &mut ExtensionContext<'_>) -> SessionResult<()> {
            self.push(format!("before_commit {}", context.session().pending()));
            Ok(())
        }

        fn after_commit(&self, _context: &mut ExtensionContext<'_>, anchor: Option<&Anchor>) -> SessionResult<()> {
            self.push(format!("after_commit {}", anchor.is_some()));
            Ok(())
        }
    }

    #[test]
    fn test_extension_hooks_run_in_order() {
        let (_temp, repository) = setup();
        let recorder = Arc::new(Recorder::default());
        let mut session = open_with(&repository, vec![Arc::clone(&recorder) as Arc<dyn WriteSessionExtension>]);

        session.store(Project::new("acme", "ACME")).unwrap();
        session.delete_by_id::<Machine>(3u64).unwrap();
        session.commit("Changes").unwrap();

        assert_eq!(
            *recorder.events.lock(),
            vec![
                "after_open",
                "before_store Project",
                "after_store projects/acme/project.json",
                "before_delete machines/3.json",
                "after_delete machines/3.json",
                "before_commit 2",
                "after_commit true",
            ]
        );
    }

    /// Fails after every commit.
    struct BrokenNotifier;

    impl WriteSessionExtension for BrokenNotifier {
        fn after_commit(&self, _context: &mut ExtensionContext<'_>, _anchor: Option<&Anchor>) -> SessionResult<()> {
            Err(SessionError::Extension {
                name: self.name(),
                message: "notification failed".to_string(),
            })
        }
    }

    #[test]
    fn test_failing_after_commit_hook_keeps_the_anchor() {
        let (_temp, repository) = setup();
        let recorder = Arc::new(Recorder::default());
        let mut session = open_with(
            &repository,
            vec![
                Arc::new(BrokenNotifier) as Arc<dyn WriteSessionExtension>,
                Arc::clone(&recorder) as Arc<dyn WriteSessionExtension>,
            ],
        );
        session.store(Machine::new(1, "web")).unwrap();

        let anchor = session.commit("Added web").unwrap().unwrap();
        assert_eq!(repository.current_anchor().unwrap().id, anchor.id);
        assert!(read(&repository, "machines/1.json").is_some());
        assert_eq!(recorder.events.lock().last().map(String::as_str), Some("after_commit true"));
    }

    /// Renames every project before it is staged.
    struct Uppercase;

    impl WriteSessionExtension for Uppercase {
        fn before_store(&self, _context: &mut ExtensionContext<'_>, document: &mut StagedDocument) -> SessionResult<()> {
            if let Some(project) = document.downcast_ref::<Project>() {
                let identity = Identity::from(project.id.to_uppercase());
                document.assign_identity(identity);
            }
            Ok(())
        }
    }

    #[test]
    fn test_before_store_can_change_the_path() {
        let (_temp, repository) = setup();
        let mut session = open_with(&repository, vec![Arc::new(Uppercase) as Arc<dyn WriteSessionExtension>]);

        let original = Arc::new(Project::new("acme", "ACME"));
        let staged = session.store_shared(Arc::clone(&original)).unwrap();
        assert_eq!(staged.id, "ACME");
        assert_eq!(original.id, "acme");
        assert!(session.staged::<Project>("ACME").unwrap().is_some());
        assert!(session.staged::<Project>("acme").unwrap().is_none());
    }
}
