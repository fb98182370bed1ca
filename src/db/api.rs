//! Store API - the high-level interface for anchordb.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::codec::CodecRegistry;
use crate::conventions::{Conventions, Document, DocumentType};
use crate::diagnostics::{Counter, Statistics, StatisticsSnapshot};
use crate::session::visitors::{LoadEverything, Loader};
use crate::session::{
    DocumentSet, HistoricalReadSession, IdentityAllocations, LinearIdentityGenerator, ReadSession, SessionResult,
    WriteSession, WriteSessionExtension,
};
use crate::storage::{Anchor, GitRepository, GitSignature, RepositoryOptions};

/// Store configuration options.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the repository directory.
    pub path: PathBuf,
    /// Initialize a repository if none exists at `path`.
    pub create_if_missing: bool,
    /// Signature recorded on commits.
    pub signature: GitSignature,
    /// Number documents stored with an unset identity.
    pub identity_allocation: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".anchordb"),
            create_if_missing: true,
            signature: GitSignature::default(),
            identity_allocation: true,
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set create_if_missing flag.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Set the commit signature.
    pub fn signature(mut self, signature: GitSignature) -> Self {
        self.signature = signature;
        self
    }

    /// Enable or disable the identity allocator.
    pub fn identity_allocation(mut self, value: bool) -> Self {
        self.identity_allocation = value;
        self
    }
}

/// The snapshot read sessions are handed, and the registry state it was built under.
struct Snapshot {
    documents: Arc<DocumentSet>,
    generation: u64,
}

/// The main store handle.
///
/// Thread-safe: clone it to share across threads - it uses Arc internally.
#[derive(Clone)]
pub struct DocumentStore {
    inner: Arc<DocumentStoreInner>,
}

struct DocumentStoreInner {
    config: StoreConfig,
    repository: GitRepository,
    conventions: Arc<Conventions>,
    codecs: CodecRegistry,
    statistics: Arc<Statistics>,
    extensions: RwLock<Vec<Arc<dyn WriteSessionExtension>>>,
    /// guards the reuse-or-rebuild decision; held for the whole rebuild
    snapshot: Mutex<Option<Snapshot>>,
}

impl DocumentStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> SessionResult<Self> {
        Self::open_with_config(StoreConfig::new(path.as_ref()))
    }

    /// Open or create a store with custom configuration.
    pub fn open_with_config(config: StoreConfig) -> SessionResult<Self> {
        let statistics = Arc::new(Statistics::new());
        let options = RepositoryOptions {
            signature: config.signature.clone(),
            statistics: Arc::clone(&statistics),
        };
        let repository = if config.create_if_missing {
            GitRepository::open_or_init_with(&config.path, options)?
        } else {
            GitRepository::open_with(&config.path, options)?
        };

        let conventions = Arc::new(Conventions::new());
        let codecs = CodecRegistry::new(Arc::clone(&conventions));

        let mut extensions: Vec<Arc<dyn WriteSessionExtension>> = Vec::new();
        if config.identity_allocation {
            conventions.register::<IdentityAllocations>()?;
            extensions.push(Arc::new(LinearIdentityGenerator::new()));
        }

        info!(path = %config.path.display(), "opened document store");
        Ok(Self {
            inner: Arc::new(DocumentStoreInner {
                config,
                repository,
                conventions,
                codecs,
                statistics,
                extensions: RwLock::new(extensions),
                snapshot: Mutex::new(None),
            }),
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// The underlying tree store.
    pub fn repository(&self) -> &GitRepository {
        &self.inner.repository
    }

    pub fn conventions(&self) -> &Arc<Conventions> {
        &self.inner.conventions
    }

    /// Register `T` under its declared path template.
    pub fn register<T: Document>(&self) -> SessionResult<Arc<DocumentType>> {
        Ok(self.inner.conventions.register::<T>()?)
    }

    /// Register `T` under an explicit path template.
    pub fn register_as<T: Document>(&self, template: &str) -> SessionResult<Arc<DocumentType>> {
        Ok(self.inner.conventions.register_as::<T>(template)?)
    }

    /// Run `extension` in every write session opened from now on.
    pub fn add_extension(&self, extension: Arc<dyn WriteSessionExtension>) {
        debug!(extension = extension.name(), "added write session extension");
        self.inner.extensions.write().push(extension);
    }

    // ==================== Sessions ====================

    /// Open a read session on the current anchor.
    ///
    /// Reuses the cached snapshot when neither the anchor nor the set of
    /// registered types changed since it was built. Otherwise builds a new
    /// snapshot seeded from the old one, so only changed files are decoded.
    pub fn open_read_session(&self) -> SessionResult<ReadSession> {
        let inner = &self.inner;
        let mut cached = inner.snapshot.lock();

        // read under the snapshot lock so snapshots never move backwards
        let anchor = inner.repository.current_anchor()?;
        let generation = inner.conventions.generation();

        if let Some(snapshot) = cached.as_ref() {
            if snapshot.documents.anchor().id == anchor.id && snapshot.generation == generation {
                inner.statistics.increment(Counter::SnapshotReuse);
                debug!(anchor = %anchor.id, "reusing read snapshot");
                return Ok(self.read_session(Arc::clone(&snapshot.documents)));
            }
        }

        inner.statistics.increment(Counter::SnapshotRebuild);
        let documents = DocumentSet::new(anchor);
        if let Some(previous) = cached.as_ref() {
            documents.initialize_from(&previous.documents);
        }

        let mut visitor = LoadEverything::new(Loader::new(&documents, &inner.codecs, &inner.statistics));
        inner.repository.visit(documents.anchor(), &mut visitor)?;
        let evicted = documents.remove_except(&visitor.into_visited());
        debug!(
            anchor = %documents.anchor().id,
            entries = documents.len(),
            evicted,
            "rebuilt read snapshot"
        );

        let documents = Arc::new(documents);
        *cached = Some(Snapshot {
            documents: Arc::clone(&documents),
            generation,
        });
        Ok(self.read_session(documents))
    }

    fn read_session(&self, documents: Arc<DocumentSet>) -> ReadSession {
        ReadSession::new(
            documents,
            Arc::clone(&self.inner.conventions),
            Arc::clone(&self.inner.statistics),
        )
    }

    /// Open a read session at a past anchor, given any id git can resolve.
    pub fn open_read_session_at(&self, anchor_id: &str) -> SessionResult<HistoricalReadSession> {
        let anchor = self.inner.repository.anchor(anchor_id)?;
        Ok(self.open_historical_session(anchor))
    }

    /// Open a read session at `anchor`, bypassing the shared snapshot.
    pub fn open_historical_session(&self, anchor: Anchor) -> HistoricalReadSession {
        debug!(anchor = %anchor.id, "opened historical read session");
        HistoricalReadSession::new(
            self.inner.repository.clone(),
            anchor,
            Arc::clone(&self.inner.conventions),
            self.inner.codecs.clone(),
            Arc::clone(&self.inner.statistics),
        )
    }

    /// Open a write session.
    ///
    /// Blocks while another write session is open.
    pub fn open_write_session(&self) -> SessionResult<WriteSession> {
        let extensions = self.inner.extensions.read().clone();
        WriteSession::open(
            self.inner.repository.clone(),
            Arc::clone(&self.inner.conventions),
            self.inner.codecs.clone(),
            Arc::clone(&self.inner.statistics),
            extensions,
        )
    }

    // ==================== Anchors ====================

    pub fn current_anchor(&self) -> SessionResult<Anchor> {
        Ok(self.inner.repository.current_anchor()?)
    }

    pub fn anchor(&self, id: &str) -> SessionResult<Anchor> {
        Ok(self.inner.repository.anchor(id)?)
    }

    /// All anchors, newest first.
    pub fn anchors(&self) -> SessionResult<Vec<Anchor>> {
        Ok(self.inner.repository.anchors()?)
    }

    pub fn recent_anchors(&self, limit: usize) -> SessionResult<Vec<Anchor>> {
        Ok(self.inner.repository.recent_anchors(limit)?)
    }

    // ==================== Statistics ====================

    pub fn statistics(&self) -> StatisticsSnapshot {
        self.inner.statistics.snapshot()
    }

    /// Copy the statistics and zero them.
    pub fn statistics_and_reset(&self) -> StatisticsSnapshot {
        self.inner.statistics.snapshot_and_reset()
    }
}

impl fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentStore")
            .field("path", &self.inner.config.path)
            .field("conventions", &self.inner.conventions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{DocumentReader, ExtensionContext, SessionError};
    use crate::storage::StorageError;
    use crate::testing::{DeploymentEnvironment, DeploymentProcess, Machine, Project, VariableSet};
    use tempfile::TempDir;

    fn setup() -> (TempDir, DocumentStore) {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::open(temp.path()).unwrap();
        store.register::<Project>().unwrap();
        store.register::<DeploymentProcess>().unwrap();
        store.register::<VariableSet>().unwrap();
        store.register::<DeploymentEnvironment>().unwrap();
        store.register::<Machine>().unwrap();
        (temp, store)
    }

    fn commit_project(store: &DocumentStore, project: Project, message: &str) -> Option<Anchor> {
        let mut session = store.open_write_session().unwrap();
        session.store(project).unwrap();
        session.commit(message).unwrap()
    }

    #[test]
    fn test_open_missing_without_create() {
        let temp = TempDir::new().unwrap();
        let config = StoreConfig::new(temp.path().join("missing")).create_if_missing(false);
        let result = DocumentStore::open_with_config(config);
        assert!(matches!(result, Err(SessionError::Storage(StorageError::NotInitialized(_)))));
    }

    #[test]
    fn test_config_defaults() {
        let config = StoreConfig::default();
        assert!(config.create_if_missing);
        assert!(config.identity_allocation);
        assert_eq!(config.signature.name, "anchordb");
    }

    #[test]
    fn test_reopen_sees_committed_documents() {
        let temp = TempDir::new().unwrap();
        {
            let store = DocumentStore::open(temp.path()).unwrap();
            commit_project(&store, Project::new("acme", "ACME"), "Added project");
        }
        let store = DocumentStore::open(temp.path()).unwrap();
        let project = store.open_read_session().unwrap().load::<Project>("acme").unwrap();
        assert_eq!(project.unwrap().name, "ACME");
        assert_eq!(store.current_anchor().unwrap().message, "Added project");
    }

    #[test]
    fn test_read_sessions_share_instances_until_a_commit() {
        let (_temp, store) = setup();
        commit_project(&store, Project::new("acme", "ACME"), "Added project");

        let first = store.open_read_session().unwrap().load::<Project>("acme").unwrap().unwrap();
        let second = store.open_read_session().unwrap().load::<Project>("acme").unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let mut session = store.open_write_session().unwrap();
        let mut renamed = (*session.load::<Project>("acme").unwrap().unwrap()).clone();
        renamed.name = "ACME 2".to_string();
        session.store(renamed).unwrap();
        session.commit("Renamed").unwrap();

        let third = store.open_read_session().unwrap().load::<Project>("acme").unwrap().unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.name, "ACME 2");
        assert_eq!(first.name, "ACME");
    }

    #[test]
    fn test_unchanged_documents_survive_a_rebuild() {
        let (_temp, store) = setup();
        commit_project(&store, Project::new("acme", "ACME"), "Added acme");
        let before = store.open_read_session().unwrap().load::<Project>("acme").unwrap().unwrap();

        commit_project(&store, Project::new("zeta", "Zeta"), "Added zeta");
        let after = store.open_read_session().unwrap().load::<Project>("acme").unwrap().unwrap();
        assert!(Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_snapshot_reused_until_anchor_changes() {
        let (_temp, store) = setup();
        commit_project(&store, Project::new("acme", "ACME"), "Added project");
        let loaded = store.statistics().count(Counter::DocumentsLoaded);

        for _ in 0..5 {
            let session = store.open_read_session().unwrap();
            assert_eq!(session.query::<Project>().unwrap().len(), 1);
        }

        let stats = store.statistics();
        assert_eq!(stats.count(Counter::SnapshotRebuild), 1);
        assert_eq!(stats.count(Counter::SnapshotReuse), 4);
        assert_eq!(stats.count(Counter::ReadSessionsOpened), 5);
        assert_eq!(stats.count(Counter::ReadSessionsClosed), 5);
        // only the first session decodes
        assert_eq!(stats.count(Counter::DocumentsLoaded), loaded + 1);

        commit_project(&store, Project::new("zeta", "Zeta"), "Added zeta");
        store.open_read_session().unwrap();
        assert_eq!(store.statistics().count(Counter::SnapshotRebuild), 2);
    }

    #[test]
    fn test_loading_does_not_bump_the_generation() {
        let (_temp, store) = setup();
        commit_project(&store, Project::new("acme", "ACME"), "Added project");
        let generation = store.conventions().generation();
        let registered = store.conventions().registered().len();

        let first = store.open_read_session().unwrap();
        assert!(first.load::<Project>("acme").unwrap().is_some());
        store.register::<Project>().unwrap();
        let second = store.open_read_session().unwrap();
        assert_eq!(second.query::<Project>().unwrap().len(), 1);

        assert_eq!(store.conventions().generation(), generation);
        assert_eq!(store.conventions().registered().len(), registered);
        assert_eq!(store.statistics().count(Counter::SnapshotRebuild), 1);
        assert_eq!(store.statistics().count(Counter::SnapshotReuse), 1);
    }

    #[test]
    fn test_delete_then_restore_keeps_attachments() {
        let (_temp, store) = setup();
        let mut project = Project::new("acme", "ACME");
        project.description = Some("# ACME".to_string());
        commit_project(&store, project.clone(), "Added project");

        let mut session = store.open_write_session().unwrap();
        session.delete_by_id::<Project>("acme").unwrap();
        project.name = "ACME restored".to_string();
        session.store(project).unwrap();
        session.commit("Deleted and restored").unwrap().unwrap();

        let read = store.open_read_session().unwrap();
        let restored = read.load::<Project>("acme").unwrap().unwrap();
        assert_eq!(restored.name, "ACME restored");
        assert_eq!(restored.description.as_deref(), Some("# ACME"));
        assert_eq!(
            read.load_text("projects/acme/project.readme.md").unwrap().as_deref(),
            Some("# ACME")
        );
    }

    #[test]
    fn test_deleted_documents_leave_the_snapshot() {
        let (_temp, store) = setup();
        commit_project(&store, Project::new("acme", "ACME"), "Added project");
        assert_eq!(store.open_read_session().unwrap().query::<Project>().unwrap().len(), 1);

        let mut session = store.open_write_session().unwrap();
        session.delete_by_id::<Project>("acme").unwrap();
        session.commit("Removed project").unwrap().unwrap();

        let read = store.open_read_session().unwrap();
        assert!(read.query::<Project>().unwrap().is_empty());
        assert!(read.load::<Project>("acme").unwrap().is_none());
    }

    #[test]
    fn test_storing_two_objects_at_one_path_fails() {
        let (_temp, store) = setup();
        let mut session = store.open_write_session().unwrap();

        let project = session.store(Project::new("acme", "ACME")).unwrap();
        let again = session.store_shared(Arc::clone(&project)).unwrap();
        assert!(Arc::ptr_eq(&project, &again));

        let result = session.store(Project::new("acme", "Other"));
        assert!(matches!(
            result,
            Err(SessionError::IdentifierAlreadyInUse { ref path }) if path == "projects/acme/project.json"
        ));
        assert!(result.unwrap_err().is_conflict());

        // same identity under another type is a different path
        session
            .store(VariableSet {
                id: "acme".to_string(),
                variables: vec![],
            })
            .unwrap();

        let replaced = session.store_replacing(Project::new("acme", "Other")).unwrap();
        session.commit("Added").unwrap();

        let read = store.open_read_session().unwrap();
        assert_eq!(read.load::<Project>("acme").unwrap().unwrap().name, replaced.name);
        assert!(read.load::<VariableSet>("acme").unwrap().is_some());
    }

    #[test]
    fn test_dropped_session_leaves_no_trace() {
        let (_temp, store) = setup();
        let before = store.current_anchor().unwrap();
        {
            let mut session = store.open_write_session().unwrap();
            session.store(Project::new("acme", "ACME")).unwrap();
            session.store_text("notes/todo.txt", "later").unwrap();
            assert_eq!(session.pending(), 2);
        }

        assert_eq!(store.current_anchor().unwrap().id, before.id);
        let read = store.open_read_session().unwrap();
        assert!(read.load::<Project>("acme").unwrap().is_none());
        assert!(read.load_text("notes/todo.txt").unwrap().is_none());

        let stats = store.statistics();
        assert_eq!(stats.count(Counter::WriteSessionsOpened), 1);
        assert_eq!(stats.count(Counter::WriteSessionsClosed), 1);

        // the write lock was released
        let session = store.open_write_session().unwrap();
        assert_eq!(session.anchor().id, before.id);
    }

    struct RefuseCommit;

    impl WriteSessionExtension for RefuseCommit {
        fn before_commit(&self, _context: &mut ExtensionContext<'_>) -> SessionResult<()> {
            Err(SessionError::Extension {
                name: self.name(),
                message: "read only".to_string(),
            })
        }
    }

    #[test]
    fn test_failed_commit_is_rolled_back() {
        let (_temp, store) = setup();
        let before = store.current_anchor().unwrap();
        store.add_extension(Arc::new(RefuseCommit));

        let mut session = store.open_write_session().unwrap();
        session.store(Project::new("acme", "ACME")).unwrap();
        let result = session.commit("Added project");
        assert!(matches!(result, Err(SessionError::Extension { name: "RefuseCommit", .. })));

        assert_eq!(store.current_anchor().unwrap().id, before.id);
        assert!(store.open_read_session().unwrap().load::<Project>("acme").unwrap().is_none());
    }

    #[test]
    fn test_empty_commit_is_a_noop() {
        let (_temp, store) = setup();
        let before = store.current_anchor().unwrap();

        let session = store.open_write_session().unwrap();
        assert!(session.commit("Nothing").unwrap().is_none());

        commit_project(&store, Project::new("acme", "ACME"), "Added project");
        assert!(commit_project(&store, Project::new("acme", "ACME"), "Same again").is_none());
        assert_eq!(store.anchors().unwrap().len(), 2);
        assert_ne!(store.current_anchor().unwrap().id, before.id);
    }

    #[test]
    fn test_concurrent_writers_are_serialized() {
        let (_temp, store) = setup();
        let before = store.anchors().unwrap().len();

        std::thread::scope(|scope| {
            for i in 0..10 {
                let store = &store;
                scope.spawn(move || {
                    let mut session = store.open_write_session().unwrap();
                    session
                        .store(DeploymentEnvironment::new(&format!("env-{i}"), &format!("Environment {i}")))
                        .unwrap();
                    session.commit(&format!("Added env-{i}")).unwrap().unwrap();
                });
            }
        });

        let environments = store.open_read_session().unwrap().query::<DeploymentEnvironment>().unwrap();
        assert_eq!(environments.len(), 10);
        for i in 0..10 {
            assert!(environments.iter().any(|e| e.id == format!("env-{i}")));
        }
        assert_eq!(store.anchors().unwrap().len(), before + 10);
    }

    #[test]
    fn test_unset_identities_are_allocated_in_the_same_commit() {
        let (_temp, store) = setup();

        let mut session = store.open_write_session().unwrap();
        let web = session.store(Machine::new(0, "web")).unwrap();
        let db = session.store(Machine::new(0, "db")).unwrap();
        assert_eq!((web.id, db.id), (1, 2));
        assert_eq!(session.load::<Machine>(2u64).unwrap().unwrap().name, "db");
        let anchor = session.commit("Added machines").unwrap().unwrap();

        let read = store.open_read_session().unwrap();
        assert_eq!(read.anchor().id, anchor.id);
        let record = read
            .load::<IdentityAllocations>(IdentityAllocations::ID)
            .unwrap()
            .unwrap();
        assert_eq!(record.last("Machine"), Some(2));
        assert_eq!(read.query::<Machine>().unwrap().len(), 2);

        // a discarded session does not burn identities
        {
            let mut session = store.open_write_session().unwrap();
            assert_eq!(session.store(Machine::new(0, "cache")).unwrap().id, 3);
        }
        let mut session = store.open_write_session().unwrap();
        assert_eq!(session.store(Machine::new(0, "cache")).unwrap().id, 3);
        assert_eq!(session.store(Machine::new(9, "fixed")).unwrap().id, 9);
        session.commit("Added cache").unwrap();

        let record = store
            .open_read_session()
            .unwrap()
            .load::<IdentityAllocations>(IdentityAllocations::ID)
            .unwrap()
            .unwrap();
        assert_eq!(record.last("Machine"), Some(3));
    }

    #[test]
    fn test_allocation_sees_records_written_by_another_store() {
        let temp = TempDir::new().unwrap();
        {
            let store = DocumentStore::open(temp.path()).unwrap();
            let mut session = store.open_write_session().unwrap();
            session.store(Machine::new(0, "web")).unwrap();
            session.commit("Added web").unwrap();
        }
        let store = DocumentStore::open(temp.path()).unwrap();
        let mut session = store.open_write_session().unwrap();
        assert_eq!(session.store(Machine::new(0, "db")).unwrap().id, 2);
    }

    #[test]
    fn test_without_allocation_unset_identities_fail() {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::open_with_config(StoreConfig::new(temp.path()).identity_allocation(false)).unwrap();

        let mut session = store.open_write_session().unwrap();
        let result = session.store(Machine::new(0, "web"));
        assert!(matches!(
            result,
            Err(SessionError::Convention(crate::conventions::ConventionError::MissingIdentity {
                type_name: "Machine"
            }))
        ));
        assert!(!store.conventions().is_registered::<IdentityAllocations>());
    }

    #[test]
    fn test_historical_read() {
        let (_temp, store) = setup();
        let first = commit_project(&store, Project::new("acme", "ACME 1"), "Added project").unwrap();

        let mut session = store.open_write_session().unwrap();
        let mut project = (*session.load::<Project>("acme").unwrap().unwrap()).clone();
        project.name = "ACME 2".to_string();
        session.store(project).unwrap();
        session.commit("Renamed").unwrap().unwrap();

        let historical = store.open_read_session_at(&first.id.to_string()).unwrap();
        assert_eq!(historical.load::<Project>("acme").unwrap().unwrap().name, "ACME 1");
        let current = store.open_read_session().unwrap();
        assert_eq!(current.load::<Project>("acme").unwrap().unwrap().name, "ACME 2");

        let stats = store.statistics();
        assert_eq!(stats.count(Counter::HistoricalReadSessionsOpened), 1);
        assert_eq!(stats.count(Counter::SnapshotRebuild), 1);

        let anchors = store.anchors().unwrap();
        assert_eq!(anchors[0].message, "Renamed");
        assert_eq!(anchors[1].id, first.id);

        let unknown = store.open_read_session_at("0000000000000000000000000000000000000001");
        assert!(unknown.unwrap_err().is_not_found());
    }

    #[test]
    fn test_write_session_reads_its_own_changes() {
        let (_temp, store) = setup();
        commit_project(&store, Project::new("acme", "ACME"), "Added acme");

        let mut session = store.open_write_session().unwrap();
        let zeta = session.store(Project::new("zeta", "Zeta")).unwrap();
        assert!(Arc::ptr_eq(&session.load::<Project>("zeta").unwrap().unwrap(), &zeta));

        let names: Vec<String> = session
            .query::<Project>()
            .unwrap()
            .iter()
            .map(|p| p.name.clone())
            .collect();
        assert_eq!(names, vec!["ACME", "Zeta"]);

        session.delete_by_id::<Project>("acme").unwrap();
        assert!(session.load::<Project>("acme").unwrap().is_none());
        assert_eq!(session.query::<Project>().unwrap().len(), 1);

        // last operation on a path wins
        session.store(Project::new("acme", "ACME again")).unwrap();
        assert_eq!(session.load::<Project>("acme").unwrap().unwrap().name, "ACME again");
    }

    #[test]
    fn test_attachments_version_with_their_owner() {
        let (_temp, store) = setup();
        let mut project = Project::new("acme", "ACME");
        project.description = Some("# ACME".to_string());
        project.script_module = Some("function Deploy {}".to_string());

        let mut session = store.open_write_session().unwrap();
        session.store(project).unwrap();
        assert_eq!(
            session.load_text("projects/acme/project.readme.md").unwrap().as_deref(),
            Some("# ACME")
        );
        session.commit("Added project").unwrap();

        let read = store.open_read_session().unwrap();
        let loaded = read.load::<Project>("acme").unwrap().unwrap();
        assert_eq!(loaded.description.as_deref(), Some("# ACME"));
        assert_eq!(
            read.load_text("projects/acme/project.module.psm1").unwrap().as_deref(),
            Some("function Deploy {}")
        );
        let json = read.load_text("projects/acme/project.json").unwrap().unwrap();
        assert!(!json.contains("# ACME"));

        // an attachment-only change still produces a fresh instance
        let mut session = store.open_write_session().unwrap();
        session.store_text("projects/acme/project.readme.md", "# Renamed").unwrap();
        session.commit("Edited readme").unwrap().unwrap();
        let reloaded = store.open_read_session().unwrap().load::<Project>("acme").unwrap().unwrap();
        assert_eq!(reloaded.description.as_deref(), Some("# Renamed"));

        // clearing the field removes the sibling
        let mut session = store.open_write_session().unwrap();
        let mut cleared = (*reloaded).clone();
        cleared.description = None;
        session.store(cleared).unwrap();
        session.commit("Cleared readme").unwrap().unwrap();
        let read = store.open_read_session().unwrap();
        assert!(read.load_binary("projects/acme/project.readme.md").unwrap().is_none());
        assert!(read.load_binary("projects/acme/project.module.psm1").unwrap().is_some());

        // deleting the owner deletes every sibling
        let mut session = store.open_write_session().unwrap();
        session.delete_by_id::<Project>("acme").unwrap();
        session.commit("Removed project").unwrap().unwrap();
        let read = store.open_read_session().unwrap();
        assert!(read.load_binary("projects/acme/project.module.psm1").unwrap().is_none());
        assert!(read.load::<Project>("acme").unwrap().is_none());
    }

    #[test]
    fn test_late_registration_rebuilds_the_snapshot() {
        let temp = TempDir::new().unwrap();
        let store = DocumentStore::open(temp.path()).unwrap();

        let mut session = store.open_write_session().unwrap();
        session
            .store_text("environments/prod.json", r#"{"id":"prod","name":"Production"}"#)
            .unwrap();
        session.commit("Raw environment").unwrap();

        let read = store.open_read_session().unwrap();
        let prod = read.load::<DeploymentEnvironment>("prod").unwrap().unwrap();
        assert_eq!(prod.name, "Production");

        let after = store.open_read_session().unwrap();
        let again = after.load::<DeploymentEnvironment>("prod").unwrap().unwrap();
        assert_eq!(again.name, "Production");
        assert_eq!(store.statistics().count(Counter::SnapshotRebuild), 2);
    }

    #[test]
    fn test_statistics_display_and_reset() {
        let (_temp, store) = setup();
        commit_project(&store, Project::new("acme", "ACME"), "Added project");

        let stats = store.statistics_and_reset();
        assert_eq!(stats.count(Counter::DocumentsStored), 1);
        assert!(stats.to_string().contains("Documents written"));
        assert_eq!(store.statistics().count(Counter::DocumentsStored), 0);
    }
}
