//! The per-snapshot identity map.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockUpgradableReadGuard};

use crate::conventions::SharedDocument;
use crate::session::error::{SessionError, SessionResult};
use crate::storage::{Anchor, BlobId};

/// What a cached entry was decoded from.
///
/// Combines the codec that produced the value with the blob ids of the file
/// and of every attachment sibling read alongside it, so a changed
/// attachment or a newly applicable codec invalidates the entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new<'a>(codec: &str, content: BlobId, attachments: impl IntoIterator<Item = (&'a str, BlobId)>) -> Self {
        let mut fingerprint = format!("{}:{}", codec, content);
        for (suffix, id) in attachments {
            fingerprint.push_str(&format!("+{}={}", suffix, id));
        }
        Self(fingerprint)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone)]
struct Entry {
    value: SharedDocument,
    /// `None` for objects staged by a write session
    fingerprint: Option<Fingerprint>,
}

/// Thread-safe cache of decoded documents keyed by storage path.
///
/// A read snapshot shares one set between all its sessions; each write
/// session and each historical session owns a private one. Entries loaded
/// from the tree carry a [`Fingerprint`]; entries staged through
/// [`add`](Self::add) carry none and shadow whatever the tree holds.
pub struct DocumentSet {
    anchor: Anchor,
    entries: RwLock<HashMap<String, Entry>>,
}

impl DocumentSet {
    pub fn new(anchor: Anchor) -> Self {
        Self {
            anchor,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// the anchor this set was built for
    pub fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.read().contains_key(path)
    }

    /// cached paths, sorted
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.entries.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn get(&self, path: &str) -> Option<SharedDocument> {
        self.entries.read().get(path).map(|entry| Arc::clone(&entry.value))
    }

    /// The cached value at `path` if it is a `T`.
    pub fn get_as<T: Send + Sync + 'static>(&self, path: &str) -> Option<Arc<T>> {
        self.get(path).and_then(|value| value.downcast::<T>().ok())
    }

    /// Every cached value that is a `T`, ordered by path.
    ///
    /// The result is a copy; later changes to the set don't show up in it.
    pub fn get_all<T: Send + Sync + 'static>(&self) -> Vec<Arc<T>> {
        let entries = self.entries.read();
        let mut matching: Vec<(&String, Arc<T>)> = entries
            .iter()
            .filter_map(|(path, entry)| {
                Arc::clone(&entry.value)
                    .downcast::<T>()
                    .ok()
                    .map(|value| (path, value))
            })
            .collect();
        matching.sort_by(|a, b| a.0.cmp(b.0));
        matching.into_iter().map(|(_, value)| value).collect()
    }

    /// Return the cached value for `path` or decode it.
    ///
    /// A cached entry is reused when its fingerprint equals `fingerprint`, or
    /// when it was staged. Otherwise `decode` runs and its result replaces the
    /// entry. Concurrent callers for the same unchanged file decode it once.
    pub fn load<E, F>(&self, path: &str, fingerprint: Fingerprint, decode: F) -> Result<SharedDocument, E>
    where
        F: FnOnce() -> Result<SharedDocument, E>,
    {
        {
            let entries = self.entries.read();
            if let Some(value) = Self::reusable(&entries, path, &fingerprint) {
                return Ok(value);
            }
        }

        // only one upgradable guard exists at a time, so a racing caller
        // waits here and then finds the freshly decoded entry
        let entries = self.entries.upgradable_read();
        if let Some(value) = Self::reusable(&entries, path, &fingerprint) {
            return Ok(value);
        }

        let value = decode()?;
        let mut entries = RwLockUpgradableReadGuard::upgrade(entries);
        entries.insert(
            path.to_string(),
            Entry {
                value: Arc::clone(&value),
                fingerprint: Some(fingerprint),
            },
        );
        Ok(value)
    }

    fn reusable(entries: &HashMap<String, Entry>, path: &str, fingerprint: &Fingerprint) -> Option<SharedDocument> {
        let entry = entries.get(path)?;
        match &entry.fingerprint {
            Some(cached) if cached != fingerprint => None,
            _ => Some(Arc::clone(&entry.value)),
        }
    }

    /// Stage `value` at `path`.
    ///
    /// Fails with [`SessionError::IdentifierAlreadyInUse`] if a different
    /// object is already staged there, unless `force` is set. Re-staging the
    /// same instance is a no-op. Entries loaded from the tree are replaced.
    pub fn add(&self, path: &str, value: SharedDocument, force: bool) -> SessionResult<()> {
        let mut entries = self.entries.write();
        if let Some(existing) = entries.get(path) {
            let staged = existing.fingerprint.is_none();
            if staged && !force && !Arc::ptr_eq(&existing.value, &value) {
                return Err(SessionError::IdentifierAlreadyInUse { path: path.to_string() });
            }
        }
        entries.insert(path.to_string(), Entry { value, fingerprint: None });
        Ok(())
    }

    /// Drop the entry at `path`.
    pub fn evict(&self, path: &str) -> Option<SharedDocument> {
        self.entries.write().remove(path).map(|entry| entry.value)
    }

    /// Replace `current` at `path` with `decoded`, keeping the fingerprint.
    ///
    /// Used when a file cached as raw bytes turns out to belong to a type
    /// registered after the set was built. Returns whichever value is cached
    /// afterwards.
    pub fn promote(&self, path: &str, current: &SharedDocument, decoded: SharedDocument) -> SharedDocument {
        let mut entries = self.entries.write();
        match entries.get_mut(path) {
            Some(entry) if Arc::ptr_eq(&entry.value, current) => {
                entry.value = Arc::clone(&decoded);
                decoded
            }
            Some(entry) => Arc::clone(&entry.value),
            None => decoded,
        }
    }

    /// Copy every entry of `previous` into this set.
    pub fn initialize_from(&self, previous: &DocumentSet) {
        let source = previous.entries.read().clone();
        self.entries.write().extend(source);
    }

    /// Evict every path not in `visited`; returns how many were evicted.
    pub fn remove_except(&self, visited: &HashSet<String>) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|path, _| visited.contains(path));
        before - entries.len()
    }
}

impl fmt::Debug for DocumentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentSet")
            .field("anchor", &self.anchor.id)
            .field("entries", &self.len())
            .finish()
    }
}
