//! Visitors that materialize documents from an anchor's tree.
//!
//! Every visitor decodes through a [`DocumentSet`], so a file whose
//! fingerprint is unchanged since it was last cached is never decoded twice.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tracing::trace;

use crate::codec::CodecRegistry;
use crate::conventions::{Attachments, Conventions, DocumentType, SharedDocument};
use crate::diagnostics::{Counter, Statistics, Timing};
use crate::session::document_set::{DocumentSet, Fingerprint};
use crate::session::error::{SessionError, SessionResult};
use crate::storage::path::is_segment_prefix;
use crate::storage::{StorageVisitor, StoredFile};

/// Decode-or-reuse for one file, resolving its attachment siblings from the
/// directory listing.
#[derive(Clone, Copy)]
pub(crate) struct Loader<'a> {
    documents: &'a DocumentSet,
    codecs: &'a CodecRegistry,
    statistics: &'a Statistics,
}

impl<'a> Loader<'a> {
    pub(crate) fn new(documents: &'a DocumentSet, codecs: &'a CodecRegistry, statistics: &'a Statistics) -> Self {
        Self {
            documents,
            codecs,
            statistics,
        }
    }

    pub(crate) fn load(&self, file: &StoredFile<'_>, directory: &[StoredFile<'_>]) -> SessionResult<SharedDocument> {
        let path = file.path();
        let codec = self.codecs.for_path(path)?;

        let siblings: Vec<(&'static str, &StoredFile<'_>)> = codec
            .attachments_for(path)
            .into_iter()
            .filter_map(|(suffix, sibling)| {
                directory
                    .iter()
                    .find(|candidate| candidate.path() == sibling)
                    .map(|found| (suffix, found))
            })
            .collect();
        let fingerprint = Fingerprint::new(
            codec.name(),
            file.fingerprint(),
            siblings.iter().map(|(suffix, found)| (*suffix, found.fingerprint())),
        );

        self.documents.load(path, fingerprint, || {
            let mut attachments = Attachments::new();
            if !siblings.is_empty() {
                let _timer = self.statistics.measure(Timing::Attachments);
                for (suffix, found) in &siblings {
                    attachments.insert(suffix, found.contents()?);
                }
            }

            let input = file.contents()?;
            let value = {
                let _timer = self.statistics.measure(Timing::Deserialization);
                codec.decode(path, &input, &attachments)?
            };
            self.statistics.increment(Counter::DocumentsLoaded);
            trace!(path, codec = codec.name(), "decoded file");
            Ok::<_, SessionError>(value)
        })
    }
}

/// Decodes every file of the tree and records every path it saw.
pub(crate) struct LoadEverything<'a> {
    loader: Loader<'a>,
    visited: HashSet<String>,
}

impl<'a> LoadEverything<'a> {
    pub(crate) fn new(loader: Loader<'a>) -> Self {
        Self {
            loader,
            visited: HashSet::new(),
        }
    }

    pub(crate) fn into_visited(self) -> HashSet<String> {
        self.visited
    }
}

impl StorageVisitor for LoadEverything<'_> {
    type Error = SessionError;

    fn should_traverse_directory(&mut self, _path: &str) -> bool {
        true
    }

    fn visit_directory(&mut self, _path: &str, files: &[StoredFile<'_>]) -> SessionResult<()> {
        for file in files {
            self.loader.load(file, files)?;
            self.visited.insert(file.path().to_string());
        }
        Ok(())
    }
}

/// Decodes the files at a fixed set of paths, skipping every directory
/// that cannot contain one of them.
pub(crate) struct LoadById<'a> {
    loader: Loader<'a>,
    targets: BTreeSet<String>,
    found: Vec<(String, SharedDocument)>,
}

impl<'a> LoadById<'a> {
    pub(crate) fn new(loader: Loader<'a>, targets: impl IntoIterator<Item = String>) -> Self {
        Self {
            loader,
            targets: targets.into_iter().collect(),
            found: Vec::new(),
        }
    }

    /// `(path, value)` for every target present in the tree, in path order
    pub(crate) fn into_found(mut self) -> Vec<(String, SharedDocument)> {
        self.found.sort_by(|a, b| a.0.cmp(&b.0));
        self.found
    }
}

impl StorageVisitor for LoadById<'_> {
    type Error = SessionError;

    fn should_traverse_directory(&mut self, path: &str) -> bool {
        self.targets.iter().any(|target| is_segment_prefix(path, target))
    }

    fn visit_directory(&mut self, _path: &str, files: &[StoredFile<'_>]) -> SessionResult<()> {
        for file in files.iter().filter(|file| self.targets.contains(file.path())) {
            let value = self.loader.load(file, files)?;
            self.found.push((file.path().to_string(), value));
        }
        Ok(())
    }
}

/// Decodes every file under a type's parent directory that resolves to
/// that type.
pub(crate) struct LoadByType<'a> {
    loader: Loader<'a>,
    conventions: &'a Conventions,
    document_type: Arc<DocumentType>,
    found: Vec<(String, SharedDocument)>,
}

impl<'a> LoadByType<'a> {
    pub(crate) fn new(loader: Loader<'a>, conventions: &'a Conventions, document_type: Arc<DocumentType>) -> Self {
        Self {
            loader,
            conventions,
            document_type,
            found: Vec::new(),
        }
    }

    pub(crate) fn into_found(mut self) -> Vec<(String, SharedDocument)> {
        self.found.sort_by(|a, b| a.0.cmp(&b.0));
        self.found
    }

    fn resolves_to_type(&self, path: &str) -> bool {
        self.conventions
            .type_of(path)
            .is_some_and(|resolved| resolved.document_type_id() == self.document_type.document_type_id())
    }
}

impl StorageVisitor for LoadByType<'_> {
    type Error = SessionError;

    fn should_traverse_directory(&mut self, path: &str) -> bool {
        let parent = self.document_type.template().parent_path();
        is_segment_prefix(path, parent) || is_segment_prefix(parent, path)
    }

    fn visit_directory(&mut self, _path: &str, files: &[StoredFile<'_>]) -> SessionResult<()> {
        for file in files {
            if !self.resolves_to_type(file.path()) {
                continue;
            }
            let value = self.loader.load(file, files)?;
            self.found.push((file.path().to_string(), value));
        }
        Ok(())
    }
}

/// Reads raw bytes at a fixed set of paths; no codec is involved.
pub(crate) struct LoadBlob {
    targets: BTreeSet<String>,
    found: Vec<(String, Vec<u8>)>,
}

impl LoadBlob {
    pub(crate) fn new(targets: impl IntoIterator<Item = String>) -> Self {
        Self {
            targets: targets.into_iter().collect(),
            found: Vec::new(),
        }
    }

    pub(crate) fn into_found(self) -> Vec<(String, Vec<u8>)> {
        self.found
    }
}

impl StorageVisitor for LoadBlob {
    type Error = SessionError;

    fn should_traverse_directory(&mut self, path: &str) -> bool {
        self.targets.iter().any(|target| is_segment_prefix(path, target))
    }

    fn visit_directory(&mut self, _path: &str, files: &[StoredFile<'_>]) -> SessionResult<()> {
        for file in files.iter().filter(|file| self.targets.contains(file.path())) {
            self.found.push((file.path().to_string(), file.contents()?));
        }
        Ok(())
    }
}
