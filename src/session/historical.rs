//! Read sessions pinned at an arbitrary anchor.

use std::fmt;
use std::sync::Arc;

use crate::codec::CodecRegistry;
use crate::conventions::{Conventions, Document, Identity};
use crate::diagnostics::{Counter, Statistics};
use crate::session::document_set::DocumentSet;
use crate::session::error::SessionResult;
use crate::session::read::DocumentReader;
use crate::session::visitors::{LoadBlob, LoadById, LoadByType, Loader};
use crate::storage::{path, Anchor, GitRepository};

/// Reads a fixed historical anchor on demand.
///
/// Each call walks only the part of the tree it needs. Decoded documents are
/// kept in a set private to the session; the store's shared snapshot is
/// never read or touched.
pub struct HistoricalReadSession {
    repository: GitRepository,
    documents: DocumentSet,
    conventions: Arc<Conventions>,
    codecs: CodecRegistry,
    statistics: Arc<Statistics>,
}

impl HistoricalReadSession {
    pub(crate) fn new(
        repository: GitRepository,
        anchor: Anchor,
        conventions: Arc<Conventions>,
        codecs: CodecRegistry,
        statistics: Arc<Statistics>,
    ) -> Self {
        statistics.increment(Counter::HistoricalReadSessionsOpened);
        Self {
            repository,
            documents: DocumentSet::new(anchor),
            conventions,
            codecs,
            statistics,
        }
    }

    fn loader(&self) -> Loader<'_> {
        Loader::new(&self.documents, &self.codecs, &self.statistics)
    }
}

impl DocumentReader for HistoricalReadSession {
    fn anchor(&self) -> &Anchor {
        self.documents.anchor()
    }

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

        let mut visitor = LoadById::new(self.loader(), paths.iter().cloned());
        self.repository.visit(self.anchor(), &mut visitor)?;
        let found = visitor.into_found();

        Ok(paths
            .iter()
            .filter_map(|path| {
                found
                    .iter()
                    .find(|(found_path, _)| found_path == path)
                    .and_then(|(_, value)| Arc::clone(value).downcast::<T>().ok())
            })
            .collect())
    }

    fn query<T: Document>(&self) -> SessionResult<Vec<Arc<T>>> {
        let document_type = self.conventions.document_type::<T>()?;
        let mut visitor = LoadByType::new(self.loader(), &self.conventions, document_type);
        self.repository.visit(self.anchor(), &mut visitor)?;

        Ok(visitor
            .into_found()
            .into_iter()
            .filter_map(|(_, value)| value.downcast::<T>().ok())
            .collect())
    }

    fn load_binary(&self, file_path: &str) -> SessionResult<Option<Vec<u8>>> {
        let file_path = path::validate(file_path)?;
        let mut visitor = LoadBlob::new([file_path]);
        self.repository.visit(self.anchor(), &mut visitor)?;
        Ok(visitor.into_found().into_iter().next().map(|(_, bytes)| bytes))
    }
}

impl fmt::Debug for HistoricalReadSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoricalReadSession")
            .field("anchor", &self.documents.anchor().id)
            .field("cached", &self.documents.len())
            .finish()
    }
}

impl Drop for HistoricalReadSession {
    fn drop(&mut self) {
        self.statistics.increment(Counter::HistoricalReadSessionsClosed);
    }
}
