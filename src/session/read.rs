//! Read sessions over the shared snapshot.

use std::sync::Arc;

use tracing::trace;

use crate::conventions::{Attachments, Conventions, Document, Identity};
use crate::diagnostics::{Counter, Statistics, Timing};
use crate::session::document_set::DocumentSet;
use crate::session::error::{SessionError, SessionResult};
use crate::storage::{path, Anchor};

/// The read API shared by every session kind.
pub trait DocumentReader {
    /// the anchor this reader observes
    fn anchor(&self) -> &Anchor;

    /// The document of type `T` with identity `id`, if it exists.
    fn load<T: Document>(&self, id: impl Into<Identity>) -> SessionResult<Option<Arc<T>>> {
        Ok(self.load_many::<T, _>([id.into()])?.into_iter().next())
    }

    /// The documents that exist among `ids`, in the order requested.
    fn load_many<T, I>(&self, ids: I) -> SessionResult<Vec<Arc<T>>>
    where
        T: Document,
        I: IntoIterator,
        I::Item: Into<Identity>;

    /// Every document of type `T`, ordered by path.
    fn query<T: Document>(&self) -> SessionResult<Vec<Arc<T>>>;

    /// Raw bytes of the file at `path`.
    fn load_binary(&self, path: &str) -> SessionResult<Option<Vec<u8>>>;

    /// Contents of the file at `path` as UTF-8 text.
    fn load_text(&self, path: &str) -> SessionResult<Option<String>> {
        match self.load_binary(path)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| SessionError::InvalidUtf8 { path: path.to_string() }),
            None => Ok(None),
        }
    }
}

/// A view of the store's current snapshot.
///
/// The snapshot is fully materialized when the session is opened, so reads
/// never touch the tree store. Sessions opened while no commit happens share
/// the same [`DocumentSet`] and hand out the same instances.
pub struct ReadSession {
    documents: Arc<DocumentSet>,
    conventions: Arc<Conventions>,
    statistics: Arc<Statistics>,
}

impl ReadSession {
    pub(crate) fn new(documents: Arc<DocumentSet>, conventions: Arc<Conventions>, statistics: Arc<Statistics>) -> Self {
        statistics.increment(Counter::ReadSessionsOpened);
        Self {
            documents,
            conventions,
            statistics,
        }
    }

    /// The value cached at `path` as a `T`.
    ///
    /// Files cached before `T` was registered were decoded as raw bytes;
    /// those are decoded as `T` now and the snapshot entry is replaced.
    fn resolve<T: Document>(&self, path: &str) -> SessionResult<Option<Arc<T>>> {
        let Some(value) = self.documents.get(path) else {
            return Ok(None);
        };
        if value.is::<T>() {
            return Ok(value.downcast::<T>().ok());
        }
        let Some(raw) = value.downcast_ref::<Vec<u8>>() else {
            return Ok(None);
        };

        let document_type = self.conventions.document_type::<T>()?;
        let mut attachments = Attachments::new();
        for (suffix, sibling) in document_type.attachment_paths(path) {
            if let Some(bytes) = self.documents.get_as::<Vec<u8>>(&sibling) {
                attachments.insert(suffix, bytes.as_slice());
            }
        }
        let decoded = {
            let _timer = self.statistics.measure(Timing::Deserialization);
            document_type.decode(raw, &attachments)?
        };
        self.statistics.increment(Counter::DocumentsLoaded);
        trace!(path, type_name = T::type_name(), "decoded cached bytes");

        Ok(self.documents.promote(path, &value, decoded).downcast::<T>().ok())
    }
}

impl DocumentReader for ReadSession {
    fn anchor(&self) -> &Anchor {
        self.documents.anchor()
    }

    fn load_many<T, I>(&self, ids: I) -> SessionResult<Vec<Arc<T>>>
    where
        T: Document,
        I: IntoIterator,
        I::Item: Into<Identity>,
    {
        let mut documents = Vec::new();
        for id in ids {
            let path = self.conventions.path_for::<T>(&id.into())?;
            if let Some(document) = self.resolve::<T>(&path)? {
                documents.push(document);
            }
        }
        Ok(documents)
    }

    fn query<T: Document>(&self) -> SessionResult<Vec<Arc<T>>> {
        let document_type = self.conventions.document_type::<T>()?;
        let mut documents = Vec::new();
        for path in self.documents.paths() {
            let claimed = self
                .conventions
                .type_of(&path)
                .is_some_and(|resolved| resolved.document_type_id() == document_type.document_type_id());
            if !claimed {
                continue;
            }
            if let Some(document) = self.resolve::<T>(&path)? {
                documents.push(document);
            }
        }
        Ok(documents)
    }

    fn load_binary(&self, file_path: &str) -> SessionResult<Option<Vec<u8>>> {
        let file_path = path::validate(file_path)?;
        let Some(value) = self.documents.get(&file_path) else {
            return Ok(None);
        };
        if let Some(bytes) = value.downcast_ref::<Vec<u8>>() {
            return Ok(Some(bytes.clone()));
        }

        // a decoded document; hand back its encoded form
        let document_type = self
            .conventions
            .require(value.as_ref().type_id(), &file_path)?;
        let mut output = Vec::new();
        document_type.encode(value.as_ref(), &mut output, &mut Attachments::new())?;
        Ok(Some(output))
    }
}

impl Drop for ReadSession {
    fn drop(&mut self) {
        self.statistics.increment(Counter::ReadSessionsClosed);
    }
}
