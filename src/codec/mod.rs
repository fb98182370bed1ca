//! Encoding and decoding of stored files.
//!
//! A [`CodecRegistry`] holds an ordered list of [`Codec`]s and hands each
//! path or value to the first one that accepts it: registered document types
//! go through [`JsonCodec`], everything else is raw bytes via [`BlobCodec`].

mod blob;
mod error;
pub(crate) mod json;

use std::any::Any;
use std::io::Write;
use std::sync::Arc;

use crate::conventions::{Attachments, Conventions, SharedDocument};

pub use blob::BlobCodec;
pub use error::{CodecError, CodecResult};
pub use json::JsonCodec;

/// Converts between stored bytes and in-memory values for some set of paths.
pub trait Codec: Send + Sync {
    /// short tag recorded in cache fingerprints
    fn name(&self) -> &'static str;

    fn can_decode(&self, path: &str) -> bool;

    fn can_encode(&self, path: &str, value: &(dyn Any + Send + Sync)) -> bool;

    /// `(suffix, sibling path)` pairs that decoding `path` reads as attachments
    fn attachments_for(&self, _path: &str) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    fn decode(&self, path: &str, input: &[u8], attachments: &Attachments) -> CodecResult<SharedDocument>;

    fn encode(
        &self,
        path: &str,
        value: &(dyn Any + Send + Sync),
        output: &mut dyn Write,
        attachments: &mut Attachments,
    ) -> CodecResult<()>;
}

/// Ordered codec selection.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: Vec<Arc<dyn Codec>>,
}

impl CodecRegistry {
    /// JSON documents first, raw bytes as the fallback.
    pub fn new(conventions: Arc<Conventions>) -> Self {
        Self {
            codecs: vec![Arc::new(JsonCodec::new(conventions)), Arc::new(BlobCodec)],
        }
    }

    /// Put `codec` ahead of every codec already registered.
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codecs.insert(0, codec);
        self
    }

    pub fn for_path(&self, path: &str) -> CodecResult<&dyn Codec> {
        self.codecs
            .iter()
            .find(|codec| codec.can_decode(path))
            .map(|codec| codec.as_ref())
            .ok_or_else(|| CodecError::UnsupportedPath(path.to_string()))
    }

    pub fn for_value(&self, path: &str, value: &(dyn Any + Send + Sync)) -> CodecResult<&dyn Codec> {
        self.codecs
            .iter()
            .find(|codec| codec.can_encode(path, value))
            .map(|codec| codec.as_ref())
            .ok_or_else(|| CodecError::UnsupportedType { path: path.to_string() })
    }

    pub fn decode(&self, path: &str, input: &[u8], attachments: &Attachments) -> CodecResult<SharedDocument> {
        self.for_path(path)?.decode(path, input, attachments)
    }

    pub fn encode(
        &self,
        path: &str,
        value: &(dyn Any + Send + Sync),
        output: &mut dyn Write,
        attachments: &mut Attachments,
    ) -> CodecResult<()> {
        self.for_value(path, value)?.encode(path, value, output, attachments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Machine;

    #[test]
    fn test_selection_order() {
        let conventions = Arc::new(Conventions::new());
        conventions.register::<Machine>().unwrap();
        let registry = CodecRegistry::new(conventions);

        assert_eq!(registry.for_path("machines/1.json").unwrap().name(), JsonCodec::NAME);
        assert_eq!(registry.for_path("machines/1.notes.txt").unwrap().name(), BlobCodec::NAME);
        assert_eq!(
            registry.for_value("machines/1.json", &Machine::new(1, "web")).unwrap().name(),
            JsonCodec::NAME
        );
        assert!(matches!(
            registry.for_value("x", &42u32),
            Err(CodecError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_unregistered_document_files_decode_as_bytes() {
        let registry = CodecRegistry::new(Arc::new(Conventions::new()));
        let decoded = registry
            .decode("machines/1.json", b"{\"id\":1}", &Attachments::new())
            .unwrap();
        assert!(decoded.is::<Vec<u8>>());
    }
}
