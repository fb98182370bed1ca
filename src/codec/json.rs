//! JSON codec for registered document types.

use std::any::Any;
use std::io::Write;
use std::sync::Arc;

use crate::codec::error::{CodecError, CodecResult};
use crate::codec::Codec;
use crate::conventions::{Attachments, Conventions, Document, SharedDocument};

/// Decodes any path claimed by a registered type and encodes instances of
/// registered types. External fields travel through [`Attachments`].
pub struct JsonCodec {
    conventions: Arc<Conventions>,
}

impl JsonCodec {
    pub const NAME: &'static str = "json";

    pub fn new(conventions: Arc<Conventions>) -> Self {
        Self { conventions }
    }
}

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn can_decode(&self, path: &str) -> bool {
        self.conventions.type_of(path).is_some()
    }

    fn can_encode(&self, _path: &str, value: &(dyn Any + Send + Sync)) -> bool {
        self.conventions.lookup(value.type_id()).is_some()
    }

    fn attachments_for(&self, path: &str) -> Vec<(&'static str, String)> {
        self.conventions
            .type_of(path)
            .map(|document_type| document_type.attachment_paths(path))
            .unwrap_or_default()
    }

    fn decode(&self, path: &str, input: &[u8], attachments: &Attachments) -> CodecResult<SharedDocument> {
        let document_type = self
            .conventions
            .type_of(path)
            .ok_or_else(|| CodecError::UnsupportedPath(path.to_string()))?;
        document_type.decode(input, attachments)
    }

    fn encode(
        &self,
        path: &str,
        value: &(dyn Any + Send + Sync),
        output: &mut dyn Write,
        attachments: &mut Attachments,
    ) -> CodecResult<()> {
        let document_type = self
            .conventions
            .lookup(value.type_id())
            .ok_or_else(|| CodecError::UnsupportedType { path: path.to_string() })?;
        document_type.encode(value, output, attachments)
    }
}

pub(crate) fn decode_document<T: Document>(input: &[u8], attachments: &Attachments) -> CodecResult<SharedDocument> {
    let mut document: T = serde_json::from_slice(input)?;
    document.read_attachments(attachments);
    Ok(Arc::new(document))
}

pub(crate) fn encode_document<T: Document>(
    value: &(dyn Any + Send + Sync),
    output: &mut dyn Write,
    attachments: &mut Attachments,
) -> CodecResult<()> {
    let document = value
        .downcast_ref::<T>()
        .ok_or(CodecError::TypeMismatch { expected: T::type_name() })?;
    serde_json::to_writer_pretty(&mut *output, document)?;
    document.write_attachments(attachments);
    Ok(())
}
