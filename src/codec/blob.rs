//! Raw byte codec. Accepts every path, so it goes last in a registry.

use std::any::Any;
use std::io::Write;
use std::sync::Arc;

use crate::codec::error::{CodecError, CodecResult};
use crate::codec::Codec;
use crate::conventions::{Attachments, SharedDocument};

#[derive(Debug, Default, Clone, Copy)]
pub struct BlobCodec;

impl BlobCodec {
    pub const NAME: &'static str = "blob";
}

impl Codec for BlobCodec {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn can_decode(&self, _path: &str) -> bool {
        true
    }

    fn can_encode(&self, _path: &str, value: &(dyn Any + Send + Sync)) -> bool {
        value.is::<Vec<u8>>()
    }

    fn decode(&self, _path: &str, input: &[u8], _attachments: &Attachments) -> CodecResult<SharedDocument> {
        Ok(Arc::new(input.to_vec()))
    }

    fn encode(
        &self,
        _path: &str,
        value: &(dyn Any + Send + Sync),
        output: &mut dyn Write,
        _attachments: &mut Attachments,
    ) -> CodecResult<()> {
        let bytes = value
            .downcast_ref::<Vec<u8>>()
            .ok_or(CodecError::TypeMismatch { expected: "Vec<u8>" })?;
        output.write_all(bytes)?;
        Ok(())
    }
}
