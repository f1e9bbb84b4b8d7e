//! Stream codec for fixed-width fields.
//!
//! TCP may split a field across reads or coalesce several fields into one
//! read. The decoder buffers until a whole field is available and yields
//! exactly one sample per `width` bytes.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use daqcast_core::Sample;

use crate::error::FrameError;
use crate::format::MessageFormat;

/// Codec for a stream of fixed-width sample fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedWidthCodec {
    format: MessageFormat,
}

impl FixedWidthCodec {
    pub fn new(format: MessageFormat) -> Self {
        Self { format }
    }
}

impl Decoder for FixedWidthCodec {
    type Item = Sample;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Sample>, FrameError> {
        let width = self.format.width();
        if src.len() < width {
            src.reserve(width - src.len());
            return Ok(None);
        }

        let field = src.split_to(width);
        self.format.decode(&field).map(Some)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Sample>, FrameError> {
        match self.decode(src)? {
            Some(sample) => Ok(Some(sample)),
            None => {
                // A trailing partial field is dropped: the server closed
                // mid-write and the bytes cannot be completed.
                src.advance(src.len());
                Ok(None)
            }
        }
    }
}

impl Encoder<Sample> for FixedWidthCodec {
    type Error = FrameError;

    fn encode(&mut self, sample: Sample, dst: &mut BytesMut) -> Result<(), FrameError> {
        let field = self.format.encode(sample);
        dst.reserve(field.len());
        dst.extend_from_slice(&field);
        Ok(())
    }
}
