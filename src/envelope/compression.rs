//! Compression envelope.
//!
//! Payload is `[tag][data]`: with the `None` tag the data is the encoded
//! inner block verbatim, with the `Zstd` tag it is a zstd frame that
//! inflates to the encoded inner block. Decoding re-parses the result as a
//! self-contained block, so the inner type survives the round trip.

use std::convert::TryFrom;

use tracing::trace;

use crate::block::Block;
use crate::error::{Error, Result};
use crate::types::{TypeId, TypeRegistry};
use crate::wrapper::check_type;
use crate::MAX_BLOCK_SIZE;

/// Worst-case block header size, allowed on top of [`MAX_BLOCK_SIZE`] when
/// judging an inflated encoded block.
const HEADER_SLACK: usize = 64;

/// Tag byte identifying how the envelope's data was transformed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CompressTag {
    /// Stored verbatim.
    None,
    /// A zstd frame.
    Zstd,
}

impl From<CompressTag> for u8 {
    fn from(val: CompressTag) -> u8 {
        match val {
            CompressTag::None => 0,
            CompressTag::Zstd => 1,
        }
    }
}

impl TryFrom<u8> for CompressTag {
    type Error = u8;
    fn try_from(val: u8) -> Result<CompressTag, u8> {
        match val {
            0 => Ok(CompressTag::None),
            1 => Ok(CompressTag::Zstd),
            _ => Err(val),
        }
    }
}

/// Compression settings for encoding. Decoding is driven by the tag byte
/// alone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Method {
    /// Store verbatim. Used when determinism without a compression step
    /// matters, and chosen automatically when compression wouldn't shrink
    /// the payload.
    None,
    /// Compress with zstd at the given level.
    Zstd { level: u8 },
}

impl Default for Method {
    fn default() -> Self {
        Method::Zstd { level: 3 }
    }
}

/// Wraps one inner block with a compression envelope.
#[derive(Clone, Debug)]
pub struct CompressionWrapper {
    ty: TypeId,
}

impl CompressionWrapper {
    pub fn new(ty: TypeId) -> Self {
        Self { ty }
    }

    pub fn wire_type(&self) -> TypeId {
        self.ty
    }

    /// Wrap `inner`, compressing per `method`. Falls back to storing
    /// verbatim when compression fails to shrink the data.
    pub fn encode(&self, inner: &Block, method: &Method) -> Result<Block> {
        let raw = inner.encode();
        let payload = match method {
            Method::None => {
                let mut payload = Vec::with_capacity(1 + raw.len());
                payload.push(CompressTag::None.into());
                payload.extend_from_slice(&raw);
                payload
            }
            Method::Zstd { level } => {
                let mut frame = Vec::with_capacity(zstd_safe::compress_bound(raw.len()));
                zstd_safe::compress(&mut frame, &raw, *level as i32)
                    .map_err(|code| Error::FailDecompress(zstd_error(code)))?;
                if frame.len() < raw.len() {
                    trace!(from = raw.len(), to = frame.len(), "compressed block");
                    let mut payload = Vec::with_capacity(1 + frame.len());
                    payload.push(CompressTag::Zstd.into());
                    payload.extend_from_slice(&frame);
                    payload
                } else {
                    // Incompressible data; store it verbatim instead.
                    let mut payload = Vec::with_capacity(1 + raw.len());
                    payload.push(CompressTag::None.into());
                    payload.extend_from_slice(&raw);
                    payload
                }
            }
        };
        Ok(Block::new(self.ty, payload))
    }

    /// Unwrap a compression envelope, inflating per its tag and re-parsing
    /// the inner block.
    pub fn decode(&self, ctx: &dyn TypeRegistry, block: &Block) -> Result<Block> {
        check_type(ctx, block, self.ty)?;
        let (tag, data) = block
            .payload()
            .split_first()
            .ok_or(Error::BadHeader("compression envelope is empty"))?;
        let tag = CompressTag::try_from(*tag)
            .map_err(|_| Error::BadHeader("unknown compression tag"))?;
        match tag {
            CompressTag::None => Block::decode(data),
            CompressTag::Zstd => {
                let size = zstd_safe::get_frame_content_size(data)
                    .map_err(|_| Error::FailDecompress("bad zstd frame header".into()))?
                    .ok_or_else(|| Error::FailDecompress("missing frame content size".into()))?
                    as usize;
                if size > MAX_BLOCK_SIZE + HEADER_SLACK {
                    return Err(Error::LengthTooLong {
                        max: MAX_BLOCK_SIZE,
                        actual: size,
                    });
                }
                let mut out = Vec::with_capacity(size);
                let used = zstd_safe::decompress(&mut out, data)
                    .map_err(|code| Error::FailDecompress(zstd_error(code)))?;
                if used != size {
                    return Err(Error::FailDecompress(
                        "decompressed size doesn't match promised size".into(),
                    ));
                }
                Block::decode(&out)
            }
        }
    }
}

fn zstd_error(code: usize) -> String {
    format!("zstd failure, code {} ({})", code, zstd_safe::get_error_name(code))
}
