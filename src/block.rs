//! The universal binary value.
//!
//! A [`Block`] is a semantic type reference, a byte length, and a payload.
//! Wire form is `[type reference][varint length][payload]`. The type
//! reference is itself a block: its payload is the 32-byte type identifier
//! and its own type is the reserved root type, whose reference is the single
//! byte `0x00`. That reserved byte terminates the recursion, so a full
//! reference is always `0x00 || varint(32) || identifier`.
//!
//! Blocks are immutable after construction. A block carved out of a larger
//! buffer shares that buffer's storage without copying, so decoding a nested
//! structure never duplicates payload bytes.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::TypeId;
use crate::varint;
use crate::MAX_BLOCK_SIZE;

/// First byte of every type reference; the encoding of the reserved root
/// type's own reference.
pub const ROOT_MARKER: u8 = 0x00;

/// A self-describing binary value: type + length + payload, possibly a
/// zero-copy view into a larger shared buffer.
#[derive(Clone)]
pub struct Block {
    ty: TypeId,
    buf: Arc<[u8]>,
    start: usize,
    end: usize,
}

impl Block {
    /// Create a block owning a fresh payload.
    pub fn new(ty: TypeId, payload: impl Into<Vec<u8>>) -> Block {
        let payload: Vec<u8> = payload.into();
        let end = payload.len();
        Block {
            ty,
            buf: payload.into(),
            start: 0,
            end,
        }
    }

    /// Create a block viewing `buf[start..end]` without copying. Fails if
    /// the range is out of bounds or inverted.
    pub fn from_buffer(ty: TypeId, buf: Arc<[u8]>, start: usize, end: usize) -> Result<Block> {
        if start > end || end > buf.len() {
            return Err(Error::LengthTooShort {
                step: "view block payload",
                actual: buf.len(),
                expected: end,
            });
        }
        Ok(Block {
            ty,
            buf,
            start,
            end,
        })
    }

    pub fn type_id(&self) -> TypeId {
        self.ty
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn payload(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    /// Shared storage handle, for zero-copy nested parsing.
    pub(crate) fn storage(&self) -> &Arc<[u8]> {
        &self.buf
    }

    /// Absolute offset of the payload within the shared storage.
    pub(crate) fn payload_start(&self) -> usize {
        self.start
    }

    /// Carve a typed sub-block over `start..end` of this block's payload.
    /// The sub-block shares this block's storage; no bytes are copied.
    pub fn sub_block(&self, ty: TypeId, start: usize, end: usize) -> Result<Block> {
        if start > end || end > self.len() {
            return Err(Error::LengthTooShort {
                step: "carve sub-block",
                actual: self.len(),
                expected: end,
            });
        }
        Block::from_buffer(ty, self.buf.clone(), self.start + start, self.start + end)
    }

    /// Size of the full wire form, header included.
    pub fn encoded_len(&self) -> usize {
        1 + varint::determine_length(TypeId::LEN as u64)
            + TypeId::LEN
            + varint::determine_length(self.len() as u64)
            + self.len()
    }

    /// Append the full wire form onto a byte vector.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.reserve(self.encoded_len());
        out.push(ROOT_MARKER);
        varint::write(out, TypeId::LEN as u64);
        out.extend_from_slice(self.ty.as_bytes());
        varint::write(out, self.len() as u64);
        out.extend_from_slice(self.payload());
    }

    /// The full wire form as a fresh byte vector.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.write_to(&mut out);
        out
    }

    /// Parse a block from its wire form. The buffer must contain exactly
    /// one block; trailing bytes are an encoding error.
    pub fn decode(data: &[u8]) -> Result<Block> {
        let buf: Arc<[u8]> = Arc::from(data);
        let (block, used) = Block::parse_at(&buf, 0)?;
        if used != data.len() {
            return Err(Error::BadEncode(format!(
                "Got {} trailing bytes after block",
                data.len() - used
            )));
        }
        Ok(block)
    }

    /// Parse a block starting at `offset` in shared storage, returning the
    /// block (a view into `buf`) and the number of bytes consumed.
    pub(crate) fn parse_at(buf: &Arc<[u8]>, offset: usize) -> Result<(Block, usize)> {
        let data: &[u8] = buf;
        let marker = *data.get(offset).ok_or(Error::LengthTooShort {
            step: "read type reference marker",
            actual: data.len() - offset,
            expected: 1,
        })?;
        if marker != ROOT_MARKER {
            return Err(Error::BadEncode(format!(
                "Type reference must begin with the reserved root marker, got 0x{:02x}",
                marker
            )));
        }
        let mut at = offset + 1;

        let (id_len, used) = varint::decode_value(&data[at..])?;
        at += used;
        if id_len as usize != TypeId::LEN {
            return Err(Error::BadEncode(format!(
                "Type identifier length is {}, must be {}",
                id_len,
                TypeId::LEN
            )));
        }
        if data.len() - at < TypeId::LEN {
            return Err(Error::LengthTooShort {
                step: "read type identifier",
                actual: data.len() - at,
                expected: TypeId::LEN,
            });
        }
        let mut id = [0u8; 32];
        id.copy_from_slice(&data[at..at + TypeId::LEN]);
        at += TypeId::LEN;
        let ty = TypeId::from_bytes(id);

        let (len, used) = varint::decode_value(&data[at..])?;
        at += used;
        let len = len as usize;
        if len > MAX_BLOCK_SIZE {
            return Err(Error::LengthTooLong {
                max: MAX_BLOCK_SIZE,
                actual: len,
            });
        }
        if data.len() - at < len {
            return Err(Error::LengthTooShort {
                step: "read block payload",
                actual: data.len() - at,
                expected: len,
            });
        }
        let block = Block::from_buffer(ty, buf.clone(), at, at + len)?;
        Ok((block, at + len - offset))
    }
}

/// Equality is type-and-bytes equality; where the payload lives doesn't
/// matter.
impl PartialEq for Block {
    fn eq(&self, other: &Block) -> bool {
        self.ty == other.ty && self.payload() == other.payload()
    }
}

impl Eq for Block {}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Block")
            .field("type", &self.ty)
            .field("len", &self.len())
            .finish()
    }
}
