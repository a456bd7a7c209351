//! The wrapper contract and the structural/value wrappers.
//!
//! A wrapper is a bidirectional mapping between a typed in-memory value and
//! a [`Block`]. Each wrapper has exactly one structural shape, but may be
//! instantiated under many semantic types sharing that shape — an
//! `Int32Wrapper` for a port number and one for a counter differ only in
//! the [`TypeId`] they carry. Decoding checks that the block's type derives
//! from the wrapper's type via the [`TypeRegistry`] context.

use crate::block::Block;
use crate::error::{Error, Result};
use crate::types::{TypeId, TypeRegistry};

mod binary;
mod boolean;
mod float;
mod int;
mod list;
mod string;
mod tuple;

pub use binary::BinaryWrapper;
pub use boolean::BoolWrapper;
pub use float::{Float32Wrapper, Float64Wrapper};
pub use int::{Int16Wrapper, Int32Wrapper, Int64Wrapper, Int8Wrapper};
pub use list::ListWrapper;
pub use string::{Utf16Wrapper, Utf8Wrapper};
pub use tuple::{Slot, Tuple, TupleWrapper};

/// Bidirectional mapping between an in-memory value and a [`Block`].
pub trait Wrapper {
    /// The in-memory value this wrapper encodes and decodes.
    type Value;

    /// The semantic type this wrapper produces and accepts.
    fn wire_type(&self) -> TypeId;

    /// Payload length, in bytes, that encoding `value` will produce.
    fn determine_length(&self, value: &Self::Value) -> usize;

    /// Encode a value into a freshly sized block.
    fn encode(&self, ctx: &dyn TypeRegistry, value: &Self::Value) -> Result<Block>;

    /// Decode a block back into a value. The block's type must derive from
    /// [`wire_type`](Self::wire_type).
    fn decode(&self, ctx: &dyn TypeRegistry, block: &Block) -> Result<Self::Value>;

    /// Nullable variant: a null block maps to a null value.
    fn decode_nullable(
        &self,
        ctx: &dyn TypeRegistry,
        block: Option<&Block>,
    ) -> Result<Option<Self::Value>> {
        block.map(|b| self.decode(ctx, b)).transpose()
    }
}

/// Check that a block's type derives from `expected`.
pub(crate) fn check_type(
    ctx: &dyn TypeRegistry,
    block: &Block,
    expected: TypeId,
) -> Result<()> {
    if ctx.is_based_on(block.type_id(), expected) {
        Ok(())
    } else {
        Err(Error::TypeMismatch {
            actual: block.type_id(),
            expected,
        })
    }
}

/// Check that a scalar block's payload is exactly `expected` bytes, with
/// the error variant picked by direction.
pub(crate) fn check_width(block: &Block, expected: usize, step: &'static str) -> Result<()> {
    if block.len() < expected {
        Err(Error::LengthTooShort {
            step,
            actual: block.len(),
            expected,
        })
    } else if block.len() > expected {
        Err(Error::LengthTooLong {
            max: expected,
            actual: block.len(),
        })
    } else {
        Ok(())
    }
}

/// Wire marker for an absent element. Unambiguous: a present element starts
/// with the varint of its length, and no length small enough to fit in a
/// block encodes with a `0x00` lead byte.
pub(crate) const ABSENT: u8 = 0x00;

/// Encoded size of one list/tuple element.
pub(crate) fn element_len(elem: Option<&Block>) -> usize {
    match elem {
        None => 1,
        Some(block) => {
            let len = block.encoded_len();
            crate::varint::determine_length(len as u64) + len
        }
    }
}

/// Append one element: `0x00` for absent, `varint(len) || block` for
/// present.
pub(crate) fn write_element(out: &mut Vec<u8>, elem: Option<&Block>) {
    match elem {
        None => out.push(ABSENT),
        Some(block) => {
            crate::varint::write(out, block.encoded_len() as u64);
            block.write_to(out);
        }
    }
}

/// Walks the element region of a list or tuple payload, yielding elements
/// as zero-copy views into the parent block's storage. Never reads past the
/// parent payload, and tracks consumption so callers can demand that the
/// declared block length is consumed exactly.
pub(crate) struct ElementReader<'a> {
    parent: &'a Block,
    pos: usize,
}

impl<'a> ElementReader<'a> {
    pub fn new(parent: &'a Block, pos: usize) -> ElementReader<'a> {
        ElementReader { parent, pos }
    }

    /// Read the next element. Fails if the payload ends mid-element or an
    /// element's declared length runs past the parent block.
    pub fn next_element(&mut self) -> Result<Option<Block>> {
        let payload = self.parent.payload();
        let marker = *payload.get(self.pos).ok_or(Error::LengthTooShort {
            step: "read element marker",
            actual: 0,
            expected: 1,
        })?;
        if marker == ABSENT {
            self.pos += 1;
            return Ok(None);
        }
        let (elem_len, used) = crate::varint::decode_value(&payload[self.pos..])?;
        let elem_len = elem_len as usize;
        let start = self.pos + used;
        if elem_len > payload.len() - start {
            return Err(Error::LengthTooShort {
                step: "read element content",
                actual: payload.len() - start,
                expected: elem_len,
            });
        }
        let abs = self.parent.payload_start() + start;
        let (block, consumed) = Block::parse_at(self.parent.storage(), abs)?;
        if consumed != elem_len {
            return Err(Error::BadEncode(format!(
                "Element declared {} bytes but its block occupies {}",
                elem_len, consumed
            )));
        }
        self.pos = start + elem_len;
        Ok(Some(block))
    }

    /// Require that the parent payload was consumed exactly.
    pub fn finish(self) -> Result<()> {
        let remaining = self.parent.len() - self.pos;
        if remaining != 0 {
            return Err(Error::LengthTooShort {
                step: "finish element region",
                actual: self.parent.len(),
                expected: self.pos,
            });
        }
        Ok(())
    }
}
