use crate::block::Block;
use crate::error::{Error, Result};
use crate::types::{TypeId, TypeRegistry};

use super::{check_type, check_width, Wrapper};

/// Wrapper for a `bool` encoded as a single byte, `0x00` or `0x01`. Any
/// other byte is an encoding error.
#[derive(Clone, Debug)]
pub struct BoolWrapper {
    ty: TypeId,
}

impl BoolWrapper {
    pub fn new(ty: TypeId) -> Self {
        Self { ty }
    }
}

impl Wrapper for BoolWrapper {
    type Value = bool;

    fn wire_type(&self) -> TypeId {
        self.ty
    }

    fn determine_length(&self, _value: &bool) -> usize {
        1
    }

    fn encode(&self, _ctx: &dyn TypeRegistry, value: &bool) -> Result<Block> {
        Ok(Block::new(self.ty, vec![*value as u8]))
    }

    fn decode(&self, ctx: &dyn TypeRegistry, block: &Block) -> Result<bool> {
        check_type(ctx, block, self.ty)?;
        check_width(block, 1, "decode bool")?;
        match block.payload()[0] {
            0x00 => Ok(false),
            0x01 => Ok(true),
            other => Err(Error::BadEncode(format!(
                "Got boolean byte 0x{:02x}, must be 0x00 or 0x01",
                other
            ))),
        }
    }
}
