use byteorder::{BigEndian, ReadBytesExt};

use crate::block::Block;
use crate::error::{Error, Result};
use crate::types::{TypeId, TypeRegistry};

use super::{check_type, check_width, Wrapper};

/// Wrapper for an `f32` encoded as its IEEE-754 bit pattern, big-endian.
#[derive(Clone, Debug)]
pub struct Float32Wrapper {
    ty: TypeId,
}

impl Float32Wrapper {
    pub fn new(ty: TypeId) -> Self {
        Self { ty }
    }
}

impl Wrapper for Float32Wrapper {
    type Value = f32;

    fn wire_type(&self) -> TypeId {
        self.ty
    }

    fn determine_length(&self, _value: &f32) -> usize {
        4
    }

    fn encode(&self, _ctx: &dyn TypeRegistry, value: &f32) -> Result<Block> {
        Ok(Block::new(self.ty, value.to_bits().to_be_bytes().to_vec()))
    }

    fn decode(&self, ctx: &dyn TypeRegistry, block: &Block) -> Result<f32> {
        check_type(ctx, block, self.ty)?;
        check_width(block, 4, "decode float32")?;
        let mut payload = block.payload();
        payload
            .read_f32::<BigEndian>()
            .map_err(|_| Error::LengthTooShort {
                step: "decode float32",
                actual: block.len(),
                expected: 4,
            })
    }
}

/// Wrapper for an `f64` encoded as its IEEE-754 bit pattern, big-endian.
#[derive(Clone, Debug)]
pub struct Float64Wrapper {
    ty: TypeId,
}

impl Float64Wrapper {
    pub fn new(ty: TypeId) -> Self {
        Self { ty }
    }
}

impl Wrapper for Float64Wrapper {
    type Value = f64;

    fn wire_type(&self) -> TypeId {
        self.ty
    }

    fn determine_length(&self, _value: &f64) -> usize {
        8
    }

    fn encode(&self, _ctx: &dyn TypeRegistry, value: &f64) -> Result<Block> {
        Ok(Block::new(self.ty, value.to_bits().to_be_bytes().to_vec()))
    }

    fn decode(&self, ctx: &dyn TypeRegistry, block: &Block) -> Result<f64> {
        check_type(ctx, block, self.ty)?;
        check_width(block, 8, "decode float64")?;
        let mut payload = block.payload();
        payload
            .read_f64::<BigEndian>()
            .map_err(|_| Error::LengthTooShort {
                step: "decode float64",
                actual: block.len(),
                expected: 8,
            })
    }
}
