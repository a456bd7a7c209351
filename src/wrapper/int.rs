use byteorder::{BigEndian, ReadBytesExt};

use crate::block::Block;
use crate::error::Result;
use crate::types::{TypeId, TypeRegistry};

use super::{check_type, check_width, Wrapper};

// Fixed-width two's-complement big-endian integer wrappers. One macro
// invocation per width; they differ only in the primitive type and the
// byteorder read call.
macro_rules! int_wrapper {
    ($name:ident, $prim:ty, $read:ident, $width:expr, $step:expr) => {
        /// Wrapper for a
        #[doc = concat!("`", stringify!($prim), "`")]
        /// encoded as
        #[doc = concat!($width, "-byte")]
        /// two's-complement big-endian.
        #[derive(Clone, Debug)]
        pub struct $name {
            ty: TypeId,
        }

        impl $name {
            pub fn new(ty: TypeId) -> Self {
                Self { ty }
            }
        }

        impl Wrapper for $name {
            type Value = $prim;

            fn wire_type(&self) -> TypeId {
                self.ty
            }

            fn determine_length(&self, _value: &$prim) -> usize {
                $width
            }

            fn encode(&self, _ctx: &dyn TypeRegistry, value: &$prim) -> Result<Block> {
                Ok(Block::new(self.ty, value.to_be_bytes().to_vec()))
            }

            fn decode(&self, ctx: &dyn TypeRegistry, block: &Block) -> Result<$prim> {
                check_type(ctx, block, self.ty)?;
                check_width(block, $width, $step)?;
                let mut payload = block.payload();
                Ok(payload.$read::<BigEndian>().map_err(|_| {
                    crate::error::Error::LengthTooShort {
                        step: $step,
                        actual: block.len(),
                        expected: $width,
                    }
                })?)
            }
        }
    };
}

int_wrapper!(Int16Wrapper, i16, read_i16, 2, "decode int16");
int_wrapper!(Int32Wrapper, i32, read_i32, 4, "decode int32");
int_wrapper!(Int64Wrapper, i64, read_i64, 8, "decode int64");

/// Wrapper for an `i8` encoded as a single two's-complement byte.
#[derive(Clone, Debug)]
pub struct Int8Wrapper {
    ty: TypeId,
}

impl Int8Wrapper {
    pub fn new(ty: TypeId) -> Self {
        Self { ty }
    }
}

impl Wrapper for Int8Wrapper {
    type Value = i8;

    fn wire_type(&self) -> TypeId {
        self.ty
    }

    fn determine_length(&self, _value: &i8) -> usize {
        1
    }

    fn encode(&self, _ctx: &dyn TypeRegistry, value: &i8) -> Result<Block> {
        Ok(Block::new(self.ty, vec![*value as u8]))
    }

    fn decode(&self, ctx: &dyn TypeRegistry, block: &Block) -> Result<i8> {
        check_type(ctx, block, self.ty)?;
        check_width(block, 1, "decode int8")?;
        Ok(block.payload()[0] as i8)
    }
}
