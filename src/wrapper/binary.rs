use crate::block::Block;
use crate::error::{Error, Result};
use crate::types::{TypeId, TypeRegistry};

use super::{check_type, Wrapper};

/// Wrapper for raw byte arrays. An optional fixed width turns it into a
/// hash/digest wrapper that rejects any other payload size.
#[derive(Clone, Debug)]
pub struct BinaryWrapper {
    ty: TypeId,
    fixed_len: Option<usize>,
}

impl BinaryWrapper {
    /// Variable-length byte array wrapper.
    pub fn new(ty: TypeId) -> Self {
        Self {
            ty,
            fixed_len: None,
        }
    }

    /// Fixed-width wrapper, e.g. `fixed(ty, 32)` for a 256-bit hash.
    pub fn fixed(ty: TypeId, len: usize) -> Self {
        Self {
            ty,
            fixed_len: Some(len),
        }
    }
}

impl Wrapper for BinaryWrapper {
    type Value = Vec<u8>;

    fn wire_type(&self) -> TypeId {
        self.ty
    }

    fn determine_length(&self, value: &Vec<u8>) -> usize {
        value.len()
    }

    fn encode(&self, _ctx: &dyn TypeRegistry, value: &Vec<u8>) -> Result<Block> {
        if let Some(expected) = self.fixed_len {
            if value.len() != expected {
                return Err(Error::LengthTooShort {
                    step: "encode fixed-width binary",
                    actual: value.len(),
                    expected,
                });
            }
        }
        Ok(Block::new(self.ty, value.clone()))
    }

    fn decode(&self, ctx: &dyn TypeRegistry, block: &Block) -> Result<Vec<u8>> {
        check_type(ctx, block, self.ty)?;
        if let Some(expected) = self.fixed_len {
            if block.len() != expected {
                return Err(Error::LengthTooShort {
                    step: "decode fixed-width binary",
                    actual: block.len(),
                    expected,
                });
            }
        }
        Ok(block.payload().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::registry;
    use super::*;

    #[test]
    fn roundtrip() {
        let (table, base, _) = registry();
        let wrapper = BinaryWrapper::new(base);
        for v in [vec![], vec![0u8], vec![1, 2, 3, 255], vec![0xAB; 1000]] {
            let block = wrapper.encode(&table, &v).unwrap();
            assert_eq!(block.len(), wrapper.determine_length(&v));
            assert_eq!(wrapper.decode(&table, &block).unwrap(), v);
        }
    }

    #[test]
    fn fixed_width_enforced() {
        let (table, base, _) = registry();
        let wrapper = BinaryWrapper::fixed(base, 32);
        let hash = vec![7u8; 32];
        let block = wrapper.encode(&table, &hash).unwrap();
        assert_eq!(wrapper.decode(&table, &block).unwrap(), hash);

        assert!(wrapper.encode(&table, &vec![7u8; 31]).is_err());
        let short = Block::new(base, vec![7u8; 31]);
        assert!(wrapper.decode(&table, &short).is_err());
    }
}
