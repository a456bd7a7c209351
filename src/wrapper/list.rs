use crate::block::Block;
use crate::error::{Error, Result};
use crate::types::{TypeId, TypeRegistry};
use crate::varint;

use super::{check_type, element_len, write_element, ElementReader, Wrapper};

/// Wrapper for an ordered sequence in which each element is independently
/// present or absent.
///
/// Payload: `varint(count)`, then per element either `0x00` (absent) or
/// `varint(elementLength) || element block`. Every present element's type
/// must derive from the declared element type; this is checked on encode
/// and again on decode. Decoding consumes the declared block length exactly
/// and never reads past it.
#[derive(Clone, Debug)]
pub struct ListWrapper {
    ty: TypeId,
    element_ty: TypeId,
}

impl ListWrapper {
    pub fn new(ty: TypeId, element_ty: TypeId) -> Self {
        Self { ty, element_ty }
    }

    pub fn element_type(&self) -> TypeId {
        self.element_ty
    }
}

impl Wrapper for ListWrapper {
    type Value = Vec<Option<Block>>;

    fn wire_type(&self) -> TypeId {
        self.ty
    }

    fn determine_length(&self, value: &Vec<Option<Block>>) -> usize {
        varint::determine_length(value.len() as u64)
            + value
                .iter()
                .map(|elem| element_len(elem.as_ref()))
                .sum::<usize>()
    }

    fn encode(&self, ctx: &dyn TypeRegistry, value: &Vec<Option<Block>>) -> Result<Block> {
        for elem in value.iter().flatten() {
            check_type(ctx, elem, self.element_ty)?;
        }
        let mut payload = Vec::with_capacity(self.determine_length(value));
        varint::write(&mut payload, value.len() as u64);
        for elem in value {
            write_element(&mut payload, elem.as_ref());
        }
        Ok(Block::new(self.ty, payload))
    }

    fn decode(&self, ctx: &dyn TypeRegistry, block: &Block) -> Result<Vec<Option<Block>>> {
        check_type(ctx, block, self.ty)?;
        let (count, used) = varint::decode_value(block.payload())?;
        if count as usize > block.len() {
            // Each element takes at least one byte; an impossible count is
            // rejected before any allocation.
            return Err(Error::BadEncode(format!(
                "List declares {} elements in a {}-byte payload",
                count,
                block.len()
            )));
        }
        let mut elems = Vec::with_capacity(count as usize);
        let mut reader = ElementReader::new(block, used);
        for _ in 0..count {
            let elem = reader.next_element()?;
            if let Some(ref elem) = elem {
                check_type(ctx, elem, self.element_ty)?;
            }
            elems.push(elem);
        }
        reader.finish()?;
        Ok(elems)
    }
}
