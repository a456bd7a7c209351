use crate::block::Block;
use crate::error::{Error, Result};
use crate::types::{TypeId, TypeRegistry};

use super::{check_type, Wrapper};

/// Wrapper for a string encoded as UTF-8 bytes.
#[derive(Clone, Debug)]
pub struct Utf8Wrapper {
    ty: TypeId,
}

impl Utf8Wrapper {
    pub fn new(ty: TypeId) -> Self {
        Self { ty }
    }
}

impl Wrapper for Utf8Wrapper {
    type Value = String;

    fn wire_type(&self) -> TypeId {
        self.ty
    }

    fn determine_length(&self, value: &String) -> usize {
        value.len()
    }

    fn encode(&self, _ctx: &dyn TypeRegistry, value: &String) -> Result<Block> {
        Ok(Block::new(self.ty, value.as_bytes().to_vec()))
    }

    fn decode(&self, ctx: &dyn TypeRegistry, block: &Block) -> Result<String> {
        check_type(ctx, block, self.ty)?;
        let s = std::str::from_utf8(block.payload())
            .map_err(|e| Error::BadEncode(format!("{}", e)))?;
        Ok(s.to_string())
    }
}

/// Wrapper for a string encoded as UTF-16 code units, big-endian, no BOM.
#[derive(Clone, Debug)]
pub struct Utf16Wrapper {
    ty: TypeId,
}

impl Utf16Wrapper {
    pub fn new(ty: TypeId) -> Self {
        Self { ty }
    }
}

impl Wrapper for Utf16Wrapper {
    type Value = String;

    fn wire_type(&self) -> TypeId {
        self.ty
    }

    fn determine_length(&self, value: &String) -> usize {
        value.encode_utf16().count() * 2
    }

    fn encode(&self, _ctx: &dyn TypeRegistry, value: &String) -> Result<Block> {
        let mut payload = Vec::with_capacity(self.determine_length(value));
        for unit in value.encode_utf16() {
            payload.extend_from_slice(&unit.to_be_bytes());
        }
        Ok(Block::new(self.ty, payload))
    }

    fn decode(&self, ctx: &dyn TypeRegistry, block: &Block) -> Result<String> {
        check_type(ctx, block, self.ty)?;
        let payload = block.payload();
        if payload.len() % 2 != 0 {
            return Err(Error::BadEncode(format!(
                "UTF-16 payload has odd length {}",
                payload.len()
            )));
        }
        let units = payload
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
        char::decode_utf16(units)
            .collect::<Result<String, _>>()
            .map_err(|e| Error::BadEncode(format!("{}", e)))
    }
}
