use crate::block::Block;
use crate::error::{Error, Result};
use crate::types::{TypeId, TypeRegistry};

use super::{check_type, element_len, write_element, ElementReader, Wrapper};

/// One position in a tuple: its declared element type and whether it may be
/// absent.
#[derive(Clone, Debug)]
pub struct Slot {
    pub element_ty: TypeId,
    pub nullable: bool,
}

impl Slot {
    pub fn required(element_ty: TypeId) -> Slot {
        Slot {
            element_ty,
            nullable: false,
        }
    }

    pub fn nullable(element_ty: TypeId) -> Slot {
        Slot {
            element_ty,
            nullable: true,
        }
    }
}

/// A decoded tuple. Slots are accessed by position; asking for a
/// non-nullable slot that is absent fails explicitly rather than returning
/// a null.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tuple {
    elems: Vec<Option<Block>>,
}

impl Tuple {
    pub fn new(elems: Vec<Option<Block>>) -> Tuple {
        Tuple { elems }
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    /// The block in `slot`. Fails with [`Error::MissingValue`] if the slot
    /// is absent or out of range.
    pub fn get(&self, slot: usize) -> Result<&Block> {
        self.elems
            .get(slot)
            .and_then(|e| e.as_ref())
            .ok_or(Error::MissingValue { slot })
    }

    /// The block in `slot`, if present.
    pub fn get_nullable(&self, slot: usize) -> Option<&Block> {
        self.elems.get(slot).and_then(|e| e.as_ref())
    }

    pub fn elems(&self) -> &[Option<Block>] {
        &self.elems
    }
}

/// Wrapper for a fixed-arity sequence of independently present-or-absent
/// elements.
///
/// Same per-element scheme as [`ListWrapper`](super::ListWrapper), but the
/// arity is fixed by the slot declarations, so there is no leading count on
/// the wire. Each slot has its own declared element type.
#[derive(Clone, Debug)]
pub struct TupleWrapper {
    ty: TypeId,
    slots: Vec<Slot>,
}

impl TupleWrapper {
    pub fn new(ty: TypeId, slots: Vec<Slot>) -> Self {
        Self { ty, slots }
    }

    pub fn arity(&self) -> usize {
        self.slots.len()
    }
}

impl Wrapper for TupleWrapper {
    type Value = Tuple;

    fn wire_type(&self) -> TypeId {
        self.ty
    }

    fn determine_length(&self, value: &Tuple) -> usize {
        value
            .elems
            .iter()
            .map(|elem| element_len(elem.as_ref()))
            .sum()
    }

    fn encode(&self, ctx: &dyn TypeRegistry, value: &Tuple) -> Result<Block> {
        if value.len() != self.slots.len() {
            return Err(Error::BadEncode(format!(
                "Tuple has {} elements, wrapper declares {} slots",
                value.len(),
                self.slots.len()
            )));
        }
        for (slot, elem) in self.slots.iter().zip(value.elems.iter()) {
            if let Some(elem) = elem {
                check_type(ctx, elem, slot.element_ty)?;
            }
        }
        let mut payload = Vec::with_capacity(self.determine_length(value));
        for elem in &value.elems {
            write_element(&mut payload, elem.as_ref());
        }
        Ok(Block::new(self.ty, payload))
    }

    fn decode(&self, ctx: &dyn TypeRegistry, block: &Block) -> Result<Tuple> {
        check_type(ctx, block, self.ty)?;
        let mut elems = Vec::with_capacity(self.slots.len());
        let mut reader = ElementReader::new(block, 0);
        for slot in &self.slots {
            let elem = reader.next_element()?;
            if let Some(ref elem) = elem {
                check_type(ctx, elem, slot.element_ty)?;
            }
            elems.push(elem);
        }
        reader.finish()?;
        Ok(Tuple { elems })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::registry;
    use super::*;

    fn tuple_type() -> TypeId {
        TypeId::from_name("tuple@test")
    }

    #[test]
    fn roundtrip() {
        let (table, base, derived) = registry();
        let wrapper = TupleWrapper::new(
            tuple_type(),
            vec![Slot::required(base), Slot::nullable(base), Slot::required(derived)],
        );
        let a = Block::new(base, vec![1]);
        let c = Block::new(derived, vec![3, 3]);
        let value = Tuple::new(vec![Some(a.clone()), None, Some(c.clone())]);

        let block = wrapper.encode(&table, &value).unwrap();
        assert_eq!(block.len(), wrapper.determine_length(&value));

        let out = wrapper.decode(&table, &block).unwrap();
        assert_eq!(*out.get(0).unwrap(), a);
        assert_eq!(out.get_nullable(1), None);
        assert_eq!(*out.get(2).unwrap(), c);
    }

    #[test]
    fn absent_required_slot_fails_on_access() {
        let (table, base, _) = registry();
        let wrapper =
            TupleWrapper::new(tuple_type(), vec![Slot::required(base), Slot::nullable(base)]);
        let value = Tuple::new(vec![None, None]);
        let block = wrapper.encode(&table, &value).unwrap();
        let out = wrapper.decode(&table, &block).unwrap();
        assert_eq!(out.get(0), Err(Error::MissingValue { slot: 0 }));
        assert_eq!(out.get_nullable(1), None);
    }

    #[test]
    fn wrong_arity_fails_on_encode() {
        let (table, base, _) = registry();
        let wrapper = TupleWrapper::new(tuple_type(), vec![Slot::required(base)]);
        let value = Tuple::new(vec![None, None]);
        assert!(wrapper.encode(&table, &value).is_err());
    }

    #[test]
    fn missing_elements_fail_on_decode() {
        let (table, base, _) = registry();
        let two = TupleWrapper::new(
            tuple_type(),
            vec![Slot::nullable(base), Slot::nullable(base)],
        );
        // A one-element payload decoded as a two-slot tuple ends early.
        let one = TupleWrapper::new(tuple_type(), vec![Slot::nullable(base)]);
        let block = one.encode(&table, &Tuple::new(vec![None])).unwrap();
        assert!(two.decode(&table, &block).is_err());
    }

    #[test]
    fn extra_elements_fail_on_decode() {
        let (table, base, _) = registry();
        let one = TupleWrapper::new(tuple_type(), vec![Slot::nullable(base)]);
        let two = TupleWrapper::new(
            tuple_type(),
            vec![Slot::nullable(base), Slot::nullable(base)],
        );
        let block = two
            .encode(&table, &Tuple::new(vec![None, None]))
            .unwrap();
        assert!(one.decode(&table, &block).is_err());
    }

    #[test]
    fn slot_types_checked() {
        let (mut table, base, _) = registry();
        let other = table.register("other@test", None);
        let strict = TupleWrapper::new(tuple_type(), vec![Slot::required(base)]);
        let loose = TupleWrapper::new(tuple_type(), vec![Slot::required(TypeId::ANY)]);
        let value = Tuple::new(vec![Some(Block::new(other, vec![1]))]);
        let block = loose.encode(&table, &value).unwrap();
        assert!(matches!(
            strict.decode(&table, &block),
            Err(Error::TypeMismatch { .. })
        ));
    }
}
