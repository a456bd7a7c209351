//! Semantic type identifiers and the type-derivation capability.
//!
//! Every block carries exactly one semantic type. Types are identified by
//! the 32-byte BLAKE3 digest of their canonical name, so two parties that
//! agree on a name agree on the identifier without coordination. The global
//! registry that knows the full derivation tree is an external collaborator;
//! this module defines the capability trait it must satisfy and a small
//! in-process table for the application-extensible cases.

use std::collections::HashMap;
use std::fmt;

use base64::Engine;

/// A semantic type identifier: the BLAKE3 digest of the type's canonical
/// name. Opaque to the wire format, resolved by a [`TypeRegistry`].
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct TypeId([u8; 32]);

impl TypeId {
    /// The root of the derivation tree. Every type derives from it, and it
    /// derives only from itself. Deliberately the all-zero digest rather
    /// than a hash of anything, so it can never collide with a named type.
    pub const ANY: TypeId = TypeId([0u8; 32]);

    /// Identifier size in bytes.
    pub const LEN: usize = 32;

    /// Derive the identifier for a canonical type name.
    pub fn from_name(name: &str) -> TypeId {
        TypeId(*blake3::hash(name.as_bytes()).as_bytes())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> TypeId {
        TypeId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let enc = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(self.0);
        f.write_str(&enc)
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TypeId({})", self)
    }
}

/// External capability for resolving semantic types and checking
/// derivation. Wrappers take this as their decode context.
pub trait TypeRegistry {
    /// Look up a type identifier by canonical name.
    fn resolve(&self, name: &str) -> Option<TypeId>;

    /// Whether `ty` is `ancestor` or derives from it, directly or
    /// transitively. [`TypeId::ANY`] is an ancestor of every type.
    fn is_based_on(&self, ty: TypeId, ancestor: TypeId) -> bool;
}

/// In-process type table with single-parent derivation links.
///
/// Suitable as the decode context when the full external registry isn't in
/// play: register the types a message may legitimately carry, with their
/// parents, and hand it to the wrappers.
#[derive(Clone, Debug, Default)]
pub struct TypeTable {
    names: HashMap<String, TypeId>,
    parents: HashMap<TypeId, TypeId>,
}

impl TypeTable {
    pub fn new() -> TypeTable {
        TypeTable::default()
    }

    /// Register a type under its canonical name, deriving from `parent`
    /// (or from the root when `None`). Returns the new identifier.
    pub fn register(&mut self, name: &str, parent: Option<TypeId>) -> TypeId {
        let id = TypeId::from_name(name);
        self.names.insert(name.to_string(), id);
        self.parents.insert(id, parent.unwrap_or(TypeId::ANY));
        id
    }
}

impl TypeRegistry for TypeTable {
    fn resolve(&self, name: &str) -> Option<TypeId> {
        self.names.get(name).copied()
    }

    fn is_based_on(&self, ty: TypeId, ancestor: TypeId) -> bool {
        if ancestor == TypeId::ANY || ty == ancestor {
            return true;
        }
        let mut current = ty;
        while let Some(&parent) = self.parents.get(&current) {
            if parent == ancestor {
                return true;
            }
            if parent == TypeId::ANY {
                return false;
            }
            current = parent;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_stable() {
        assert_eq!(TypeId::from_name("test@core"), TypeId::from_name("test@core"));
        assert_ne!(TypeId::from_name("test@core"), TypeId::from_name("test@other"));
    }

    #[test]
    fn derivation_walks_parents() {
        let mut table = TypeTable::new();
        let animal = table.register("animal@core", None);
        let cat = table.register("cat@core", Some(animal));
        let tabby = table.register("tabby@core", Some(cat));
        let rock = table.register("rock@core", None);

        assert!(table.is_based_on(tabby, cat));
        assert!(table.is_based_on(tabby, animal));
        assert!(table.is_based_on(tabby, tabby));
        assert!(table.is_based_on(tabby, TypeId::ANY));
        assert!(!table.is_based_on(tabby, rock));
        assert!(!table.is_based_on(animal, cat));
    }

    #[test]
    fn resolve_by_name() {
        let mut table = TypeTable::new();
        let id = table.register("point@geo", None);
        assert_eq!(table.resolve("point@geo"), Some(id));
        assert_eq!(table.resolve("missing@geo"), None);
    }

    #[test]
    fn any_is_universal_ancestor() {
        let table = TypeTable::new();
        // Even unregistered types derive from the root.
        assert!(table.is_based_on(TypeId::from_name("unknown"), TypeId::ANY));
        assert!(table.is_based_on(TypeId::ANY, TypeId::ANY));
    }
}
