//! trustwire is the wire-level trust layer of a decentralized identity
//! protocol: a self-describing binary block format plus the envelopes that
//! carry blocks between hosts with confidentiality and authenticity. The
//! goal is that any two parties who agree on type names can exchange typed
//! data without further coordination, and can check who said it and when.
//!
//! It provides:
//!
//! - A universal binary value, the [`Block`]: a semantic type reference, a
//!   length, and a payload. Blocks nest, and decoding nested structure is
//!   zero-copy.
//! - Semantic types identified by the BLAKE3 digest of their canonical
//!   name, with derivation checked through a [`TypeRegistry`] capability.
//! - Value wrappers for integers, floats, booleans, strings, and binary
//!   data, plus structural wrappers for lists and fixed-arity tuples with
//!   per-slot nullability.
//! - A compression envelope (zstd, with a verbatim fallback for
//!   incompressible data).
//! - An encryption envelope: X25519 key agreement seals a fresh symmetric
//!   key on first contact, and replies ride on the shared key.
//! - A signature envelope with three signed modes (host key, host-committed
//!   client key, anonymous credentials) and an explicit unsigned mode, with
//!   lazy, cached verification and a failure taxonomy of its own.
//! - Time-ordered [`KeyChain`]s so yesterday's signatures still verify
//!   against the key that was active yesterday.
//!
//! Everything here is a pure, synchronous transform over immutable inputs.
//! Key distribution, credential issuance, and transport live in the layers
//! around this crate.
//!
//! ```
//! use trustwire::{Block, Int32Wrapper, TypeTable, Wrapper};
//!
//! # fn main() -> Result<(), trustwire::Error> {
//! let mut types = TypeTable::new();
//! let port = types.register("port@example", None);
//!
//! let wrapper = Int32Wrapper::new(port);
//! let block = wrapper.encode(&types, &8080)?;
//!
//! let bytes = block.encode();
//! let back = Block::decode(&bytes)?;
//! assert_eq!(wrapper.decode(&types, &back)?, 8080);
//! # Ok(())
//! # }
//! ```

mod block;
mod crypto;
mod error;
mod keychain;
mod time;
mod types;
mod varint;

pub mod envelope;
pub mod wrapper;

pub use block::{Block, ROOT_MARKER};
pub use crypto::{
    ClientCommitment, CredentialProof, CredentialRefusal, CredentialVerifier, IdentityRef,
    SymmetricKey,
};
pub use envelope::{
    CompressionWrapper, EncryptionWrapper, FailureKind, Method, SignatureError, SignatureMode,
    SignaturePolicy, SignatureWrapper, VerifyContext,
};
pub use error::{Error, Result};
pub use keychain::{KeyChain, KeyChainError, MAX_FUTURE_SKEW, RETENTION};
pub use time::Time;
pub use types::{TypeId, TypeRegistry, TypeTable};
pub use wrapper::{
    BinaryWrapper, BoolWrapper, Float32Wrapper, Float64Wrapper, Int16Wrapper, Int32Wrapper,
    Int64Wrapper, Int8Wrapper, ListWrapper, Slot, Tuple, TupleWrapper, Utf16Wrapper, Utf8Wrapper,
    Wrapper,
};

/// Maximum size of a single decoded block's payload, in bytes. Anything
/// claiming to be larger is rejected before allocation, on decode and on
/// decompression alike.
pub const MAX_BLOCK_SIZE: usize = 1 << 20;
