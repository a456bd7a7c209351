//! Envelope wrappers: compression, confidentiality, and authenticity.
//!
//! Each envelope wraps exactly one inner block. Outbound, a value block is
//! compressed, then encrypted, then signed; inbound, each stage validates
//! before unwrapping the next. All operations here are pure, synchronous
//! transforms over immutable inputs — key fetches and timeouts belong to
//! the layers outside this crate.

pub mod compression;
pub mod encryption;
pub mod signature;

pub use compression::{CompressionWrapper, Method};
pub use encryption::EncryptionWrapper;
pub use signature::{
    FailureKind, SignatureError, SignatureMode, SignaturePolicy, SignatureWrapper, VerifyContext,
};
