use std::fmt;

use crate::keychain::KeyChainError;
use crate::types::TypeId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced while encoding or decoding blocks and envelopes.
///
/// These are all fatal to the block being processed: a malformed block is
/// dropped, never retried. Signature-validity failures are a separate
/// taxonomy ([`SignatureError`](crate::envelope::signature::SignatureError)),
/// since they speak about a well-formed block whose authenticity claim
/// doesn't hold up.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// A block, varint, or envelope field ended before its declared size.
    LengthTooShort {
        step: &'static str,
        actual: usize,
        expected: usize,
    },
    /// A size exceeds its allowed maximum: a block's declared size on
    /// decode, or a scalar payload wider than its fixed width.
    LengthTooLong { max: usize, actual: usize },
    /// Basic wire encoding failure: bad marker, non-canonical varint,
    /// trailing bytes, invalid UTF-8/UTF-16, and the like.
    BadEncode(String),
    /// A block's type does not derive from the type a wrapper expected.
    TypeMismatch { actual: TypeId, expected: TypeId },
    /// A non-nullable tuple slot was absent.
    MissingValue { slot: usize },
    /// An envelope header (compression tag, key mode, signature mode)
    /// failed to parse.
    BadHeader(&'static str),
    /// Decompression failed, or the inflated data exceeded the size limit.
    FailDecompress(String),
    /// Decryption failed: bad sealed key, corrupted ciphertext, or a
    /// failing authentication tag.
    FailDecrypt(&'static str),
    /// A key-chain precondition was violated. These are caller defects,
    /// not recoverable conditions.
    KeyChain(KeyChainError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::LengthTooShort {
                step,
                actual,
                expected,
            } => write!(
                f,
                "Expected data length {}, but got {} on step [{}]",
                expected, actual, step
            ),
            Error::LengthTooLong { max, actual } => write!(
                f,
                "Data too long: was {} bytes, maximum allowed is {}",
                actual, max
            ),
            Error::BadEncode(ref err) => write!(f, "Basic data encoding failure: {}", err),
            Error::TypeMismatch {
                ref actual,
                ref expected,
            } => write!(
                f,
                "Block type {} does not derive from expected type {}",
                actual, expected
            ),
            Error::MissingValue { slot } => {
                write!(f, "Non-nullable tuple slot {} is absent", slot)
            }
            Error::BadHeader(msg) => write!(f, "Bad envelope header: {}", msg),
            Error::FailDecompress(ref err) => write!(f, "Failed decompression step: {}", err),
            Error::FailDecrypt(msg) => write!(f, "Failed decryption step: {}", msg),
            Error::KeyChain(ref err) => write!(f, "Key chain precondition violated: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            Error::KeyChain(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<KeyChainError> for Error {
    fn from(e: KeyChainError) -> Self {
        Self::KeyChain(e)
    }
}
