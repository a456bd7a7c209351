//! Key material and identity references used by the envelope wrappers.
//!
//! Host signing uses Ed25519; recipient key agreement uses X25519. Actors
//! are referred to on the wire by the BLAKE3 digest of their public key, so
//! a reference is fixed-width and can't be forged without the key itself.
//! The anonymous-credential cryptography is not implemented here — it is an
//! external capability consumed through [`CredentialVerifier`].

use std::fmt;

use base64::Engine;
use ed25519_dalek::VerifyingKey;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A 32-byte reference to an actor (host, client, or recipient): the BLAKE3
/// digest of its public key.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct IdentityRef([u8; 32]);

impl IdentityRef {
    /// Reference size in bytes.
    pub const LEN: usize = 32;

    /// Reference an actor by its Ed25519 verifying key.
    pub fn of_signing_key(key: &VerifyingKey) -> IdentityRef {
        IdentityRef(*blake3::hash(key.as_bytes()).as_bytes())
    }

    /// Reference an actor by its X25519 public key.
    pub fn of_exchange_key(key: &x25519_dalek::PublicKey) -> IdentityRef {
        IdentityRef(*blake3::hash(key.as_bytes()).as_bytes())
    }

    pub fn from_bytes(bytes: [u8; 32]) -> IdentityRef {
        IdentityRef(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for IdentityRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let enc = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(self.0);
        f.write_str(&enc)
    }
}

impl fmt::Debug for IdentityRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "IdentityRef({})", self)
    }
}

/// A 256-bit symmetric key for the ChaCha20-Poly1305 body cipher. Zeroed on
/// drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; 32]);

impl SymmetricKey {
    pub const LEN: usize = 32;

    /// Generate a fresh random key.
    pub fn generate() -> SymmetricKey {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        SymmetricKey(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> SymmetricKey {
        SymmetricKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Never print key material.
        f.write_str("SymmetricKey(..)")
    }
}

/// A client's secret commitment to a specific host.
///
/// Instead of signing under a long-lived conventional key, a client binds
/// its verifying key to one host: `commit = BLAKE3(host_ref || key)`. A
/// verifier checks that the commitment opens to itself as the host and to
/// the declared key, then checks the signature under that key. The same
/// client presents a different commitment to every host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientCommitment {
    host: IdentityRef,
    public: VerifyingKey,
    commit: [u8; 32],
}

impl ClientCommitment {
    /// Commit a client verifying key to a host.
    pub fn new(host: IdentityRef, public: VerifyingKey) -> ClientCommitment {
        ClientCommitment {
            host,
            public,
            commit: Self::bind(&host, &public),
        }
    }

    /// Reassemble a commitment from its wire fields, without checking it.
    pub fn from_parts(
        host: IdentityRef,
        public: VerifyingKey,
        commit: [u8; 32],
    ) -> ClientCommitment {
        ClientCommitment {
            host,
            public,
            commit,
        }
    }

    /// The host this commitment is bound to.
    pub fn host(&self) -> IdentityRef {
        self.host
    }

    /// The committed verifying key.
    pub fn public(&self) -> &VerifyingKey {
        &self.public
    }

    pub fn commit_bytes(&self) -> &[u8; 32] {
        &self.commit
    }

    /// Whether the commitment opens correctly: the stored binding matches a
    /// recomputation over the declared host and key.
    pub fn opens(&self) -> bool {
        self.commit == Self::bind(&self.host, &self.public)
    }

    fn bind(host: &IdentityRef, public: &VerifyingKey) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(host.as_bytes());
        hasher.update(public.as_bytes());
        *hasher.finalize().as_bytes()
    }
}

/// Material carried by a credentials-mode signature: one or more
/// third-party-issued anonymous credential proofs, opaque to this layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialProof {
    /// The serialized credential proof, interpreted only by the verifier
    /// capability.
    pub proof: Vec<u8>,
    /// Whether the signature commits to a value usable later to prove
    /// non-repudiation of blinded exponents.
    pub lodged: bool,
}

/// Why a credential verifier refused a proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialRefusal {
    /// The proof failed cryptographic verification.
    Invalid(String),
    /// The credential has been administratively revoked or suspended.
    Inactive(String),
}

impl fmt::Display for CredentialRefusal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CredentialRefusal::Invalid(reason) => write!(f, "Invalid credentials: {}", reason),
            CredentialRefusal::Inactive(reason) => write!(f, "Inactive credentials: {}", reason),
        }
    }
}

/// External capability that verifies anonymous-credential proofs. The
/// credential cryptography lives outside this crate; signature verification
/// delegates to this trait.
pub trait CredentialVerifier {
    /// Verify a proof over the given signable bytes.
    fn verify(&self, signable: &[u8], proof: &CredentialProof) -> Result<(), CredentialRefusal>;
}
