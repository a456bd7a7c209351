//! Encryption envelope: confidential delivery of one inner block.
//!
//! Payload: `time || recipient ref || key mode || [sealed key] || nonce ||
//! ciphertext`. The first message to a recipient seals a fresh symmetric
//! key under the recipient's X25519 public key valid at the stated time
//! (ephemeral Diffie-Hellman, HKDF-SHA-256, ChaCha20-Poly1305). Replies
//! reuse the already-shared symmetric key and say so with an explicit key
//! mode — a decoder never infers session state from context. Corrupted
//! ciphertext fails the AEAD tag and is never silently accepted.

use std::convert::TryFrom;

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use tracing::trace;
use x25519_dalek::{EphemeralSecret, PublicKey, SharedSecret, StaticSecret};

use crate::block::Block;
use crate::crypto::{IdentityRef, SymmetricKey};
use crate::error::{Error, Result};
use crate::keychain::KeyChain;
use crate::time::Time;
use crate::types::{TypeId, TypeRegistry};
use crate::wrapper::check_type;

/// AEAD nonce size.
pub const NONCE_LEN: usize = 12;

/// Sealed key field: ephemeral public key, then the wrapped symmetric key
/// with its authentication tag.
const EPHEMERAL_LEN: usize = 32;
const WRAPPED_LEN: usize = SymmetricKey::LEN + 16;

const KEK_INFO: &[u8] = b"trustwire/v1/kek";

/// How the body's symmetric key travels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KeyMode {
    /// First message: the key is sealed to the recipient's public key.
    Sealed,
    /// Reply: the key is already shared; the envelope carries none.
    Known,
}

impl From<KeyMode> for u8 {
    fn from(val: KeyMode) -> u8 {
        match val {
            KeyMode::Sealed => 0,
            KeyMode::Known => 1,
        }
    }
}

impl TryFrom<u8> for KeyMode {
    type Error = u8;
    fn try_from(val: u8) -> Result<KeyMode, u8> {
        match val {
            0 => Ok(KeyMode::Sealed),
            1 => Ok(KeyMode::Known),
            _ => Err(val),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct SealedKey {
    ephemeral: [u8; EPHEMERAL_LEN],
    wrapped: Vec<u8>,
}

/// Wraps one inner block for confidential delivery to a named recipient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptionWrapper {
    ty: TypeId,
    time: Time,
    recipient: IdentityRef,
    sealed: Option<SealedKey>,
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl EncryptionWrapper {
    /// Encrypt `inner` for a recipient's public key valid at `time`,
    /// sealing a fresh symmetric key. Returns the envelope and the key,
    /// which the caller keeps for the reply direction.
    pub fn seal(
        ty: TypeId,
        inner: &Block,
        time: Time,
        recipient_key: &PublicKey,
    ) -> Result<(EncryptionWrapper, SymmetricKey)> {
        let key = SymmetricKey::generate();
        let ephemeral = EphemeralSecret::random_from_rng(OsRng);
        let ephemeral_pub = PublicKey::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(recipient_key);
        let kek = derive_kek(&shared, &ephemeral_pub, recipient_key)?;

        // The key-encryption key is single-use, so a fixed nonce is sound.
        let wrapped = ChaCha20Poly1305::new(Key::from_slice(&kek))
            .encrypt(Nonce::from_slice(&[0u8; NONCE_LEN]), key.as_bytes().as_slice())
            .map_err(|_| Error::FailDecrypt("failed to seal symmetric key"))?;

        let recipient = IdentityRef::of_exchange_key(recipient_key);
        let (nonce, ciphertext) = encrypt_body(&key, inner)?;
        trace!(%recipient, "sealed block");
        Ok((
            EncryptionWrapper {
                ty,
                time,
                recipient,
                sealed: Some(SealedKey {
                    ephemeral: ephemeral_pub.to_bytes(),
                    wrapped,
                }),
                nonce,
                ciphertext,
            },
            key,
        ))
    }

    /// Encrypt `inner` under an already-shared symmetric key (the reply
    /// direction). The envelope carries no sealed key.
    pub fn seal_with(
        ty: TypeId,
        inner: &Block,
        time: Time,
        recipient: IdentityRef,
        key: &SymmetricKey,
    ) -> Result<EncryptionWrapper> {
        let (nonce, ciphertext) = encrypt_body(key, inner)?;
        Ok(EncryptionWrapper {
            ty,
            time,
            recipient,
            sealed: None,
            nonce,
            ciphertext,
        })
    }

    pub fn wire_type(&self) -> TypeId {
        self.ty
    }

    /// The time at which the recipient's key must have been valid.
    pub fn time(&self) -> Time {
        self.time
    }

    pub fn recipient(&self) -> IdentityRef {
        self.recipient
    }

    /// Whether this envelope carries a sealed key (first-message mode).
    pub fn is_sealed(&self) -> bool {
        self.sealed.is_some()
    }

    /// Encode into a block.
    pub fn encode(&self) -> Block {
        let mut payload = Vec::with_capacity(
            Time::WIRE_LEN
                + IdentityRef::LEN
                + 1
                + self
                    .sealed
                    .as_ref()
                    .map_or(0, |s| EPHEMERAL_LEN + s.wrapped.len())
                + NONCE_LEN
                + self.ciphertext.len(),
        );
        self.time.encode_vec(&mut payload);
        payload.extend_from_slice(self.recipient.as_bytes());
        match &self.sealed {
            Some(sealed) => {
                payload.push(KeyMode::Sealed.into());
                payload.extend_from_slice(&sealed.ephemeral);
                payload.extend_from_slice(&sealed.wrapped);
            }
            None => payload.push(KeyMode::Known.into()),
        }
        payload.extend_from_slice(&self.nonce);
        payload.extend_from_slice(&self.ciphertext);
        Block::new(self.ty, payload)
    }

    /// Parse an encryption envelope from a block. The block's type must
    /// derive from `expected`.
    pub fn decode(
        ctx: &dyn TypeRegistry,
        expected: TypeId,
        block: &Block,
    ) -> Result<EncryptionWrapper> {
        check_type(ctx, block, expected)?;
        let payload = block.payload();
        let mut at = 0;

        let time = Time::decode(payload)?;
        at += Time::WIRE_LEN;

        let recipient = read_array::<{ IdentityRef::LEN }>(payload, &mut at, "recipient ref")?;
        let recipient = IdentityRef::from_bytes(recipient);

        let mode = *payload
            .get(at)
            .ok_or(Error::BadHeader("encryption envelope missing key mode"))?;
        at += 1;
        let mode = KeyMode::try_from(mode).map_err(|_| Error::BadHeader("unknown key mode"))?;

        let sealed = match mode {
            KeyMode::Sealed => {
                let ephemeral = read_array::<EPHEMERAL_LEN>(payload, &mut at, "ephemeral key")?;
                let wrapped = read_array::<WRAPPED_LEN>(payload, &mut at, "sealed key")?;
                Some(SealedKey {
                    ephemeral,
                    wrapped: wrapped.to_vec(),
                })
            }
            KeyMode::Known => None,
        };

        let nonce = read_array::<NONCE_LEN>(payload, &mut at, "nonce")?;
        let ciphertext = payload[at..].to_vec();
        Ok(EncryptionWrapper {
            ty: block.type_id(),
            time,
            recipient,
            sealed,
            nonce,
            ciphertext,
        })
    }

    /// Decrypt a sealed envelope with the recipient's private key, yielding
    /// the inner block and the now-shared symmetric key.
    pub fn open(&self, secret: &StaticSecret) -> Result<(Block, SymmetricKey)> {
        let sealed = self.sealed.as_ref().ok_or(Error::BadHeader(
            "envelope carries no sealed key; supply the shared symmetric key",
        ))?;
        let ephemeral_pub = PublicKey::from(sealed.ephemeral);
        let recipient_pub = PublicKey::from(secret);
        let shared = secret.diffie_hellman(&ephemeral_pub);
        let kek = derive_kek(&shared, &ephemeral_pub, &recipient_pub)?;

        let key_bytes = ChaCha20Poly1305::new(Key::from_slice(&kek))
            .decrypt(Nonce::from_slice(&[0u8; NONCE_LEN]), sealed.wrapped.as_slice())
            .map_err(|_| Error::FailDecrypt("sealed key failed authentication"))?;
        let key_bytes: [u8; SymmetricKey::LEN] = key_bytes
            .try_into()
            .map_err(|_| Error::FailDecrypt("sealed key has wrong size"))?;
        let key = SymmetricKey::from_bytes(key_bytes);

        let inner = self.decrypt_body(&key)?;
        Ok((inner, key))
    }

    /// Decrypt with an already-known symmetric key. Works for both modes.
    pub fn open_with(&self, key: &SymmetricKey) -> Result<Block> {
        self.decrypt_body(key)
    }

    /// Decrypt a sealed envelope by looking up the recipient's private key
    /// valid at the envelope's stated time.
    pub fn open_via(&self, chain: &KeyChain<StaticSecret>) -> Result<(Block, SymmetricKey)> {
        let secret = chain.get_key(self.time)?;
        self.open(secret)
    }

    fn decrypt_body(&self, key: &SymmetricKey) -> Result<Block> {
        let plain = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()))
            .decrypt(Nonce::from_slice(&self.nonce), self.ciphertext.as_slice())
            .map_err(|_| Error::FailDecrypt("ciphertext failed authentication"))?;
        Block::decode(&plain)
    }
}

fn encrypt_body(key: &SymmetricKey, inner: &Block) -> Result<([u8; NONCE_LEN], Vec<u8>)> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()))
        .encrypt(Nonce::from_slice(&nonce), inner.encode().as_slice())
        .map_err(|_| Error::FailDecrypt("failed to encrypt block"))?;
    Ok((nonce, ciphertext))
}

/// Derive the key-encryption key from the Diffie-Hellman shared secret,
/// bound to both public keys.
fn derive_kek(
    shared: &SharedSecret,
    ephemeral_pub: &PublicKey,
    recipient_pub: &PublicKey,
) -> Result<[u8; 32]> {
    if !shared.was_contributory() {
        return Err(Error::FailDecrypt("non-contributory key exchange"));
    }
    let mut salt = Vec::with_capacity(64);
    salt.extend_from_slice(ephemeral_pub.as_bytes());
    salt.extend_from_slice(recipient_pub.as_bytes());
    let hk = Hkdf::<Sha256>::new(Some(&salt), shared.as_bytes());
    let mut kek = [0u8; 32];
    hk.expand(KEK_INFO, &mut kek)
        .map_err(|_| Error::FailDecrypt("key derivation failed"))?;
    Ok(kek)
}

fn read_array<const N: usize>(
    payload: &[u8],
    at: &mut usize,
    step: &'static str,
) -> Result<[u8; N]> {
    let end = *at + N;
    if payload.len() < end {
        return Err(Error::LengthTooShort {
            step,
            actual: payload.len().saturating_sub(*at),
            expected: N,
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&payload[*at..end]);
    *at = end;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeTable;

    fn setup() -> (TypeTable, TypeId, Block) {
        let mut table = TypeTable::new();
        let envelope = table.register("encrypted@test", None);
        let inner_ty = table.register("payload@test", None);
        let inner = Block::new(inner_ty, b"attack at dawn".to_vec());
        (table, envelope, inner)
    }

    fn recipient() -> (StaticSecret, PublicKey) {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        (secret, public)
    }

    #[test]
    fn sealed_roundtrip() {
        let (table, envelope, inner) = setup();
        let (secret, public) = recipient();
        let (wrapper, key) =
            EncryptionWrapper::seal(envelope, &inner, Time::now(), &public).unwrap();

        let decoded = EncryptionWrapper::decode(&table, envelope, &wrapper.encode()).unwrap();
        assert!(decoded.is_sealed());
        assert_eq!(decoded.recipient(), IdentityRef::of_exchange_key(&public));

        let (out, opened_key) = decoded.open(&secret).unwrap();
        assert_eq!(out, inner);
        assert_eq!(opened_key, key);
    }

    #[test]
    fn reply_roundtrip_with_known_key() {
        let (table, envelope, inner) = setup();
        let key = SymmetricKey::generate();
        let recipient = IdentityRef::from_bytes([5u8; 32]);
        let wrapper =
            EncryptionWrapper::seal_with(envelope, &inner, Time::now(), recipient, &key).unwrap();

        let decoded = EncryptionWrapper::decode(&table, envelope, &wrapper.encode()).unwrap();
        assert!(!decoded.is_sealed());
        assert_eq!(decoded.open_with(&key).unwrap(), inner);
    }

    #[test]
    fn reply_mode_refuses_private_key_open() {
        let (_, envelope, inner) = setup();
        let (secret, _) = recipient();
        let key = SymmetricKey::generate();
        let wrapper = EncryptionWrapper::seal_with(
            envelope,
            &inner,
            Time::now(),
            IdentityRef::from_bytes([5u8; 32]),
            &key,
        )
        .unwrap();
        assert!(matches!(
            wrapper.open(&secret),
            Err(Error::BadHeader(_))
        ));
    }

    #[test]
    fn wrong_private_key_fails() {
        let (_, envelope, inner) = setup();
        let (_, public) = recipient();
        let (other_secret, _) = recipient();
        let (wrapper, _) =
            EncryptionWrapper::seal(envelope, &inner, Time::now(), &public).unwrap();
        assert!(matches!(
            wrapper.open(&other_secret),
            Err(Error::FailDecrypt(_))
        ));
    }

    #[test]
    fn wrong_symmetric_key_fails() {
        let (_, envelope, inner) = setup();
        let key = SymmetricKey::generate();
        let wrapper = EncryptionWrapper::seal_with(
            envelope,
            &inner,
            Time::now(),
            IdentityRef::from_bytes([5u8; 32]),
            &key,
        )
        .unwrap();
        assert!(wrapper.open_with(&SymmetricKey::generate()).is_err());
    }

    #[test]
    fn corrupted_ciphertext_fails() {
        let (table, envelope, inner) = setup();
        let (secret, public) = recipient();
        let (wrapper, _) =
            EncryptionWrapper::seal(envelope, &inner, Time::now(), &public).unwrap();
        let block = wrapper.encode();
        let mut payload = block.payload().to_vec();
        let last = payload.len() - 1;
        payload[last] ^= 0x01;
        let tampered =
            EncryptionWrapper::decode(&table, envelope, &Block::new(envelope, payload)).unwrap();
        assert!(matches!(
            tampered.open(&secret),
            Err(Error::FailDecrypt(_))
        ));
    }

    #[test]
    fn corrupted_sealed_key_fails() {
        let (table, envelope, inner) = setup();
        let (secret, public) = recipient();
        let (wrapper, _) =
            EncryptionWrapper::seal(envelope, &inner, Time::now(), &public).unwrap();
        let block = wrapper.encode();
        let mut payload = block.payload().to_vec();
        // The wrapped key sits after time, recipient, mode, and ephemeral.
        let offset = Time::WIRE_LEN + IdentityRef::LEN + 1 + EPHEMERAL_LEN;
        payload[offset] ^= 0x01;
        let tampered =
            EncryptionWrapper::decode(&table, envelope, &Block::new(envelope, payload)).unwrap();
        assert!(tampered.open(&secret).is_err());
    }

    #[test]
    fn stale_key_fails_via_chain_lookup() {
        let (_, envelope, inner) = setup();
        let (secret, public) = recipient();
        let rotated_at = Time::now() - Time::DAY;
        let chain = KeyChain::new(rotated_at, secret);
        // Envelope claims a time before the chain's oldest key.
        let (wrapper, _) = EncryptionWrapper::seal(
            envelope,
            &inner,
            rotated_at - Time::DAY,
            &public,
        )
        .unwrap();
        assert!(matches!(
            wrapper.open_via(&chain),
            Err(Error::KeyChain(_))
        ));
    }

    #[test]
    fn open_via_chain_selects_key_at_time() {
        let (_, envelope, inner) = setup();
        let (old_secret, old_public) = recipient();
        let (new_secret, _) = recipient();
        let t0 = Time::now() - 30 * Time::DAY;
        let chain = KeyChain::new(t0, old_secret);
        let chain = chain.add(Time::now() - Time::DAY, new_secret).unwrap();
        // Sealed to the old key at a time when it was still active.
        let (wrapper, _) =
            EncryptionWrapper::seal(envelope, &inner, t0 + Time::DAY, &old_public).unwrap();
        let (out, _) = wrapper.open_via(&chain).unwrap();
        assert_eq!(out, inner);
    }

    #[test]
    fn truncated_envelope_fails() {
        let (table, envelope, inner) = setup();
        let (_, public) = recipient();
        let (wrapper, _) =
            EncryptionWrapper::seal(envelope, &inner, Time::now(), &public).unwrap();
        let block = wrapper.encode();
        let payload = block.payload();
        for cut in [0, 7, 39, 41, 60] {
            let truncated = Block::new(envelope, payload[..cut.min(payload.len())].to_vec());
            assert!(
                EncryptionWrapper::decode(&table, envelope, &truncated).is_err(),
                "decode should fail at cut {}",
                cut
            );
        }
    }
}
