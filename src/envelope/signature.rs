//! Signature envelope: authenticity claims over one inner block.
//!
//! Payload: `time || subject ref || mode || material || inner block`. The
//! signed bytes are `time || subject ref || inner block`, so a signature
//! commits to when it was made and who it speaks about, not just to the
//! content. Three signed modes exist alongside an explicit unsigned mode:
//!
//! * `Host` — a plain Ed25519 signature under the host's key active at the
//!   stated time.
//! * `Client` — an Ed25519 signature under a key the client has committed
//!   to one specific host; the commitment travels with the signature and
//!   must open for the verifying host.
//! * `Credentials` — an anonymous credential proof, verified by an external
//!   [`CredentialVerifier`] capability.
//!
//! Verification is explicit and lazy: decoding never verifies, and a
//! successful verification is cached so repeated checks of the same wrapper
//! cost one signature verification total. Failures are reported through
//! [`SignatureError`], a taxonomy separate from the wire-format errors in
//! [`Error`](crate::error::Error): expired, invalid, and inactive all speak
//! about a well-formed block.

use std::convert::TryFrom;
use std::fmt;
use std::sync::OnceLock;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use tracing::trace;

use crate::block::Block;
use crate::crypto::{ClientCommitment, CredentialProof, CredentialRefusal, CredentialVerifier, IdentityRef};
use crate::error::{Error, Result};
use crate::keychain::KeyChain;
use crate::time::Time;
use crate::types::{TypeId, TypeRegistry};
use crate::varint;
use crate::wrapper::check_type;

const SIGNATURE_LEN: usize = 64;
const KEY_LEN: usize = 32;
const COMMIT_LEN: usize = 32;

/// How (or whether) the envelope is signed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureMode {
    /// No signature. Carried explicitly so a reader can tell "unsigned" from
    /// "truncated".
    Unsigned,
    /// Signed by a host under its published signing key.
    Host,
    /// Signed by a client under a key committed to one specific host.
    Client,
    /// Backed by an anonymous credential proof.
    Credentials,
}

impl From<SignatureMode> for u8 {
    fn from(val: SignatureMode) -> u8 {
        match val {
            SignatureMode::Unsigned => 0,
            SignatureMode::Host => 1,
            SignatureMode::Client => 2,
            SignatureMode::Credentials => 3,
        }
    }
}

impl TryFrom<u8> for SignatureMode {
    type Error = u8;
    fn try_from(val: u8) -> Result<SignatureMode, u8> {
        match val {
            0 => Ok(SignatureMode::Unsigned),
            1 => Ok(SignatureMode::Host),
            2 => Ok(SignatureMode::Client),
            3 => Ok(SignatureMode::Credentials),
            _ => Err(val),
        }
    }
}

impl fmt::Display for SignatureMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            SignatureMode::Unsigned => "unsigned",
            SignatureMode::Host => "host",
            SignatureMode::Client => "client",
            SignatureMode::Credentials => "credentials",
        };
        f.write_str(name)
    }
}

/// Why a signature was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// The stated signing time is outside the acceptance window, or lies in
    /// the future.
    Expired,
    /// The signature, commitment, or proof failed cryptographic checks, or
    /// required verification material was not available.
    Invalid,
    /// The backing credential exists but has been revoked or suspended.
    Inactive,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            FailureKind::Expired => "expired",
            FailureKind::Invalid => "invalid",
            FailureKind::Inactive => "inactive",
        };
        f.write_str(name)
    }
}

/// A rejected authenticity claim. Carries the offending wrapper so callers
/// can log or audit the full claim, not just the verdict.
#[derive(Clone, Debug)]
pub struct SignatureError {
    pub mode: SignatureMode,
    pub kind: FailureKind,
    pub reason: String,
    pub signature: Box<SignatureWrapper>,
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Rejected {} signature over subject {}: {} ({})",
            self.mode,
            self.signature.subject(),
            self.kind,
            self.reason
        )
    }
}

impl std::error::Error for SignatureError {}

/// Verifier-side acceptance rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SignaturePolicy {
    /// Maximum accepted age of a signature, in milliseconds. A signature
    /// exactly this old is still accepted.
    pub window: i64,
    /// Whether unsigned envelopes pass verification.
    pub allow_unsigned: bool,
}

impl Default for SignaturePolicy {
    fn default() -> Self {
        SignaturePolicy {
            window: Time::HOUR,
            allow_unsigned: false,
        }
    }
}

/// Everything a verifier brings to [`SignatureWrapper::verify`].
///
/// Key chains and credential verifiers are supplied by the caller; this
/// layer never fetches keys itself.
pub struct VerifyContext<'a> {
    /// The verifier's current time.
    pub now: Time,
    pub policy: SignaturePolicy,
    /// The verifying host's own reference. Client commitments must be bound
    /// to it.
    pub host: Option<IdentityRef>,
    /// Signing-key history of the claimed host signer.
    pub host_keys: Option<&'a KeyChain<VerifyingKey>>,
    /// External capability for credential proofs.
    pub credentials: Option<&'a dyn CredentialVerifier>,
}

impl<'a> VerifyContext<'a> {
    pub fn new() -> VerifyContext<'a> {
        VerifyContext {
            now: Time::now(),
            policy: SignaturePolicy::default(),
            host: None,
            host_keys: None,
            credentials: None,
        }
    }

    pub fn at(mut self, now: Time) -> Self {
        self.now = now;
        self
    }

    pub fn with_policy(mut self, policy: SignaturePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_host(mut self, host: IdentityRef) -> Self {
        self.host = Some(host);
        self
    }

    pub fn with_host_keys(mut self, keys: &'a KeyChain<VerifyingKey>) -> Self {
        self.host_keys = Some(keys);
        self
    }

    pub fn with_credentials(mut self, verifier: &'a dyn CredentialVerifier) -> Self {
        self.credentials = Some(verifier);
        self
    }
}

impl<'a> Default for VerifyContext<'a> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Material {
    Unsigned,
    Host(Signature),
    Client {
        commitment: ClientCommitment,
        signature: Signature,
    },
    Credentials(CredentialProof),
}

impl Material {
    fn mode(&self) -> SignatureMode {
        match self {
            Material::Unsigned => SignatureMode::Unsigned,
            Material::Host(_) => SignatureMode::Host,
            Material::Client { .. } => SignatureMode::Client,
            Material::Credentials(_) => SignatureMode::Credentials,
        }
    }

    fn len(&self) -> usize {
        match self {
            Material::Unsigned => 0,
            Material::Host(_) => SIGNATURE_LEN,
            Material::Client { .. } => IdentityRef::LEN + KEY_LEN + COMMIT_LEN + SIGNATURE_LEN,
            Material::Credentials(proof) => {
                1 + varint::determine_length(proof.proof.len() as u64) + proof.proof.len()
            }
        }
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Material::Unsigned => {}
            Material::Host(sig) => out.extend_from_slice(&sig.to_bytes()),
            Material::Client {
                commitment,
                signature,
            } => {
                out.extend_from_slice(commitment.host().as_bytes());
                out.extend_from_slice(commitment.public().as_bytes());
                out.extend_from_slice(commitment.commit_bytes());
                out.extend_from_slice(&signature.to_bytes());
            }
            Material::Credentials(proof) => {
                out.push(proof.lodged as u8);
                varint::write(out, proof.proof.len() as u64);
                out.extend_from_slice(&proof.proof);
            }
        }
    }
}

/// Wraps one inner block with an authenticity claim.
///
/// Signing happens at construction; verification is a separate, explicit
/// step against a [`VerifyContext`].
#[derive(Clone, Debug)]
pub struct SignatureWrapper {
    ty: TypeId,
    time: Time,
    subject: IdentityRef,
    material: Material,
    inner: Block,
    verified: OnceLock<()>,
}

impl PartialEq for SignatureWrapper {
    fn eq(&self, other: &Self) -> bool {
        // The verification cache is not part of the wrapper's identity.
        self.ty == other.ty
            && self.time == other.time
            && self.subject == other.subject
            && self.material == other.material
            && self.inner == other.inner
    }
}

impl Eq for SignatureWrapper {}

impl SignatureWrapper {
    /// Wrap `inner` without any signature.
    pub fn unsigned(ty: TypeId, inner: Block, time: Time, subject: IdentityRef) -> SignatureWrapper {
        SignatureWrapper {
            ty,
            time,
            subject,
            material: Material::Unsigned,
            inner,
            verified: OnceLock::new(),
        }
    }

    /// Sign `inner` as a host, under the host's own signing key.
    pub fn sign_host(
        ty: TypeId,
        inner: Block,
        time: Time,
        subject: IdentityRef,
        key: &SigningKey,
    ) -> SignatureWrapper {
        let mut wrapper = SignatureWrapper {
            ty,
            time,
            subject,
            material: Material::Unsigned,
            inner,
            verified: OnceLock::new(),
        };
        let sig = key.sign(&wrapper.signable());
        wrapper.material = Material::Host(sig);
        wrapper
    }

    /// Sign `inner` as a client, under a key committed to `host`. The
    /// commitment travels with the signature.
    pub fn sign_client(
        ty: TypeId,
        inner: Block,
        time: Time,
        subject: IdentityRef,
        host: IdentityRef,
        key: &SigningKey,
    ) -> SignatureWrapper {
        let mut wrapper = SignatureWrapper {
            ty,
            time,
            subject,
            material: Material::Unsigned,
            inner,
            verified: OnceLock::new(),
        };
        let sig = key.sign(&wrapper.signable());
        wrapper.material = Material::Client {
            commitment: ClientCommitment::new(host, key.verifying_key()),
            signature: sig,
        };
        wrapper
    }

    /// Wrap `inner` with an anonymous credential proof. The proof itself is
    /// produced by an external capability; this only carries it.
    pub fn with_credentials(
        ty: TypeId,
        inner: Block,
        time: Time,
        subject: IdentityRef,
        proof: CredentialProof,
    ) -> SignatureWrapper {
        SignatureWrapper {
            ty,
            time,
            subject,
            material: Material::Credentials(proof),
            inner,
            verified: OnceLock::new(),
        }
    }

    pub fn wire_type(&self) -> TypeId {
        self.ty
    }

    pub fn mode(&self) -> SignatureMode {
        self.material.mode()
    }

    /// When the signature claims to have been made.
    pub fn time(&self) -> Time {
        self.time
    }

    /// The actor this envelope speaks about.
    pub fn subject(&self) -> IdentityRef {
        self.subject
    }

    pub fn inner(&self) -> &Block {
        &self.inner
    }

    pub fn is_signed(&self) -> bool {
        self.mode() != SignatureMode::Unsigned
    }

    /// The client commitment, if this is a client-mode signature.
    pub fn commitment(&self) -> Option<&ClientCommitment> {
        match &self.material {
            Material::Client { commitment, .. } => Some(commitment),
            _ => None,
        }
    }

    /// The bytes an authenticity claim commits to: time, subject, and the
    /// full encoded inner block. The material itself is excluded.
    fn signable(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(Time::WIRE_LEN + IdentityRef::LEN + self.inner.encoded_len());
        self.time.encode_vec(&mut out);
        out.extend_from_slice(self.subject.as_bytes());
        self.inner.write_to(&mut out);
        out
    }

    /// Encode into a block.
    pub fn encode(&self) -> Block {
        let mut payload = Vec::with_capacity(
            Time::WIRE_LEN
                + IdentityRef::LEN
                + 1
                + self.material.len()
                + self.inner.encoded_len(),
        );
        self.time.encode_vec(&mut payload);
        payload.extend_from_slice(self.subject.as_bytes());
        payload.push(self.mode().into());
        self.material.write_to(&mut payload);
        self.inner.write_to(&mut payload);
        Block::new(self.ty, payload)
    }

    /// Parse a signature envelope from a block. The block's type must
    /// derive from `expected`. Parsing never verifies; call
    /// [`verify`](Self::verify) for that.
    pub fn decode(
        ctx: &dyn TypeRegistry,
        expected: TypeId,
        block: &Block,
    ) -> Result<SignatureWrapper> {
        check_type(ctx, block, expected)?;
        let payload = block.payload();
        let mut at = 0;

        let time = Time::decode(payload)?;
        at += Time::WIRE_LEN;

        let subject = read_array::<{ IdentityRef::LEN }>(payload, &mut at, "subject ref")?;
        let subject = IdentityRef::from_bytes(subject);

        let mode = *payload
            .get(at)
            .ok_or(Error::BadHeader("signature envelope missing mode"))?;
        at += 1;
        let mode =
            SignatureMode::try_from(mode).map_err(|_| Error::BadHeader("unknown signature mode"))?;

        let material = match mode {
            SignatureMode::Unsigned => Material::Unsigned,
            SignatureMode::Host => {
                let sig = read_array::<SIGNATURE_LEN>(payload, &mut at, "host signature")?;
                Material::Host(Signature::from_bytes(&sig))
            }
            SignatureMode::Client => {
                let host = read_array::<{ IdentityRef::LEN }>(payload, &mut at, "commitment host")?;
                let public = read_array::<KEY_LEN>(payload, &mut at, "committed key")?;
                let commit = read_array::<COMMIT_LEN>(payload, &mut at, "commitment")?;
                let sig = read_array::<SIGNATURE_LEN>(payload, &mut at, "client signature")?;
                let public = VerifyingKey::from_bytes(&public)
                    .map_err(|_| Error::BadEncode("Committed key is not a valid Ed25519 point".into()))?;
                Material::Client {
                    commitment: ClientCommitment::from_parts(
                        IdentityRef::from_bytes(host),
                        public,
                        commit,
                    ),
                    signature: Signature::from_bytes(&sig),
                }
            }
            SignatureMode::Credentials => {
                let lodged = match payload.get(at) {
                    Some(0) => false,
                    Some(1) => true,
                    Some(_) => return Err(Error::BadHeader("bad lodged flag")),
                    None => return Err(Error::BadHeader("signature envelope missing lodged flag")),
                };
                at += 1;
                let (len, used) = varint::decode_value(&payload[at..])?;
                at += used;
                let len = len as usize;
                if payload.len() - at < len {
                    return Err(Error::LengthTooShort {
                        step: "credential proof",
                        actual: payload.len() - at,
                        expected: len,
                    });
                }
                let proof = payload[at..at + len].to_vec();
                at += len;
                Material::Credentials(CredentialProof { proof, lodged })
            }
        };

        // The inner block fills the rest of the payload exactly, parsed as
        // a zero-copy view into the envelope's storage. When the envelope is
        // itself a sub-view, the shared storage extends past its payload, so
        // the parse may consume more than the payload holds; both directions
        // are rejected.
        let rest = payload.len() - at;
        let (inner, consumed) = Block::parse_at(block.storage(), block.payload_start() + at)?;
        if consumed != rest {
            return Err(Error::BadEncode(format!(
                "Signature envelope payload holds {} bytes, its inner block occupies {}",
                rest, consumed
            )));
        }

        Ok(SignatureWrapper {
            ty: block.type_id(),
            time,
            subject,
            material,
            inner,
            verified: OnceLock::new(),
        })
    }

    /// Verify the authenticity claim against a [`VerifyContext`].
    ///
    /// A success is cached: later calls on the same wrapper return `Ok`
    /// without re-running the cryptography. Failures are never cached.
    pub fn verify(&self, ctx: &VerifyContext) -> Result<(), SignatureError> {
        if self.verified.get().is_some() {
            return Ok(());
        }
        self.check(ctx)?;
        let _ = self.verified.set(());
        trace!(mode = %self.mode(), subject = %self.subject, "verified signature");
        Ok(())
    }

    fn check(&self, ctx: &VerifyContext) -> Result<(), SignatureError> {
        match &self.material {
            Material::Unsigned => {
                if ctx.policy.allow_unsigned {
                    Ok(())
                } else {
                    Err(self.fail(FailureKind::Invalid, "unsigned envelope not accepted"))
                }
            }
            Material::Host(sig) => {
                self.check_freshness(ctx)?;
                let keys = ctx.host_keys.ok_or_else(|| {
                    self.fail(FailureKind::Invalid, "no host key chain available")
                })?;
                let key = keys.get_key(self.time).map_err(|e| {
                    self.fail(FailureKind::Invalid, &format!("no host key at {}: {}", self.time, e))
                })?;
                key.verify_strict(&self.signable(), sig)
                    .map_err(|_| self.fail(FailureKind::Invalid, "host signature check failed"))
            }
            Material::Client {
                commitment,
                signature,
            } => {
                self.check_freshness(ctx)?;
                if !commitment.opens() {
                    return Err(self.fail(FailureKind::Invalid, "commitment does not open"));
                }
                if let Some(host) = ctx.host {
                    if commitment.host() != host {
                        return Err(
                            self.fail(FailureKind::Invalid, "commitment bound to a different host")
                        );
                    }
                }
                commitment
                    .public()
                    .verify_strict(&self.signable(), signature)
                    .map_err(|_| self.fail(FailureKind::Invalid, "client signature check failed"))
            }
            Material::Credentials(proof) => {
                self.check_freshness(ctx)?;
                let verifier = ctx.credentials.ok_or_else(|| {
                    self.fail(FailureKind::Invalid, "no credential verifier available")
                })?;
                verifier
                    .verify(&self.signable(), proof)
                    .map_err(|refusal| match refusal {
                        CredentialRefusal::Invalid(reason) => {
                            self.fail(FailureKind::Invalid, &reason)
                        }
                        CredentialRefusal::Inactive(reason) => {
                            self.fail(FailureKind::Inactive, &reason)
                        }
                    })
            }
        }
    }

    /// A signature is fresh if its time is not in the future and not older
    /// than the policy window. A signature exactly `window` old still
    /// passes.
    fn check_freshness(&self, ctx: &VerifyContext) -> Result<(), SignatureError> {
        if self.time > ctx.now {
            return Err(self.fail(FailureKind::Expired, "signing time lies in the future"));
        }
        if ctx.now - self.time > ctx.policy.window {
            return Err(self.fail(FailureKind::Expired, "signature is older than the window"));
        }
        Ok(())
    }

    fn fail(&self, kind: FailureKind, reason: &str) -> SignatureError {
        SignatureError {
            mode: self.mode(),
            kind,
            reason: reason.to_owned(),
            signature: Box::new(self.clone()),
        }
    }
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
    use rand::rngs::OsRng;

    fn setup() -> (TypeTable, TypeId, Block) {
        let mut table = TypeTable::new();
        let envelope = table.register("signed@test", None);
        let inner_ty = table.register("payload@test", None);
        let inner = Block::new(inner_ty, b"open the gate".to_vec());
        (table, envelope, inner)
    }

    fn host_setup() -> (SigningKey, IdentityRef, KeyChain<VerifyingKey>) {
        let key = SigningKey::generate(&mut OsRng);
        let subject = IdentityRef::of_signing_key(&key.verifying_key());
        let chain = KeyChain::new(Time::now() - 30 * Time::DAY, key.verifying_key());
        (key, subject, chain)
    }

    #[test]
    fn host_roundtrip_verifies() {
        let (table, envelope, inner) = setup();
        let (key, subject, chain) = host_setup();
        let wrapper =
            SignatureWrapper::sign_host(envelope, inner.clone(), Time::now(), subject, &key);

        let decoded = SignatureWrapper::decode(&table, envelope, &wrapper.encode()).unwrap();
        assert_eq!(decoded, wrapper);
        assert_eq!(decoded.mode(), SignatureMode::Host);
        assert_eq!(*decoded.inner(), inner);

        let ctx = VerifyContext::new().with_host_keys(&chain);
        decoded.verify(&ctx).unwrap();
    }

    #[test]
    fn tampered_inner_fails() {
        let (table, envelope, inner) = setup();
        let (key, subject, chain) = host_setup();
        let wrapper = SignatureWrapper::sign_host(envelope, inner, Time::now(), subject, &key);
        let block = wrapper.encode();
        let mut payload = block.payload().to_vec();
        let last = payload.len() - 1;
        payload[last] ^= 0x01;
        let tampered =
            SignatureWrapper::decode(&table, envelope, &Block::new(envelope, payload)).unwrap();

        let ctx = VerifyContext::new().with_host_keys(&chain);
        let err = tampered.verify(&ctx).unwrap_err();
        assert_eq!(err.kind, FailureKind::Invalid);
        assert_eq!(err.mode, SignatureMode::Host);
    }

    #[test]
    fn tampered_subject_fails() {
        let (table, envelope, inner) = setup();
        let (key, subject, chain) = host_setup();
        let wrapper = SignatureWrapper::sign_host(envelope, inner, Time::now(), subject, &key);
        let block = wrapper.encode();
        let mut payload = block.payload().to_vec();
        payload[Time::WIRE_LEN] ^= 0x01;
        let tampered =
            SignatureWrapper::decode(&table, envelope, &Block::new(envelope, payload)).unwrap();
        let ctx = VerifyContext::new().with_host_keys(&chain);
        assert_eq!(
            tampered.verify(&ctx).unwrap_err().kind,
            FailureKind::Invalid
        );
    }

    #[test]
    fn expiry_window_boundary() {
        let (_, envelope, inner) = setup();
        let (key, subject, chain) = host_setup();
        let now = Time::now();
        let window = SignaturePolicy::default().window;

        // Exactly `window` old still passes.
        let at_edge = SignatureWrapper::sign_host(
            envelope,
            inner.clone(),
            now - window,
            subject,
            &key,
        );
        let ctx = VerifyContext::new().at(now).with_host_keys(&chain);
        at_edge.verify(&ctx).unwrap();

        // One millisecond past the window fails.
        let too_old =
            SignatureWrapper::sign_host(envelope, inner, now - window - 1, subject, &key);
        let err = too_old.verify(&ctx).unwrap_err();
        assert_eq!(err.kind, FailureKind::Expired);
    }

    #[test]
    fn future_signature_fails() {
        let (_, envelope, inner) = setup();
        let (key, subject, chain) = host_setup();
        let now = Time::now();
        let wrapper =
            SignatureWrapper::sign_host(envelope, inner, now + Time::MINUTE, subject, &key);
        let ctx = VerifyContext::new().at(now).with_host_keys(&chain);
        assert_eq!(
            wrapper.verify(&ctx).unwrap_err().kind,
            FailureKind::Expired
        );
    }

    #[test]
    fn host_key_selected_by_signing_time() {
        let (_, envelope, inner) = setup();
        let old_key = SigningKey::generate(&mut OsRng);
        let new_key = SigningKey::generate(&mut OsRng);
        let subject = IdentityRef::of_signing_key(&old_key.verifying_key());
        // One shared clock reading, so freshness never depends on how long
        // the signing calls themselves take.
        let now = Time::now();
        let rotation = now - Time::DAY;
        let chain = KeyChain::new(now - 30 * Time::DAY, old_key.verifying_key());
        let chain = chain.add(rotation, new_key.verifying_key()).unwrap();

        // Signed with the new key after the rotation: verifies.
        let fresh =
            SignatureWrapper::sign_host(envelope, inner.clone(), now, subject, &new_key);
        let ctx = VerifyContext::new().at(now).with_host_keys(&chain);
        fresh.verify(&ctx).unwrap();

        // Signed with the old key but claiming a post-rotation time: the
        // chain yields the new key and the check fails.
        let stale = SignatureWrapper::sign_host(envelope, inner, now, subject, &old_key);
        assert_eq!(
            stale.verify(&ctx).unwrap_err().kind,
            FailureKind::Invalid
        );
    }

    #[test]
    fn missing_host_keys_fails() {
        let (_, envelope, inner) = setup();
        let (key, subject, _) = host_setup();
        let wrapper = SignatureWrapper::sign_host(envelope, inner, Time::now(), subject, &key);
        assert_eq!(
            wrapper.verify(&VerifyContext::new()).unwrap_err().kind,
            FailureKind::Invalid
        );
    }

    #[test]
    fn client_roundtrip_verifies_for_right_host() {
        let (table, envelope, inner) = setup();
        let client_key = SigningKey::generate(&mut OsRng);
        let subject = IdentityRef::of_signing_key(&client_key.verifying_key());
        let host = IdentityRef::from_bytes([9u8; 32]);
        let wrapper = SignatureWrapper::sign_client(
            envelope,
            inner,
            Time::now(),
            subject,
            host,
            &client_key,
        );

        let decoded = SignatureWrapper::decode(&table, envelope, &wrapper.encode()).unwrap();
        assert_eq!(decoded.mode(), SignatureMode::Client);
        decoded.verify(&VerifyContext::new().with_host(host)).unwrap();

        // A different host refuses the commitment. A fresh decode, since
        // the accepting verify above was cached.
        let other = IdentityRef::from_bytes([10u8; 32]);
        let again = SignatureWrapper::decode(&table, envelope, &wrapper.encode()).unwrap();
        let err = again
            .verify(&VerifyContext::new().with_host(other))
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Invalid);
    }

    #[test]
    fn forged_commitment_fails() {
        let (table, envelope, inner) = setup();
        let client_key = SigningKey::generate(&mut OsRng);
        let subject = IdentityRef::of_signing_key(&client_key.verifying_key());
        let host = IdentityRef::from_bytes([9u8; 32]);
        let wrapper = SignatureWrapper::sign_client(
            envelope,
            inner,
            Time::now(),
            subject,
            host,
            &client_key,
        );
        let block = wrapper.encode();
        let mut payload = block.payload().to_vec();
        // Flip a byte inside the commitment binding.
        let commit_at = Time::WIRE_LEN + IdentityRef::LEN + 1 + IdentityRef::LEN + KEY_LEN;
        payload[commit_at] ^= 0x01;
        let forged =
            SignatureWrapper::decode(&table, envelope, &Block::new(envelope, payload)).unwrap();
        let err = forged
            .verify(&VerifyContext::new().with_host(host))
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Invalid);
    }

    struct StubVerifier {
        refusal: Option<CredentialRefusal>,
    }

    impl CredentialVerifier for StubVerifier {
        fn verify(
            &self,
            _signable: &[u8],
            _proof: &CredentialProof,
        ) -> Result<(), CredentialRefusal> {
            match &self.refusal {
                None => Ok(()),
                Some(refusal) => Err(refusal.clone()),
            }
        }
    }

    #[test]
    fn credentials_roundtrip_and_refusals() {
        let (table, envelope, inner) = setup();
        let subject = IdentityRef::from_bytes([3u8; 32]);
        let proof = CredentialProof {
            proof: vec![0xAB; 40],
            lodged: true,
        };
        let wrapper = SignatureWrapper::with_credentials(
            envelope,
            inner,
            Time::now(),
            subject,
            proof,
        );
        let decoded = SignatureWrapper::decode(&table, envelope, &wrapper.encode()).unwrap();
        assert_eq!(decoded, wrapper);

        let accept = StubVerifier { refusal: None };
        decoded
            .verify(&VerifyContext::new().with_credentials(&accept))
            .unwrap();

        let revoked = StubVerifier {
            refusal: Some(CredentialRefusal::Inactive("revoked".into())),
        };
        // A fresh decode, since the accepting verify above was cached.
        let again = SignatureWrapper::decode(&table, envelope, &wrapper.encode()).unwrap();
        let err = again
            .verify(&VerifyContext::new().with_credentials(&revoked))
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::Inactive);
        assert_eq!(err.mode, SignatureMode::Credentials);
    }

    #[test]
    fn unsigned_gated_by_policy() {
        let (table, envelope, inner) = setup();
        let subject = IdentityRef::from_bytes([4u8; 32]);
        let wrapper = SignatureWrapper::unsigned(envelope, inner, Time::now(), subject);
        let decoded = SignatureWrapper::decode(&table, envelope, &wrapper.encode()).unwrap();
        assert!(!decoded.is_signed());

        assert_eq!(
            decoded.verify(&VerifyContext::new()).unwrap_err().kind,
            FailureKind::Invalid
        );

        let lenient = SignaturePolicy {
            allow_unsigned: true,
            ..SignaturePolicy::default()
        };
        decoded
            .verify(&VerifyContext::new().with_policy(lenient))
            .unwrap();
    }

    #[test]
    fn successful_verify_is_cached() {
        let (_, envelope, inner) = setup();
        let (key, subject, chain) = host_setup();
        let now = Time::now();
        let wrapper = SignatureWrapper::sign_host(envelope, inner, now, subject, &key);

        let ctx = VerifyContext::new().at(now).with_host_keys(&chain);
        wrapper.verify(&ctx).unwrap();

        // Once verified, the wrapper stays verified even when a later check
        // would fall outside the freshness window.
        let much_later = VerifyContext::new().at(now + Time::DAY).with_host_keys(&chain);
        wrapper.verify(&much_later).unwrap();
    }

    #[test]
    fn failed_verify_is_not_cached() {
        let (_, envelope, inner) = setup();
        let (key, subject, chain) = host_setup();
        let now = Time::now();
        let wrapper = SignatureWrapper::sign_host(envelope, inner, now, subject, &key);

        // No key chain: fails.
        assert!(wrapper.verify(&VerifyContext::new().at(now)).is_err());
        // With the chain supplied, the same wrapper verifies.
        wrapper
            .verify(&VerifyContext::new().at(now).with_host_keys(&chain))
            .unwrap();
    }

    #[test]
    fn inner_length_past_subview_envelope_fails() {
        let (table, envelope, inner) = setup();
        let subject = IdentityRef::from_bytes([4u8; 32]);
        let wrapper = SignatureWrapper::unsigned(envelope, inner, Time::now(), subject);
        let mut payload = wrapper.encode().payload().to_vec();
        // Inflate the inner block's declared payload length so it claims
        // more bytes than the envelope holds.
        let len_at = Time::WIRE_LEN + IdentityRef::LEN + 1 + 1 + 1 + TypeId::LEN;
        payload[len_at] = 0x80 | 100;
        // Carve the envelope out of a larger buffer, giving the inflated
        // length sibling bytes to run into.
        let envelope_len = payload.len();
        payload.extend_from_slice(&[0xAA; 200]);
        let parent = Block::new(envelope, payload);
        let carved = parent.sub_block(envelope, 0, envelope_len).unwrap();
        assert!(SignatureWrapper::decode(&table, envelope, &carved).is_err());
    }

    #[test]
    fn trailing_bytes_after_inner_fail() {
        let (table, envelope, inner) = setup();
        let subject = IdentityRef::from_bytes([4u8; 32]);
        let wrapper = SignatureWrapper::unsigned(envelope, inner, Time::now(), subject);
        let block = wrapper.encode();
        let mut payload = block.payload().to_vec();
        payload.push(0xAA);
        assert!(
            SignatureWrapper::decode(&table, envelope, &Block::new(envelope, payload)).is_err()
        );
    }

    #[test]
    fn truncated_envelope_fails() {
        let (table, envelope, inner) = setup();
        let (key, subject, _) = host_setup();
        let wrapper = SignatureWrapper::sign_host(envelope, inner, Time::now(), subject, &key);
        let block = wrapper.encode();
        let payload = block.payload();
        for cut in [0, 7, 39, 41, 100] {
            let truncated = Block::new(envelope, payload[..cut.min(payload.len())].to_vec());
            assert!(
                SignatureWrapper::decode(&table, envelope, &truncated).is_err(),
                "decode should fail at cut {}",
                cut
            );
        }
    }

    #[test]
    fn error_display_names_mode_and_kind() {
        let (_, envelope, inner) = setup();
        let subject = IdentityRef::from_bytes([4u8; 32]);
        let wrapper = SignatureWrapper::unsigned(envelope, inner, Time::now(), subject);
        let err = wrapper.verify(&VerifyContext::new()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unsigned"), "{}", msg);
        assert!(msg.contains("invalid"), "{}", msg);
    }
}
