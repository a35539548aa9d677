//! Recoverable consent signatures and the revocation registry.
//!
//! An agent authorizes an off-line escrow creation by signing the derived
//! escrow id. The 65-byte blob (`r ‖ s ‖ v`) doubles as the one-shot
//! credential: no nonce is needed because the blob itself is unique per id,
//! and the signer can revoke it unilaterally at any time, before or after a
//! use is attempted.

use std::collections::{HashMap, HashSet};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bincode::{Decode, Encode};
use k256::ecdsa::{self, RecoveryId, SigningKey, VerifyingKey};
use serde_with::hex::Hex;
use serde_with::serde_as;
use sha2::{Digest, Sha256};

use crate::error::{EscrowError, IdentityError};
use crate::id::EscrowId;
use crate::identity::Address;
use crate::Result;

const CONSENT_PREFIX: &[u8] = b"custodia/consent/v1";

// Consents sign a tagged digest of the id, never the raw id bytes.
fn consent_digest(id: &EscrowId) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(CONSENT_PREFIX);
    hasher.update(id.as_bytes());
    hasher.finalize().into()
}

/// A 65-byte recoverable secp256k1 signature (`r ‖ s ‖ v`).
#[serde_as]
#[derive(
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    Encode,
    Decode,
)]
pub struct Signature(#[serde_as(as = "Hex")] [u8; 65]);

impl Signature {
    pub const LEN: usize = 65;

    pub fn new(bytes: [u8; 65]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    /// Recovers the signer's address from a consent over `id`.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::InvalidSignature`] if the blob does not decode
    /// to a valid signature or no public key can be recovered.
    pub fn recover(&self, id: &EscrowId) -> Result<Address> {
        let signature = ecdsa::Signature::from_slice(&self.0[..64])
            .map_err(|_| EscrowError::InvalidSignature)?;
        let recovery =
            RecoveryId::from_byte(self.0[64]).ok_or(EscrowError::InvalidSignature)?;
        let key = VerifyingKey::recover_from_prehash(&consent_digest(id), &signature, recovery)
            .map_err(|_| EscrowError::InvalidSignature)?;
        Ok(Address::from_key(&key))
    }
}

/// Signs the consent digest of `id`, producing the blob
/// [`sign_create_escrow`](crate::FungibleEscrowEngine::sign_create_escrow)
/// accepts.
pub fn sign_id(key: &SigningKey, id: &EscrowId) -> Result<Signature> {
    let (signature, recovery) = key
        .sign_prehash_recoverable(&consent_digest(id))
        .map_err(|_| EscrowError::InvalidSignature)?;
    let mut bytes = [0u8; 65];
    bytes[..64].copy_from_slice(signature.to_bytes().as_slice());
    bytes[64] = recovery.to_byte();
    Ok(Signature(bytes))
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({self})")
    }
}

impl std::str::FromStr for Signature {
    type Err = IdentityError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(IdentityError::Empty);
        }
        let bytes = if let Some(stripped) = s.strip_prefix("0x") {
            hex::decode(stripped)?
        } else if let Ok(bytes) = BASE64.decode(s) {
            bytes
        } else {
            return Err(IdentityError::UnsupportedFormat);
        };
        let bytes: [u8; 65] = bytes.try_into().map_err(|v: Vec<u8>| IdentityError::Length {
            expected: Self::LEN,
            got: v.len(),
        })?;
        Ok(Self(bytes))
    }
}

/// Per-signer revocation sets plus the consent-checking sequence.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SignatureRegistry {
    canceled: HashMap<Address, HashSet<Signature>>,
}

impl SignatureRegistry {
    /// Revokes `signature` for `signer`. Canceling twice leaves the set
    /// unchanged.
    pub fn cancel(&mut self, signer: Address, signature: Signature) {
        self.canceled.entry(signer).or_default().insert(signature);
    }

    pub fn is_canceled(&self, signer: &Address, signature: &Signature) -> bool {
        self.canceled
            .get(signer)
            .is_some_and(|set| set.contains(signature))
    }

    /// Checks that `signature` is the agent's own un-revoked consent over
    /// `id`.
    ///
    /// # Errors
    ///
    /// [`EscrowError::InvalidSignature`] if the recovered signer differs
    /// from `agent`; [`EscrowError::SignatureCanceled`] if the agent revoked
    /// the blob.
    pub fn authorize(&self, agent: &Address, id: &EscrowId, signature: &Signature) -> Result<()> {
        let signer = signature.recover(id)?;
        if !signer.ct_eq(agent) {
            return Err(EscrowError::InvalidSignature);
        }
        if self.is_canceled(agent, signature) {
            return Err(EscrowError::SignatureCanceled);
        }
        Ok(())
    }

    /// Sorted export of the revocation sets, for state snapshots.
    pub fn entries(&self) -> Vec<(Address, Vec<Signature>)> {
        let mut entries: Vec<_> = self
            .canceled
            .iter()
            .map(|(signer, set)| {
                let mut signatures: Vec<_> = set.iter().copied().collect();
                signatures.sort();
                (*signer, signatures)
            })
            .collect();
        entries.sort_by_key(|(signer, _)| *signer);
        entries
    }

    /// Rebuilds a registry from an [`entries`](Self::entries) export.
    pub fn restore(entries: Vec<(Address, Vec<Signature>)>) -> Self {
        let canceled = entries
            .into_iter()
            .map(|(signer, signatures)| (signer, signatures.into_iter().collect()))
            .collect();
        Self { canceled }
    }
}

#[cfg(test)]
mod tests {
    use k256::ecdsa::SigningKey;
    use k256::elliptic_curve::rand_core::OsRng;

    use super::*;
    use crate::id::IdHasher;

    fn some_id() -> EscrowId {
        IdHasher::new(&Address::new([9; 20])).uint(42).finish()
    }

    #[test]
    fn sign_then_recover() {
        let sk = SigningKey::random(&mut OsRng);
        let signer = Address::from_key(sk.verifying_key());
        let id = some_id();

        let signature = sign_id(&sk, &id).unwrap();
        assert_eq!(signature.recover(&id).unwrap(), signer);
    }

    #[test]
    fn tampered_signature_does_not_recover_the_signer() {
        let sk = SigningKey::random(&mut OsRng);
        let signer = Address::from_key(sk.verifying_key());
        let id = some_id();

        let mut bytes = *sign_id(&sk, &id).unwrap().as_bytes();
        bytes[0] ^= 0xFF;
        let tampered = Signature::new(bytes);
        match tampered.recover(&id) {
            Ok(recovered) => assert_ne!(recovered, signer),
            Err(err) => assert_eq!(err, EscrowError::InvalidSignature),
        }
    }

    #[test]
    fn registry_authorize_and_cancel() {
        let sk = SigningKey::random(&mut OsRng);
        let agent = Address::from_key(sk.verifying_key());
        let id = some_id();
        let signature = sign_id(&sk, &id).unwrap();

        let mut registry = SignatureRegistry::default();
        assert!(registry.authorize(&agent, &id, &signature).is_ok());

        // wrong agent
        assert_eq!(
            registry.authorize(&Address::new([1; 20]), &id, &signature),
            Err(EscrowError::InvalidSignature)
        );

        registry.cancel(agent, signature);
        registry.cancel(agent, signature); // idempotent
        assert!(registry.is_canceled(&agent, &signature));
        assert_eq!(
            registry.authorize(&agent, &id, &signature),
            Err(EscrowError::SignatureCanceled)
        );
    }

    #[test]
    fn entries_roundtrip() {
        let sk = SigningKey::random(&mut OsRng);
        let agent = Address::from_key(sk.verifying_key());
        let mut registry = SignatureRegistry::default();
        registry.cancel(agent, sign_id(&sk, &some_id()).unwrap());

        let restored = SignatureRegistry::restore(registry.entries());
        assert_eq!(restored, registry);
    }

    #[test]
    fn string_roundtrip() {
        let sk = SigningKey::random(&mut OsRng);
        let signature = sign_id(&sk, &some_id()).unwrap();
        let parsed: Signature = signature.to_string().parse().unwrap();
        assert_eq!(parsed, signature);

        let b64 = BASE64.encode(signature.as_bytes());
        let parsed: Signature = b64.parse().unwrap();
        assert_eq!(parsed, signature);
    }
}
