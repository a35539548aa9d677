//! Account addresses for escrow parties, agents, and asset contracts.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bincode::{Decode, Encode};
use k256::ecdsa::VerifyingKey;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::IdentityError;

/// A 20-byte account identifier.
///
/// Parses from `0x`-prefixed hex, base58, or base64 strings and displays as
/// `0x`-prefixed hex.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode)]
pub struct Address([u8; 20]);

impl Address {
    /// Byte width of an address.
    pub const LEN: usize = 20;

    /// The all-zero address. Never hosts a token and never acts as a party.
    pub const ZERO: Self = Self([0u8; 20]);

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Derives the address of a secp256k1 key: the last 20 bytes of the
    /// SHA-256 digest of the uncompressed curve point.
    pub fn from_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        let digest = Sha256::digest(&point.as_bytes()[1..]);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[digest.len() - Self::LEN..]);
        Self(bytes)
    }

    /// Constant-time equality, for comparing recovered signer identities.
    pub fn ct_eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).unwrap_u8() == 1
    }

    fn try_from_slice(bytes: &[u8]) -> Result<Self, IdentityError> {
        let bytes: [u8; 20] = bytes.try_into().map_err(|_| IdentityError::Length {
            expected: Self::LEN,
            got: bytes.len(),
        })?;
        Ok(Self(bytes))
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl std::str::FromStr for Address {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(IdentityError::Empty);
        }
        if let Some(stripped) = s.strip_prefix("0x") {
            return Self::try_from_slice(&hex::decode(stripped)?);
        }
        if let Ok(bytes) = bs58::decode(s).into_vec() {
            if bytes.len() == Self::LEN {
                return Self::try_from_slice(&bytes);
            }
        }
        if let Ok(bytes) = BASE64.decode(s) {
            if bytes.len() == Self::LEN {
                return Self::try_from_slice(&bytes);
            }
        }
        Err(IdentityError::UnsupportedFormat)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use core::str::FromStr as _;

    use super::*;

    #[test]
    fn hex_roundtrip() {
        let addr = Address::new([0xAB; 20]);
        let parsed = Address::from_str(&addr.to_string()).unwrap();
        assert_eq!(parsed, addr);
    }

    #[test]
    fn base58_and_base64() {
        let addr = Address::new([7u8; 20]);

        let b58 = bs58::encode(addr.as_bytes()).into_string();
        assert_eq!(Address::from_str(&b58).unwrap(), addr);

        let b64 = BASE64.encode(addr.as_bytes());
        assert_eq!(Address::from_str(&b64).unwrap(), addr);
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(Address::from_str(""), Err(IdentityError::Empty));
        assert_eq!(
            Address::from_str("0xdeadbeef"),
            Err(IdentityError::Length {
                expected: 20,
                got: 4
            })
        );
        assert!(Address::from_str("!!not-an-address!!").is_err());
    }

    #[test]
    fn key_derivation_is_stable() {
        use k256::ecdsa::SigningKey;
        use k256::elliptic_curve::rand_core::OsRng;

        let sk = SigningKey::random(&mut OsRng);
        let a = Address::from_key(sk.verifying_key());
        let b = Address::from_key(sk.verifying_key());
        assert_eq!(a, b);
        assert_ne!(a, Address::ZERO);
        assert!(a.ct_eq(&b));
    }

    #[test]
    fn serde_as_display_string() {
        let addr = Address::new([1u8; 20]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", addr));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
