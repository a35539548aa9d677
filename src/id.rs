//! Content-addressed escrow identifiers.
//!
//! An escrow id is the SHA-256 digest of the engine instance's own address
//! followed by the escrow's full parameter tuple in declaration order.
//! Including the engine address keeps ids from different instances disjoint;
//! including every economic parameter means altering any of them yields a
//! different id; the salt disambiguates otherwise-identical escrows.

use bincode::{Decode, Encode};
use serde_with::hex::Hex;
use serde_with::serde_as;
use sha2::{Digest, Sha256};

use crate::error::IdentityError;
use crate::identity::Address;

/// A 32-byte derived escrow identifier.
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
pub struct EscrowId(#[serde_as(as = "Hex")] [u8; 32]);

impl EscrowId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Display for EscrowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl std::fmt::Debug for EscrowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EscrowId({self})")
    }
}

impl std::str::FromStr for EscrowId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| IdentityError::Length {
            expected: 32,
            got: v.len(),
        })?;
        Ok(Self(bytes))
    }
}

/// Streaming builder for escrow ids.
///
/// Addresses hash as their raw 20 bytes; every integer field hashes as a
/// fixed-width big-endian `u128`. The encoding of a tuple is unambiguous.
pub struct IdHasher(Sha256);

impl IdHasher {
    /// Starts a derivation scoped to the given engine instance.
    pub fn new(engine: &Address) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(engine.as_bytes());
        Self(hasher)
    }

    pub fn address(mut self, value: &Address) -> Self {
        self.0.update(value.as_bytes());
        self
    }

    pub fn uint(mut self, value: u128) -> Self {
        self.0.update(value.to_be_bytes());
        self
    }

    pub fn finish(self) -> EscrowId {
        EscrowId(self.0.finalize().into())
    }
}

#[cfg(test)]
mod tests {
    use core::str::FromStr as _;

    use super::*;

    fn addr(n: u8) -> Address {
        Address::new([n; 20])
    }

    fn derive(engine: u8, salt: u128) -> EscrowId {
        IdHasher::new(&addr(engine))
            .address(&addr(1))
            .address(&addr(2))
            .uint(500)
            .uint(salt)
            .finish()
    }

    #[test]
    fn deterministic() {
        assert_eq!(derive(9, 0), derive(9, 0));
    }

    #[test]
    fn any_parameter_change_changes_the_id() {
        let base = derive(9, 0);
        assert_ne!(base, derive(9, 1));
        assert_ne!(base, derive(8, 0));
        assert_ne!(
            base,
            IdHasher::new(&addr(9))
                .address(&addr(1))
                .address(&addr(2))
                .uint(501)
                .uint(0)
                .finish()
        );
    }

    #[test]
    fn hex_roundtrip() {
        let id = derive(3, 7);
        assert_eq!(EscrowId::from_str(&id.to_string()).unwrap(), id);
    }
}
