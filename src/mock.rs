//! In-memory collaborators for testing escrow lifecycles without real asset
//! contracts or agent deployments. NOT FOR PRODUCTION USE.

use std::collections::HashMap;

use crate::agent::{AgentPolicy, CreateRequest};
use crate::error::LedgerError;
use crate::id::EscrowId;
use crate::identity::Address;
use crate::ledger::{FungibleLedger, NonFungibleLedger};

/// A fungible ledger backed by nested hash maps.
#[derive(Debug, Default, Clone)]
pub struct MockTokens {
    balances: HashMap<Address, HashMap<Address, u128>>,
}

impl MockTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deploys an empty token contract at `token`.
    pub fn register(&mut self, token: Address) {
        self.balances.entry(token).or_default();
    }

    /// Credits `holder` with `amount`, deploying the token if needed.
    pub fn mint(&mut self, token: Address, holder: Address, amount: u128) {
        *self
            .balances
            .entry(token)
            .or_default()
            .entry(holder)
            .or_insert(0) += amount;
    }
}

impl FungibleLedger for MockTokens {
    fn balance_of(&self, token: Address, holder: Address) -> Result<u128, LedgerError> {
        let book = self
            .balances
            .get(&token)
            .ok_or(LedgerError::UnknownToken(token))?;
        Ok(book.get(&holder).copied().unwrap_or(0))
    }

    fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), LedgerError> {
        let book = self
            .balances
            .get_mut(&token)
            .ok_or(LedgerError::UnknownToken(token))?;
        let available = book.get(&from).copied().unwrap_or(0);
        if available < amount {
            return Err(LedgerError::InsufficientFunds {
                token,
                holder: from,
                required: amount,
                available,
            });
        }
        book.insert(from, available - amount);
        *book.entry(to).or_insert(0) += amount;
        Ok(())
    }
}

/// A non-fungible ledger mapping token ids to owners.
#[derive(Debug, Default, Clone)]
pub struct MockNfts {
    owners: HashMap<Address, HashMap<u128, Address>>,
}

impl MockNfts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, token: Address) {
        self.owners.entry(token).or_default();
    }

    /// Mints `token_id` to `owner`, deploying the token if needed.
    pub fn mint(&mut self, token: Address, token_id: u128, owner: Address) {
        self.owners.entry(token).or_default().insert(token_id, owner);
    }
}

impl NonFungibleLedger for MockNfts {
    fn owner_of(&self, token: Address, token_id: u128) -> Result<Address, LedgerError> {
        let book = self
            .owners
            .get(&token)
            .ok_or(LedgerError::UnknownToken(token))?;
        book.get(&token_id)
            .copied()
            .ok_or(LedgerError::UnknownTokenId { token, token_id })
    }

    fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        token_id: u128,
    ) -> Result<(), LedgerError> {
        let owner = self.owner_of(token, token_id)?;
        if owner != from {
            return Err(LedgerError::NotOwner {
                token,
                from,
                token_id,
            });
        }
        if let Some(book) = self.owners.get_mut(&token) {
            book.insert(token_id, to);
        }
        Ok(())
    }
}

/// A policy that approves everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproveAll;

impl AgentPolicy for ApproveAll {
    fn approve_create(&self, _request: CreateRequest<'_>, _data: &[u8]) -> bool {
        true
    }

    fn approve_withdraw(&self, _id: &EscrowId, _data: &[u8]) -> bool {
        true
    }

    fn approve_cancel(&self, _id: &EscrowId, _data: &[u8]) -> bool {
        true
    }
}

/// A policy that rejects everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectAll;

impl AgentPolicy for RejectAll {
    fn approve_create(&self, _request: CreateRequest<'_>, _data: &[u8]) -> bool {
        false
    }

    fn approve_withdraw(&self, _id: &EscrowId, _data: &[u8]) -> bool {
        false
    }

    fn approve_cancel(&self, _id: &EscrowId, _data: &[u8]) -> bool {
        false
    }
}

/// A policy that approves an action only when the initiator's `data` equals
/// the configured key.
#[derive(Debug, Clone, Default)]
pub struct MatchData {
    key: Vec<u8>,
}

impl MatchData {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }
}

impl AgentPolicy for MatchData {
    fn approve_create(&self, _request: CreateRequest<'_>, data: &[u8]) -> bool {
        data == self.key
    }

    fn approve_withdraw(&self, _id: &EscrowId, data: &[u8]) -> bool {
        data == self.key
    }

    fn approve_cancel(&self, _id: &EscrowId, data: &[u8]) -> bool {
        data == self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::new([n; 20])
    }

    #[test]
    fn token_transfers() {
        let (token, alice, bob) = (addr(1), addr(2), addr(3));
        let mut tokens = MockTokens::new();
        tokens.mint(token, alice, 100);

        tokens.transfer(token, alice, bob, 60).unwrap();
        assert_eq!(tokens.balance_of(token, alice).unwrap(), 40);
        assert_eq!(tokens.balance_of(token, bob).unwrap(), 60);

        // zero transfers succeed, even from unknown holders
        tokens.transfer(token, addr(9), bob, 0).unwrap();

        assert_eq!(
            tokens.transfer(token, alice, bob, 41),
            Err(LedgerError::InsufficientFunds {
                token,
                holder: alice,
                required: 41,
                available: 40,
            })
        );
        assert_eq!(
            tokens.transfer(addr(8), alice, bob, 0),
            Err(LedgerError::UnknownToken(addr(8)))
        );
    }

    #[test]
    fn self_transfer_is_a_noop() {
        let (token, alice) = (addr(1), addr(2));
        let mut tokens = MockTokens::new();
        tokens.mint(token, alice, 10);
        tokens.transfer(token, alice, alice, 10).unwrap();
        assert_eq!(tokens.balance_of(token, alice).unwrap(), 10);
    }

    #[test]
    fn nft_ownership() {
        let (token, alice, bob) = (addr(1), addr(2), addr(3));
        let mut nfts = MockNfts::new();
        nfts.mint(token, 7, alice);

        assert_eq!(nfts.owner_of(token, 7).unwrap(), alice);
        assert_eq!(
            nfts.transfer(token, bob, alice, 7),
            Err(LedgerError::NotOwner {
                token,
                from: bob,
                token_id: 7,
            })
        );

        nfts.transfer(token, alice, bob, 7).unwrap();
        assert_eq!(nfts.owner_of(token, 7).unwrap(), bob);

        assert_eq!(
            nfts.owner_of(token, 8),
            Err(LedgerError::UnknownTokenId { token, token_id: 8 })
        );
    }
}
