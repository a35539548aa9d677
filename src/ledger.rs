//! Asset-ledger collaborator traits.
//!
//! The engines never hold assets themselves; they instruct a ledger to move
//! them between accounts, with the engine's own address as the custody
//! account. Implementations must be atomic per call: a transfer either fully
//! applies or fails without effect. The zero address never hosts a token.

use crate::error::LedgerError;
use crate::identity::Address;

/// A fungible token ledger (balances per holder, per token contract).
pub trait FungibleLedger {
    /// Current balance of `holder` at `token`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnknownToken`] if no token lives at `token`.
    fn balance_of(&self, token: Address, holder: Address) -> Result<u128, LedgerError>;

    /// Moves `amount` units from `from` to `to`. A zero `amount` against a
    /// known token succeeds as a no-op.
    fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), LedgerError>;
}

/// A non-fungible token ledger (one owner per token id, per token contract).
pub trait NonFungibleLedger {
    fn owner_of(&self, token: Address, token_id: u128) -> Result<Address, LedgerError>;

    /// Moves `token_id` from `from` to `to`; fails with
    /// [`LedgerError::NotOwner`] unless `from` currently owns it.
    fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        token_id: u128,
    ) -> Result<(), LedgerError>;
}
