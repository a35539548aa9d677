use thiserror::Error;

use crate::identity::Address;

/// Escrow-related errors.
#[derive(Debug, Error, PartialEq)]
pub enum EscrowError {
    /// Agent fee above the basis-point cap, rejected at creation.
    #[error("agent fee of {0} basis points exceeds the cap of 1000")]
    FeeTooHigh(u16),

    /// An escrow with the same derived id already exists.
    #[error("the escrow already exists")]
    EscrowExists,

    /// The caller is not allowed to perform this action on the escrow.
    #[error("the caller is not authorized")]
    Unauthorized,

    /// The consent signature is malformed or was not issued by the agent.
    #[error("invalid agent signature")]
    InvalidSignature,

    /// The consent signature was revoked by its signer.
    #[error("the signature was canceled")]
    SignatureCanceled,

    /// The agent's policy declined the action.
    #[error("the agent rejected the request")]
    CapabilityRejected,

    /// A withdrawal asked for more than the escrow holds.
    #[error("withdrawal of {requested} exceeds the escrow balance of {available}")]
    InsufficientBalance { requested: u128, available: u128 },

    /// A deposit would overflow the escrow balance.
    #[error("deposit overflows the escrow balance")]
    BalanceOverflow,

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),
}

/// Errors that might occur while parsing an [`Address`] or a
/// [`Signature`](crate::signature::Signature).
#[derive(Debug, Error, PartialEq)]
pub enum IdentityError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("invalid base58: {0}")]
    Base58(#[from] bs58::decode::Error),

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("expected {expected} bytes, got {got}")]
    Length { expected: usize, got: usize },

    #[error("cannot parse from an empty string")]
    Empty,

    #[error("unsupported format")]
    UnsupportedFormat,
}

/// Failures reported by the external asset ledgers.
#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("no token at {0}")]
    UnknownToken(Address),

    #[error("token {token}: {holder} holds {available}, needs {required}")]
    InsufficientFunds {
        token: Address,
        holder: Address,
        required: u128,
        available: u128,
    },

    #[error("token {token}: id {token_id} does not exist")]
    UnknownTokenId { token: Address, token_id: u128 },

    #[error("token {token}: {from} does not own id {token_id}")]
    NotOwner {
        token: Address,
        from: Address,
        token_id: u128,
    },
}
