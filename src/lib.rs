/// Agent capability callbacks and the per-engine policy directory
pub mod agent;
/// The fungible and non-fungible escrow state machines
pub mod engine;
/// Basis-point fee arithmetic
pub mod fee;
/// Content-addressed escrow identifiers
pub mod id;
/// Account addresses and key-derived identities
pub mod identity;
/// JSON and binary (de)serialization of escrow terms and engine state
pub mod interface;
/// Asset-ledger collaborator traits
pub mod ledger;
/// In-memory collaborators for tests. NOT FOR PRODUCTION USE.
pub mod mock;
/// Recoverable consent signatures and the revocation registry
pub mod signature;

pub mod error;
pub use error::{EscrowError, IdentityError, LedgerError};

pub type Result<T> = std::result::Result<T, EscrowError>;

pub use engine::fungible::{FungibleEscrow, FungibleEscrowEngine, FungibleEvent, FungibleTerms};
pub use engine::nonfungible::{
    NonFungibleEscrow, NonFungibleEscrowEngine, NonFungibleEvent, NonFungibleTerms,
};

pub use agent::{AgentDirectory, AgentPolicy, CreateRequest};
pub use id::EscrowId;
pub use identity::Address;
pub use ledger::{FungibleLedger, NonFungibleLedger};
pub use signature::{Signature, SignatureRegistry};
