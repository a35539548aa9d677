//! The two escrow state machines.
//!
//! Both engines drive the same lifecycle over their own record map,
//! canceled-signature registry, agent directory, and event journal: create
//! (directly or by agent signature), deposit, withdraw to either party with
//! the agent's fee split off, or cancel with a full refund. They differ only
//! in what they hold in custody: a divisible token balance versus a single
//! non-fungible asset plus a fixed fee.

/// Escrows over divisible token balances with a basis-point agent fee.
pub mod fungible;
/// Escrows over single non-fungible assets with a fixed agent fee.
pub mod nonfungible;
