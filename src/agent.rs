//! Programmable agents.
//!
//! An agent is normally a plain account: only the agent itself (or its
//! signature) can authorize escrow actions. Registering an [`AgentPolicy`]
//! for an agent address turns the agent into a programmable arbiter: actions
//! initiated by someone other than the agent are preflighted through the
//! policy's callbacks, with opaque `data` bytes from the initiator carrying
//! whatever out-of-band context the policy wants to see.

use std::collections::HashMap;

use crate::engine::fungible::FungibleTerms;
use crate::engine::nonfungible::NonFungibleTerms;
use crate::id::EscrowId;
use crate::identity::Address;

/// The creation request handed to [`AgentPolicy::approve_create`], borrowing
/// the full terms of either engine variant.
#[derive(Debug, Clone, Copy)]
pub enum CreateRequest<'a> {
    Fungible(&'a FungibleTerms),
    NonFungible(&'a NonFungibleTerms),
}

/// Approval callbacks for a programmable agent.
///
/// Returning `false` from any callback aborts the action with
/// [`EscrowError::CapabilityRejected`](crate::error::EscrowError::CapabilityRejected).
pub trait AgentPolicy {
    fn approve_create(&self, request: CreateRequest<'_>, data: &[u8]) -> bool;

    fn approve_withdraw(&self, id: &EscrowId, data: &[u8]) -> bool;

    fn approve_cancel(&self, id: &EscrowId, data: &[u8]) -> bool;
}

/// Maps agent addresses to their registered policies.
///
/// The lookup is the static dispatch point between the two agent kinds: an
/// address with no entry is a plain account.
#[derive(Default)]
pub struct AgentDirectory {
    policies: HashMap<Address, Box<dyn AgentPolicy>>,
}

impl AgentDirectory {
    pub fn register(&mut self, agent: Address, policy: impl AgentPolicy + 'static) {
        self.policies.insert(agent, Box::new(policy));
    }

    pub fn policy(&self, agent: &Address) -> Option<&dyn AgentPolicy> {
        self.policies.get(agent).map(|policy| policy.as_ref())
    }

    pub fn is_programmable(&self, agent: &Address) -> bool {
        self.policies.contains_key(agent)
    }
}

impl std::fmt::Debug for AgentDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentDirectory")
            .field("registered", &self.policies.keys().collect::<Vec<_>>())
            .finish()
    }
}
