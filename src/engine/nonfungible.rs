//! Escrow engine for single non-fungible assets.
//!
//! Same lifecycle as the fungible engine, with two differences: custody is a
//! single `(token, token_id)` asset plus a fixed fungible fee, transfers are
//! all-or-nothing, and only the depositant may fund the escrow (the specific
//! asset has to come from a known holder).

use std::collections::HashMap;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::agent::{AgentDirectory, AgentPolicy, CreateRequest};
use crate::error::{EscrowError, LedgerError};
use crate::id::{EscrowId, IdHasher};
use crate::identity::Address;
use crate::ledger::{FungibleLedger, NonFungibleLedger};
use crate::signature::{Signature, SignatureRegistry};
use crate::Result;

/// Full creation parameter tuple of a non-fungible escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct NonFungibleTerms {
    pub agent: Address,
    pub depositant: Address,
    pub beneficiary: Address,
    /// The escrowed asset's contract.
    pub token: Address,
    pub token_id: u128,
    /// Contract of the token the fixed fee is paid in.
    pub fee_token: Address,
    /// Fixed agent fee, pulled at deposit time alongside the asset.
    pub fee: u128,
    pub salt: u128,
}

impl NonFungibleTerms {
    /// Derives the content-addressed id these terms map to on the given
    /// engine instance.
    pub fn escrow_id(&self, engine: &Address) -> EscrowId {
        IdHasher::new(engine)
            .address(&self.agent)
            .address(&self.depositant)
            .address(&self.beneficiary)
            .address(&self.token)
            .uint(self.token_id)
            .address(&self.fee_token)
            .uint(self.fee)
            .uint(self.salt)
            .finish()
    }
}

/// A live non-fungible escrow record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct NonFungibleEscrow {
    pub agent: Address,
    pub depositant: Address,
    pub beneficiary: Address,
    pub token: Address,
    pub token_id: u128,
    pub fee_token: Address,
    pub fee: u128,
}

/// One journal entry per state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum NonFungibleEvent {
    Created {
        id: EscrowId,
        terms: NonFungibleTerms,
    },
    SignCreated {
        id: EscrowId,
        signature: Signature,
    },
    SignatureCanceled {
        signer: Address,
        signature: Signature,
    },
    Deposited {
        id: EscrowId,
    },
    Withdrawn {
        id: EscrowId,
        sender: Address,
        to: Address,
    },
    Canceled {
        id: EscrowId,
    },
}

/// Serializable engine state; see
/// [`FungibleState`](crate::engine::fungible::FungibleState) for the
/// conventions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct NonFungibleState {
    pub address: Address,
    pub escrows: Vec<(EscrowId, NonFungibleEscrow)>,
    pub canceled_signatures: Vec<(Address, Vec<Signature>)>,
}

enum Payout {
    ToBeneficiary,
    ToDepositant,
}

/// Escrow engine holding one non-fungible asset per record, plus the fixed
/// fee, in custody.
#[derive(Debug)]
pub struct NonFungibleEscrowEngine<L, N> {
    address: Address,
    tokens: L,
    nfts: N,
    agents: AgentDirectory,
    escrows: HashMap<EscrowId, NonFungibleEscrow>,
    signatures: SignatureRegistry,
    events: Vec<NonFungibleEvent>,
}

impl<L: FungibleLedger, N: NonFungibleLedger> NonFungibleEscrowEngine<L, N> {
    pub fn new(address: Address, tokens: L, nfts: N) -> Self {
        Self {
            address,
            tokens,
            nfts,
            agents: AgentDirectory::default(),
            escrows: HashMap::new(),
            signatures: SignatureRegistry::default(),
            events: Vec::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn tokens(&self) -> &L {
        &self.tokens
    }

    pub fn tokens_mut(&mut self) -> &mut L {
        &mut self.tokens
    }

    pub fn nfts(&self) -> &N {
        &self.nfts
    }

    pub fn nfts_mut(&mut self) -> &mut N {
        &mut self.nfts
    }

    /// Makes `agent` programmable by attaching a policy to it.
    pub fn register_agent(&mut self, agent: Address, policy: impl AgentPolicy + 'static) {
        self.agents.register(agent, policy);
    }

    pub fn escrow(&self, id: &EscrowId) -> Option<&NonFungibleEscrow> {
        self.escrows.get(id)
    }

    pub fn calculate_id(&self, terms: &NonFungibleTerms) -> EscrowId {
        terms.escrow_id(&self.address)
    }

    pub fn is_signature_canceled(&self, signer: &Address, signature: &Signature) -> bool {
        self.signatures.is_canceled(signer, signature)
    }

    pub fn events(&self) -> &[NonFungibleEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<NonFungibleEvent> {
        std::mem::take(&mut self.events)
    }

    /// Creates an empty escrow under the terms' derived id; custody arrives
    /// later via [`deposit`](Self::deposit). Gating matches the fungible
    /// engine. The fixed fee has no cap.
    pub fn create_escrow(
        &mut self,
        caller: Address,
        terms: &NonFungibleTerms,
        agent_data: &[u8],
    ) -> Result<EscrowId> {
        let id = terms.escrow_id(&self.address);
        if self.escrows.contains_key(&id) {
            return Err(EscrowError::EscrowExists);
        }
        if caller != terms.agent {
            match self.agents.policy(&terms.agent) {
                Some(policy)
                    if policy.approve_create(CreateRequest::NonFungible(terms), agent_data) => {}
                Some(_) => return Err(EscrowError::CapabilityRejected),
                None => return Err(EscrowError::Unauthorized),
            }
        }
        self.record(id, terms);
        Ok(id)
    }

    /// Creates an escrow from the agent's off-line consent over the derived
    /// id; same rules as the fungible engine.
    pub fn sign_create_escrow(
        &mut self,
        terms: &NonFungibleTerms,
        signature: &Signature,
    ) -> Result<EscrowId> {
        let id = terms.escrow_id(&self.address);
        self.signatures.authorize(&terms.agent, &id, signature)?;
        if self.escrows.contains_key(&id) {
            return Err(EscrowError::EscrowExists);
        }
        self.record(id, terms);
        self.events.push(NonFungibleEvent::SignCreated {
            id,
            signature: *signature,
        });
        Ok(id)
    }

    /// Revokes `signature` for the caller; see the fungible engine.
    pub fn cancel_signature(&mut self, caller: Address, signature: Signature) {
        self.signatures.cancel(caller, signature);
        self.events.push(NonFungibleEvent::SignatureCanceled {
            signer: caller,
            signature,
        });
    }

    /// Funds the escrow: pulls the fixed fee and the specific asset from the
    /// depositant into custody. Only the depositant may deposit.
    pub fn deposit(&mut self, caller: Address, id: EscrowId) -> Result<()> {
        let Some(escrow) = self.escrows.get(&id) else {
            return Err(EscrowError::Unauthorized);
        };
        if caller != escrow.depositant {
            return Err(EscrowError::Unauthorized);
        }
        let (token, token_id, fee_token, fee) =
            (escrow.token, escrow.token_id, escrow.fee_token, escrow.fee);

        // the fee must be affordable before the asset moves
        let available = self.tokens.balance_of(fee_token, caller)?;
        if available < fee {
            return Err(LedgerError::InsufficientFunds {
                token: fee_token,
                holder: caller,
                required: fee,
                available,
            }
            .into());
        }
        self.nfts.transfer(token, caller, self.address, token_id)?;
        self.tokens.transfer(fee_token, caller, self.address, fee)?;

        self.events.push(NonFungibleEvent::Deposited { id });
        Ok(())
    }

    /// Releases the asset to the beneficiary and the fixed fee to the agent,
    /// in full. Callable by the depositant or the agent. The record stays in
    /// place.
    pub fn withdraw_to_beneficiary(
        &mut self,
        caller: Address,
        id: EscrowId,
        data: &[u8],
    ) -> Result<()> {
        self.withdraw(caller, id, data, Payout::ToBeneficiary)
    }

    /// Returns the asset to the depositant, still paying the fixed fee to
    /// the agent. Callable by the beneficiary or the agent.
    pub fn withdraw_to_depositant(
        &mut self,
        caller: Address,
        id: EscrowId,
        data: &[u8],
    ) -> Result<()> {
        self.withdraw(caller, id, data, Payout::ToDepositant)
    }

    /// Terminates the escrow: returns both the asset and the fixed fee to
    /// the depositant and removes the record. Only the agent (or its
    /// approving policy) may cancel.
    pub fn cancel(&mut self, caller: Address, id: EscrowId, data: &[u8]) -> Result<()> {
        let Some(escrow) = self.escrows.get(&id) else {
            return Err(EscrowError::Unauthorized);
        };
        self.cancel_gate(caller, escrow.agent, &id, data)?;
        let (fee_token, fee) = (escrow.fee_token, escrow.fee);

        let custody = self.tokens.balance_of(fee_token, self.address)?;
        if custody < fee {
            return Err(LedgerError::InsufficientFunds {
                token: fee_token,
                holder: self.address,
                required: fee,
                available: custody,
            }
            .into());
        }

        let Some(escrow) = self.escrows.remove(&id) else {
            return Err(EscrowError::Unauthorized);
        };
        if let Err(err) =
            self.nfts
                .transfer(escrow.token, self.address, escrow.depositant, escrow.token_id)
        {
            self.escrows.insert(id, escrow);
            return Err(err.into());
        }
        self.tokens
            .transfer(fee_token, self.address, escrow.depositant, fee)?;

        self.events.push(NonFungibleEvent::Canceled { id });
        Ok(())
    }

    /// Exports the engine state for persistence.
    pub fn state(&self) -> NonFungibleState {
        let mut escrows: Vec<_> = self
            .escrows
            .iter()
            .map(|(id, escrow)| (*id, escrow.clone()))
            .collect();
        escrows.sort_by_key(|(id, _)| *id);
        NonFungibleState {
            address: self.address,
            escrows,
            canceled_signatures: self.signatures.entries(),
        }
    }

    /// Resurrects an engine from an exported state on the given ledgers.
    pub fn from_state(state: NonFungibleState, tokens: L, nfts: N) -> Self {
        Self {
            address: state.address,
            tokens,
            nfts,
            agents: AgentDirectory::default(),
            escrows: state.escrows.into_iter().collect(),
            signatures: SignatureRegistry::restore(state.canceled_signatures),
            events: Vec::new(),
        }
    }

    fn record(&mut self, id: EscrowId, terms: &NonFungibleTerms) {
        self.escrows.insert(
            id,
            NonFungibleEscrow {
                agent: terms.agent,
                depositant: terms.depositant,
                beneficiary: terms.beneficiary,
                token: terms.token,
                token_id: terms.token_id,
                fee_token: terms.fee_token,
                fee: terms.fee,
            },
        );
        self.events.push(NonFungibleEvent::Created {
            id,
            terms: terms.clone(),
        });
    }

    // Only the agent cancels; a registered policy may approve on its
    // behalf when someone else asks.
    fn cancel_gate(&self, caller: Address, agent: Address, id: &EscrowId, data: &[u8]) -> Result<()> {
        if caller == agent {
            return Ok(());
        }
        match self.agents.policy(&agent) {
            Some(policy) if policy.approve_cancel(id, data) => Ok(()),
            Some(_) => Err(EscrowError::CapabilityRejected),
            None => Err(EscrowError::Unauthorized),
        }
    }

    fn withdraw(
        &mut self,
        caller: Address,
        id: EscrowId,
        data: &[u8],
        payout: Payout,
    ) -> Result<()> {
        let Some(escrow) = self.escrows.get(&id) else {
            return Err(EscrowError::Unauthorized);
        };
        let (approved, to) = match payout {
            Payout::ToBeneficiary => (escrow.depositant, escrow.beneficiary),
            Payout::ToDepositant => (escrow.beneficiary, escrow.depositant),
        };
        let (agent, token, token_id, fee_token, fee) = (
            escrow.agent,
            escrow.token,
            escrow.token_id,
            escrow.fee_token,
            escrow.fee,
        );

        if caller != approved && caller != agent {
            return Err(EscrowError::Unauthorized);
        }
        if caller != agent {
            if let Some(policy) = self.agents.policy(&agent) {
                if !policy.approve_withdraw(&id, data) {
                    return Err(EscrowError::CapabilityRejected);
                }
            }
        }

        // fee custody first: the asset must not move unless the whole
        // payout can complete
        let custody = self.tokens.balance_of(fee_token, self.address)?;
        if custody < fee {
            return Err(LedgerError::InsufficientFunds {
                token: fee_token,
                holder: self.address,
                required: fee,
                available: custody,
            }
            .into());
        }
        self.nfts.transfer(token, self.address, to, token_id)?;
        self.tokens.transfer(fee_token, self.address, agent, fee)?;

        self.events.push(NonFungibleEvent::Withdrawn {
            id,
            sender: caller,
            to,
        });
        Ok(())
    }
}
