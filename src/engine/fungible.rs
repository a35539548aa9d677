//! Escrow engine for divisible token balances.

use std::collections::HashMap;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::agent::{AgentDirectory, AgentPolicy, CreateRequest};
use crate::error::{EscrowError, LedgerError};
use crate::fee;
use crate::id::{EscrowId, IdHasher};
use crate::identity::Address;
use crate::ledger::FungibleLedger;
use crate::signature::{Signature, SignatureRegistry};
use crate::Result;

/// Full creation parameter tuple of a fungible escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct FungibleTerms {
    /// The designated arbiter.
    pub agent: Address,
    /// Who funds the escrow.
    pub depositant: Address,
    /// Who receives a successful release.
    pub beneficiary: Address,
    /// Agent fee in basis points, at most [`fee::MAX_AGENT_FEE_BPS`].
    pub fee_bps: u16,
    /// The escrowed token contract.
    pub token: Address,
    /// Disambiguates otherwise-identical escrows.
    pub salt: u128,
}

impl FungibleTerms {
    /// Derives the content-addressed id these terms map to on the given
    /// engine instance.
    pub fn escrow_id(&self, engine: &Address) -> EscrowId {
        IdHasher::new(engine)
            .address(&self.agent)
            .address(&self.depositant)
            .address(&self.beneficiary)
            .uint(self.fee_bps.into())
            .address(&self.token)
            .uint(self.salt)
            .finish()
    }
}

/// A live fungible escrow record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct FungibleEscrow {
    pub agent: Address,
    pub depositant: Address,
    pub beneficiary: Address,
    pub fee_bps: u16,
    pub token: Address,
    /// Units currently held in custody for this escrow.
    pub balance: u128,
}

/// One journal entry per state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum FungibleEvent {
    Created {
        id: EscrowId,
        terms: FungibleTerms,
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
        amount: u128,
    },
    Withdrawn {
        id: EscrowId,
        sender: Address,
        to: Address,
        /// Amount delivered to the target party.
        amount: u128,
        /// Amount split off to the agent.
        fee: u128,
    },
    Canceled {
        id: EscrowId,
        refund: u128,
    },
}

/// Serializable engine state: records plus canceled signatures, sorted for
/// determinism. Registered policies and the event journal are transient and
/// re-established by the host after [`FungibleEscrowEngine::from_state`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct FungibleState {
    pub address: Address,
    pub escrows: Vec<(EscrowId, FungibleEscrow)>,
    pub canceled_signatures: Vec<(Address, Vec<Signature>)>,
}

enum Payout {
    ToBeneficiary,
    ToDepositant,
}

/// Escrow engine holding divisible token balances in custody.
#[derive(Debug)]
pub struct FungibleEscrowEngine<L> {
    address: Address,
    ledger: L,
    agents: AgentDirectory,
    escrows: HashMap<EscrowId, FungibleEscrow>,
    signatures: SignatureRegistry,
    events: Vec<FungibleEvent>,
}

impl<L: FungibleLedger> FungibleEscrowEngine<L> {
    /// Creates an engine instance identified by `address` on the given
    /// ledger. The address scopes every derived escrow id.
    pub fn new(address: Address, ledger: L) -> Self {
        Self {
            address,
            ledger,
            agents: AgentDirectory::default(),
            escrows: HashMap::new(),
            signatures: SignatureRegistry::default(),
            events: Vec::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    /// Makes `agent` programmable by attaching a policy to it.
    pub fn register_agent(&mut self, agent: Address, policy: impl AgentPolicy + 'static) {
        self.agents.register(agent, policy);
    }

    /// The record behind `id`, if the escrow exists.
    pub fn escrow(&self, id: &EscrowId) -> Option<&FungibleEscrow> {
        self.escrows.get(id)
    }

    pub fn calculate_id(&self, terms: &FungibleTerms) -> EscrowId {
        terms.escrow_id(&self.address)
    }

    pub fn is_signature_canceled(&self, signer: &Address, signature: &Signature) -> bool {
        self.signatures.is_canceled(signer, signature)
    }

    /// The journal of every state transition since the last
    /// [`take_events`](Self::take_events).
    pub fn events(&self) -> &[FungibleEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<FungibleEvent> {
        std::mem::take(&mut self.events)
    }

    /// Creates a zero-balance escrow under the terms' derived id.
    ///
    /// A caller other than the agent needs the agent's policy to approve the
    /// creation; a plain-account agent only ever creates for itself.
    ///
    /// # Errors
    ///
    /// [`EscrowError::FeeTooHigh`] above the basis-point cap,
    /// [`EscrowError::EscrowExists`] on a duplicate id,
    /// [`EscrowError::CapabilityRejected`] / [`EscrowError::Unauthorized`]
    /// when the creation gate fails.
    pub fn create_escrow(
        &mut self,
        caller: Address,
        terms: &FungibleTerms,
        agent_data: &[u8],
    ) -> Result<EscrowId> {
        let id = terms.escrow_id(&self.address);
        self.ensure_creatable(&id, terms)?;
        if caller != terms.agent {
            match self.agents.policy(&terms.agent) {
                Some(policy) if policy.approve_create(CreateRequest::Fungible(terms), agent_data) => {}
                Some(_) => return Err(EscrowError::CapabilityRejected),
                None => return Err(EscrowError::Unauthorized),
            }
        }
        self.record(id, terms);
        Ok(id)
    }

    /// Creates an escrow on behalf of an agent who consented off-line by
    /// signing the derived id. The signature stands in for the agent's
    /// direct call; no capability callback runs.
    ///
    /// # Errors
    ///
    /// [`EscrowError::InvalidSignature`] when the signature does not recover
    /// to the agent, [`EscrowError::SignatureCanceled`] when the agent
    /// revoked it, plus the creation failures of
    /// [`create_escrow`](Self::create_escrow).
    pub fn sign_create_escrow(
        &mut self,
        terms: &FungibleTerms,
        signature: &Signature,
    ) -> Result<EscrowId> {
        let id = terms.escrow_id(&self.address);
        self.signatures.authorize(&terms.agent, &id, signature)?;
        self.ensure_creatable(&id, terms)?;
        self.record(id, terms);
        self.events.push(FungibleEvent::SignCreated {
            id,
            signature: *signature,
        });
        Ok(id)
    }

    /// Revokes `signature` for the caller. Idempotent in effect; every call
    /// journals a cancellation event. Self-service per signer.
    pub fn cancel_signature(&mut self, caller: Address, signature: Signature) {
        self.signatures.cancel(caller, signature);
        self.events.push(FungibleEvent::SignatureCanceled {
            signer: caller,
            signature,
        });
    }

    /// Funds the escrow: pulls `amount` of its token from the caller into
    /// custody. Open to any party. A zero `amount` succeeds and is
    /// journaled. An absent record surfaces as the ledger rejecting the
    /// zero-address token.
    pub fn deposit(&mut self, caller: Address, id: EscrowId, amount: u128) -> Result<()> {
        let Some(escrow) = self.escrows.get(&id) else {
            return Err(LedgerError::UnknownToken(Address::ZERO).into());
        };
        let token = escrow.token;
        let credited = escrow
            .balance
            .checked_add(amount)
            .ok_or(EscrowError::BalanceOverflow)?;
        self.ledger.transfer(token, caller, self.address, amount)?;
        if let Some(escrow) = self.escrows.get_mut(&id) {
            escrow.balance = credited;
        }
        self.events.push(FungibleEvent::Deposited { id, amount });
        Ok(())
    }

    /// Releases `amount` towards the beneficiary, splitting the agent's fee
    /// off. Callable by the depositant or the agent.
    pub fn withdraw_to_beneficiary(
        &mut self,
        caller: Address,
        id: EscrowId,
        amount: u128,
        data: &[u8],
    ) -> Result<()> {
        self.withdraw(caller, id, amount, data, Payout::ToBeneficiary)
    }

    /// Returns `amount` towards the depositant, splitting the agent's fee
    /// off. Callable by the beneficiary or the agent.
    pub fn withdraw_to_depositant(
        &mut self,
        caller: Address,
        id: EscrowId,
        amount: u128,
        data: &[u8],
    ) -> Result<()> {
        self.withdraw(caller, id, amount, data, Payout::ToDepositant)
    }

    /// Terminates the escrow: refunds the remaining balance to the
    /// depositant and removes the record, freeing the id for re-creation.
    /// Only the agent (or its approving policy) may cancel.
    pub fn cancel(&mut self, caller: Address, id: EscrowId, data: &[u8]) -> Result<()> {
        let Some(escrow) = self.escrows.get(&id) else {
            return Err(EscrowError::Unauthorized);
        };
        self.cancel_gate(caller, escrow.agent, &id, data)?;

        let Some(escrow) = self.escrows.remove(&id) else {
            return Err(EscrowError::Unauthorized);
        };
        let refund = escrow.balance;
        if let Err(err) = self
            .ledger
            .transfer(escrow.token, self.address, escrow.depositant, refund)
        {
            self.escrows.insert(id, escrow);
            return Err(err.into());
        }
        self.events.push(FungibleEvent::Canceled { id, refund });
        Ok(())
    }

    /// Exports the engine state for persistence.
    pub fn state(&self) -> FungibleState {
        let mut escrows: Vec<_> = self
            .escrows
            .iter()
            .map(|(id, escrow)| (*id, escrow.clone()))
            .collect();
        escrows.sort_by_key(|(id, _)| *id);
        FungibleState {
            address: self.address,
            escrows,
            canceled_signatures: self.signatures.entries(),
        }
    }

    /// Resurrects an engine from an exported state on the given ledger.
    pub fn from_state(state: FungibleState, ledger: L) -> Self {
        Self {
            address: state.address,
            ledger,
            agents: AgentDirectory::default(),
            escrows: state.escrows.into_iter().collect(),
            signatures: SignatureRegistry::restore(state.canceled_signatures),
            events: Vec::new(),
        }
    }

    fn ensure_creatable(&self, id: &EscrowId, terms: &FungibleTerms) -> Result<()> {
        if terms.fee_bps > fee::MAX_AGENT_FEE_BPS {
            return Err(EscrowError::FeeTooHigh(terms.fee_bps));
        }
        if self.escrows.contains_key(id) {
            return Err(EscrowError::EscrowExists);
        }
        Ok(())
    }

    fn record(&mut self, id: EscrowId, terms: &FungibleTerms) {
        self.escrows.insert(
            id,
            FungibleEscrow {
                agent: terms.agent,
                depositant: terms.depositant,
                beneficiary: terms.beneficiary,
                fee_bps: terms.fee_bps,
                token: terms.token,
                balance: 0,
            },
        );
        self.events.push(FungibleEvent::Created {
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
        amount: u128,
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
        let (agent, token, balance, fee_bps) =
            (escrow.agent, escrow.token, escrow.balance, escrow.fee_bps);

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

        let remaining = balance
            .checked_sub(amount)
            .ok_or(EscrowError::InsufficientBalance {
                requested: amount,
                available: balance,
            })?;
        let (to_agent, to_principal) = fee::split(amount, fee_bps);

        // effects before external calls; a failed push restores the record
        if let Some(escrow) = self.escrows.get_mut(&id) {
            escrow.balance = remaining;
        }
        if let Err(err) = self.payout(token, agent, to_agent, to, to_principal) {
            if let Some(escrow) = self.escrows.get_mut(&id) {
                escrow.balance = balance;
            }
            return Err(err.into());
        }

        self.events.push(FungibleEvent::Withdrawn {
            id,
            sender: caller,
            to,
            amount: to_principal,
            fee: to_agent,
        });
        Ok(())
    }

    fn payout(
        &mut self,
        token: Address,
        agent: Address,
        fee: u128,
        to: Address,
        amount: u128,
    ) -> std::result::Result<(), LedgerError> {
        self.ledger.transfer(token, self.address, agent, fee)?;
        self.ledger.transfer(token, self.address, to, amount)
    }
}
