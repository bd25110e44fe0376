//! In-memory ledger for testing.
//!
//! Implements both `LedgerReader` and `Wallet` over a small simulation of the
//! registry: allowances are consumed by writes, votes update stake totals,
//! and conclusion settles the property status. Every write is recorded so
//! tests can assert on ordering and call counts.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use super::traits::*;
use crate::address::Address;
use crate::amount::TokenAmount;
use crate::id::{keccak256, EntityId, LocationKey};
use crate::records::{RawProperty, RawStake, RawValidation};

/// Observable step of a simulated write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalEntry {
    Sent(&'static str),
    Confirmed(&'static str),
    Reverted(&'static str),
}

#[derive(Default)]
struct MockState {
    properties: BTreeMap<EntityId, RawProperty>,
    validations: HashMap<EntityId, RawValidation>,
    stakes: HashMap<(EntityId, Address), RawStake>,
    valid_locations: HashSet<(String, String, String)>,
    allowances: HashMap<Address, u128>,
    balances: HashMap<Address, u128>,
    forced_reverts: HashMap<&'static str, String>,
    failing_reads: Option<String>,
    calls: Vec<ContractCall>,
    journal: Vec<JournalEntry>,
}

/// Mock ledger for testing.
pub struct MockLedger {
    state: Mutex<MockState>,
    account: Option<Address>,
    minimum_stake: u128,
    confirmation_delay: Duration,
    clock: AtomicU64,
    block: AtomicU64,
    read_count: AtomicU32,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    /// Create an empty ledger with no connected account.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            account: None,
            minimum_stake: TokenAmount::from_tokens(100).raw(),
            confirmation_delay: Duration::ZERO,
            clock: AtomicU64::new(1_700_000_000),
            block: AtomicU64::new(0),
            read_count: AtomicU32::new(0),
        }
    }

    /// Connect an account.
    pub fn with_account(mut self, account: Address) -> Self {
        self.account = Some(account);
        self
    }

    /// Stake the registry demands for `submitProperty`.
    pub fn with_minimum_stake(mut self, amount: TokenAmount) -> Self {
        self.minimum_stake = amount.raw();
        self
    }

    /// Delay between a write being sent and confirmed.
    pub fn with_confirmation_delay(mut self, delay: Duration) -> Self {
        self.confirmation_delay = delay;
        self
    }

    pub fn with_property(mut self, property: RawProperty) -> Self {
        self.state.get_mut().properties.insert(property.id, property);
        self
    }

    pub fn with_validation(mut self, validation: RawValidation) -> Self {
        self.state
            .get_mut()
            .validations
            .insert(validation.property_id, validation);
        self
    }

    pub fn with_stake(mut self, id: EntityId, voter: Address, stake: RawStake) -> Self {
        self.state.get_mut().stakes.insert((id, voter), stake);
        self
    }

    pub fn with_valid_location(mut self, country: &str, region: &str, locality: &str) -> Self {
        self.state.get_mut().valid_locations.insert((
            country.to_string(),
            region.to_string(),
            locality.to_string(),
        ));
        self
    }

    /// Allowance `owner` has granted the registry.
    pub fn with_allowance(mut self, owner: Address, amount: TokenAmount) -> Self {
        self.state.get_mut().allowances.insert(owner, amount.raw());
        self
    }

    pub fn with_balance(mut self, owner: Address, amount: TokenAmount) -> Self {
        self.state.get_mut().balances.insert(owner, amount.raw());
        self
    }

    /// Make the next write named `call_name` revert with `reason`.
    pub fn with_revert(mut self, call_name: &'static str, reason: impl Into<String>) -> Self {
        self.state
            .get_mut()
            .forced_reverts
            .insert(call_name, reason.into());
        self
    }

    /// Make every read fail with a transport error.
    pub fn with_failing_reads(mut self, message: impl Into<String>) -> Self {
        self.state.get_mut().failing_reads = Some(message.into());
        self
    }

    /// Toggle read failures at runtime.
    pub async fn set_failing_reads(&self, message: Option<String>) {
        self.state.lock().await.failing_reads = message;
    }

    /// Registered property fixture in the ledger's tuple shape.
    pub fn property_fixture(location: &LocationKey, submitter: Address, status: u8) -> RawProperty {
        RawProperty {
            id: location.entity_id(),
            submitter,
            country: location.country.clone(),
            region: location.region.clone(),
            locality: location.locality.clone(),
            parcel: location.parcel.clone(),
            ipfs_hash: "QmFixture".to_string(),
            staked_amount: TokenAmount::from_tokens(100).raw(),
            last_update_time: 1_700_000_000,
            validated: status == 2,
            validation_status: status,
        }
    }

    // ==================== Inspection ====================

    /// Writes sent so far, in order.
    pub async fn calls(&self) -> Vec<ContractCall> {
        self.state.lock().await.calls.clone()
    }

    /// Sent/confirmed steps of every write, in order.
    pub async fn journal(&self) -> Vec<JournalEntry> {
        self.state.lock().await.journal.clone()
    }

    /// Number of `approve` writes sent.
    pub async fn approval_count(&self) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| matches!(c, ContractCall::Approve { .. }))
            .count()
    }

    /// Number of reads served (including failed ones).
    pub fn read_count(&self) -> u32 {
        self.read_count.load(Ordering::SeqCst)
    }

    pub async fn allowance_of(&self, owner: Address) -> TokenAmount {
        TokenAmount::from_raw(
            self.state
                .lock()
                .await
                .allowances
                .get(&owner)
                .copied()
                .unwrap_or(0),
        )
    }

    // ==================== Helper Methods ====================

    async fn read(&self) -> Result<tokio::sync::MutexGuard<'_, MockState>, LedgerError> {
        self.read_count.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().await;
        if let Some(message) = state.failing_reads.clone() {
            return Err(LedgerError::Transport(message));
        }
        Ok(state)
    }

    fn spend(state: &mut MockState, owner: Address, amount: u128) -> Result<(), LedgerError> {
        let allowance = state.allowances.entry(owner).or_insert(0);
        if *allowance < amount {
            return Err(LedgerError::Reverted("Insufficient allowance".to_string()));
        }
        *allowance -= amount;
        Ok(())
    }

    fn execute(
        &self,
        state: &mut MockState,
        from: Address,
        call: &ContractCall,
    ) -> Result<(), LedgerError> {
        let revert = |reason: &str| -> Result<(), LedgerError> {
            Err(LedgerError::Reverted(reason.to_string()))
        };

        match call {
            ContractCall::Approve { amount, .. } => {
                state.allowances.insert(from, amount.raw());
            }
            ContractCall::SubmitProperty {
                location,
                content_hash,
            } => {
                let id = location.entity_id();
                if state.properties.contains_key(&id) {
                    return revert("Property already registered");
                }
                Self::spend(state, from, self.minimum_stake)?;
                state.properties.insert(
                    id,
                    RawProperty {
                        id,
                        submitter: from,
                        country: location.country.clone(),
                        region: location.region.clone(),
                        locality: location.locality.clone(),
                        parcel: location.parcel.clone(),
                        ipfs_hash: content_hash.clone(),
                        staked_amount: self.minimum_stake,
                        last_update_time: self.clock.load(Ordering::SeqCst),
                        validated: false,
                        validation_status: 1,
                    },
                );
            }
            ContractCall::RequestValidation { property_id, fee } => {
                if !state.properties.contains_key(property_id) {
                    return revert("Property not registered");
                }
                if state
                    .validations
                    .get(property_id)
                    .is_some_and(|v| v.start_time != 0 && !v.concluded)
                {
                    return revert("Validation already in progress");
                }
                Self::spend(state, from, fee.raw())?;
                state.validations.insert(
                    *property_id,
                    RawValidation {
                        property_id: *property_id,
                        fee: fee.raw(),
                        start_time: self.clock.load(Ordering::SeqCst),
                        ..Default::default()
                    },
                );
            }
            ContractCall::CastValidationVote {
                property_id,
                stake,
                support,
            } => {
                let open = state
                    .validations
                    .get(property_id)
                    .is_some_and(|v| v.start_time != 0 && !v.concluded);
                if !open {
                    return revert("No active validation");
                }
                if state
                    .stakes
                    .get(&(*property_id, from))
                    .is_some_and(|s| s.amount != 0)
                {
                    return revert("Already voted");
                }
                Self::spend(state, from, stake.raw())?;
                state.stakes.insert(
                    (*property_id, from),
                    RawStake {
                        amount: stake.raw(),
                        support: *support,
                        claimed: false,
                    },
                );
                if let Some(validation) = state.validations.get_mut(property_id) {
                    validation.total_staked += stake.raw();
                    if *support {
                        validation.positive_stake += stake.raw();
                    }
                }
            }
            ContractCall::ConcludeValidation { property_id } => {
                let Some(validation) = state
                    .validations
                    .get_mut(property_id)
                    .filter(|v| v.start_time != 0 && !v.concluded)
                else {
                    return revert("No active validation");
                };
                validation.concluded = true;
                let approved = validation.positive_stake * 2 > validation.total_staked;
                if let Some(property) = state.properties.get_mut(property_id) {
                    property.validation_status = if approved { 2 } else { 3 };
                    property.validated = approved;
                }
            }
            ContractCall::ClaimRewards { property_id } => {
                let concluded = state
                    .validations
                    .get(property_id)
                    .is_some_and(|v| v.concluded);
                if !concluded {
                    return revert("Validation not concluded");
                }
                match state.stakes.get_mut(&(*property_id, from)) {
                    Some(stake) if stake.amount != 0 && !stake.claimed => stake.claimed = true,
                    _ => return revert("Nothing to claim"),
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerReader for MockLedger {
    async fn properties_needing_validation(&self) -> Result<Vec<RawProperty>, LedgerError> {
        let state = self.read().await?;
        Ok(state
            .properties
            .values()
            .filter(|p| p.validation_status <= 1)
            .cloned()
            .collect())
    }

    async fn property(&self, id: EntityId) -> Result<RawProperty, LedgerError> {
        let state = self.read().await?;
        Ok(state.properties.get(&id).cloned().unwrap_or(RawProperty {
            id: EntityId::ZERO,
            submitter: Address::ZERO,
            country: String::new(),
            region: String::new(),
            locality: String::new(),
            parcel: String::new(),
            ipfs_hash: String::new(),
            staked_amount: 0,
            last_update_time: 0,
            validated: false,
            validation_status: 0,
        }))
    }

    async fn validation(&self, id: EntityId) -> Result<RawValidation, LedgerError> {
        let state = self.read().await?;
        Ok(state.validations.get(&id).cloned().unwrap_or_default())
    }

    async fn validation_stake(
        &self,
        id: EntityId,
        voter: Address,
    ) -> Result<RawStake, LedgerError> {
        let state = self.read().await?;
        Ok(state.stakes.get(&(id, voter)).copied().unwrap_or_default())
    }

    async fn is_valid_location(
        &self,
        country: &str,
        region: &str,
        locality: &str,
    ) -> Result<bool, LedgerError> {
        let state = self.read().await?;
        Ok(state.valid_locations.contains(&(
            country.to_string(),
            region.to_string(),
            locality.to_string(),
        )))
    }

    async fn is_property_registered(&self, id: EntityId) -> Result<bool, LedgerError> {
        let state = self.read().await?;
        Ok(state.properties.contains_key(&id))
    }

    async fn allowance(
        &self,
        owner: Address,
        _spender: Address,
    ) -> Result<TokenAmount, LedgerError> {
        let state = self.read().await?;
        Ok(TokenAmount::from_raw(
            state.allowances.get(&owner).copied().unwrap_or(0),
        ))
    }

    async fn balance_of(&self, owner: Address) -> Result<TokenAmount, LedgerError> {
        let state = self.read().await?;
        Ok(TokenAmount::from_raw(
            state.balances.get(&owner).copied().unwrap_or(0),
        ))
    }
}

#[async_trait]
impl Wallet for MockLedger {
    fn account(&self) -> Option<Address> {
        self.account
    }

    async fn send(&self, call: ContractCall) -> Result<Receipt, LedgerError> {
        let from = self.account.ok_or(LedgerError::NotConnected)?;
        let name = call.name();

        {
            let mut state = self.state.lock().await;
            state.calls.push(call.clone());
            state.journal.push(JournalEntry::Sent(name));
        }

        if !self.confirmation_delay.is_zero() {
            tokio::time::sleep(self.confirmation_delay).await;
        }

        let mut state = self.state.lock().await;
        let outcome = match state.forced_reverts.remove(name) {
            Some(reason) => Err(LedgerError::Reverted(reason)),
            None => self.execute(&mut state, from, &call),
        };

        if let Err(err) = outcome {
            state.journal.push(JournalEntry::Reverted(name));
            return Err(err);
        }

        state.journal.push(JournalEntry::Confirmed(name));
        self.clock.fetch_add(12, Ordering::SeqCst);
        let block = self.block.fetch_add(1, Ordering::SeqCst) + 1;
        let mut seed = name.as_bytes().to_vec();
        seed.extend_from_slice(&block.to_be_bytes());

        Ok(Receipt {
            tx_hash: TxHash(keccak256(&seed)),
            block_number: Some(block),
        })
    }
}
