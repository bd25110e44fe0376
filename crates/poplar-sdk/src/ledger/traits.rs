//! Core traits for ledger access.
//!
//! `LedgerReader` is the read half of the registry and token ABIs. `Wallet`
//! is the sign-and-send capability: it is passed explicitly to whatever
//! needs to write, so tests can inject a fake one.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::address::Address;
use crate::amount::TokenAmount;
use crate::id::{decode_hex_fixed, EntityId, LocationKey};
use crate::records::{RawProperty, RawStake, RawValidation};

/// Error types for ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The ledger rejected the call; the message is the ledger's own
    #[error("{0}")]
    Reverted(String),

    /// HTTP or connection failure
    #[error("{0}")]
    Transport(String),

    /// JSON-RPC level error
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Return data did not match the expected ABI shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// No account is connected
    #[error("Wallet not connected")]
    NotConnected,
}

/// Read access to the registry and its staking token.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// `getPropertiesNeedingValidation()`
    async fn properties_needing_validation(&self) -> Result<Vec<RawProperty>, LedgerError>;

    /// `properties(id)`; unknown ids come back as a zeroed tuple
    async fn property(&self, id: EntityId) -> Result<RawProperty, LedgerError>;

    /// `validations(id)`
    async fn validation(&self, id: EntityId) -> Result<RawValidation, LedgerError>;

    /// `getValidationStake(id, voter)`
    async fn validation_stake(&self, id: EntityId, voter: Address)
        -> Result<RawStake, LedgerError>;

    /// `isValidLocation(country, region, locality)`
    async fn is_valid_location(
        &self,
        country: &str,
        region: &str,
        locality: &str,
    ) -> Result<bool, LedgerError>;

    /// `isPropertyRegistered(id)`
    async fn is_property_registered(&self, id: EntityId) -> Result<bool, LedgerError>;

    /// Token `allowance(owner, spender)`
    async fn allowance(&self, owner: Address, spender: Address)
        -> Result<TokenAmount, LedgerError>;

    /// Token `balanceOf(owner)`
    async fn balance_of(&self, owner: Address) -> Result<TokenAmount, LedgerError>;
}

/// Sign-and-send capability of the connected account.
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Connected account, if any
    fn account(&self) -> Option<Address>;

    fn is_connected(&self) -> bool {
        self.account().is_some()
    }

    /// Sign and send a write, then wait until the ledger reports its outcome.
    ///
    /// A revert is `Err(LedgerError::Reverted)`; `Ok` means it executed.
    async fn send(&self, call: ContractCall) -> Result<Receipt, LedgerError>;
}

/// A state-changing call against the registry or token contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractCall {
    /// Token `approve(spender, amount)`
    Approve { spender: Address, amount: TokenAmount },
    /// `submitProperty(country, region, locality, parcel, contentHash)`
    SubmitProperty {
        location: LocationKey,
        content_hash: String,
    },
    /// `requestValidation(id, fee)`
    RequestValidation { property_id: EntityId, fee: TokenAmount },
    /// `castValidationVote(id, stake, support)`
    CastValidationVote {
        property_id: EntityId,
        stake: TokenAmount,
        support: bool,
    },
    /// `concludeValidation(id)`
    ConcludeValidation { property_id: EntityId },
    /// `claimRewards(id)`
    ClaimRewards { property_id: EntityId },
}

impl ContractCall {
    /// ABI function name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Approve { .. } => "approve",
            Self::SubmitProperty { .. } => "submitProperty",
            Self::RequestValidation { .. } => "requestValidation",
            Self::CastValidationVote { .. } => "castValidationVote",
            Self::ConcludeValidation { .. } => "concludeValidation",
            Self::ClaimRewards { .. } => "claimRewards",
        }
    }

    /// Whether this call goes to the token contract rather than the registry
    pub fn targets_token(&self) -> bool {
        matches!(self, Self::Approve { .. })
    }

    /// Property the call refers to
    pub fn property_id(&self) -> Option<EntityId> {
        match self {
            Self::Approve { .. } => None,
            Self::SubmitProperty { location, .. } => Some(location.entity_id()),
            Self::RequestValidation { property_id, .. }
            | Self::CastValidationVote { property_id, .. }
            | Self::ConcludeValidation { property_id }
            | Self::ClaimRewards { property_id } => Some(*property_id),
        }
    }
}

/// Transaction hash
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TxHash(pub [u8; 32]);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({self})")
    }
}

impl FromStr for TxHash {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_hex_fixed::<32>(s)
            .map(TxHash)
            .ok_or_else(|| LedgerError::Decode(format!("invalid transaction hash: {s}")))
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Confirmation of an executed write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
}
