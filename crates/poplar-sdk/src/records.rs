//! Typed registry records
//!
//! The ledger returns positional tuples. `Raw*` types mirror those tuples
//! field for field; the typed records add units (token amounts, UTC
//! timestamps, status enums) and are what the rest of the SDK works with.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

use crate::address::Address;
use crate::amount::TokenAmount;
use crate::error::SdkError;
use crate::id::{EntityId, LocationKey};
use crate::status::{detail_label, DisplayStatus, RecordStatus};

/// Length of a validation round on the ledger (2 days)
pub const VALIDATION_PERIOD_SECS: u64 = 172_800;

fn timestamp(secs: u64) -> Result<DateTime<Utc>, SdkError> {
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .ok_or_else(|| SdkError::Decode(format!("timestamp out of range: {secs}")))
}

// ==================== Raw Tuples ====================

/// Output of `properties(id)` and one element of `getPropertiesNeedingValidation()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawProperty {
    pub id: EntityId,
    pub submitter: Address,
    pub country: String,
    pub region: String,
    pub locality: String,
    pub parcel: String,
    pub ipfs_hash: String,
    pub staked_amount: u128,
    pub last_update_time: u64,
    pub validated: bool,
    pub validation_status: u8,
}

/// Output of `validations(id)`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawValidation {
    pub property_id: EntityId,
    pub fee: u128,
    pub start_time: u64,
    pub total_staked: u128,
    pub positive_stake: u128,
    pub concluded: bool,
}

/// Output of `getValidationStake(id, voter)`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawStake {
    pub amount: u128,
    pub support: bool,
    pub claimed: bool,
}

// ==================== Typed Records ====================

/// A registered property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyRecord {
    pub id: EntityId,
    pub submitter: Address,
    pub location: LocationKey,
    /// Content-store hash of the submitted form data
    pub content_hash: String,
    pub staked_amount: TokenAmount,
    pub last_update_time: DateTime<Utc>,
    pub validated: bool,
    pub status: RecordStatus,
    /// Raw code, kept because the detail view labels codes differently
    pub status_code: u8,
}

impl PropertyRecord {
    /// The ledger returns a zeroed tuple for unknown ids
    pub fn is_registered(&self) -> bool {
        !self.id.is_zero()
    }

    /// End of the stake lock: last update plus the validation period
    pub fn lock_period_end(&self, validation_period_secs: u64) -> DateTime<Utc> {
        i64::try_from(validation_period_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|period| self.last_update_time.checked_add_signed(period))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn detail_label(&self) -> &'static str {
        detail_label(self.status_code)
    }

    /// List-view projection
    pub fn summary(&self, validation_period_secs: u64) -> PropertySummary {
        PropertySummary {
            id: self.id,
            parcel: self.location.parcel.clone(),
            city: self.location.locality.clone(),
            state: self.location.region.clone(),
            country: self.location.country.clone(),
            submission_date: self.last_update_time,
            submitter: self.submitter,
            status: self.status.display_status(),
            stake_amount: self.staked_amount,
            lock_period_end: self.lock_period_end(validation_period_secs),
            content_hash: self.content_hash.clone(),
        }
    }
}

impl TryFrom<RawProperty> for PropertyRecord {
    type Error = SdkError;

    fn try_from(raw: RawProperty) -> Result<Self, Self::Error> {
        Ok(Self {
            id: raw.id,
            submitter: raw.submitter,
            location: LocationKey::new(raw.country, raw.region, raw.locality, raw.parcel),
            content_hash: raw.ipfs_hash,
            staked_amount: TokenAmount::from_raw(raw.staked_amount),
            last_update_time: timestamp(raw.last_update_time)?,
            validated: raw.validated,
            status: RecordStatus::from_code(raw.validation_status),
            status_code: raw.validation_status,
        })
    }
}

/// Row of the "needs validation" list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySummary {
    pub id: EntityId,
    pub parcel: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub submission_date: DateTime<Utc>,
    pub submitter: Address,
    pub status: DisplayStatus,
    pub stake_amount: TokenAmount,
    pub lock_period_end: DateTime<Utc>,
    pub content_hash: String,
}

/// Validation round for a property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRecord {
    pub property_id: EntityId,
    pub fee: TokenAmount,
    /// `None` when no round was ever requested
    pub start_time: Option<DateTime<Utc>>,
    pub total_staked: TokenAmount,
    pub positive_stake: TokenAmount,
    pub concluded: bool,
}

impl ValidationRecord {
    /// A round exists iff the ledger recorded a start time
    pub fn exists(&self) -> bool {
        self.start_time.is_some()
    }

    /// Round is open for votes
    pub fn is_open(&self) -> bool {
        self.exists() && !self.concluded
    }

    /// Stake voting against
    pub fn negative_stake(&self) -> TokenAmount {
        self.total_staked
            .checked_sub(self.positive_stake)
            .unwrap_or(TokenAmount::ZERO)
    }

    pub fn progress_label(&self) -> &'static str {
        if self.concluded {
            "Concluded"
        } else {
            "In Progress"
        }
    }
}

impl TryFrom<RawValidation> for ValidationRecord {
    type Error = SdkError;

    fn try_from(raw: RawValidation) -> Result<Self, Self::Error> {
        let start_time = match raw.start_time {
            0 => None,
            secs => Some(timestamp(secs)?),
        };
        Ok(Self {
            property_id: raw.property_id,
            fee: TokenAmount::from_raw(raw.fee),
            start_time,
            total_staked: TokenAmount::from_raw(raw.total_staked),
            positive_stake: TokenAmount::from_raw(raw.positive_stake),
            concluded: raw.concluded,
        })
    }
}

/// A voter's stake in one validation round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterStake {
    pub amount: TokenAmount,
    pub support: bool,
    pub claimed: bool,
}

impl VoterStake {
    /// Whether the voter has already voted
    pub fn has_stake(&self) -> bool {
        !self.amount.is_zero()
    }
}

impl From<RawStake> for VoterStake {
    fn from(raw: RawStake) -> Self {
        Self {
            amount: TokenAmount::from_raw(raw.amount),
            support: raw.support,
            claimed: raw.claimed,
        }
    }
}
