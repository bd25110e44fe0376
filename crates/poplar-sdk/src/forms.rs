//! Form models for the three write actions and their local checks.
//!
//! Everything here is synchronous and never touches the network. Checks
//! that need a ledger read (location validity, registration) are run by
//! the pipeline between the local ones, in the order the forms list them.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

use crate::amount::TokenAmount;
use crate::id::{EntityId, LocationKey};

/// Prefilled amount for fee and stake inputs, in whole tokens
pub const DEFAULT_AMOUNT_INPUT: &str = "100";

/// A rejected input. The display string is what the user sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("Please connect your wallet first")]
    WalletNotConnected,

    #[error("Country is required")]
    CountryRequired,

    #[error("State is required")]
    StateRequired,

    #[error("County is required")]
    CountyRequired,

    #[error("Parcel number is required")]
    ParcelRequired,

    #[error("Street address is required")]
    StreetAddressRequired,

    #[error("Legal description is required")]
    LegalDescriptionRequired,

    #[error("City is required")]
    CityRequired,

    #[error("Valid ZIP code is required")]
    InvalidZip,

    #[error("All location fields are required")]
    LocationIncomplete,

    #[error("Invalid location combination")]
    InvalidLocation,

    #[error("Property already registered")]
    AlreadyRegistered,

    #[error("Property not found in registry")]
    NotRegistered,

    #[error("Valid fee amount is required")]
    InvalidFee,

    #[error("Valid stake amount is required")]
    InvalidStake,

    #[error("Voting is not available for this property")]
    VotingUnavailable,

    #[error("Validation cannot be concluded")]
    ConcludeUnavailable,

    #[error("No rewards to claim")]
    ClaimUnavailable,
}

fn zip_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[0-9]{5}(-[0-9]{4})?$").ok())
        .as_ref()
}

/// US ZIP or ZIP+4
pub fn is_valid_zip(zip: &str) -> bool {
    zip_pattern().is_some_and(|re| re.is_match(zip))
}

/// Positive token amount from a decimal input
fn parse_positive(input: &str) -> Option<TokenAmount> {
    TokenAmount::parse_units(input)
        .ok()
        .filter(|amount| !amount.is_zero())
}

/// Property submission form.
///
/// Serialized as-is (camelCase) into the content store; the ledger only
/// receives the location fields and the returned content hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySubmission {
    pub country: String,
    pub state: String,
    pub county: String,
    pub parcel_number: String,
    pub street_address: String,
    pub city: String,
    pub zip_code: String,
    pub legal_description: String,
}

impl PropertySubmission {
    /// Change the state. The county belongs to the old state, so it is cleared.
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = state.into();
        self.county.clear();
        self
    }

    pub fn location(&self) -> LocationKey {
        LocationKey::new(
            self.country.clone(),
            self.state.clone(),
            self.county.clone(),
            self.parcel_number.clone(),
        )
    }

    pub fn property_id(&self) -> EntityId {
        self.location().entity_id()
    }

    /// First failing field check, in form order.
    pub fn validate(&self) -> Result<(), FormError> {
        let required = [
            (&self.country, FormError::CountryRequired),
            (&self.state, FormError::StateRequired),
            (&self.county, FormError::CountyRequired),
            (&self.parcel_number, FormError::ParcelRequired),
            (&self.street_address, FormError::StreetAddressRequired),
            (&self.legal_description, FormError::LegalDescriptionRequired),
            (&self.city, FormError::CityRequired),
        ];
        if let Some((_, err)) = required.into_iter().find(|(value, _)| value.is_empty()) {
            return Err(err);
        }
        if !is_valid_zip(&self.zip_code) {
            return Err(FormError::InvalidZip);
        }
        Ok(())
    }

    /// Content-store payload
    pub fn metadata(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

/// Validation request form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRequest {
    pub country: String,
    pub region: String,
    pub locality: String,
    pub parcel_number: String,
    /// Decimal token amount as typed
    pub fee: String,
}

impl Default for ValidationRequest {
    fn default() -> Self {
        Self {
            country: String::new(),
            region: String::new(),
            locality: String::new(),
            parcel_number: String::new(),
            fee: DEFAULT_AMOUNT_INPUT.to_string(),
        }
    }
}

impl ValidationRequest {
    /// Empty form with the fee prefilled
    pub fn with_default_fee(fee: TokenAmount) -> Self {
        Self {
            fee: fee.to_decimal_string(),
            ..Self::default()
        }
    }

    pub fn location(&self) -> LocationKey {
        LocationKey::new(
            self.country.clone(),
            self.region.clone(),
            self.locality.clone(),
            self.parcel_number.clone(),
        )
    }

    /// Identifier shown as the user types; only once every location field is set.
    pub fn property_id(&self) -> Option<EntityId> {
        let location = self.location();
        location.is_complete().then(|| location.entity_id())
    }

    pub fn check_location_fields(&self) -> Result<(), FormError> {
        if self.location().has_location() {
            Ok(())
        } else {
            Err(FormError::LocationIncomplete)
        }
    }

    pub fn check_parcel(&self) -> Result<(), FormError> {
        if self.parcel_number.is_empty() {
            Err(FormError::ParcelRequired)
        } else {
            Ok(())
        }
    }

    pub fn parse_fee(&self) -> Result<TokenAmount, FormError> {
        parse_positive(&self.fee).ok_or(FormError::InvalidFee)
    }
}

/// Vote on an open validation round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub property_id: EntityId,
    /// Decimal token amount as typed
    pub stake: String,
    pub support: bool,
}

impl VoteRequest {
    pub fn new(property_id: EntityId, stake: impl Into<String>, support: bool) -> Self {
        Self {
            property_id,
            stake: stake.into(),
            support,
        }
    }

    pub fn parse_stake(&self) -> Result<TokenAmount, FormError> {
        parse_positive(&self.stake).ok_or(FormError::InvalidStake)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baldwin() -> PropertySubmission {
        PropertySubmission {
            country: "US".into(),
            state: "Alabama".into(),
            county: "Baldwin County".into(),
            parcel_number: "1234567890".into(),
            street_address: "123 Main Street".into(),
            city: "Fairhope".into(),
            zip_code: "36532".into(),
            legal_description: "Lot 1, Block 2 of Sunset Heights Addition".into(),
        }
    }

    #[test]
    fn test_zip_pattern() {
        assert!(is_valid_zip("36532"));
        assert!(is_valid_zip("36532-1234"));
        assert!(!is_valid_zip("3653"));
        assert!(!is_valid_zip("36532-12"));
        assert!(!is_valid_zip("36532 "));
        assert!(!is_valid_zip(""));
        assert!(!is_valid_zip("٣٦٥٣٢"));
    }

    #[test]
    fn test_submission_valid() {
        assert_eq!(baldwin().validate(), Ok(()));
        assert_eq!(
            baldwin().property_id().to_hex(),
            "0xf77d578af4a435fbd34d677f0e949b8d724e283f1a26ffb582aec353a8ad65d5"
        );
    }

    #[test]
    fn test_submission_reports_first_missing_field() {
        let mut form = baldwin();
        form.street_address.clear();
        form.city.clear();
        assert_eq!(form.validate(), Err(FormError::StreetAddressRequired));

        let mut form = baldwin();
        form.legal_description.clear();
        form.city.clear();
        assert_eq!(form.validate(), Err(FormError::LegalDescriptionRequired));

        let form = baldwin().with_state("Texas");
        assert_eq!(form.validate(), Err(FormError::CountyRequired));
        assert_eq!(form.validate().unwrap_err().to_string(), "County is required");

        let mut form = baldwin();
        form.zip_code = "3653".into();
        assert_eq!(
            form.validate().unwrap_err().to_string(),
            "Valid ZIP code is required"
        );
    }

    #[test]
    fn test_metadata_is_camel_case() {
        let metadata = baldwin().metadata().unwrap();
        assert_eq!(metadata["parcelNumber"], "1234567890");
        assert_eq!(metadata["zipCode"], "36532");
        assert_eq!(metadata["legalDescription"].as_str().unwrap().len(), 41);
    }

    #[test]
    fn test_request_checks() {
        let mut request = ValidationRequest::with_default_fee(TokenAmount::from_tokens(100));
        assert_eq!(request.fee, "100");
        assert_eq!(request.check_location_fields(), Err(FormError::LocationIncomplete));
        assert_eq!(request.property_id(), None);

        request.country = "US".into();
        request.region = "Alabama".into();
        request.locality = "Baldwin County".into();
        assert_eq!(request.check_location_fields(), Ok(()));
        assert_eq!(request.check_parcel(), Err(FormError::ParcelRequired));

        request.parcel_number = "1234567890".into();
        assert_eq!(request.property_id(), Some(baldwin().property_id()));
        assert_eq!(request.parse_fee(), Ok(TokenAmount::from_tokens(100)));

        for bad in ["0", "", "-1", "abc", "0.0"] {
            request.fee = bad.into();
            assert_eq!(request.parse_fee(), Err(FormError::InvalidFee), "fee {bad:?}");
        }
    }

    #[test]
    fn test_vote_stake() {
        let vote = VoteRequest::new(EntityId::ZERO, "2.5", true);
        assert_eq!(
            vote.parse_stake().unwrap(),
            TokenAmount::parse_units("2.5").unwrap()
        );
        assert_eq!(
            VoteRequest::new(EntityId::ZERO, "0", false).parse_stake(),
            Err(FormError::InvalidStake)
        );
    }
}
