//! Property identifier derivation
//!
//! The registry keys every property by `keccak256(country-region-locality-parcel)`,
//! computed over the raw UTF-8 bytes with a single ASCII hyphen between the
//! fields and no length prefixes or escaping. The client derives the same
//! identifier locally so it can look records up before they are fetched.
//!
//! Because the fields are not length-prefixed, two different keys whose joined
//! bytes coincide (`"a-b","c",..` and `"a","b-c",..`) share an identifier. The
//! ledger behaves the same way, so this is reproduced rather than fixed.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

use crate::error::SdkError;

/// Byte placed between the four location fields
pub const SEPARATOR: &[u8] = b"-";

/// Keccak-256 as used by the ledger (not NIST SHA3-256)
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Decode `0x`-prefixed (or bare) hex into exactly `N` bytes.
pub(crate) fn decode_hex_fixed<const N: usize>(input: &str) -> Option<[u8; N]> {
    let trimmed = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);
    let mut out = [0u8; N];
    hex::decode_to_slice(trimmed, &mut out).ok()?;
    Some(out)
}

/// Human-readable location of a property
///
/// Fields are free-form and compared byte for byte: `"Baldwin County"` and
/// `"baldwin county"` are different keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationKey {
    /// Country code or name (e.g. "US")
    pub country: String,
    /// State or region (e.g. "Alabama")
    pub region: String,
    /// County or locality (e.g. "Baldwin County")
    pub locality: String,
    /// Parcel number as printed on the deed
    pub parcel: String,
}

impl LocationKey {
    /// Create a location key from its four fields
    pub fn new(
        country: impl Into<String>,
        region: impl Into<String>,
        locality: impl Into<String>,
        parcel: impl Into<String>,
    ) -> Self {
        Self {
            country: country.into(),
            region: region.into(),
            locality: locality.into(),
            parcel: parcel.into(),
        }
    }

    /// Change the region. The locality belongs to the old region, so it is cleared.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self.locality.clear();
        self
    }

    /// Change the locality
    pub fn with_locality(mut self, locality: impl Into<String>) -> Self {
        self.locality = locality.into();
        self
    }

    /// Change the parcel number
    pub fn with_parcel(mut self, parcel: impl Into<String>) -> Self {
        self.parcel = parcel.into();
        self
    }

    /// Country, region and locality are all set
    pub fn has_location(&self) -> bool {
        !self.country.is_empty() && !self.region.is_empty() && !self.locality.is_empty()
    }

    /// All four fields are set, so the identifier can match a real entry
    pub fn is_complete(&self) -> bool {
        self.has_location() && !self.parcel.is_empty()
    }

    /// Identifier the ledger assigns to this location
    pub fn entity_id(&self) -> EntityId {
        derive(self)
    }
}

/// Derive the ledger identifier for a location.
///
/// Pure and total: empty fields are accepted and simply produce an
/// identifier no real entry will have.
pub fn derive(location: &LocationKey) -> EntityId {
    let mut hasher = Keccak256::new();
    hasher.update(location.country.as_bytes());
    hasher.update(SEPARATOR);
    hasher.update(location.region.as_bytes());
    hasher.update(SEPARATOR);
    hasher.update(location.locality.as_bytes());
    hasher.update(SEPARATOR);
    hasher.update(location.parcel.as_bytes());
    EntityId(hasher.finalize().into())
}

/// 32-byte registry identifier
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId([u8; 32]);

impl EntityId {
    /// All-zero identifier; mapping getters return it for unknown keys
    pub const ZERO: EntityId = EntityId([0u8; 32]);

    /// Wrap raw digest bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether this is the "no record" marker
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// `0x`-prefixed lowercase hex
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.to_hex())
    }
}

impl FromStr for EntityId {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_hex_fixed::<32>(s)
            .map(EntityId)
            .ok_or_else(|| SdkError::InvalidId(s.to_string()))
    }
}

impl From<[u8; 32]> for EntityId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
