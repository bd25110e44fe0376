//! Fixed-point token amounts
//!
//! The staking token uses 18 implied decimals. The raw integer is the
//! authoritative value for comparisons and arithmetic; [`TokenAmount::display`]
//! is a lossy rendering for people and must never be fed back into a
//! threshold check.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::SdkError;

/// Number of implied decimal digits
pub const DECIMALS: u32 = 18;

/// Fractional digits kept by [`TokenAmount::display`]
pub const DISPLAY_DECIMALS: u32 = 4;

const ONE_TOKEN: u128 = 10u128.pow(DECIMALS);

/// Token amount in base units (1 token = 10^18 units)
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenAmount(u128);

impl TokenAmount {
    pub const ZERO: TokenAmount = TokenAmount(0);

    /// Wrap a base-unit integer
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Base-unit integer
    pub const fn raw(&self) -> u128 {
        self.0
    }

    /// Whole tokens
    pub const fn from_tokens(tokens: u64) -> Self {
        Self(tokens as u128 * ONE_TOKEN)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: TokenAmount) -> Option<TokenAmount> {
        self.0.checked_add(other.0).map(TokenAmount)
    }

    pub fn checked_sub(self, other: TokenAmount) -> Option<TokenAmount> {
        self.0.checked_sub(other.0).map(TokenAmount)
    }

    /// Parse a decimal token string (`"100"`, `"0.5"`) into base units.
    ///
    /// Rejects signs, exponents, more than 18 fractional digits and values
    /// that do not fit.
    pub fn parse_units(input: &str) -> Result<Self, SdkError> {
        let invalid = || SdkError::InvalidAmount(input.to_string());
        let s = input.trim();

        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }
        if frac.len() > DECIMALS as usize {
            return Err(invalid());
        }

        let whole_units = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u128>()
                .ok()
                .and_then(|w| w.checked_mul(ONE_TOKEN))
                .ok_or_else(invalid)?
        };
        let frac_units = if frac.is_empty() {
            0
        } else {
            let digits = frac.parse::<u128>().map_err(|_| invalid())?;
            digits * 10u128.pow(DECIMALS - frac.len() as u32)
        };

        whole_units
            .checked_add(frac_units)
            .map(TokenAmount)
            .ok_or_else(invalid)
    }

    /// Exact decimal rendering with trailing zeros trimmed (`"100"`, `"0.5"`)
    pub fn to_decimal_string(&self) -> String {
        let whole = self.0 / ONE_TOKEN;
        let frac = self.0 % ONE_TOKEN;
        if frac == 0 {
            return whole.to_string();
        }
        let digits = format!("{:018}", frac);
        format!("{}.{}", whole, digits.trim_end_matches('0'))
    }

    /// Human rendering: thousands separators, at most four fractional digits
    /// rounded half-up, trailing zeros trimmed.
    ///
    /// `1234.56785` renders as `"1,234.5679"` and `99.99999` as `"100"`.
    pub fn display(&self) -> String {
        let step = 10u128.pow(DECIMALS - DISPLAY_DECIMALS);
        let mut whole = self.0 / ONE_TOKEN;
        let frac = self.0 % ONE_TOKEN;

        let mut shown = frac / step;
        if frac % step >= step / 2 {
            shown += 1;
        }
        if shown == 10u128.pow(DISPLAY_DECIMALS) {
            whole += 1;
            shown = 0;
        }

        let grouped = group_thousands(whole);
        if shown == 0 {
            return grouped;
        }
        let digits = format!("{:0width$}", shown, width = DISPLAY_DECIMALS as usize);
        format!("{}.{}", grouped, digits.trim_end_matches('0'))
    }
}

fn group_thousands(value: u128) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

impl fmt::Debug for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenAmount({})", self.to_decimal_string())
    }
}

impl FromStr for TokenAmount {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_units(s)
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_decimal_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse_units(&s).map_err(serde::de::Error::custom)
    }
}
