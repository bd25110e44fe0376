//! Registry status codes and their user-facing projections

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw status code stored by the ledger for a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// 0: never submitted
    Unset,
    /// 1: awaiting validation
    Pending,
    /// 2: validated
    Validated,
    /// 3 and above
    Rejected,
}

impl RecordStatus {
    /// Total mapping from the ledger's code
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::Unset,
            1 => Self::Pending,
            2 => Self::Validated,
            _ => Self::Rejected,
        }
    }

    /// List-view status. Codes 0 and 1 both read as pending.
    pub fn display_status(&self) -> DisplayStatus {
        match self {
            Self::Unset | Self::Pending => DisplayStatus::Pending,
            Self::Validated => DisplayStatus::Validated,
            Self::Rejected => DisplayStatus::Rejected,
        }
    }
}

/// Label used on the validation detail page.
///
/// Works on the raw code: only 3 is "Rejected" here, unlike the list view.
pub fn detail_label(code: u8) -> &'static str {
    match code {
        1 => "Pending Validation",
        2 => "Approved",
        3 => "Rejected",
        _ => "Unknown",
    }
}

/// Status shown in the property list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisplayStatus {
    Pending,
    Validated,
    Rejected,
}

impl DisplayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Validated => "Validated",
            Self::Rejected => "Rejected",
        }
    }
}

impl fmt::Display for DisplayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
