//! Routed views of the registry front end.

use std::fmt;

use crate::id::EntityId;

/// A view and the data it needs from the URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// `/` - property submission
    Submit,
    /// `/properties` - properties awaiting validation
    Properties,
    /// `/request-validation`
    RequestValidation,
    /// `/validation/:propertyId`
    Validation(EntityId),
}

impl Route {
    /// Match a path. Unknown paths and malformed ids give `None`.
    pub fn parse(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = path.trim_end_matches('/');

        match trimmed {
            "" => Some(Self::Submit),
            "/properties" => Some(Self::Properties),
            "/request-validation" => Some(Self::RequestValidation),
            _ => {
                let id = trimmed.strip_prefix("/validation/")?;
                id.parse().ok().map(Self::Validation)
            }
        }
    }

    pub fn path(&self) -> String {
        match self {
            Self::Submit => "/".to_string(),
            Self::Properties => "/properties".to_string(),
            Self::RequestValidation => "/request-validation".to_string(),
            Self::Validation(id) => format!("/validation/{id}"),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}
