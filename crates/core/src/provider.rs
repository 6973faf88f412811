//! The directory providers whose pipelines this service drives.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the postal data providers a sorting directory is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Provider {
    /// USPS-style directories; periods carry a cycle code.
    SmartMatch,
    Parascript,
    RoyalMail,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown provider: {0}")]
pub struct UnknownProvider(pub String);

impl Provider {
    /// All providers, in the order they appear in status snapshots.
    pub const ALL: [Provider; 3] = [Provider::SmartMatch, Provider::Parascript, Provider::RoyalMail];

    /// Wire name, as used in client commands and snapshots.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::SmartMatch => "SmartMatch",
            Provider::Parascript => "Parascript",
            Provider::RoyalMail => "RoyalMail",
        }
    }

    /// Whether this provider's periods include a cycle code.
    pub fn has_cycle(&self) -> bool {
        matches!(self, Provider::SmartMatch)
    }

    /// Prefix of this provider's persisted tables.
    pub(crate) fn table_prefix(&self) -> &'static str {
        match self {
            Provider::SmartMatch => "smartmatch",
            Provider::Parascript => "parascript",
            Provider::RoyalMail => "royalmail",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownProvider(s.to_string()))
    }
}
