//! Core type definitions for the signaling protocol.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-chosen identifier correlating one camera with one dashboard.
///
/// Opaque to the relay: no format is imposed and matching is exact and
/// case-sensitive.
pub type Pin = String;

/// The two fixed roles a connection can register as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Media producer. Registers a pin and originates the offer.
    Camera,
    /// Media consumer. Joins a pin and originates the answer.
    Dashboard,
}

impl Role {
    /// The opposite side of the pairing.
    #[must_use]
    pub const fn peer(self) -> Self {
        match self {
            Self::Camera => Self::Dashboard,
            Self::Dashboard => Self::Camera,
        }
    }

    /// Lowercase label used in logs and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::Dashboard => "dashboard",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
