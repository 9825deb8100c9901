//! Peer address parsing and display helpers
//!
//! A peer is identified by a ledger address: `0x` followed by 40 hex
//! digits. Addresses are normalised to lowercase on parse so that a
//! checksummed and a plain rendering of the same address never split a
//! conversation in two.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::error::AddressError;

/// Number of hex digits in an address payload (20 bytes)
const ADDRESS_HEX_LEN: usize = 40;

/// A validated, lowercase-normalised peer address
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerAddress(String);

impl PeerAddress {
    /// Parse and validate an address string
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let Some(payload) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) else {
            return Err(AddressError::MissingPrefix(s.to_string()));
        };

        if payload.len() != ADDRESS_HEX_LEN {
            return Err(AddressError::InvalidLength {
                expected: ADDRESS_HEX_LEN,
                actual: payload.len(),
            });
        }

        if hex::decode(payload).is_err() {
            return Err(AddressError::NotHex(s.to_string()));
        }

        Ok(Self(format!("0x{}", payload.to_ascii_lowercase())))
    }

    /// Get the full address string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Truncated display form: `0x1234…abcd`
    pub fn truncate(&self) -> String {
        format!("{}…{}", &self.0[..6], &self.0[self.0.len() - 4..])
    }

    /// Deterministic `#rrggbb` color for this address
    ///
    /// Derived from a hash of the full address, so every client renders
    /// the same peer with the same color.
    pub fn color(&self) -> String {
        let digest = blake3::hash(self.0.as_bytes());
        let rgb = &digest.as_bytes()[..3];
        format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
    }
}

impl Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
