// crates/purse-core/src/address.rs
//
// Account and component identifiers.
//
// An Address is a 20-byte opaque identifier. Users, pools, ledgers, and
// treasuries all live in the same address space so that custody in the
// Bank is uniform. The all-zero address is reserved and rejected by every
// entry point that takes a recipient.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::LedgerError;

/// A 20-byte account identifier, displayed as `0x`-prefixed lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The reserved zero address.
    pub const ZERO: Address = Address([0u8; 20]);

    /// Derive a stable address from a human-readable label.
    ///
    /// Takes the first 20 bytes of `SHA-256(label)`. Used by the simulator
    /// and tests to name accounts ("alice", "pool", ...).
    pub fn from_label(label: &str) -> Self {
        let digest = Sha256::digest(label.as_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[..20]);
        Address(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Returns `InvalidArgument` if this is the zero address.
    pub fn ensure_nonzero(&self, what: &str) -> Result<(), LedgerError> {
        if self.is_zero() {
            return Err(LedgerError::InvalidArgument(format!(
                "{} cannot be the zero address",
                what
            )));
        }
        Ok(())
    }

    /// First four bytes in hex, for compact log lines.
    pub fn short(&self) -> String {
        format!("0x{}", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let raw = hex::decode(trimmed)
            .map_err(|e| LedgerError::InvalidArgument(format!("bad address {}: {}", s, e)))?;
        let bytes: [u8; 20] = raw.try_into().map_err(|v: Vec<u8>| {
            LedgerError::InvalidArgument(format!(
                "address must be 20 bytes, got {} bytes",
                v.len()
            ))
        })?;
        Ok(Address(bytes))
    }
}

// Addresses serialize as hex strings so they can key JSON maps.
impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_str(&s).map_err(serde::de::Error::custom)
    }
}
