// crates/purse-core/src/lib.rs
//
// purse-core: Core types for the Purse staking ledger.
//
// This is the leaf crate that every other crate in the workspace depends on.
// It defines account addresses, the token custody Bank, checked fixed-point
// math, the error taxonomy, and the structured event log.

pub mod address;
pub mod bank;
pub mod error;
pub mod event;
pub mod math;

// Re-export key types for ergonomic access from downstream crates.
pub use address::Address;
pub use bank::{Asset, Bank};
pub use error::{ErrorKind, LedgerError};
pub use event::{EventLog, LedgerEvent};
pub use math::{Amount, Timestamp, BIPS_DIVISOR, REWARD_PRECISION};
