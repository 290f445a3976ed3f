// crates/purse-vault/src/lib.rs
//
// purse-vault: The compounding vault tier of the Purse ledger.
//
// A CompoundingVault holds base-pool receipt shares on behalf of its
// depositors, harvests and reinvests the base reward, skims fees, streams a
// second reward token, and routes exits through its own vesting ledger.
// VaultSystem composes it with the base StakingSystem behind atomic entry
// points.

pub mod system;
pub mod vault;

pub use system::{Unstaked, VaultParams, VaultSystem, DEFAULT_MIN_COMPOUND_AMOUNT};
pub use vault::{CompoundingVault, VaultConfig, VaultFees, VaultInfo, VaultUserInfo, VaultWiring};
