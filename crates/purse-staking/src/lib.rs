// crates/purse-staking/src/lib.rs
//
// purse-staking: The base staking tier of the Purse ledger.
//
// Depositors stake PURSE into a StakingPool for reward-bearing receipt
// shares. A RewardFeed streams emission into the pool's RewardAccumulator,
// the Treasury pays settled rewards, and withdrawn principal vests through
// the VestingLedger. StakingSystem wires the pieces together behind atomic
// entry points.

pub mod accumulator;
pub mod feed;
pub mod pool;
pub mod schema;
pub mod system;
pub mod treasury;
pub mod vesting;

pub use accumulator::{Injection, RewardAccumulator};
pub use feed::{RewardFeed, RewardSink};
pub use pool::{PoolConfig, StakingPool, UserInfo};
pub use schema::{UpgradeWiring, VersionedPoolState};
pub use system::{Checkpoint, StakingParams, StakingSystem, DEFAULT_LOCK_PERIOD};
pub use treasury::Treasury;
pub use vesting::{VestingLedger, VestingSchedule, VestingSource};
