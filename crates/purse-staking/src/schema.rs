// crates/purse-staking/src/schema.rs
//
// Versioned pool snapshots and in-place upgrades.
//
// The pool's storage layout grew in three steps: V1 tracked only principal
// and shares, V2 added reward accounting, V3 added withdrawal locking. A
// snapshot of any version can be migrated forward with explicit
// state-transfer functions and loaded into a StakingPool. Every migration
// step re-validates share conservation so a corrupt snapshot is rejected
// instead of being silently loaded.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use purse_core::error::LedgerError;
use purse_core::math;
use purse_core::Address;

use crate::accumulator::RewardAccumulator;
use crate::pool::{StakingPool, UserInfo};

/// V1: principal and share balances only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStateV1 {
    pub address: Address,
    pub owner: Address,
    pub total_principal: u64,
    pub total_receipt_shares: u64,
    pub shares: BTreeMap<Address, u64>,
}

/// V2: adds the reward accumulator and per-account reward buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStateV2 {
    pub address: Address,
    pub owner: Address,
    pub feed: Address,
    pub treasury: Address,
    pub total_principal: u64,
    pub total_receipt_shares: u64,
    pub accumulator: RewardAccumulator,
    pub accounts: BTreeMap<Address, UserInfo>,
}

/// V3 (current): adds the withdrawal lock period and locked total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStateV3 {
    pub address: Address,
    pub owner: Address,
    pub feed: Address,
    pub treasury: Address,
    pub total_principal: u64,
    pub total_receipt_shares: u64,
    pub total_locked_amount: u64,
    pub lock_period: u64,
    pub accumulator: RewardAccumulator,
    pub accounts: BTreeMap<Address, UserInfo>,
}

/// A snapshot keyed by its layout version (`{"v3": {...}}`).
///
/// Externally tagged: reward-per-share values are u128, which serde cannot
/// buffer for internally tagged enums.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionedPoolState {
    V1(PoolStateV1),
    V2(PoolStateV2),
    V3(PoolStateV3),
}

/// Wiring that older layouts did not store and an upgrade must supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeWiring {
    pub feed: Address,
    pub treasury: Address,
    pub lock_period: u64,
    /// PURSE already escrowed in vesting for this pool.
    pub total_locked: u64,
}

fn check_conservation<'a>(
    version: &str,
    total_principal: u64,
    total_shares: u64,
    balances: impl Iterator<Item = &'a u64>,
) -> Result<(), LedgerError> {
    let mut sum = 0u64;
    for shares in balances {
        sum = math::add(sum, *shares, "snapshot share sum")?;
    }
    if sum != total_shares {
        return Err(LedgerError::InvalidArgument(format!(
            "{} snapshot: account shares sum to {} but total is {}",
            version, sum, total_shares
        )));
    }
    if total_shares == 0 && total_principal != 0 {
        return Err(LedgerError::InvalidArgument(format!(
            "{} snapshot: {} principal backs no shares",
            version, total_principal
        )));
    }
    Ok(())
}

impl PoolStateV1 {
    pub fn validate(&self) -> Result<(), LedgerError> {
        check_conservation("v1", self.total_principal, self.total_receipt_shares, self.shares.values())
    }

    /// V1 had no rewards: every account starts at accumulator zero.
    pub fn upgrade(self, wiring: &UpgradeWiring) -> Result<PoolStateV2, LedgerError> {
        self.validate()?;
        let accounts = self
            .shares
            .into_iter()
            .filter(|(_, shares)| *shares > 0)
            .map(|(account, receipt_shares)| {
                (
                    account,
                    UserInfo {
                        receipt_shares,
                        ..UserInfo::default()
                    },
                )
            })
            .collect();
        Ok(PoolStateV2 {
            address: self.address,
            owner: self.owner,
            feed: wiring.feed,
            treasury: wiring.treasury,
            total_principal: self.total_principal,
            total_receipt_shares: self.total_receipt_shares,
            accumulator: RewardAccumulator::new(),
            accounts,
        })
    }
}

impl PoolStateV2 {
    pub fn validate(&self) -> Result<(), LedgerError> {
        check_conservation(
            "v2",
            self.total_principal,
            self.total_receipt_shares,
            self.accounts.values().map(|info| &info.receipt_shares),
        )?;
        validate_snapshots("v2", &self.accumulator, &self.accounts)
    }

    /// V2 had no locking: the locked total is whatever vesting escrows now.
    pub fn upgrade(self, wiring: &UpgradeWiring) -> Result<PoolStateV3, LedgerError> {
        self.validate()?;
        Ok(PoolStateV3 {
            address: self.address,
            owner: self.owner,
            feed: self.feed,
            treasury: self.treasury,
            total_principal: self.total_principal,
            total_receipt_shares: self.total_receipt_shares,
            total_locked_amount: wiring.total_locked,
            lock_period: wiring.lock_period,
            accumulator: self.accumulator,
            accounts: self.accounts,
        })
    }
}

impl PoolStateV3 {
    pub fn validate(&self) -> Result<(), LedgerError> {
        check_conservation(
            "v3",
            self.total_principal,
            self.total_receipt_shares,
            self.accounts.values().map(|info| &info.receipt_shares),
        )?;
        validate_snapshots("v3", &self.accumulator, &self.accounts)
    }
}

fn validate_snapshots(
    version: &str,
    accumulator: &RewardAccumulator,
    accounts: &BTreeMap<Address, UserInfo>,
) -> Result<(), LedgerError> {
    for (account, info) in accounts {
        if info.prev_cumulative_reward_per_share > accumulator.value() {
            return Err(LedgerError::InvalidArgument(format!(
                "{} snapshot: {} is ahead of the accumulator",
                version,
                account.short()
            )));
        }
    }
    Ok(())
}

impl VersionedPoolState {
    pub fn version(&self) -> u32 {
        match self {
            VersionedPoolState::V1(_) => 1,
            VersionedPoolState::V2(_) => 2,
            VersionedPoolState::V3(_) => 3,
        }
    }

    /// Bring the snapshot up to the current layout.
    ///
    /// # Errors
    /// `InvalidArgument` if any intermediate layout fails validation.
    pub fn migrate(self, wiring: &UpgradeWiring) -> Result<PoolStateV3, LedgerError> {
        let from = self.version();
        let state = match self {
            VersionedPoolState::V1(v1) => v1.upgrade(wiring)?.upgrade(wiring)?,
            VersionedPoolState::V2(v2) => v2.upgrade(wiring)?,
            VersionedPoolState::V3(v3) => v3,
        };
        state.validate()?;
        if from < 3 {
            tracing::info!(pool = %state.address.short(), from, to = 3, "migrated pool snapshot");
        }
        Ok(state)
    }

    pub fn to_json(&self) -> Result<String, LedgerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, LedgerError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl StakingPool {
    /// Snapshot the pool in the current layout.
    pub fn export_state(&self) -> VersionedPoolState {
        VersionedPoolState::V3(PoolStateV3 {
            address: self.address,
            owner: self.owner,
            feed: self.feed,
            treasury: self.treasury,
            total_principal: self.total_principal,
            total_receipt_shares: self.total_receipt_shares,
            total_locked_amount: self.total_locked_amount,
            lock_period: self.lock_period,
            accumulator: self.accumulator.clone(),
            accounts: self.users.clone(),
        })
    }

    /// Build a pool from a snapshot of any supported version.
    ///
    /// # Errors
    /// `InvalidArgument` if the snapshot fails validation.
    pub fn import_state(state: VersionedPoolState, wiring: &UpgradeWiring) -> Result<Self, LedgerError> {
        let v3 = state.migrate(wiring)?;
        Ok(Self {
            address: v3.address,
            owner: v3.owner,
            feed: v3.feed,
            treasury: v3.treasury,
            total_principal: v3.total_principal,
            total_receipt_shares: v3.total_receipt_shares,
            total_locked_amount: v3.total_locked_amount,
            lock_period: v3.lock_period,
            accumulator: v3.accumulator,
            users: v3.accounts,
        })
    }
}
