// crates/purse-core/src/bank.rs
//
// Token custody for the ledger.
//
// The Bank is the only place where token balances live. Pools, treasuries,
// vesting ledgers, and vaults are just addresses in it, so "the pool holds
// 500 PURSE" means `bank.balance(Asset::Purse, pool.address()) == 500`.
// Transfers are all-or-nothing and are always the last step of an entry
// point.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::error::LedgerError;
use crate::math;

/// Assets tracked by the Bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Asset {
    /// The base staking token. Principal and base-tier rewards.
    Purse,
    /// The vault's second-layer incentive token.
    VaultReward,
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Asset::Purse => write!(f, "PURSE"),
            Asset::VaultReward => write!(f, "VREWARD"),
        }
    }
}

/// Per-asset, per-address balances.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bank {
    balances: BTreeMap<(Asset, Address), u64>,
    supply: BTreeMap<Asset, u64>,
}

impl Bank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, asset: Asset, owner: &Address) -> u64 {
        self.balances.get(&(asset, *owner)).copied().unwrap_or(0)
    }

    /// Total units of `asset` that have entered the ledger via `credit`.
    pub fn supply(&self, asset: Asset) -> u64 {
        self.supply.get(&asset).copied().unwrap_or(0)
    }

    /// Bring external funds into the ledger (bridge-in / faucet).
    ///
    /// # Errors
    /// `InvalidArgument` on a zero recipient or zero amount.
    pub fn credit(&mut self, asset: Asset, to: &Address, amount: u64) -> Result<(), LedgerError> {
        to.ensure_nonzero("credit recipient")?;
        if amount == 0 {
            return Err(LedgerError::InvalidArgument("credit amount is zero".to_string()));
        }
        let new_balance = math::add(self.balance(asset, to), amount, "credit balance")?;
        let new_supply = math::add(self.supply(asset), amount, "credit supply")?;
        self.balances.insert((asset, *to), new_balance);
        self.supply.insert(asset, new_supply);
        Ok(())
    }

    /// Returns `InsufficientBalance` unless `owner` holds at least `amount`.
    pub fn ensure_balance(&self, asset: Asset, owner: &Address, amount: u64) -> Result<(), LedgerError> {
        let have = self.balance(asset, owner);
        if have < amount {
            return Err(LedgerError::InsufficientBalance(format!(
                "{} holds {} {} but {} is required",
                owner.short(),
                have,
                asset,
                amount
            )));
        }
        Ok(())
    }

    /// Move `amount` of `asset` from `from` to `to`.
    ///
    /// # Errors
    /// - `InvalidArgument` if `to` is the zero address.
    /// - `InsufficientBalance` if `from` holds less than `amount`.
    pub fn transfer(
        &mut self,
        asset: Asset,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), LedgerError> {
        to.ensure_nonzero("transfer recipient")?;
        self.ensure_balance(asset, from, amount)?;
        if amount == 0 || from == to {
            return Ok(());
        }
        let from_after = self.balance(asset, from) - amount;
        let to_after = math::add(self.balance(asset, to), amount, "transfer balance")?;
        self.balances.insert((asset, *from), from_after);
        self.balances.insert((asset, *to), to_after);
        Ok(())
    }
}
