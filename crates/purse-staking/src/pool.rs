// crates/purse-staking/src/pool.rs
//
// Base-tier staking pool.
//
// Depositors hand over PURSE principal and receive receipt shares at the
// pool exchange rate (`total_principal / total_receipt_shares`, 1:1 on
// bootstrap). A RewardAccumulator mutualizes the feed's emission across
// shareholders; each account's reward is settled lazily into
// `claimable_reward` whenever its share balance changes and is paid only
// through the Treasury. Withdrawn principal is locked in the VestingLedger
// and stays in the pool's custody until swept.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use purse_core::error::LedgerError;
use purse_core::event::{EventLog, LedgerEvent};
use purse_core::math;
use purse_core::{Address, Asset, Bank, Timestamp};

use crate::accumulator::{Injection, RewardAccumulator};
use crate::feed::RewardSink;
use crate::vesting::{VestingLedger, VestingSource};

/// Per-account state inside a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub receipt_shares: u64,
    pub prev_cumulative_reward_per_share: u128,
    /// Settled, unpaid reward. Only grows, except for a full-zeroing claim.
    pub claimable_reward: u64,
    /// Lifetime reward paid out (informational).
    pub total_claimed: u64,
}

/// Static wiring of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub address: Address,
    pub owner: Address,
    pub feed: Address,
    pub treasury: Address,
    pub lock_period: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakingPool {
    pub(crate) address: Address,
    pub(crate) owner: Address,
    pub(crate) feed: Address,
    pub(crate) treasury: Address,
    pub(crate) total_principal: u64,
    pub(crate) total_receipt_shares: u64,
    pub(crate) total_locked_amount: u64,
    pub(crate) lock_period: u64,
    pub(crate) accumulator: RewardAccumulator,
    pub(crate) users: BTreeMap<Address, UserInfo>,
}

impl StakingPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            address: config.address,
            owner: config.owner,
            feed: config.feed,
            treasury: config.treasury,
            total_principal: 0,
            total_receipt_shares: 0,
            total_locked_amount: 0,
            lock_period: config.lock_period,
            accumulator: RewardAccumulator::new(),
            users: BTreeMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn feed(&self) -> Address {
        self.feed
    }

    pub fn treasury(&self) -> Address {
        self.treasury
    }

    pub fn total_principal(&self) -> u64 {
        self.total_principal
    }

    pub fn total_receipt_shares(&self) -> u64 {
        self.total_receipt_shares
    }

    pub fn total_locked_amount(&self) -> u64 {
        self.total_locked_amount
    }

    pub fn lock_period(&self) -> u64 {
        self.lock_period
    }

    pub fn accumulator(&self) -> &RewardAccumulator {
        &self.accumulator
    }

    pub fn user_info(&self, account: &Address) -> UserInfo {
        self.users.get(account).copied().unwrap_or_default()
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &UserInfo)> {
        self.users.iter()
    }

    /// Pool-held PURSE not reserved for vesting schedules.
    pub fn available_supply(&self, bank: &Bank) -> Result<u64, LedgerError> {
        math::sub(
            bank.balance(Asset::Purse, &self.address),
            self.total_locked_amount,
            "available supply",
        )
    }

    /// Base-asset value of `account`'s receipt shares at the current rate.
    pub fn principal_of(&self, account: &Address) -> Result<u64, LedgerError> {
        self.shares_to_principal(self.user_info(account).receipt_shares)
    }

    fn shares_to_principal(&self, shares: u64) -> Result<u64, LedgerError> {
        if self.total_receipt_shares == 0 {
            return Ok(0);
        }
        math::mul_div(shares, self.total_principal, self.total_receipt_shares, "shares to principal")
    }

    /// Account state with reward accrued up to the current accumulator value
    /// moved into `claimable_reward` and the snapshot refreshed. Pure.
    fn settled(&self, account: &Address) -> Result<UserInfo, LedgerError> {
        let mut info = self.user_info(account);
        let accrued = self
            .accumulator
            .accrued_since(info.receipt_shares, info.prev_cumulative_reward_per_share)?;
        info.claimable_reward = math::add(info.claimable_reward, accrued, "claimable reward")?;
        info.prev_cumulative_reward_per_share = self.accumulator.value();
        if accrued > 0 {
            tracing::debug!(account = %account.short(), accrued, "pool: settled reward");
        }
        Ok(info)
    }

    /// Stored plus unsettled reward of `account`. Pure.
    pub fn preview_claimable(&self, account: &Address) -> Result<u64, LedgerError> {
        Ok(self.settled(account)?.claimable_reward)
    }

    /// Like `preview_claimable`, but against a hypothetical accumulator
    /// value (used to project a pending feed emission).
    pub fn preview_claimable_with(&self, account: &Address, cumulative: u128) -> Result<u64, LedgerError> {
        let info = self.user_info(account);
        let accrued = math::accrued_reward(
            info.receipt_shares,
            info.prev_cumulative_reward_per_share,
            cumulative.max(self.accumulator.value()),
        )?;
        math::add(info.claimable_reward, accrued, "claimable reward")
    }

    /// Deposit `amount` PURSE from `account` and mint receipt shares.
    ///
    /// Returns the number of shares minted.
    ///
    /// # Errors
    /// - `InvalidArgument` on a zero account, zero amount, or a deposit too
    ///   small to mint a single share.
    /// - `InsufficientBalance` if `account` holds less than `amount`.
    pub fn deposit(
        &mut self,
        bank: &mut Bank,
        events: &mut EventLog,
        account: Address,
        amount: u64,
    ) -> Result<u64, LedgerError> {
        account.ensure_nonzero("depositor")?;
        if amount == 0 {
            return Err(LedgerError::InvalidArgument("StakingPool: cannot deposit 0".to_string()));
        }
        bank.ensure_balance(Asset::Purse, &account, amount)?;

        let minted = if self.total_receipt_shares == 0 {
            amount
        } else {
            math::mul_div(amount, self.total_receipt_shares, self.total_principal, "shares minted")?
        };
        if minted == 0 {
            return Err(LedgerError::InvalidArgument(format!(
                "StakingPool: deposit of {} mints no shares",
                amount
            )));
        }

        let mut info = self.settled(&account)?;
        info.receipt_shares = math::add(info.receipt_shares, minted, "receipt shares")?;
        let total_principal = math::add(self.total_principal, amount, "total principal")?;
        let total_shares = math::add(self.total_receipt_shares, minted, "total receipt shares")?;

        self.users.insert(account, info);
        self.total_principal = total_principal;
        self.total_receipt_shares = total_shares;
        bank.transfer(Asset::Purse, &account, &self.address, amount)?;

        events.emit(LedgerEvent::Deposited {
            pool: self.address,
            account,
            amount,
            shares_minted: minted,
            account_shares: info.receipt_shares,
            total_principal,
            total_shares,
        });
        Ok(minted)
    }

    /// Burn `shares` of `account` and lock the returned principal in
    /// `vesting` until `now + lock_period`.
    ///
    /// Returns the principal locked. Reward accrued so far stays claimable.
    ///
    /// # Errors
    /// - `InvalidArgument` on zero shares or a zero principal result.
    /// - `InsufficientBalance` if `account` holds fewer than `shares`.
    /// - Anything `VestingLedger::lock` returns.
    pub fn withdraw(
        &mut self,
        vesting: &mut VestingLedger,
        events: &mut EventLog,
        account: Address,
        shares: u64,
        now: Timestamp,
    ) -> Result<u64, LedgerError> {
        account.ensure_nonzero("withdrawer")?;
        if shares == 0 {
            return Err(LedgerError::InvalidArgument("StakingPool: cannot withdraw 0".to_string()));
        }
        let mut info = self.settled(&account)?;
        if info.receipt_shares < shares {
            return Err(LedgerError::InsufficientBalance(format!(
                "StakingPool: {} holds {} shares, {} requested",
                account.short(),
                info.receipt_shares,
                shares
            )));
        }

        let principal = self.shares_to_principal(shares)?;
        if principal == 0 {
            return Err(LedgerError::InvalidArgument(format!(
                "StakingPool: {} shares redeem for nothing",
                shares
            )));
        }
        info.receipt_shares -= shares;
        let total_principal = math::sub(self.total_principal, principal, "total principal")?;
        let total_shares = math::sub(self.total_receipt_shares, shares, "total receipt shares")?;
        let total_locked = math::add(self.total_locked_amount, principal, "total locked")?;
        let unlock_time = math::add(now, self.lock_period, "unlock time")?;

        vesting.lock(events, self.address, account, principal, now, unlock_time)?;

        self.users.insert(account, info);
        self.total_principal = total_principal;
        self.total_receipt_shares = total_shares;
        self.total_locked_amount = total_locked;

        events.emit(LedgerEvent::Withdrawn {
            pool: self.address,
            account,
            shares_burned: shares,
            principal,
            unlock_time,
            total_principal,
            total_locked,
        });
        Ok(principal)
    }

    /// Move receipt shares between accounts, settling both sides first.
    ///
    /// # Errors
    /// `InvalidArgument` on a zero recipient, zero shares, or self-transfer;
    /// `InsufficientBalance` if `from` holds fewer than `shares`.
    pub fn transfer_shares(
        &mut self,
        events: &mut EventLog,
        from: Address,
        to: Address,
        shares: u64,
    ) -> Result<(), LedgerError> {
        to.ensure_nonzero("share recipient")?;
        if shares == 0 {
            return Err(LedgerError::InvalidArgument("StakingPool: cannot transfer 0 shares".to_string()));
        }
        if from == to {
            return Err(LedgerError::InvalidArgument("StakingPool: cannot transfer to self".to_string()));
        }
        let mut sender = self.settled(&from)?;
        if sender.receipt_shares < shares {
            return Err(LedgerError::InsufficientBalance(format!(
                "StakingPool: {} holds {} shares, {} requested",
                from.short(),
                sender.receipt_shares,
                shares
            )));
        }
        let mut recipient = self.settled(&to)?;
        sender.receipt_shares -= shares;
        recipient.receipt_shares = math::add(recipient.receipt_shares, shares, "receipt shares")?;

        self.users.insert(from, sender);
        self.users.insert(to, recipient);
        events.emit(LedgerEvent::SharesTransferred {
            pool: self.address,
            from,
            to,
            shares,
        });
        Ok(())
    }

    /// Settle and zero `account`'s claimable reward on behalf of the
    /// treasury, returning the amount to pay.
    ///
    /// # Errors
    /// `Unauthorized` unless `caller` is the configured treasury.
    pub fn debit_claimable(&mut self, caller: Address, account: Address) -> Result<u64, LedgerError> {
        if caller != self.treasury {
            tracing::warn!(caller = %caller.short(), "pool: rejected claim debit");
            return Err(LedgerError::Unauthorized(
                "StakingPool: only the treasury may debit rewards".to_string(),
            ));
        }
        let mut info = self.settled(&account)?;
        let amount = info.claimable_reward;
        info.total_claimed = math::add(info.total_claimed, amount, "total claimed")?;
        info.claimable_reward = 0;
        self.users.insert(account, info);
        Ok(amount)
    }

    fn ensure_owner(&self, caller: Address, action: &str) -> Result<(), LedgerError> {
        if caller != self.owner {
            tracing::warn!(caller = %caller.short(), action, "pool: rejected admin call");
            return Err(LedgerError::Unauthorized(format!("StakingPool: {} is owner-only", action)));
        }
        Ok(())
    }

    fn config_updated(&self, events: &mut EventLog, field: &str, value: String) {
        events.emit(LedgerEvent::ConfigUpdated {
            component: self.address,
            field: field.to_string(),
            value,
        });
    }

    /// Set the lock period applied to future withdrawals.
    pub fn update_lock_period(
        &mut self,
        events: &mut EventLog,
        caller: Address,
        lock_period: u64,
    ) -> Result<(), LedgerError> {
        self.ensure_owner(caller, "update_lock_period")?;
        self.lock_period = lock_period;
        self.config_updated(events, "lock_period", lock_period.to_string());
        Ok(())
    }

    pub fn update_feed(&mut self, events: &mut EventLog, caller: Address, feed: Address) -> Result<(), LedgerError> {
        self.ensure_owner(caller, "update_feed")?;
        feed.ensure_nonzero("pool feed")?;
        self.feed = feed;
        self.config_updated(events, "feed", feed.to_string());
        Ok(())
    }

    pub fn update_treasury(
        &mut self,
        events: &mut EventLog,
        caller: Address,
        treasury: Address,
    ) -> Result<(), LedgerError> {
        self.ensure_owner(caller, "update_treasury")?;
        treasury.ensure_nonzero("pool treasury")?;
        self.treasury = treasury;
        self.config_updated(events, "treasury", treasury.to_string());
        Ok(())
    }
}

impl RewardSink for StakingPool {
    fn sink_address(&self) -> Address {
        self.address
    }

    fn poke_reward_accumulator(
        &mut self,
        events: &mut EventLog,
        caller: Address,
        amount: u64,
    ) -> Result<Injection, LedgerError> {
        if caller != self.feed {
            tracing::warn!(caller = %caller.short(), "pool: rejected accumulator poke");
            return Err(LedgerError::Unauthorized(
                "StakingPool: only the reward feed may poke the accumulator".to_string(),
            ));
        }
        let injection = self.accumulator.inject(amount, self.total_receipt_shares)?;
        events.emit(LedgerEvent::RewardInjected {
            target: self.address,
            amount,
            distributed: injection.distributed,
            buffered: injection.buffered,
            cumulative_reward_per_share: injection.cumulative_reward_per_share,
        });
        Ok(injection)
    }
}

impl VestingSource for StakingPool {
    fn custodian(&self) -> Address {
        self.address
    }

    fn release(&mut self, bank: &mut Bank, to: &Address, amount: u64) -> Result<(), LedgerError> {
        let locked = self.total_locked_amount.checked_sub(amount).ok_or_else(|| {
            LedgerError::InsufficientBalance(format!(
                "StakingPool: release of {} exceeds locked {}",
                amount, self.total_locked_amount
            ))
        })?;
        bank.transfer(Asset::Purse, &self.address, to, amount)?;
        self.total_locked_amount = locked;
        Ok(())
    }
}
