// crates/purse-staking/src/system.rs
//
// The base tier wired together.
//
// StakingSystem owns the Bank, the event log, and one of each base
// component. Every public entry point runs inside `transact`, which restores
// the pre-call state on any error, so a call either commits in full or is
// not observable at all. Account-facing entry points poke the reward feed
// first so that settlement always sees an up-to-date accumulator. Calls
// that take `now` may not move the system clock backwards.

use purse_core::error::LedgerError;
use purse_core::event::{EventLog, LedgerEvent};
use purse_core::{Address, Asset, Bank, Timestamp};

use crate::feed::RewardFeed;
use crate::pool::{PoolConfig, StakingPool, UserInfo};
use crate::schema::{UpgradeWiring, VersionedPoolState};
use crate::treasury::Treasury;
use crate::vesting::VestingLedger;

/// Default withdrawal lock: 21 days.
pub const DEFAULT_LOCK_PERIOD: u64 = 21 * 24 * 60 * 60;

/// Addresses and parameters for a fresh base tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakingParams {
    pub owner: Address,
    pub governor: Address,
    pub pool: Address,
    pub feed: Address,
    pub vesting: Address,
    pub treasury: Address,
    pub lock_period: u64,
    pub tokens_per_interval: u64,
    pub start_time: Timestamp,
}

impl StakingParams {
    /// Component addresses derived from `prefix` ("purse/pool", ...).
    pub fn labelled(prefix: &str, owner: Address, governor: Address) -> Self {
        let label = |name: &str| Address::from_label(&format!("{}/{}", prefix, name));
        Self {
            owner,
            governor,
            pool: label("pool"),
            feed: label("feed"),
            vesting: label("vesting"),
            treasury: label("treasury"),
            lock_period: DEFAULT_LOCK_PERIOD,
            tokens_per_interval: 0,
            start_time: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakingSystem {
    pub(crate) bank: Bank,
    pub(crate) events: EventLog,
    pub(crate) pool: StakingPool,
    pub(crate) feed: RewardFeed,
    pub(crate) vesting: VestingLedger,
    pub(crate) treasury: Treasury,
    pub(crate) clock: Timestamp,
}

/// Component state captured before a call. The event log is recorded by
/// length only, since a call can only append to it.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    bank: Bank,
    pool: StakingPool,
    feed: RewardFeed,
    vesting: VestingLedger,
    treasury: Treasury,
    clock: Timestamp,
    events_len: usize,
}

impl StakingSystem {
    pub fn new(params: StakingParams) -> Self {
        Self::with_bank(params, Bank::new())
    }

    /// Build the tier around an existing Bank (shared with a vault).
    pub fn with_bank(params: StakingParams, bank: Bank) -> Self {
        let pool = StakingPool::new(PoolConfig {
            address: params.pool,
            owner: params.owner,
            feed: params.feed,
            treasury: params.treasury,
            lock_period: params.lock_period,
        });
        Self {
            bank,
            events: EventLog::new(),
            pool,
            feed: RewardFeed::new(
                params.feed,
                params.governor,
                params.pool,
                params.tokens_per_interval,
                params.start_time,
            ),
            vesting: VestingLedger::new(params.vesting, params.owner, params.pool),
            treasury: Treasury::new(params.treasury, params.owner, params.pool),
            clock: 0,
        }
    }

    pub fn bank(&self) -> &Bank {
        &self.bank
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn pool(&self) -> &StakingPool {
        &self.pool
    }

    pub fn feed(&self) -> &RewardFeed {
        &self.feed
    }

    pub fn vesting(&self) -> &VestingLedger {
        &self.vesting
    }

    pub fn treasury(&self) -> &Treasury {
        &self.treasury
    }

    /// Latest `now` any call has committed with.
    pub fn clock(&self) -> Timestamp {
        self.clock
    }

    /// Record `now` as the current time.
    ///
    /// # Errors
    /// `InvalidArgument` if `now` is earlier than the clock.
    pub fn advance_clock(&mut self, now: Timestamp) -> Result<(), LedgerError> {
        if now < self.clock {
            return Err(LedgerError::InvalidArgument(format!(
                "time cannot move back from {} to {}",
                self.clock, now
            )));
        }
        self.clock = now;
        Ok(())
    }

    /// Custody and event log together, for tiers built on top of this one.
    pub fn custody_mut(&mut self) -> (&mut Bank, &mut EventLog) {
        (&mut self.bank, &mut self.events)
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            bank: self.bank.clone(),
            pool: self.pool.clone(),
            feed: self.feed.clone(),
            vesting: self.vesting.clone(),
            treasury: self.treasury.clone(),
            clock: self.clock,
            events_len: self.events.len(),
        }
    }

    /// Restore the state captured by `checkpoint`, dropping any event
    /// emitted since.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.bank = checkpoint.bank;
        self.pool = checkpoint.pool;
        self.feed = checkpoint.feed;
        self.vesting = checkpoint.vesting;
        self.treasury = checkpoint.treasury;
        self.clock = checkpoint.clock;
        self.events.truncate(checkpoint.events_len);
    }

    /// Run `f` atomically: on error every component, the Bank, and the event
    /// log are restored to their state before the call.
    pub fn transact<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let checkpoint = self.checkpoint();
        match f(self) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::debug!(error = %e, "staking: call rolled back");
                self.rollback(checkpoint);
                Err(e)
            }
        }
    }

    fn poke_feed(&mut self, now: Timestamp) -> Result<u64, LedgerError> {
        self.advance_clock(now)?;
        let caller = self.pool.address();
        self.feed.distribute(&mut self.pool, &mut self.events, caller, now)
    }

    /// Bring external PURSE (or vault reward tokens) into the ledger.
    pub fn credit(&mut self, asset: Asset, to: Address, amount: u64) -> Result<(), LedgerError> {
        self.transact(|s| {
            s.bank.credit(asset, &to, amount)?;
            s.events.emit(LedgerEvent::Funded {
                recipient: to,
                from: Address::ZERO,
                asset,
                amount,
                balance: s.bank.balance(asset, &to),
            });
            Ok(())
        })
    }

    /// Deposit principal, returning receipt shares minted.
    pub fn deposit(&mut self, account: Address, amount: u64, now: Timestamp) -> Result<u64, LedgerError> {
        self.transact(|s| {
            s.poke_feed(now)?;
            s.pool.deposit(&mut s.bank, &mut s.events, account, amount)
        })
    }

    /// Withdraw receipt shares into a vesting schedule, returning principal.
    pub fn withdraw(&mut self, account: Address, shares: u64, now: Timestamp) -> Result<u64, LedgerError> {
        self.transact(|s| {
            s.poke_feed(now)?;
            s.pool.withdraw(&mut s.vesting, &mut s.events, account, shares, now)
        })
    }

    pub fn transfer_shares(
        &mut self,
        from: Address,
        to: Address,
        shares: u64,
        now: Timestamp,
    ) -> Result<(), LedgerError> {
        self.transact(|s| {
            s.poke_feed(now)?;
            s.pool.transfer_shares(&mut s.events, from, to, shares)
        })
    }

    /// Explicit feed poke by the pool or the governor.
    pub fn distribute(&mut self, caller: Address, now: Timestamp) -> Result<u64, LedgerError> {
        self.transact(|s| {
            s.advance_clock(now)?;
            s.feed.distribute(&mut s.pool, &mut s.events, caller, now)
        })
    }

    pub fn set_rate(&mut self, caller: Address, rate: u64, now: Timestamp) -> Result<(), LedgerError> {
        self.transact(|s| {
            s.advance_clock(now)?;
            s.feed.set_rate(&mut s.pool, &mut s.events, caller, rate, now)
        })
    }

    pub fn update_last_distribution_time(
        &mut self,
        caller: Address,
        timestamp: Timestamp,
    ) -> Result<(), LedgerError> {
        self.transact(|s| s.feed.update_last_distribution_time(&mut s.events, caller, timestamp))
    }

    /// Release `account`'s due vesting schedules.
    pub fn sweep(&mut self, account: Address, now: Timestamp) -> Result<u64, LedgerError> {
        self.transact(|s| {
            s.advance_clock(now)?;
            s.vesting.sweep(&mut s.pool, &mut s.bank, &mut s.events, account, now)
        })
    }

    /// Pay `account` its base reward through the treasury.
    pub fn claim(&mut self, account: Address, now: Timestamp) -> Result<u64, LedgerError> {
        self.transact(|s| {
            s.poke_feed(now)?;
            s.treasury.claim(&mut s.pool, &mut s.bank, &mut s.events, account)
        })
    }

    pub fn fund_treasury(&mut self, from: Address, amount: u64) -> Result<(), LedgerError> {
        self.transact(|s| s.treasury.fund(&mut s.bank, &mut s.events, from, amount))
    }

    pub fn pause_treasury(&mut self, caller: Address) -> Result<(), LedgerError> {
        self.transact(|s| s.treasury.pause(&mut s.events, caller))
    }

    pub fn unpause_treasury(&mut self, caller: Address) -> Result<(), LedgerError> {
        self.transact(|s| s.treasury.unpause(&mut s.events, caller))
    }

    pub fn recover_treasury_token(
        &mut self,
        caller: Address,
        asset: Asset,
        to: Address,
        amount: u64,
    ) -> Result<(), LedgerError> {
        self.transact(|s| s.treasury.recover_token(&mut s.bank, &mut s.events, caller, asset, to, amount))
    }

    pub fn update_lock_period(&mut self, caller: Address, lock_period: u64) -> Result<(), LedgerError> {
        self.transact(|s| s.pool.update_lock_period(&mut s.events, caller, lock_period))
    }

    /// Stored plus unsettled reward, as of the last feed poke.
    pub fn preview_claimable(&self, account: &Address) -> Result<u64, LedgerError> {
        self.pool.preview_claimable(account)
    }

    /// Reward `account` could claim at `now`, including the emission the
    /// feed has not pushed yet.
    pub fn preview_claimable_at(&self, account: &Address, now: Timestamp) -> Result<u64, LedgerError> {
        if self.feed.target() != self.pool.address() {
            return self.pool.preview_claimable(account);
        }
        let pending = self.feed.preview_distribute(now)?;
        let projected = self
            .pool
            .accumulator()
            .projected(pending, self.pool.total_receipt_shares())?;
        self.pool.preview_claimable_with(account, projected)
    }

    pub fn user_info(&self, account: &Address) -> UserInfo {
        self.pool.user_info(account)
    }

    pub fn available_supply(&self) -> Result<u64, LedgerError> {
        self.pool.available_supply(&self.bank)
    }

    pub fn export_pool_state(&self) -> VersionedPoolState {
        self.pool.export_state()
    }

    /// Replace the pool with a (possibly older) snapshot.
    ///
    /// # Errors
    /// - `Unauthorized` unless `caller` owns the pool.
    /// - `InvalidArgument` if the snapshot is for another pool, fails
    ///   validation, disagrees with the vesting escrow, or is not backed
    ///   by the pool's custody.
    ///
    /// Layouts older than V3 take their locked total from the escrow.
    pub fn import_pool_state(&mut self, caller: Address, state: VersionedPoolState) -> Result<(), LedgerError> {
        self.transact(|s| {
            if caller != s.pool.owner() {
                return Err(LedgerError::Unauthorized(
                    "StakingPool: import_state is owner-only".to_string(),
                ));
            }
            let wiring = UpgradeWiring {
                feed: s.feed.address(),
                treasury: s.treasury.address(),
                lock_period: s.pool.lock_period(),
                total_locked: s.vesting.total_escrowed(),
            };
            let pool = StakingPool::import_state(state, &wiring)?;
            if pool.address() != s.pool.address() {
                return Err(LedgerError::InvalidArgument(format!(
                    "snapshot is for pool {}, not {}",
                    pool.address().short(),
                    s.pool.address().short()
                )));
            }
            if pool.total_locked_amount() != s.vesting.total_escrowed() {
                return Err(LedgerError::InvalidArgument(format!(
                    "snapshot locks {} PURSE but vesting escrows {}",
                    pool.total_locked_amount(),
                    s.vesting.total_escrowed()
                )));
            }
            let backing = purse_core::math::add(pool.total_principal(), pool.total_locked_amount(), "pool backing")?;
            let held = s.bank.balance(Asset::Purse, &pool.address());
            if held < backing {
                return Err(LedgerError::InvalidArgument(format!(
                    "snapshot needs {} PURSE in custody, pool holds {}",
                    backing, held
                )));
            }
            s.pool = pool;
            s.events.emit(LedgerEvent::ConfigUpdated {
                component: s.pool.address(),
                field: "state".to_string(),
                value: "imported".to_string(),
            });
            Ok(())
        })
    }

    /// Check the cross-component bookkeeping. Returns one line per
    /// violation; empty when consistent.
    pub fn audit(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let pool = &self.pool;

        let share_sum: u128 = pool.accounts().map(|(_, info)| info.receipt_shares as u128).sum();
        if share_sum != pool.total_receipt_shares() as u128 {
            problems.push(format!(
                "account shares sum to {} but pool total is {}",
                share_sum,
                pool.total_receipt_shares()
            ));
        }
        if pool.total_locked_amount() != self.vesting.total_escrowed() {
            problems.push(format!(
                "pool locks {} but vesting escrows {}",
                pool.total_locked_amount(),
                self.vesting.total_escrowed()
            ));
        }
        let backing = pool.total_principal() as u128 + pool.total_locked_amount() as u128;
        let held = self.bank.balance(Asset::Purse, &pool.address()) as u128;
        if held < backing {
            problems.push(format!("pool holds {} PURSE but owes {}", held, backing));
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use purse_core::ErrorKind;

    fn alice() -> Address {
        Address::from_label("alice")
    }

    fn bob() -> Address {
        Address::from_label("bob")
    }

    fn owner() -> Address {
        Address::from_label("owner")
    }

    fn system(rate: u64, lock: u64) -> StakingSystem {
        let mut params = StakingParams::labelled("test", owner(), owner());
        params.tokens_per_interval = rate;
        params.lock_period = lock;
        let mut sys = StakingSystem::new(params);
        sys.credit(Asset::Purse, alice(), 10_000).unwrap();
        sys.credit(Asset::Purse, bob(), 10_000).unwrap();
        let treasury = sys.treasury().address();
        sys.credit(Asset::Purse, treasury, 1_000_000).unwrap();
        sys
    }

    #[test]
    fn test_failed_call_is_not_observable() {
        let mut sys = system(10, 100);
        sys.deposit(alice(), 1_000, 0).unwrap();
        let before = sys.clone();
        // The feed poke succeeds, then the withdraw fails: the poke is undone.
        let err = sys.withdraw(alice(), 5_000, 50).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
        assert_eq!(sys, before);
    }

    #[test]
    fn test_deposit_distributes_before_minting() {
        let mut sys = system(1, 100);
        sys.deposit(alice(), 1_000, 0).unwrap();
        sys.deposit(bob(), 1_000, 10).unwrap();
        assert_eq!(sys.preview_claimable(&alice()).unwrap(), 10);
        assert_eq!(sys.preview_claimable(&bob()).unwrap(), 0);
    }

    #[test]
    fn test_preview_at_projects_pending_emission() {
        let mut sys = system(10, 100);
        sys.deposit(alice(), 1_000, 0).unwrap();
        assert_eq!(sys.preview_claimable(&alice()).unwrap(), 0);
        assert_eq!(sys.preview_claimable_at(&alice(), 3).unwrap(), 30);
        assert_eq!(sys.claim(alice(), 3).unwrap(), 30);
    }

    #[test]
    fn test_claim_then_nothing_to_do() {
        let mut sys = system(10, 100);
        sys.deposit(alice(), 1_000, 0).unwrap();
        sys.claim(alice(), 1).unwrap();
        let err = sys.claim(alice(), 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NothingToDo);
    }

    #[test]
    fn test_audit_clean_after_round_trip() {
        let mut sys = system(10, 100);
        sys.deposit(alice(), 1_000, 0).unwrap();
        sys.withdraw(alice(), 400, 5).unwrap();
        assert!(sys.audit().is_empty());
        sys.sweep(alice(), 105).unwrap();
        assert!(sys.audit().is_empty());
        assert_eq!(sys.bank().balance(Asset::Purse, &alice()), 9_400);
    }

    #[test]
    fn test_import_older_snapshot() {
        let mut sys = system(0, 100);
        sys.deposit(alice(), 700, 0).unwrap();
        let snapshot = sys.export_pool_state();
        assert!(sys.import_pool_state(alice(), snapshot.clone()).is_err());
        sys.import_pool_state(owner(), snapshot).unwrap();
        assert_eq!(sys.user_info(&alice()).receipt_shares, 700);
    }

    #[test]
    fn test_import_rejects_unbacked_snapshot() {
        let mut sys = system(0, 100);
        sys.deposit(alice(), 700, 0).unwrap();
        let mut shares = std::collections::BTreeMap::new();
        shares.insert(alice(), 5_000);
        let v1 = crate::schema::PoolStateV1 {
            address: sys.pool().address(),
            owner: owner(),
            total_principal: 5_000,
            total_receipt_shares: 5_000,
            shares,
        };
        let err = sys
            .import_pool_state(owner(), VersionedPoolState::V1(v1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(sys.user_info(&alice()).receipt_shares, 700);
    }

    #[test]
    fn test_v1_import_keeps_open_schedules_sweepable() {
        let mut sys = system(0, 10);
        sys.deposit(alice(), 1_000, 0).unwrap();
        sys.withdraw(alice(), 400, 0).unwrap();
        let mut shares = std::collections::BTreeMap::new();
        shares.insert(alice(), 600);
        let v1 = crate::schema::PoolStateV1 {
            address: sys.pool().address(),
            owner: owner(),
            total_principal: 600,
            total_receipt_shares: 600,
            shares,
        };
        sys.import_pool_state(owner(), VersionedPoolState::V1(v1)).unwrap();
        assert_eq!(sys.pool().total_locked_amount(), 400);
        assert!(sys.audit().is_empty());

        assert_eq!(sys.sweep(alice(), 10).unwrap(), 400);
        assert_eq!(sys.pool().total_locked_amount(), 0);
        assert_eq!(sys.bank().balance(Asset::Purse, &alice()), 9_400);
        assert!(sys.audit().is_empty());
    }

    #[test]
    fn test_import_rejects_stale_locked_total() {
        let mut sys = system(0, 10);
        sys.deposit(alice(), 1_000, 0).unwrap();
        let stale = sys.export_pool_state();
        sys.withdraw(alice(), 400, 0).unwrap();
        let before = sys.clone();
        let err = sys.import_pool_state(owner(), stale).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(sys, before);
        assert_eq!(sys.sweep(alice(), 10).unwrap(), 400);
    }

    #[test]
    fn test_failed_call_drops_only_its_own_events() {
        let mut sys = system(10, 100);
        sys.deposit(alice(), 1_000, 0).unwrap();
        let committed = sys.events().events().to_vec();
        // The feed poke emits before the withdraw fails.
        assert!(sys.withdraw(alice(), 5_000, 50).is_err());
        assert_eq!(sys.events().events(), committed.as_slice());
        sys.claim(alice(), 50).unwrap();
        assert_eq!(&sys.events().events()[..committed.len()], committed.as_slice());
        assert!(sys.events().len() > committed.len());
    }

    #[test]
    fn test_time_cannot_move_backwards() {
        let mut sys = system(10, 100);
        sys.deposit(alice(), 1_000, 50).unwrap();
        assert_eq!(sys.clock(), 50);
        let before = sys.clone();
        for err in [
            sys.deposit(bob(), 1_000, 10).unwrap_err(),
            sys.withdraw(alice(), 100, 10).unwrap_err(),
            sys.claim(alice(), 49).unwrap_err(),
            sys.sweep(alice(), 10).unwrap_err(),
            sys.distribute(owner(), 10).unwrap_err(),
            sys.set_rate(owner(), 1, 10).unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
        assert_eq!(sys, before);
        // The same instant is fine.
        sys.deposit(bob(), 1_000, 50).unwrap();
    }
}
