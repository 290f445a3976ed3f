// crates/purse-staking/src/vesting.rs
//
// Time-locked disbursement schedules.
//
// Withdrawn funds do not leave the system immediately. The owning component
// (the authority) locks them into a per-owner FIFO queue of schedules, each
// unlocking in full at `end_time`. Sweeping releases every due schedule from
// the front of the queue and pays the owner out of the authority's custody.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use purse_core::error::LedgerError;
use purse_core::event::{EventLog, LedgerEvent};
use purse_core::math;
use purse_core::{Address, Bank, Timestamp};

/// Custodian of the funds a vesting ledger releases.
///
/// The staking pool and the compounding vault both hold the tokens behind
/// their ledger's schedules and track how much of their balance is locked.
pub trait VestingSource {
    /// Address holding the locked tokens.
    fn custodian(&self) -> Address;

    /// Pay `amount` of locked funds to `to` and reduce the locked total.
    ///
    /// # Errors
    /// `InsufficientBalance` if the locked total or the custodian's balance
    /// is short. Nothing is mutated on error.
    fn release(&mut self, bank: &mut Bank, to: &Address, amount: u64) -> Result<(), LedgerError>;
}

/// One locked disbursement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VestingSchedule {
    pub owner: Address,
    pub amount: u64,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
}

impl VestingSchedule {
    pub fn is_due(&self, now: Timestamp) -> bool {
        self.end_time <= now
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VestingLedger {
    address: Address,
    owner: Address,
    authority: Address,
    schedules: BTreeMap<Address, VecDeque<VestingSchedule>>,
    escrowed: BTreeMap<Address, u64>,
    vested: BTreeMap<Address, u64>,
    total_escrowed: u64,
}

impl VestingLedger {
    /// `owner` administers the ledger; `authority` is the only component
    /// allowed to lock schedules and the one whose custody pays them out.
    pub fn new(address: Address, owner: Address, authority: Address) -> Self {
        Self {
            address,
            owner,
            authority,
            schedules: BTreeMap::new(),
            escrowed: BTreeMap::new(),
            vested: BTreeMap::new(),
            total_escrowed: 0,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn authority(&self) -> Address {
        self.authority
    }

    pub fn num_schedules(&self, owner: &Address) -> usize {
        self.schedules.get(owner).map(VecDeque::len).unwrap_or(0)
    }

    /// Schedule at `index` in `owner`'s queue, oldest first.
    pub fn schedule_at(&self, owner: &Address, index: usize) -> Option<&VestingSchedule> {
        self.schedules.get(owner).and_then(|queue| queue.get(index))
    }

    pub fn schedules(&self, owner: &Address) -> impl Iterator<Item = &VestingSchedule> {
        self.schedules.get(owner).into_iter().flatten()
    }

    pub fn escrowed_balance(&self, owner: &Address) -> u64 {
        self.escrowed.get(owner).copied().unwrap_or(0)
    }

    pub fn vested_balance(&self, owner: &Address) -> u64 {
        self.vested.get(owner).copied().unwrap_or(0)
    }

    /// Sum of every outstanding schedule across all owners.
    pub fn total_escrowed(&self) -> u64 {
        self.total_escrowed
    }

    /// Amount a sweep at `now` would release for `owner`, with the number
    /// of schedules involved.
    pub fn due(&self, owner: &Address, now: Timestamp) -> Result<(u64, usize), LedgerError> {
        let mut amount = 0u64;
        let mut count = 0usize;
        for schedule in self.schedules(owner) {
            if !schedule.is_due(now) {
                break;
            }
            amount = math::add(amount, schedule.amount, "due amount")?;
            count += 1;
        }
        Ok((amount, count))
    }

    /// Append a schedule for `owner`.
    ///
    /// # Errors
    /// - `Unauthorized` unless `caller` is the authority.
    /// - `InvalidArgument` on a zero owner, zero amount, or `end < start`.
    pub fn lock(
        &mut self,
        events: &mut EventLog,
        caller: Address,
        owner: Address,
        amount: u64,
        start_time: Timestamp,
        end_time: Timestamp,
    ) -> Result<(), LedgerError> {
        if caller != self.authority {
            tracing::warn!(caller = %caller.short(), "vesting: rejected lock");
            return Err(LedgerError::Unauthorized(
                "VestingLedger: only the owning pool may lock".to_string(),
            ));
        }
        owner.ensure_nonzero("vesting owner")?;
        if amount == 0 {
            return Err(LedgerError::InvalidArgument(
                "VestingLedger: cannot lock zero".to_string(),
            ));
        }
        if end_time < start_time {
            return Err(LedgerError::InvalidArgument(format!(
                "VestingLedger: end {} precedes start {}",
                end_time, start_time
            )));
        }

        let escrowed = math::add(self.escrowed_balance(&owner), amount, "escrowed balance")?;
        let total = math::add(self.total_escrowed, amount, "total escrowed")?;

        self.schedules.entry(owner).or_default().push_back(VestingSchedule {
            owner,
            amount,
            start_time,
            end_time,
        });
        self.escrowed.insert(owner, escrowed);
        self.total_escrowed = total;

        events.emit(LedgerEvent::ScheduleLocked {
            ledger: self.address,
            owner,
            amount,
            start_time,
            end_time,
            escrowed,
        });
        Ok(())
    }

    /// Release every due schedule of `owner`, oldest first, paying out of
    /// `source`'s custody. Stops at the first schedule that is not yet due.
    ///
    /// # Errors
    /// - `Unauthorized` if `source` is not this ledger's authority.
    /// - `NothingToDo` if no schedule is due.
    /// - `InsufficientBalance` from `source.release`.
    pub fn sweep<S: VestingSource>(
        &mut self,
        source: &mut S,
        bank: &mut Bank,
        events: &mut EventLog,
        owner: Address,
        now: Timestamp,
    ) -> Result<u64, LedgerError> {
        if source.custodian() != self.authority {
            return Err(LedgerError::Unauthorized(format!(
                "VestingLedger: {} is not the owning pool",
                source.custodian().short()
            )));
        }
        let (amount, count) = self.due(&owner, now)?;
        if amount == 0 {
            return Err(LedgerError::NothingToDo("No tokens to vest".to_string()));
        }

        let escrowed = math::sub(self.escrowed_balance(&owner), amount, "escrowed balance")?;
        let vested = math::add(self.vested_balance(&owner), amount, "vested balance")?;
        let total = math::sub(self.total_escrowed, amount, "total escrowed")?;

        source.release(bank, &owner, amount)?;

        if let Some(queue) = self.schedules.get_mut(&owner) {
            queue.drain(..count);
            if queue.is_empty() {
                self.schedules.remove(&owner);
            }
        }
        self.escrowed.insert(owner, escrowed);
        self.vested.insert(owner, vested);
        self.total_escrowed = total;

        events.emit(LedgerEvent::SchedulesVested {
            ledger: self.address,
            owner,
            amount,
            schedules: count as u64,
            escrowed,
            vested,
        });
        Ok(amount)
    }

    /// Repoint the ledger at a new owning component.
    ///
    /// # Errors
    /// `Unauthorized` unless `caller` is the ledger owner; `InvalidArgument`
    /// on the zero address.
    pub fn update_authority(
        &mut self,
        events: &mut EventLog,
        caller: Address,
        authority: Address,
    ) -> Result<(), LedgerError> {
        if caller != self.owner {
            return Err(LedgerError::Unauthorized(
                "VestingLedger: caller is not the owner".to_string(),
            ));
        }
        authority.ensure_nonzero("vesting authority")?;
        self.authority = authority;
        events.emit(LedgerEvent::ConfigUpdated {
            component: self.address,
            field: "authority".to_string(),
            value: authority.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use purse_core::{Asset, ErrorKind};

    struct Custody {
        address: Address,
        locked: u64,
    }

    impl VestingSource for Custody {
        fn custodian(&self) -> Address {
            self.address
        }

        fn release(&mut self, bank: &mut Bank, to: &Address, amount: u64) -> Result<(), LedgerError> {
            if self.locked < amount {
                return Err(LedgerError::InsufficientBalance("locked".to_string()));
            }
            bank.transfer(Asset::Purse, &self.address, to, amount)?;
            self.locked -= amount;
            Ok(())
        }
    }

    fn setup() -> (VestingLedger, Custody, Bank, EventLog) {
        let pool = Address::from_label("pool");
        let ledger = VestingLedger::new(Address::from_label("vesting"), Address::from_label("admin"), pool);
        let mut bank = Bank::new();
        bank.credit(Asset::Purse, &pool, 1_000).unwrap();
        (ledger, Custody { address: pool, locked: 1_000 }, bank, EventLog::new())
    }

    fn alice() -> Address {
        Address::from_label("alice")
    }

    #[test]
    fn test_lock_appends_and_escrows() {
        let (mut ledger, custody, _bank, mut events) = setup();
        ledger.lock(&mut events, custody.address, alice(), 300, 0, 100).unwrap();
        ledger.lock(&mut events, custody.address, alice(), 200, 10, 110).unwrap();
        assert_eq!(ledger.num_schedules(&alice()), 2);
        assert_eq!(ledger.escrowed_balance(&alice()), 500);
        assert_eq!(ledger.schedule_at(&alice(), 1).unwrap().end_time, 110);
        assert_eq!(ledger.total_escrowed(), 500);
    }

    #[test]
    fn test_lock_rejects_non_authority() {
        let (mut ledger, _custody, _bank, mut events) = setup();
        let err = ledger.lock(&mut events, alice(), alice(), 1, 0, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(ledger.num_schedules(&alice()), 0);
    }

    #[test]
    fn test_sweep_before_due_is_nothing_to_do() {
        let (mut ledger, mut custody, mut bank, mut events) = setup();
        ledger.lock(&mut events, custody.address, alice(), 300, 0, 100).unwrap();
        let err = ledger.sweep(&mut custody, &mut bank, &mut events, alice(), 99).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NothingToDo);
        assert_eq!(ledger.escrowed_balance(&alice()), 300);
    }

    #[test]
    fn test_sweep_releases_due_prefix_only() {
        let (mut ledger, mut custody, mut bank, mut events) = setup();
        ledger.lock(&mut events, custody.address, alice(), 300, 0, 100).unwrap();
        ledger.lock(&mut events, custody.address, alice(), 200, 0, 200).unwrap();
        let paid = ledger.sweep(&mut custody, &mut bank, &mut events, alice(), 150).unwrap();
        assert_eq!(paid, 300);
        assert_eq!(bank.balance(Asset::Purse, &alice()), 300);
        assert_eq!(ledger.num_schedules(&alice()), 1);
        assert_eq!(ledger.escrowed_balance(&alice()), 200);
        assert_eq!(ledger.vested_balance(&alice()), 300);
        assert_eq!(custody.locked, 700);
    }

    #[test]
    fn test_sweep_stops_at_first_pending_schedule() {
        let (mut ledger, mut custody, mut bank, mut events) = setup();
        // Queue order is insertion order; a later-inserted earlier end time
        // waits behind the pending head.
        ledger.lock(&mut events, custody.address, alice(), 100, 0, 500).unwrap();
        ledger.lock(&mut events, custody.address, alice(), 50, 0, 10).unwrap();
        let err = ledger.sweep(&mut custody, &mut bank, &mut events, alice(), 20).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NothingToDo);
    }

    #[test]
    fn test_sweep_with_short_custody_leaves_state() {
        let (mut ledger, _custody, mut bank, mut events) = setup();
        let pool = Address::from_label("pool");
        ledger.lock(&mut events, pool, alice(), 300, 0, 100).unwrap();
        let mut short = Custody { address: pool, locked: 10 };
        let before = ledger.clone();
        let err = ledger.sweep(&mut short, &mut bank, &mut events, alice(), 100).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_sweep_rejects_foreign_custodian() {
        let (mut ledger, custody, mut bank, mut events) = setup();
        ledger.lock(&mut events, custody.address, alice(), 300, 0, 100).unwrap();
        let mut other = Custody { address: alice(), locked: 300 };
        let err = ledger.sweep(&mut other, &mut bank, &mut events, alice(), 100).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn test_update_authority_owner_only() {
        let (mut ledger, _custody, _bank, mut events) = setup();
        assert!(ledger.update_authority(&mut events, alice(), alice()).is_err());
        let admin = Address::from_label("admin");
        ledger.update_authority(&mut events, admin, alice()).unwrap();
        assert_eq!(ledger.authority(), alice());
    }
}
