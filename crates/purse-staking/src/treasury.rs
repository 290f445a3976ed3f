// crates/purse-staking/src/treasury.rs
//
// Account-facing payout gate for base-tier rewards.
//
// The Treasury holds the PURSE that backs reward claims. A claim reads the
// pool's settled reward for the account, zeroes it in the pool, and pays
// from the treasury balance. It never short-pays: an underfunded treasury
// rejects the claim and the reward stays claimable.

use serde::{Deserialize, Serialize};

use purse_core::error::LedgerError;
use purse_core::event::{EventLog, LedgerEvent};
use purse_core::math;
use purse_core::{Address, Asset, Bank};

use crate::pool::StakingPool;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Treasury {
    address: Address,
    owner: Address,
    pool: Address,
    paused: bool,
    total_paid: u64,
}

impl Treasury {
    pub fn new(address: Address, owner: Address, pool: Address) -> Self {
        Self {
            address,
            owner,
            pool,
            paused: false,
            total_paid: 0,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn pool(&self) -> Address {
        self.pool
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn total_paid(&self) -> u64 {
        self.total_paid
    }

    pub fn balance(&self, bank: &Bank) -> u64 {
        bank.balance(Asset::Purse, &self.address)
    }

    /// Pay `account` its settled pool reward.
    ///
    /// Returns the amount paid.
    ///
    /// # Errors
    /// - `InvalidArgument` on the zero address or a pool other than the
    ///   configured one.
    /// - `Paused` while paused.
    /// - `NothingToDo` when nothing is owed.
    /// - `InsufficientBalance` when the treasury cannot cover the claim.
    pub fn claim(
        &mut self,
        pool: &mut StakingPool,
        bank: &mut Bank,
        events: &mut EventLog,
        account: Address,
    ) -> Result<u64, LedgerError> {
        if account.is_zero() {
            return Err(LedgerError::InvalidArgument("Treasury: zero address".to_string()));
        }
        if self.paused {
            return Err(LedgerError::Paused("Pausable: paused".to_string()));
        }
        if pool.address() != self.pool {
            return Err(LedgerError::InvalidArgument(format!(
                "Treasury: {} is not the configured pool",
                pool.address().short()
            )));
        }

        let amount = pool.preview_claimable(&account)?;
        if amount == 0 {
            return Err(LedgerError::NothingToDo(
                "user does not have available rewards".to_string(),
            ));
        }
        bank.ensure_balance(Asset::Purse, &self.address, amount)?;
        let total_paid = math::add(self.total_paid, amount, "treasury total paid")?;

        let debited = pool.debit_claimable(self.address, account)?;
        bank.transfer(Asset::Purse, &self.address, &account, debited)?;
        self.total_paid = total_paid;

        events.emit(LedgerEvent::RewardClaimed {
            payer: self.address,
            account,
            asset: Asset::Purse,
            amount: debited,
            payer_balance: self.balance(bank),
        });
        Ok(debited)
    }

    /// Top up the treasury from `from`.
    ///
    /// # Errors
    /// `InvalidArgument` on zero amount, `InsufficientBalance` if `from` is short.
    pub fn fund(&mut self, bank: &mut Bank, events: &mut EventLog, from: Address, amount: u64) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidArgument("Treasury: zero amount".to_string()));
        }
        bank.transfer(Asset::Purse, &from, &self.address, amount)?;
        events.emit(LedgerEvent::Funded {
            recipient: self.address,
            from,
            asset: Asset::Purse,
            amount,
            balance: self.balance(bank),
        });
        Ok(())
    }

    fn ensure_owner(&self, caller: Address, action: &str) -> Result<(), LedgerError> {
        if caller != self.owner {
            tracing::warn!(caller = %caller.short(), action, "treasury: rejected admin call");
            return Err(LedgerError::Unauthorized(format!("Treasury: {} is owner-only", action)));
        }
        Ok(())
    }

    /// Send stray tokens held by the treasury to `to`.
    ///
    /// # Errors
    /// `Unauthorized` for non-owners; `InvalidArgument` on a zero address or
    /// zero amount; `InsufficientBalance` beyond the held balance.
    pub fn recover_token(
        &mut self,
        bank: &mut Bank,
        events: &mut EventLog,
        caller: Address,
        asset: Asset,
        to: Address,
        amount: u64,
    ) -> Result<(), LedgerError> {
        self.ensure_owner(caller, "recover_token")?;
        if to.is_zero() {
            return Err(LedgerError::InvalidArgument("Treasury: zero address".to_string()));
        }
        if amount == 0 {
            return Err(LedgerError::InvalidArgument("Treasury: zero amount".to_string()));
        }
        if bank.balance(asset, &self.address) < amount {
            return Err(LedgerError::InsufficientBalance("Not enough balance".to_string()));
        }
        bank.transfer(asset, &self.address, &to, amount)?;
        events.emit(LedgerEvent::TokenRecovered {
            component: self.address,
            asset,
            to,
            amount,
        });
        Ok(())
    }

    pub fn pause(&mut self, events: &mut EventLog, caller: Address) -> Result<(), LedgerError> {
        self.ensure_owner(caller, "pause")?;
        if self.paused {
            return Err(LedgerError::Paused("Pausable: paused".to_string()));
        }
        self.paused = true;
        events.emit(LedgerEvent::PauseChanged {
            component: self.address,
            paused: true,
        });
        Ok(())
    }

    pub fn unpause(&mut self, events: &mut EventLog, caller: Address) -> Result<(), LedgerError> {
        self.ensure_owner(caller, "unpause")?;
        if !self.paused {
            return Err(LedgerError::InvalidArgument("Pausable: not paused".to_string()));
        }
        self.paused = false;
        events.emit(LedgerEvent::PauseChanged {
            component: self.address,
            paused: false,
        });
        Ok(())
    }

    /// Repoint the treasury at another pool.
    pub fn update_pool(&mut self, events: &mut EventLog, caller: Address, pool: Address) -> Result<(), LedgerError> {
        self.ensure_owner(caller, "update_pool")?;
        pool.ensure_nonzero("treasury pool")?;
        self.pool = pool;
        events.emit(LedgerEvent::ConfigUpdated {
            component: self.address,
            field: "pool".to_string(),
            value: pool.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::RewardSink;
    use crate::pool::PoolConfig;
    use purse_core::ErrorKind;

    struct Fixture {
        treasury: Treasury,
        pool: StakingPool,
        bank: Bank,
        events: EventLog,
    }

    fn alice() -> Address {
        Address::from_label("alice")
    }

    fn owner() -> Address {
        Address::from_label("owner")
    }

    /// Alice holds 1000 shares and has 10 reward accrued.
    fn fixture(treasury_funds: u64) -> Fixture {
        let treasury_addr = Address::from_label("treasury");
        let config = PoolConfig {
            address: Address::from_label("pool"),
            owner: owner(),
            feed: Address::from_label("feed"),
            treasury: treasury_addr,
            lock_period: 100,
        };
        let mut f = Fixture {
            treasury: Treasury::new(treasury_addr, owner(), config.address),
            pool: StakingPool::new(config),
            bank: Bank::new(),
            events: EventLog::new(),
        };
        f.bank.credit(Asset::Purse, &alice(), 1_000).unwrap();
        if treasury_funds > 0 {
            f.bank.credit(Asset::Purse, &treasury_addr, treasury_funds).unwrap();
        }
        f.pool.deposit(&mut f.bank, &mut f.events, alice(), 1_000).unwrap();
        f.pool.poke_reward_accumulator(&mut f.events, config.feed, 10).unwrap();
        f
    }

    #[test]
    fn test_claim_pays_and_zeroes() {
        let mut f = fixture(100);
        let paid = f.treasury.claim(&mut f.pool, &mut f.bank, &mut f.events, alice()).unwrap();
        assert_eq!(paid, 10);
        assert_eq!(f.bank.balance(Asset::Purse, &alice()), 10);
        assert_eq!(f.treasury.balance(&f.bank), 90);
        assert_eq!(f.pool.preview_claimable(&alice()).unwrap(), 0);
        assert_eq!(f.treasury.total_paid(), 10);
    }

    #[test]
    fn test_second_claim_is_nothing_to_do() {
        let mut f = fixture(100);
        f.treasury.claim(&mut f.pool, &mut f.bank, &mut f.events, alice()).unwrap();
        let err = f.treasury.claim(&mut f.pool, &mut f.bank, &mut f.events, alice()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NothingToDo);
    }

    #[test]
    fn test_underfunded_claim_never_short_pays() {
        let mut f = fixture(5);
        let err = f.treasury.claim(&mut f.pool, &mut f.bank, &mut f.events, alice()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
        assert_eq!(f.pool.preview_claimable(&alice()).unwrap(), 10);
        assert_eq!(f.treasury.balance(&f.bank), 5);
    }

    #[test]
    fn test_claim_zero_address_and_pause() {
        let mut f = fixture(100);
        let err = f
            .treasury
            .claim(&mut f.pool, &mut f.bank, &mut f.events, Address::ZERO)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        f.treasury.pause(&mut f.events, owner()).unwrap();
        let err = f.treasury.claim(&mut f.pool, &mut f.bank, &mut f.events, alice()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Paused);
        f.treasury.unpause(&mut f.events, owner()).unwrap();
        assert!(f.treasury.claim(&mut f.pool, &mut f.bank, &mut f.events, alice()).is_ok());
    }

    #[test]
    fn test_recover_token_checks() {
        let mut f = fixture(100);
        let to = Address::from_label("ops");
        let err = f
            .treasury
            .recover_token(&mut f.bank, &mut f.events, alice(), Asset::Purse, to, 1)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        let err = f
            .treasury
            .recover_token(&mut f.bank, &mut f.events, owner(), Asset::Purse, to, 101)
            .unwrap_err();
        assert_eq!(err, LedgerError::InsufficientBalance("Not enough balance".to_string()));
        f.treasury
            .recover_token(&mut f.bank, &mut f.events, owner(), Asset::Purse, to, 60)
            .unwrap();
        assert_eq!(f.bank.balance(Asset::Purse, &to), 60);
    }

    #[test]
    fn test_fund_increases_balance() {
        let mut f = fixture(0);
        let donor = Address::from_label("donor");
        f.bank.credit(Asset::Purse, &donor, 50).unwrap();
        f.treasury.fund(&mut f.bank, &mut f.events, donor, 50).unwrap();
        assert_eq!(f.treasury.balance(&f.bank), 50);
    }

    #[test]
    fn test_repointed_treasury_rejects_old_pool() {
        let mut f = fixture(100);
        f.treasury
            .update_pool(&mut f.events, owner(), Address::from_label("pool-v2"))
            .unwrap();
        let err = f.treasury.claim(&mut f.pool, &mut f.bank, &mut f.events, alice()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
