// crates/purse-vault/src/system.rs
//
// The compounding vault composed over the base tier.
//
// VaultSystem owns a StakingSystem (and through it the shared Bank and event
// log), the CompoundingVault books, the vault's own VestingLedger, and the
// RewardFeed driving the vault reward token. Each entry point is atomic: on
// error the whole two-tier state, base included, is restored. Both tiers
// share the base clock, so `now` may not move backwards across either.
//
// Exits are two-legged. Unstaking withdraws the vault's base shares into a
// base vesting schedule under the vault's address and records linked
// schedules in the vault ledger: one for the user (principal minus the
// withdrawal fee) and one for the vault treasury (the fee). Sweeping a vault
// schedule first sweeps the vault's due base schedules into vault custody.

use purse_core::error::{ErrorKind, LedgerError};
use purse_core::event::{EventLog, LedgerEvent};
use purse_core::math;
use purse_core::{Address, Asset, Bank, Timestamp};
use purse_staking::{RewardFeed, StakingParams, StakingSystem, VestingLedger};

use crate::vault::{CompoundingVault, VaultConfig, VaultFees, VaultInfo, VaultWiring};

/// Minimum pending reward before a stake triggers a compound.
pub const DEFAULT_MIN_COMPOUND_AMOUNT: u64 = 500;

/// Everything needed to stand up both tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultParams {
    pub base: StakingParams,
    pub wiring: VaultWiring,
    pub vesting: Address,
    pub fees: VaultFees,
    pub config: VaultConfig,
    pub reward_rate: u64,
}

impl VaultParams {
    /// Base and vault component addresses derived from `prefix`.
    pub fn labelled(prefix: &str, owner: Address, governor: Address) -> Self {
        let label = |name: &str| Address::from_label(&format!("{}/{}", prefix, name));
        let base = StakingParams::labelled(prefix, owner, governor);
        Self {
            base,
            wiring: VaultWiring {
                address: label("vault"),
                owner,
                governor,
                reward_feed: label("vault-feed"),
                treasury: label("vault-treasury"),
            },
            vesting: label("vault-vesting"),
            fees: VaultFees::default(),
            config: VaultConfig {
                min_compound_amount: DEFAULT_MIN_COMPOUND_AMOUNT,
                cap_stake_amount: u64::MAX,
                vest_duration: base.lock_period,
            },
            reward_rate: 0,
        }
    }
}

/// Outcome of an unstake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unstaked {
    /// Base receipt shares redeemed.
    pub assets: u64,
    /// PURSE locked in the base schedule.
    pub principal: u64,
    pub withdrawal_fee: u64,
    /// PURSE locked for the user in the vault schedule.
    pub user_amount: u64,
    pub unlock_time: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultSystem {
    base: StakingSystem,
    vault: CompoundingVault,
    vesting: VestingLedger,
    reward_feed: RewardFeed,
}

impl VaultSystem {
    /// # Errors
    /// `InvalidArgument` if the fee schedule is invalid.
    pub fn new(params: VaultParams) -> Result<Self, LedgerError> {
        let wiring = params.wiring;
        Ok(Self {
            base: StakingSystem::new(params.base),
            vault: CompoundingVault::new(wiring, params.fees, params.config)?,
            vesting: VestingLedger::new(params.vesting, wiring.owner, wiring.address),
            reward_feed: RewardFeed::new(
                wiring.reward_feed,
                wiring.governor,
                wiring.address,
                params.reward_rate,
                params.base.start_time,
            ),
        })
    }

    pub fn base(&self) -> &StakingSystem {
        &self.base
    }

    /// The base tier, for direct (non-vault) staking. Its entry points are
    /// atomic on their own.
    pub fn base_mut(&mut self) -> &mut StakingSystem {
        &mut self.base
    }

    pub fn vault(&self) -> &CompoundingVault {
        &self.vault
    }

    pub fn vesting(&self) -> &VestingLedger {
        &self.vesting
    }

    pub fn reward_feed(&self) -> &RewardFeed {
        &self.reward_feed
    }

    pub fn bank(&self) -> &Bank {
        self.base.bank()
    }

    pub fn events(&self) -> &EventLog {
        self.base.events()
    }

    pub fn vault_info(&self) -> VaultInfo {
        self.vault.vault_info()
    }

    /// Run `f` atomically over both tiers.
    pub fn transact<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let base = self.base.checkpoint();
        let vault = self.vault.clone();
        let vesting = self.vesting.clone();
        let reward_feed = self.reward_feed.clone();
        match f(self) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::debug!(error = %e, "vault: call rolled back");
                self.base.rollback(base);
                self.vault = vault;
                self.vesting = vesting;
                self.reward_feed = reward_feed;
                Err(e)
            }
        }
    }

    fn poke_reward_feed(&mut self, now: Timestamp) -> Result<u64, LedgerError> {
        self.base.advance_clock(now)?;
        let caller = self.vault.address();
        let (_, events) = self.base.custody_mut();
        self.reward_feed.distribute(&mut self.vault, events, caller, now)
    }

    /// Harvest the vault's base reward and reinvest it.
    ///
    /// Auto-compounds (`strict == false`) skip a harvest the base treasury
    /// cannot currently pay instead of failing the enclosing stake/unstake.
    fn compound_inner(&mut self, caller: Address, now: Timestamp, strict: bool) -> Result<u64, LedgerError> {
        caller.ensure_nonzero("compounder")?;
        let vault_addr = self.vault.address();
        let harvested = match self.base.claim(vault_addr, now) {
            Ok(amount) => amount,
            Err(e)
                if !strict
                    && matches!(
                        e.kind(),
                        ErrorKind::NothingToDo | ErrorKind::InsufficientBalance | ErrorKind::Paused
                    ) =>
            {
                tracing::warn!(error = %e, "vault: auto-compound skipped");
                return Ok(0);
            }
            Err(e) => return Err(e),
        };

        let fees = self.vault.fees();
        let reward_fee = math::bips_of(harvested, fees.fee_on_reward)?;
        let compounder_fee = math::bips_of(harvested, fees.fee_on_compounder)?;
        let reinvested = math::sub(
            math::sub(harvested, reward_fee, "reinvestment")?,
            compounder_fee,
            "reinvestment",
        )?;

        let treasury = self.vault.treasury();
        {
            let (bank, _) = self.base.custody_mut();
            bank.transfer(Asset::Purse, &vault_addr, &treasury, reward_fee)?;
            bank.transfer(Asset::Purse, &vault_addr, &caller, compounder_fee)?;
        }
        let minted = if reinvested > 0 {
            self.base.deposit(vault_addr, reinvested, now)?
        } else {
            0
        };
        let total_assets = self.vault.reinvest(minted)?;

        let (_, events) = self.base.custody_mut();
        events.emit(LedgerEvent::Compounded {
            vault: vault_addr,
            caller,
            harvested,
            reinvested,
            compounder_fee,
            reward_fee,
            total_assets,
        });
        Ok(harvested)
    }

    /// Hand base shares left behind by the last vault share to the vault
    /// treasury, so the next staker does not mint against them.
    fn release_orphaned_assets(&mut self, now: Timestamp) -> Result<u64, LedgerError> {
        let orphaned = self.vault.take_orphaned_assets();
        if orphaned > 0 {
            tracing::warn!(orphaned, "vault: assets without shares sent to treasury");
            let vault_addr = self.vault.address();
            let treasury = self.vault.treasury();
            self.base.transfer_shares(vault_addr, treasury, orphaned, now)?;
        }
        Ok(orphaned)
    }

    /// Mint vault shares for `assets` base shares already in vault custody,
    /// then pay out any vault reward the reserve covers.
    fn mint_and_pay(&mut self, account: Address, assets: u64, now: Timestamp) -> Result<u64, LedgerError> {
        self.release_orphaned_assets(now)?;
        let (bank, events) = self.base.custody_mut();
        let minted = self.vault.mint(events, account, assets)?;
        self.vault.pay_reward(bank, events, account, false)?;
        Ok(minted)
    }

    /// Compound first if the vault's pending base reward exceeds the
    /// configured minimum.
    fn maybe_compound(&mut self, caller: Address, now: Timestamp, threshold: u64) -> Result<(), LedgerError> {
        let pending = self.base.preview_claimable_at(&self.vault.address(), now)?;
        if pending > threshold {
            self.compound_inner(caller, now, false)?;
        }
        Ok(())
    }

    /// Stake `amount` PURSE: the vault deposits it into the base pool on its
    /// own behalf and mints vault shares for the base shares received.
    ///
    /// # Errors
    /// `Paused`, `InvalidArgument` (zero amount, cap), `InsufficientBalance`,
    /// plus anything the base deposit returns.
    pub fn stake(&mut self, account: Address, amount: u64, now: Timestamp) -> Result<u64, LedgerError> {
        self.transact(|s| {
            s.vault.ensure_not_paused()?;
            account.ensure_nonzero("vault staker")?;
            if amount == 0 {
                return Err(LedgerError::InvalidArgument("StakePurseVault: Cannot stake 0".to_string()));
            }
            s.poke_reward_feed(now)?;
            let threshold = s.vault.config().min_compound_amount;
            s.maybe_compound(account, now, threshold)?;

            let vault_addr = s.vault.address();
            {
                let (bank, _) = s.base.custody_mut();
                bank.transfer(Asset::Purse, &account, &vault_addr, amount)?;
            }
            let base_shares = s.base.deposit(vault_addr, amount, now)?;
            s.mint_and_pay(account, base_shares, now)
        })
    }

    /// Stake base receipt shares `account` already holds.
    pub fn stake_receipt_shares(&mut self, account: Address, shares: u64, now: Timestamp) -> Result<u64, LedgerError> {
        self.transact(|s| {
            s.vault.ensure_not_paused()?;
            if shares == 0 {
                return Err(LedgerError::InvalidArgument("StakePurseVault: Cannot stake 0".to_string()));
            }
            s.poke_reward_feed(now)?;
            let threshold = s.vault.config().min_compound_amount;
            s.maybe_compound(account, now, threshold)?;

            let vault_addr = s.vault.address();
            s.base.transfer_shares(account, vault_addr, shares, now)?;
            s.mint_and_pay(account, shares, now)
        })
    }

    /// Burn vault shares and start the linked vesting schedules.
    ///
    /// # Errors
    /// `Paused`, `InvalidArgument`, `InsufficientBalance`, plus anything the
    /// base withdrawal or the vault ledger returns.
    pub fn unstake(&mut self, account: Address, shares: u64, now: Timestamp) -> Result<Unstaked, LedgerError> {
        self.transact(|s| {
            s.vault.ensure_not_paused()?;
            account.ensure_nonzero("vault unstaker")?;
            s.poke_reward_feed(now)?;
            s.maybe_compound(account, now, 0)?;

            let vault_addr = s.vault.address();
            let assets = s.vault.burn(account, shares)?;
            let base_end = math::add(now, s.base.pool().lock_period(), "base unlock time")?;
            let principal = s.base.withdraw(vault_addr, assets, now)?;

            let withdrawal_fee = math::bips_of(principal, s.vault.fees().fee_on_withdrawal)?;
            let user_amount = math::sub(principal, withdrawal_fee, "user amount")?;
            let vest_end = math::add(now, s.vault.config().vest_duration, "vault unlock time")?;
            let unlock_time = base_end.max(vest_end);
            let treasury = s.vault.treasury();

            {
                let (_, events) = s.base.custody_mut();
                s.vesting.lock(events, vault_addr, account, user_amount, now, unlock_time)?;
                if withdrawal_fee > 0 {
                    s.vesting.lock(events, vault_addr, treasury, withdrawal_fee, now, base_end)?;
                }
            }
            s.vault.lock(principal)?;

            let info = s.vault.vault_info();
            let (bank, events) = s.base.custody_mut();
            events.emit(LedgerEvent::VaultUnstaked {
                vault: vault_addr,
                account,
                shares_burned: shares,
                assets,
                withdrawal_fee,
                user_amount,
                unlock_time,
                total_assets: info.total_assets,
                total_shares: info.total_shares,
            });
            s.vault.pay_reward(bank, events, account, false)?;

            Ok(Unstaked {
                assets,
                principal,
                withdrawal_fee,
                user_amount,
                unlock_time,
            })
        })
    }

    /// Harvest and reinvest the vault's base reward. The caller earns the
    /// compounder fee.
    ///
    /// # Errors
    /// `Paused`; `NothingToDo` when there is nothing to harvest; anything the
    /// base treasury returns.
    pub fn compound(&mut self, caller: Address, now: Timestamp) -> Result<u64, LedgerError> {
        self.transact(|s| {
            s.vault.ensure_not_paused()?;
            s.compound_inner(caller, now, true)
        })
    }

    fn sweep_inner(&mut self, owner: Address, now: Timestamp) -> Result<u64, LedgerError> {
        self.base.advance_clock(now)?;
        let (due, _) = self.vesting.due(&owner, now)?;
        if due == 0 {
            return Err(LedgerError::NothingToDo("No tokens to vest".to_string()));
        }
        let vault_addr = self.vault.address();
        match self.base.sweep(vault_addr, now) {
            Ok(released) => tracing::debug!(released, "vault: pulled base schedules into custody"),
            Err(e) if e.kind() == ErrorKind::NothingToDo => {}
            Err(e) => return Err(e),
        }
        let (bank, events) = self.base.custody_mut();
        self.vesting.sweep(&mut self.vault, bank, events, owner, now)
    }

    /// Release `account`'s due vault schedules.
    pub fn sweep(&mut self, account: Address, now: Timestamp) -> Result<u64, LedgerError> {
        self.transact(|s| s.sweep_inner(account, now))
    }

    /// Move due withdrawal fees into the vault treasury.
    pub fn collect_withdrawal_fees(&mut self, caller: Address, now: Timestamp) -> Result<u64, LedgerError> {
        self.transact(|s| {
            if caller != s.vault.owner() {
                return Err(LedgerError::Unauthorized(
                    "StakePurseVault: collect_withdrawal_fees is owner-only".to_string(),
                ));
            }
            let treasury = s.vault.treasury();
            s.sweep_inner(treasury, now)
        })
    }

    /// Pay `account` its vault reward token balance.
    pub fn claim_rewards(&mut self, account: Address, now: Timestamp) -> Result<u64, LedgerError> {
        self.transact(|s| {
            s.poke_reward_feed(now)?;
            let (bank, events) = s.base.custody_mut();
            s.vault.pay_reward(bank, events, account, true)
        })
    }

    /// Top up the vault reward reserve.
    pub fn fund_rewards(&mut self, from: Address, amount: u64) -> Result<(), LedgerError> {
        self.transact(|s| {
            if amount == 0 {
                return Err(LedgerError::InvalidArgument("StakePurseVault: zero amount".to_string()));
            }
            let vault_addr = s.vault.address();
            let (bank, events) = s.base.custody_mut();
            bank.transfer(Asset::VaultReward, &from, &vault_addr, amount)?;
            events.emit(LedgerEvent::Funded {
                recipient: vault_addr,
                from,
                asset: Asset::VaultReward,
                amount,
                balance: bank.balance(Asset::VaultReward, &vault_addr),
            });
            Ok(())
        })
    }

    /// Vault reward `account` could claim at `now`, including emission the
    /// vault feed has not pushed yet.
    pub fn claimable(&self, account: &Address, now: Timestamp) -> Result<u64, LedgerError> {
        let pending = if self.reward_feed.target() == self.vault.address() {
            self.reward_feed.preview_distribute(now)?
        } else {
            0
        };
        let projected = self.vault.accumulator().projected(pending, self.vault.total_shares())?;
        self.vault.claimable_with(account, projected)
    }

    /// Base assets (receipt shares) `shares` vault shares redeem for now.
    pub fn preview_redeem(&self, shares: u64) -> Result<u64, LedgerError> {
        self.vault.preview_redeem(shares)
    }

    pub fn credit(&mut self, asset: Asset, to: Address, amount: u64) -> Result<(), LedgerError> {
        self.base.credit(asset, to, amount)
    }

    pub fn update_vault_configs(
        &mut self,
        caller: Address,
        min_compound_amount: u64,
        cap_stake_amount: u64,
    ) -> Result<(), LedgerError> {
        self.transact(|s| {
            let (_, events) = s.base.custody_mut();
            s.vault.update_vault_configs(events, caller, min_compound_amount, cap_stake_amount)
        })
    }

    pub fn update_vault_fees(&mut self, caller: Address, fees: VaultFees) -> Result<(), LedgerError> {
        self.transact(|s| {
            let (_, events) = s.base.custody_mut();
            s.vault.update_vault_fees(events, caller, fees)
        })
    }

    pub fn update_vest_duration(&mut self, caller: Address, vest_duration: u64) -> Result<(), LedgerError> {
        self.transact(|s| {
            let (_, events) = s.base.custody_mut();
            s.vault.update_vest_duration(events, caller, vest_duration)
        })
    }

    pub fn pause(&mut self, caller: Address) -> Result<(), LedgerError> {
        self.transact(|s| {
            let (_, events) = s.base.custody_mut();
            s.vault.pause(events, caller)
        })
    }

    pub fn unpause(&mut self, caller: Address) -> Result<(), LedgerError> {
        self.transact(|s| {
            let (_, events) = s.base.custody_mut();
            s.vault.unpause(events, caller)
        })
    }

    pub fn recover_token(&mut self, caller: Address, asset: Asset, to: Address, amount: u64) -> Result<(), LedgerError> {
        self.transact(|s| {
            let (bank, events) = s.base.custody_mut();
            s.vault.recover_token(bank, events, caller, asset, to, amount)
        })
    }

    /// Change the vault reward emission rate (vault governor).
    pub fn set_reward_rate(&mut self, caller: Address, rate: u64, now: Timestamp) -> Result<(), LedgerError> {
        self.transact(|s| {
            s.base.advance_clock(now)?;
            let (_, events) = s.base.custody_mut();
            s.reward_feed.set_rate(&mut s.vault, events, caller, rate, now)
        })
    }

    /// Point the vault's fee payouts at another treasury (vault owner).
    pub fn update_treasury(&mut self, caller: Address, treasury: Address) -> Result<(), LedgerError> {
        self.transact(|s| {
            let (_, events) = s.base.custody_mut();
            s.vault.update_treasury(events, caller, treasury)
        })
    }

    /// Accept accumulator pokes only from `feed` (vault owner).
    pub fn update_reward_feed(&mut self, caller: Address, feed: Address) -> Result<(), LedgerError> {
        self.transact(|s| {
            let (_, events) = s.base.custody_mut();
            s.vault.update_reward_feed(events, caller, feed)
        })
    }

    /// Cross-tier bookkeeping check; one line per violation.
    pub fn audit(&self) -> Vec<String> {
        let mut problems = self.base.audit();
        let vault = &self.vault;

        let share_sum: u128 = vault.accounts().map(|(_, info)| info.shares as u128).sum();
        if share_sum != vault.total_shares() as u128 {
            problems.push(format!(
                "vault shares sum to {} but total is {}",
                share_sum,
                vault.total_shares()
            ));
        }
        let held_base = self.base.user_info(&vault.address()).receipt_shares;
        if held_base < vault.total_assets() {
            problems.push(format!(
                "vault holds {} base shares but reports {} assets",
                held_base,
                vault.total_assets()
            ));
        }
        if self.vesting.total_escrowed() != vault.total_locked() {
            problems.push(format!(
                "vault locks {} but vault vesting escrows {}",
                vault.total_locked(),
                self.vesting.total_escrowed()
            ));
        }
        let custody = self.bank().balance(Asset::Purse, &vault.address()) as u128
            + self.base.vesting().escrowed_balance(&vault.address()) as u128;
        if custody < vault.total_locked() as u128 {
            problems.push(format!(
                "vault custody {} cannot back {} locked",
                custody,
                vault.total_locked()
            ));
        }
        problems
    }
}
