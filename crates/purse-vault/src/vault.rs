// crates/purse-vault/src/vault.rs
//
// Second-tier share accounting.
//
// The vault's asset is base-pool receipt shares. Depositors get vault shares
// at `total_assets / total_shares` (1:1 on bootstrap). Harvested base reward
// is reinvested into `total_assets` without minting vault shares, so the
// exchange rate only grows. A separate reward token (Asset::VaultReward) is
// streamed to vault shareholders through a second RewardAccumulator.
//
// This module holds the vault's own books. Everything that touches the base
// tier is composed in `system.rs`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use purse_core::error::LedgerError;
use purse_core::event::{EventLog, LedgerEvent};
use purse_core::math;
use purse_core::{Address, Asset, Bank, BIPS_DIVISOR};
use purse_staking::{Injection, RewardAccumulator, RewardSink, VestingSource};

/// Fee schedule in basis points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultFees {
    /// Share of harvested reward sent to the vault treasury.
    pub fee_on_reward: u64,
    /// Share of harvested reward paid to whoever triggers the compound.
    pub fee_on_compounder: u64,
    /// Share of withdrawn principal kept by the vault treasury.
    pub fee_on_withdrawal: u64,
}

impl Default for VaultFees {
    fn default() -> Self {
        Self {
            fee_on_reward: 100,
            fee_on_compounder: 500,
            fee_on_withdrawal: 50,
        }
    }
}

impl VaultFees {
    /// # Errors
    /// `InvalidArgument` if the harvest fees exceed 100% combined or the
    /// withdrawal fee would take the whole withdrawal.
    pub fn validate(&self) -> Result<(), LedgerError> {
        let harvest = math::add(self.fee_on_reward, self.fee_on_compounder, "harvest fees")?;
        if harvest > BIPS_DIVISOR {
            return Err(LedgerError::InvalidArgument(format!(
                "StakePurseVault: reward and compounder fees total {} bips",
                harvest
            )));
        }
        if self.fee_on_withdrawal >= BIPS_DIVISOR {
            return Err(LedgerError::InvalidArgument(format!(
                "StakePurseVault: withdrawal fee of {} bips",
                self.fee_on_withdrawal
            )));
        }
        Ok(())
    }
}

/// Tunable vault limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Stake auto-compounds only above this much pending base reward.
    pub min_compound_amount: u64,
    /// Ceiling on `total_assets`.
    pub cap_stake_amount: u64,
    /// Minimum time an unstaked position vests in the vault ledger.
    pub vest_duration: u64,
}

/// Per-account vault state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultUserInfo {
    pub shares: u64,
    pub prev_cumulative_reward_per_share: u128,
    pub claimable_reward: u64,
    pub total_claimed: u64,
}

/// Read-only summary returned by `vault_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VaultInfo {
    pub total_assets: u64,
    pub total_shares: u64,
    pub total_locked: u64,
    pub pending_reward: u64,
    pub cumulative_reward_per_share: u128,
    pub fees: VaultFees,
    pub config: VaultConfig,
    pub paused: bool,
}

/// Wiring for a new vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultWiring {
    pub address: Address,
    pub owner: Address,
    pub governor: Address,
    pub reward_feed: Address,
    pub treasury: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundingVault {
    address: Address,
    owner: Address,
    governor: Address,
    reward_feed: Address,
    treasury: Address,
    total_assets: u64,
    total_shares: u64,
    /// PURSE in vault custody reserved for vault vesting schedules.
    total_locked: u64,
    fees: VaultFees,
    config: VaultConfig,
    paused: bool,
    accumulator: RewardAccumulator,
    users: BTreeMap<Address, VaultUserInfo>,
}

impl CompoundingVault {
    /// # Errors
    /// `InvalidArgument` if `fees` fail validation.
    pub fn new(wiring: VaultWiring, fees: VaultFees, config: VaultConfig) -> Result<Self, LedgerError> {
        fees.validate()?;
        Ok(Self {
            address: wiring.address,
            owner: wiring.owner,
            governor: wiring.governor,
            reward_feed: wiring.reward_feed,
            treasury: wiring.treasury,
            total_assets: 0,
            total_shares: 0,
            total_locked: 0,
            fees,
            config,
            paused: false,
            accumulator: RewardAccumulator::new(),
            users: BTreeMap::new(),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn governor(&self) -> Address {
        self.governor
    }

    pub fn treasury(&self) -> Address {
        self.treasury
    }

    pub fn reward_feed(&self) -> Address {
        self.reward_feed
    }

    pub fn total_assets(&self) -> u64 {
        self.total_assets
    }

    pub fn total_shares(&self) -> u64 {
        self.total_shares
    }

    pub fn total_locked(&self) -> u64 {
        self.total_locked
    }

    pub fn fees(&self) -> VaultFees {
        self.fees
    }

    pub fn config(&self) -> VaultConfig {
        self.config
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn accumulator(&self) -> &RewardAccumulator {
        &self.accumulator
    }

    pub fn user_info(&self, account: &Address) -> VaultUserInfo {
        self.users.get(account).copied().unwrap_or_default()
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &VaultUserInfo)> {
        self.users.iter()
    }

    pub fn vault_info(&self) -> VaultInfo {
        VaultInfo {
            total_assets: self.total_assets,
            total_shares: self.total_shares,
            total_locked: self.total_locked,
            pending_reward: self.accumulator.pending_reward(),
            cumulative_reward_per_share: self.accumulator.value(),
            fees: self.fees,
            config: self.config,
            paused: self.paused,
        }
    }

    pub fn ensure_not_paused(&self) -> Result<(), LedgerError> {
        if self.paused {
            return Err(LedgerError::Paused("Pausable: paused".to_string()));
        }
        Ok(())
    }

    /// Vault shares `assets` would mint at the current rate.
    pub fn convert_to_shares(&self, assets: u64) -> Result<u64, LedgerError> {
        if self.total_shares == 0 || self.total_assets == 0 {
            return Ok(assets);
        }
        math::mul_div(assets, self.total_shares, self.total_assets, "vault shares")
    }

    /// Base receipt shares redeemed by `shares` vault shares.
    pub fn preview_redeem(&self, shares: u64) -> Result<u64, LedgerError> {
        if self.total_shares == 0 {
            return Ok(0);
        }
        math::mul_div(shares, self.total_assets, self.total_shares, "vault assets")
    }

    fn settled(&self, account: &Address) -> Result<VaultUserInfo, LedgerError> {
        let mut info = self.user_info(account);
        let accrued = self
            .accumulator
            .accrued_since(info.shares, info.prev_cumulative_reward_per_share)?;
        info.claimable_reward = math::add(info.claimable_reward, accrued, "vault claimable")?;
        info.prev_cumulative_reward_per_share = self.accumulator.value();
        Ok(info)
    }

    /// Settled plus unsettled vault reward of `account` against a projected
    /// accumulator value.
    pub fn claimable_with(&self, account: &Address, cumulative: u128) -> Result<u64, LedgerError> {
        let info = self.user_info(account);
        let accrued = math::accrued_reward(
            info.shares,
            info.prev_cumulative_reward_per_share,
            cumulative.max(self.accumulator.value()),
        )?;
        math::add(info.claimable_reward, accrued, "vault claimable")
    }

    /// Credit `assets` base shares to the vault and mint vault shares for
    /// `account`. Returns shares minted.
    ///
    /// # Errors
    /// - `InvalidArgument` on zero assets, a cap breach, or a deposit too
    ///   small to mint a share.
    pub fn mint(&mut self, events: &mut EventLog, account: Address, assets: u64) -> Result<u64, LedgerError> {
        account.ensure_nonzero("vault staker")?;
        if assets == 0 {
            return Err(LedgerError::InvalidArgument("StakePurseVault: Cannot stake 0".to_string()));
        }
        let total_assets = math::add(self.total_assets, assets, "vault total assets")?;
        if total_assets > self.config.cap_stake_amount {
            return Err(LedgerError::InvalidArgument(format!(
                "StakePurseVault: stake would raise assets to {} above cap {}",
                total_assets, self.config.cap_stake_amount
            )));
        }
        let minted = self.convert_to_shares(assets)?;
        if minted == 0 {
            return Err(LedgerError::InvalidArgument(format!(
                "StakePurseVault: {} assets mint no shares",
                assets
            )));
        }
        let mut info = self.settled(&account)?;
        info.shares = math::add(info.shares, minted, "vault user shares")?;
        let total_shares = math::add(self.total_shares, minted, "vault total shares")?;

        self.users.insert(account, info);
        self.total_assets = total_assets;
        self.total_shares = total_shares;

        events.emit(LedgerEvent::VaultStaked {
            vault: self.address,
            account,
            assets,
            shares_minted: minted,
            total_assets,
            total_shares,
        });
        Ok(minted)
    }

    /// Burn `shares` of `account`, returning the base shares released.
    ///
    /// # Errors
    /// `InvalidArgument` on zero shares or a zero redemption;
    /// `InsufficientBalance` beyond the account's shares.
    pub fn burn(&mut self, account: Address, shares: u64) -> Result<u64, LedgerError> {
        if shares == 0 {
            return Err(LedgerError::InvalidArgument("StakePurseVault: Cannot unstake 0".to_string()));
        }
        let mut info = self.settled(&account)?;
        if info.shares < shares {
            return Err(LedgerError::InsufficientBalance(format!(
                "StakePurseVault: {} holds {} shares, {} requested",
                account.short(),
                info.shares,
                shares
            )));
        }
        let assets = self.preview_redeem(shares)?;
        if assets == 0 {
            return Err(LedgerError::InvalidArgument(format!(
                "StakePurseVault: {} shares redeem for nothing",
                shares
            )));
        }
        info.shares -= shares;
        let total_shares = math::sub(self.total_shares, shares, "vault total shares")?;
        let total_assets = math::sub(self.total_assets, assets, "vault total assets")?;

        self.users.insert(account, info);
        self.total_shares = total_shares;
        self.total_assets = total_assets;
        Ok(assets)
    }

    /// Add reinvested base shares without minting vault shares.
    pub fn reinvest(&mut self, assets: u64) -> Result<u64, LedgerError> {
        self.total_assets = math::add(self.total_assets, assets, "vault total assets")?;
        Ok(self.total_assets)
    }

    /// Write off the assets left once every vault share is burned (e.g. a
    /// harvest reinvested after the last unstake). Returns the base shares
    /// released, or 0 while shares are outstanding.
    pub fn take_orphaned_assets(&mut self) -> u64 {
        if self.total_shares > 0 {
            return 0;
        }
        std::mem::take(&mut self.total_assets)
    }

    /// Reserve `amount` of vault-held PURSE for vesting schedules.
    pub fn lock(&mut self, amount: u64) -> Result<(), LedgerError> {
        self.total_locked = math::add(self.total_locked, amount, "vault total locked")?;
        Ok(())
    }

    /// Pay `account`'s vault reward from the vault's reward reserve.
    ///
    /// With `strict`, nothing owed is `NothingToDo` and a short reserve is
    /// `InsufficientBalance`. Without it, both cases just settle the reward
    /// and return 0.
    pub fn pay_reward(
        &mut self,
        bank: &mut Bank,
        events: &mut EventLog,
        account: Address,
        strict: bool,
    ) -> Result<u64, LedgerError> {
        let mut info = self.settled(&account)?;
        let amount = info.claimable_reward;
        if amount == 0 {
            if strict {
                return Err(LedgerError::NothingToDo(
                    "user does not have available rewards".to_string(),
                ));
            }
            self.users.insert(account, info);
            return Ok(0);
        }
        let reserve = bank.balance(Asset::VaultReward, &self.address);
        if reserve < amount {
            if strict {
                return Err(LedgerError::InsufficientBalance(format!(
                    "StakePurseVault: reward reserve {} cannot cover {}",
                    reserve, amount
                )));
            }
            tracing::warn!(account = %account.short(), amount, reserve, "vault: reward reserve short, payout deferred");
            self.users.insert(account, info);
            return Ok(0);
        }
        info.total_claimed = math::add(info.total_claimed, amount, "vault total claimed")?;
        info.claimable_reward = 0;
        bank.transfer(Asset::VaultReward, &self.address, &account, amount)?;
        self.users.insert(account, info);

        events.emit(LedgerEvent::RewardClaimed {
            payer: self.address,
            account,
            asset: Asset::VaultReward,
            amount,
            payer_balance: bank.balance(Asset::VaultReward, &self.address),
        });
        Ok(amount)
    }

    fn ensure_owner(&self, caller: Address, action: &str) -> Result<(), LedgerError> {
        if caller != self.owner {
            tracing::warn!(caller = %caller.short(), action, "vault: rejected owner call");
            return Err(LedgerError::Unauthorized(format!("StakePurseVault: {} is owner-only", action)));
        }
        Ok(())
    }

    fn ensure_governor(&self, caller: Address, action: &str) -> Result<(), LedgerError> {
        if caller != self.governor {
            tracing::warn!(caller = %caller.short(), action, "vault: rejected governor call");
            return Err(LedgerError::Unauthorized(format!(
                "StakePurseVault: {} is governor-only",
                action
            )));
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

    pub fn update_vault_configs(
        &mut self,
        events: &mut EventLog,
        caller: Address,
        min_compound_amount: u64,
        cap_stake_amount: u64,
    ) -> Result<(), LedgerError> {
        self.ensure_governor(caller, "update_vault_configs")?;
        self.config.min_compound_amount = min_compound_amount;
        self.config.cap_stake_amount = cap_stake_amount;
        self.config_updated(
            events,
            "vault_configs",
            format!("min_compound={} cap={}", min_compound_amount, cap_stake_amount),
        );
        Ok(())
    }

    pub fn update_vault_fees(&mut self, events: &mut EventLog, caller: Address, fees: VaultFees) -> Result<(), LedgerError> {
        self.ensure_governor(caller, "update_vault_fees")?;
        fees.validate()?;
        self.fees = fees;
        self.config_updated(
            events,
            "vault_fees",
            format!(
                "reward={} compounder={} withdrawal={}",
                fees.fee_on_reward, fees.fee_on_compounder, fees.fee_on_withdrawal
            ),
        );
        Ok(())
    }

    pub fn update_vest_duration(&mut self, events: &mut EventLog, caller: Address, vest_duration: u64) -> Result<(), LedgerError> {
        self.ensure_owner(caller, "update_vest_duration")?;
        self.config.vest_duration = vest_duration;
        self.config_updated(events, "vest_duration", vest_duration.to_string());
        Ok(())
    }

    pub fn update_treasury(&mut self, events: &mut EventLog, caller: Address, treasury: Address) -> Result<(), LedgerError> {
        self.ensure_owner(caller, "update_treasury")?;
        treasury.ensure_nonzero("vault treasury")?;
        self.treasury = treasury;
        self.config_updated(events, "treasury", treasury.to_string());
        Ok(())
    }

    pub fn update_reward_feed(&mut self, events: &mut EventLog, caller: Address, feed: Address) -> Result<(), LedgerError> {
        self.ensure_owner(caller, "update_reward_feed")?;
        feed.ensure_nonzero("vault reward feed")?;
        self.reward_feed = feed;
        self.config_updated(events, "reward_feed", feed.to_string());
        Ok(())
    }

    pub fn pause(&mut self, events: &mut EventLog, caller: Address) -> Result<(), LedgerError> {
        self.ensure_owner(caller, "pause")?;
        self.ensure_not_paused()?;
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

    /// Send stray tokens out of the vault. PURSE reserved for vesting cannot
    /// be recovered.
    ///
    /// # Errors
    /// `Unauthorized` for non-owners; `InvalidArgument` on a zero address or
    /// amount; `InsufficientBalance` beyond the unencumbered balance.
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
        to.ensure_nonzero("recovery recipient")?;
        if amount == 0 {
            return Err(LedgerError::InvalidArgument("StakePurseVault: zero amount".to_string()));
        }
        let held = bank.balance(asset, &self.address);
        let free = match asset {
            Asset::Purse => held.saturating_sub(self.total_locked),
            Asset::VaultReward => held,
        };
        if free < amount {
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
}

impl RewardSink for CompoundingVault {
    fn sink_address(&self) -> Address {
        self.address
    }

    fn poke_reward_accumulator(
        &mut self,
        events: &mut EventLog,
        caller: Address,
        amount: u64,
    ) -> Result<Injection, LedgerError> {
        if caller != self.reward_feed {
            tracing::warn!(caller = %caller.short(), "vault: rejected accumulator poke");
            return Err(LedgerError::Unauthorized(
                "StakePurseVault: only the vault reward feed may poke the accumulator".to_string(),
            ));
        }
        let injection = self.accumulator.inject(amount, self.total_shares)?;
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

impl VestingSource for CompoundingVault {
    fn custodian(&self) -> Address {
        self.address
    }

    fn release(&mut self, bank: &mut Bank, to: &Address, amount: u64) -> Result<(), LedgerError> {
        let locked = self.total_locked.checked_sub(amount).ok_or_else(|| {
            LedgerError::InsufficientBalance(format!(
                "StakePurseVault: release of {} exceeds locked {}",
                amount, self.total_locked
            ))
        })?;
        bank.transfer(Asset::Purse, &self.address, to, amount)?;
        self.total_locked = locked;
        Ok(())
    }
}
