// crates/purse-sim/src/config.rs
//
// Simulator configuration.
// Loaded from a TOML file or populated with defaults matching a fresh
// deployment of both ledger tiers.

use serde::{Deserialize, Serialize};
use std::fs;

use purse_core::Address;
use purse_staking::DEFAULT_LOCK_PERIOD;
use purse_vault::{VaultFees, VaultParams, DEFAULT_MIN_COMPOUND_AMOUNT};

/// Parameters for the simulated deployment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SimConfig {
    /// Label of the account that owns every component.
    #[serde(default = "default_owner")]
    pub owner: String,

    /// Label of the account allowed to steer the reward feeds.
    #[serde(default = "default_governor")]
    pub governor: String,

    /// Prefix from which component addresses are derived.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Seconds a base withdrawal stays in vesting.
    #[serde(default = "default_lock_period")]
    pub lock_period: u64,

    /// Base reward emitted per second.
    #[serde(default = "default_tokens_per_interval")]
    pub tokens_per_interval: u64,

    /// Timestamp both feeds start counting from.
    #[serde(default)]
    pub start_time: u64,

    #[serde(default = "default_min_compound_amount")]
    pub min_compound_amount: u64,

    /// Ceiling on vault assets. Unlimited when absent.
    #[serde(default)]
    pub cap_stake_amount: Option<u64>,

    /// Minimum vault vesting time. Defaults to `lock_period`.
    #[serde(default)]
    pub vest_duration: Option<u64>,

    /// Vault reward token emitted per second.
    #[serde(default)]
    pub vault_reward_rate: u64,

    /// PURSE the owner seeds into the base treasury at start.
    #[serde(default = "default_treasury_funding")]
    pub treasury_funding: u64,

    /// Vault reward tokens the owner seeds into the vault reserve at start.
    #[serde(default)]
    pub reward_reserve: u64,

    /// Vault fees in basis points.
    #[serde(default)]
    pub vault_fees: VaultFees,
}

fn default_owner() -> String {
    "owner".to_string()
}

fn default_governor() -> String {
    "governor".to_string()
}

fn default_prefix() -> String {
    "purse".to_string()
}

fn default_lock_period() -> u64 {
    DEFAULT_LOCK_PERIOD
}

fn default_tokens_per_interval() -> u64 {
    1_000
}

fn default_min_compound_amount() -> u64 {
    DEFAULT_MIN_COMPOUND_AMOUNT
}

fn default_treasury_funding() -> u64 {
    1_000_000_000
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            governor: default_governor(),
            prefix: default_prefix(),
            lock_period: default_lock_period(),
            tokens_per_interval: default_tokens_per_interval(),
            start_time: 0,
            min_compound_amount: default_min_compound_amount(),
            cap_stake_amount: None,
            vest_duration: None,
            vault_reward_rate: 0,
            treasury_funding: default_treasury_funding(),
            reward_reserve: 0,
            vault_fees: VaultFees::default(),
        }
    }
}

impl SimConfig {
    /// Load configuration from a TOML file at the given path.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)?;
        let config: SimConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn owner_address(&self) -> Address {
        Address::from_label(&self.owner)
    }

    pub fn governor_address(&self) -> Address {
        Address::from_label(&self.governor)
    }

    /// Deployment parameters for both tiers.
    pub fn vault_params(&self) -> VaultParams {
        let mut params = VaultParams::labelled(&self.prefix, self.owner_address(), self.governor_address());
        params.base.lock_period = self.lock_period;
        params.base.tokens_per_interval = self.tokens_per_interval;
        params.base.start_time = self.start_time;
        params.fees = self.vault_fees;
        params.config.min_compound_amount = self.min_compound_amount;
        params.config.cap_stake_amount = self.cap_stake_amount.unwrap_or(u64::MAX);
        params.config.vest_duration = self.vest_duration.unwrap_or(self.lock_period);
        params.reward_rate = self.vault_reward_rate;
        params
    }
}
