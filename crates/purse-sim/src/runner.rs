// crates/purse-sim/src/runner.rs
//
// Replays a Script against a freshly deployed VaultSystem.
//
// Ledger errors do not stop the run: every entry point is atomic, so a
// failed step is recorded with its error kind and the next step runs
// against unchanged state.

use serde::Serialize;

use purse_core::{Address, Asset, LedgerError};
use purse_vault::VaultSystem;

use crate::config::SimConfig;
use crate::script::{Op, Script, Step};

/// What happened at one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub at: u64,
    pub op: String,
    pub ok: bool,
    /// Result value on success, the error message on failure.
    pub detail: String,
    /// Events the step appended to the log.
    pub events: usize,
}

/// End-of-run view of one labelled account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountReport {
    pub label: String,
    pub address: Address,
    pub purse: u64,
    pub vault_reward: u64,
    pub receipt_shares: u64,
    pub vault_shares: u64,
    pub base_claimable: u64,
    pub vault_claimable: u64,
    pub base_escrowed: u64,
    pub vault_escrowed: u64,
}

/// End-of-run totals for both tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemReport {
    pub now: u64,
    pub total_principal: u64,
    pub total_receipt_shares: u64,
    pub total_locked: u64,
    pub treasury_balance: u64,
    pub vault_total_assets: u64,
    pub vault_total_shares: u64,
    pub vault_total_locked: u64,
    pub events: usize,
    pub audit: Vec<String>,
}

pub struct Simulator {
    config: SimConfig,
    system: VaultSystem,
    labels: Vec<String>,
    now: u64,
}

impl Simulator {
    /// Deploy both tiers and seed the configured treasury and reward
    /// reserve from the owner account.
    pub fn new(config: SimConfig) -> Result<Self, LedgerError> {
        let mut system = VaultSystem::new(config.vault_params())?;
        let owner = config.owner_address();
        if config.treasury_funding > 0 {
            system.credit(Asset::Purse, owner, config.treasury_funding)?;
            system.base_mut().fund_treasury(owner, config.treasury_funding)?;
        }
        if config.reward_reserve > 0 {
            system.credit(Asset::VaultReward, owner, config.reward_reserve)?;
            system.fund_rewards(owner, config.reward_reserve)?;
        }
        tracing::info!(
            pool = %system.base().pool().address().short(),
            vault = %system.vault().address().short(),
            "sim: deployed"
        );
        Ok(Self {
            now: config.start_time,
            labels: Vec::new(),
            config,
            system,
        })
    }

    pub fn system(&self) -> &VaultSystem {
        &self.system
    }

    fn remember(&mut self, label: &str) {
        if !self.labels.iter().any(|l| l == label) {
            self.labels.push(label.to_string());
        }
    }

    fn apply(&mut self, op: &Op, now: u64) -> Result<String, LedgerError> {
        let owner = self.config.owner_address();
        let governor = self.config.governor_address();
        let or_governor = |caller: &Option<String>| {
            caller.as_deref().map(Address::from_label).unwrap_or(governor)
        };
        let sys = &mut self.system;
        let addr = Address::from_label;
        match op {
            Op::Credit { account, amount, asset } => {
                sys.credit(*asset, addr(account), *amount).map(|_| format!("{} {}", amount, asset))
            }
            Op::Deposit { account, amount } => sys
                .base_mut()
                .deposit(addr(account), *amount, now)
                .map(|shares| format!("{} shares", shares)),
            Op::Withdraw { account, shares } => sys
                .base_mut()
                .withdraw(addr(account), *shares, now)
                .map(|principal| format!("{} locked", principal)),
            Op::TransferShares { from, to, shares } => sys
                .base_mut()
                .transfer_shares(addr(from), addr(to), *shares, now)
                .map(|_| format!("{} shares", shares)),
            Op::Claim { account } => sys.base_mut().claim(addr(account), now).map(|paid| format!("{} paid", paid)),
            Op::Sweep { account } => sys.base_mut().sweep(addr(account), now).map(|v| format!("{} vested", v)),
            Op::Distribute { caller } => sys
                .base_mut()
                .distribute(or_governor(caller), now)
                .map(|amount| format!("{} distributed", amount)),
            Op::SetRate { rate, caller } => sys
                .base_mut()
                .set_rate(or_governor(caller), *rate, now)
                .map(|_| format!("rate {}", rate)),
            Op::FundTreasury { from, amount } => sys
                .base_mut()
                .fund_treasury(addr(from), *amount)
                .map(|_| format!("{} funded", amount)),
            Op::PauseTreasury => sys.base_mut().pause_treasury(owner).map(|_| "paused".to_string()),
            Op::UnpauseTreasury => sys.base_mut().unpause_treasury(owner).map(|_| "unpaused".to_string()),
            Op::UpdateLockPeriod { lock_period } => sys
                .base_mut()
                .update_lock_period(owner, *lock_period)
                .map(|_| format!("lock period {}", lock_period)),
            Op::Stake { account, amount } => sys
                .stake(addr(account), *amount, now)
                .map(|shares| format!("{} vault shares", shares)),
            Op::StakeReceiptShares { account, shares } => sys
                .stake_receipt_shares(addr(account), *shares, now)
                .map(|minted| format!("{} vault shares", minted)),
            Op::Unstake { account, shares } => sys.unstake(addr(account), *shares, now).map(|out| {
                format!(
                    "{} locked until {} (fee {})",
                    out.user_amount, out.unlock_time, out.withdrawal_fee
                )
            }),
            Op::Compound { caller } => sys
                .compound(addr(caller), now)
                .map(|harvested| format!("{} harvested", harvested)),
            Op::VaultSweep { account } => sys.sweep(addr(account), now).map(|v| format!("{} vested", v)),
            Op::ClaimRewards { account } => sys
                .claim_rewards(addr(account), now)
                .map(|paid| format!("{} paid", paid)),
            Op::FundRewards { from, amount } => sys
                .fund_rewards(addr(from), *amount)
                .map(|_| format!("{} funded", amount)),
            Op::CollectWithdrawalFees => sys
                .collect_withdrawal_fees(owner, now)
                .map(|fees| format!("{} collected", fees)),
            Op::SetRewardRate { rate } => sys
                .set_reward_rate(governor, *rate, now)
                .map(|_| format!("rate {}", rate)),
            Op::PauseVault => sys.pause(owner).map(|_| "paused".to_string()),
            Op::UnpauseVault => sys.unpause(owner).map(|_| "unpaused".to_string()),
            Op::ExportState => sys.base().export_pool_state().to_json(),
        }
    }

    /// Run one step, recording rather than propagating ledger errors.
    pub fn step(&mut self, index: usize, step: &Step) -> StepReport {
        for label in step.op.labels() {
            self.remember(label);
        }
        self.now = self.now.max(step.at);
        let before = self.system.events().len();
        let result = self.apply(&step.op, step.at);
        let events = self.system.events().len() - before;

        let (ok, detail) = match result {
            Ok(detail) => (true, detail),
            Err(e) => {
                tracing::warn!(index, op = step.op.name(), error = %e, "sim: step failed");
                (false, e.to_string())
            }
        };
        StepReport {
            index,
            at: step.at,
            op: step.op.name().to_string(),
            ok,
            detail,
            events,
        }
    }

    pub fn run(&mut self, script: &Script) -> Vec<StepReport> {
        script
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| self.step(index, step))
            .collect()
    }

    /// Balances and positions of every account the script named.
    pub fn accounts(&self) -> Result<Vec<AccountReport>, LedgerError> {
        let sys = &self.system;
        self.labels
            .iter()
            .map(|label| {
                let address = Address::from_label(label);
                Ok(AccountReport {
                    label: label.clone(),
                    address,
                    purse: sys.bank().balance(Asset::Purse, &address),
                    vault_reward: sys.bank().balance(Asset::VaultReward, &address),
                    receipt_shares: sys.base().user_info(&address).receipt_shares,
                    vault_shares: sys.vault().user_info(&address).shares,
                    base_claimable: sys.base().preview_claimable_at(&address, self.now)?,
                    vault_claimable: sys.claimable(&address, self.now)?,
                    base_escrowed: sys.base().vesting().escrowed_balance(&address),
                    vault_escrowed: sys.vesting().escrowed_balance(&address),
                })
            })
            .collect()
    }

    pub fn summary(&self) -> SystemReport {
        let sys = &self.system;
        let pool = sys.base().pool();
        let vault = sys.vault();
        SystemReport {
            now: self.now,
            total_principal: pool.total_principal(),
            total_receipt_shares: pool.total_receipt_shares(),
            total_locked: pool.total_locked_amount(),
            treasury_balance: sys.base().treasury().balance(sys.bank()),
            vault_total_assets: vault.total_assets(),
            vault_total_shares: vault.total_shares(),
            vault_total_locked: vault.total_locked(),
            events: sys.events().len(),
            audit: sys.audit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SimConfig {
        SimConfig {
            lock_period: 100,
            tokens_per_interval: 10,
            ..SimConfig::default()
        }
    }

    #[test]
    fn test_new_funds_treasury_from_owner() {
        let sim = Simulator::new(config()).unwrap();
        let treasury = sim.system().base().treasury().address();
        assert_eq!(sim.system().bank().balance(Asset::Purse, &treasury), 1_000_000_000);
        assert_eq!(sim.system().bank().balance(Asset::Purse, &Address::from_label("owner")), 0);
    }

    #[test]
    fn test_run_records_failures_and_continues() {
        let mut sim = Simulator::new(config()).unwrap();
        let script = Script::from_json(
            r#"{ "steps": [
                { "at": 0, "op": "credit", "account": "alice", "amount": 1000 },
                { "at": 0, "op": "deposit", "account": "alice", "amount": 1000 },
                { "at": 0, "op": "claim", "account": "alice" },
                { "at": 1, "op": "claim", "account": "alice" }
            ] }"#,
        )
        .unwrap();
        let reports = sim.run(&script);
        assert!(reports[1].ok);
        assert!(!reports[2].ok);
        assert!(reports[2].detail.starts_with("Nothing to do"));
        assert_eq!(reports[2].events, 0);
        assert_eq!(reports[3].detail, "10 paid");

        let accounts = sim.accounts().unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].label, "alice");
        assert_eq!(accounts[0].purse, 10);
        assert_eq!(accounts[0].receipt_shares, 1_000);
        assert!(sim.summary().audit.is_empty());
    }

    #[test]
    fn test_vault_round_trip() {
        let mut sim = Simulator::new(config()).unwrap();
        let script = Script::from_json(
            r#"{ "steps": [
                { "at": 0, "op": "credit", "account": "bob", "amount": 10000 },
                { "at": 0, "op": "stake", "account": "bob", "amount": 10000 },
                { "at": 0, "op": "unstake", "account": "bob", "shares": 10000 },
                { "at": 100, "op": "vault_sweep", "account": "bob" },
                { "at": 100, "op": "collect_withdrawal_fees" }
            ] }"#,
        )
        .unwrap();
        let reports = sim.run(&script);
        assert!(reports.iter().all(|r| r.ok), "{:?}", reports);
        assert_eq!(reports[3].detail, "9950 vested");
        assert_eq!(reports[4].detail, "50 collected");
        let summary = sim.summary();
        assert_eq!(summary.vault_total_locked, 0);
        assert!(summary.audit.is_empty());
    }
}
