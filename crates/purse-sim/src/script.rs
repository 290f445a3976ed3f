// crates/purse-sim/src/script.rs
//
// JSON operation scripts.
//
// A script is a list of steps. Each step names the operation in an "op"
// field, carries the timestamp it runs at in "at", and refers to accounts
// by label (hashed into an Address the same way the simulator derives
// component addresses):
//
//   { "steps": [
//       { "at": 0,  "op": "credit",  "account": "alice", "amount": 1000 },
//       { "at": 0,  "op": "deposit", "account": "alice", "amount": 1000 },
//       { "at": 60, "op": "claim",   "account": "alice" }
//   ] }

use std::fs;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use purse_core::Asset;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Script I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Script parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Step {index} runs at {at}, before the previous step at {previous}")]
    TimeWentBack { index: usize, at: u64, previous: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Script {
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Step {
    pub at: u64,
    #[serde(flatten)]
    pub op: Op,
}

fn default_asset() -> Asset {
    Asset::Purse
}

/// One ledger operation. Omitted callers default to the configured owner
/// or governor as appropriate.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// Mint tokens into an account from outside the ledger.
    Credit {
        account: String,
        amount: u64,
        #[serde(default = "default_asset")]
        asset: Asset,
    },
    Deposit { account: String, amount: u64 },
    Withdraw { account: String, shares: u64 },
    TransferShares { from: String, to: String, shares: u64 },
    Claim { account: String },
    Sweep { account: String },
    Distribute { caller: Option<String> },
    SetRate { rate: u64, caller: Option<String> },
    FundTreasury { from: String, amount: u64 },
    PauseTreasury,
    UnpauseTreasury,
    UpdateLockPeriod { lock_period: u64 },
    Stake { account: String, amount: u64 },
    StakeReceiptShares { account: String, shares: u64 },
    Unstake { account: String, shares: u64 },
    Compound { caller: String },
    VaultSweep { account: String },
    ClaimRewards { account: String },
    FundRewards { from: String, amount: u64 },
    CollectWithdrawalFees,
    SetRewardRate { rate: u64 },
    PauseVault,
    UnpauseVault,
    /// Record the base pool snapshot in the step result.
    ExportState,
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Credit { .. } => "credit",
            Op::Deposit { .. } => "deposit",
            Op::Withdraw { .. } => "withdraw",
            Op::TransferShares { .. } => "transfer_shares",
            Op::Claim { .. } => "claim",
            Op::Sweep { .. } => "sweep",
            Op::Distribute { .. } => "distribute",
            Op::SetRate { .. } => "set_rate",
            Op::FundTreasury { .. } => "fund_treasury",
            Op::PauseTreasury => "pause_treasury",
            Op::UnpauseTreasury => "unpause_treasury",
            Op::UpdateLockPeriod { .. } => "update_lock_period",
            Op::Stake { .. } => "stake",
            Op::StakeReceiptShares { .. } => "stake_receipt_shares",
            Op::Unstake { .. } => "unstake",
            Op::Compound { .. } => "compound",
            Op::VaultSweep { .. } => "vault_sweep",
            Op::ClaimRewards { .. } => "claim_rewards",
            Op::FundRewards { .. } => "fund_rewards",
            Op::CollectWithdrawalFees => "collect_withdrawal_fees",
            Op::SetRewardRate { .. } => "set_reward_rate",
            Op::PauseVault => "pause_vault",
            Op::UnpauseVault => "unpause_vault",
            Op::ExportState => "export_state",
        }
    }

    /// Account labels this step mentions, in order.
    pub fn labels(&self) -> Vec<&str> {
        match self {
            Op::Credit { account, .. }
            | Op::Deposit { account, .. }
            | Op::Withdraw { account, .. }
            | Op::Claim { account }
            | Op::Sweep { account }
            | Op::Stake { account, .. }
            | Op::StakeReceiptShares { account, .. }
            | Op::Unstake { account, .. }
            | Op::VaultSweep { account }
            | Op::ClaimRewards { account } => vec![account.as_str()],
            Op::TransferShares { from, to, .. } => vec![from.as_str(), to.as_str()],
            Op::FundTreasury { from, .. } | Op::FundRewards { from, .. } => vec![from.as_str()],
            Op::Compound { caller } => vec![caller.as_str()],
            Op::Distribute { caller } | Op::SetRate { caller, .. } => {
                caller.iter().map(String::as_str).collect()
            }
            _ => Vec::new(),
        }
    }
}

impl Script {
    /// Parse a script and check that its timestamps never decrease.
    pub fn from_json(json: &str) -> Result<Self, ScriptError> {
        let script: Script = serde_json::from_str(json)?;
        let mut previous = 0u64;
        for (index, step) in script.steps.iter().enumerate() {
            if step.at < previous {
                return Err(ScriptError::TimeWentBack {
                    index,
                    at: step.at,
                    previous,
                });
            }
            previous = step.at;
        }
        Ok(script)
    }

    pub fn load(path: &str) -> Result<Self, ScriptError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json(&contents)
    }
}
