// crates/purse-staking/src/accumulator.rs
//
// Cumulative reward-per-share accumulator.
//
// The accumulator turns a stream of reward injections into a single
// monotonically increasing counter. An account that held `s` shares while
// the counter moved from `prev` to `now` earned `s * (now - prev) / SCALE`,
// so settling one account is O(1) regardless of how many accounts exist.
//
// Reward injected while no shares exist is buffered in `pending_reward` and
// folded into the next injection that sees a non-zero share supply.

use serde::{Deserialize, Serialize};

use purse_core::error::LedgerError;
use purse_core::math;

/// Outcome of a single injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Injection {
    /// Amount folded into the per-share counter by this call.
    pub distributed: u64,
    /// Amount held back because there were no shares (or the increment
    /// rounded to zero).
    pub buffered: u64,
    /// Counter value after the call.
    pub cumulative_reward_per_share: u128,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardAccumulator {
    cumulative_reward_per_share: u128,
    pending_reward: u64,
    total_distributed: u64,
}

impl RewardAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted parts (schema migration).
    pub fn from_parts(cumulative_reward_per_share: u128, pending_reward: u64, total_distributed: u64) -> Self {
        Self {
            cumulative_reward_per_share,
            pending_reward,
            total_distributed,
        }
    }

    pub fn value(&self) -> u128 {
        self.cumulative_reward_per_share
    }

    /// Reward waiting for a non-zero share supply.
    pub fn pending_reward(&self) -> u64 {
        self.pending_reward
    }

    /// Lifetime reward folded into the counter.
    pub fn total_distributed(&self) -> u64 {
        self.total_distributed
    }

    /// Inject `amount` of new reward spread across `total_shares`.
    ///
    /// Previously buffered reward is included. With zero shares, or when the
    /// per-share increment rounds to zero, the whole amount stays buffered.
    ///
    /// # Errors
    /// `MathOverflow` if the buffer or counter would overflow. State is
    /// untouched on error.
    pub fn inject(&mut self, amount: u64, total_shares: u64) -> Result<Injection, LedgerError> {
        let total = math::add(self.pending_reward, amount, "pending reward")?;

        if total_shares == 0 || total == 0 {
            self.pending_reward = total;
            return Ok(Injection {
                distributed: 0,
                buffered: total,
                cumulative_reward_per_share: self.cumulative_reward_per_share,
            });
        }

        let increment = math::reward_per_share(total, total_shares)?;
        if increment == 0 {
            self.pending_reward = total;
            return Ok(Injection {
                distributed: 0,
                buffered: total,
                cumulative_reward_per_share: self.cumulative_reward_per_share,
            });
        }

        let next = self
            .cumulative_reward_per_share
            .checked_add(increment)
            .ok_or_else(|| LedgerError::MathOverflow("cumulative reward per share".to_string()))?;
        let distributed_total = math::add(self.total_distributed, total, "total distributed")?;

        self.cumulative_reward_per_share = next;
        self.pending_reward = 0;
        self.total_distributed = distributed_total;

        Ok(Injection {
            distributed: total,
            buffered: 0,
            cumulative_reward_per_share: next,
        })
    }

    /// Counter value that `inject(extra, total_shares)` would produce,
    /// without mutating. Used by read-only previews.
    pub fn projected(&self, extra: u64, total_shares: u64) -> Result<u128, LedgerError> {
        let total = math::add(self.pending_reward, extra, "pending reward")?;
        if total_shares == 0 || total == 0 {
            return Ok(self.cumulative_reward_per_share);
        }
        let increment = math::reward_per_share(total, total_shares)?;
        self.cumulative_reward_per_share
            .checked_add(increment)
            .ok_or_else(|| LedgerError::MathOverflow("cumulative reward per share".to_string()))
    }

    /// Reward earned by `shares` since the snapshot `prev`.
    pub fn accrued_since(&self, shares: u64, prev: u128) -> Result<u64, LedgerError> {
        math::accrued_reward(shares, prev, self.cumulative_reward_per_share)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_with_shares_moves_counter() {
        let mut acc = RewardAccumulator::new();
        let inj = acc.inject(10, 1_000).unwrap();
        assert_eq!(inj.distributed, 10);
        assert_eq!(inj.buffered, 0);
        assert_eq!(acc.accrued_since(1_000, 0).unwrap(), 10);
        assert_eq!(acc.total_distributed(), 10);
    }

    #[test]
    fn test_inject_without_shares_buffers() {
        let mut acc = RewardAccumulator::new();
        let inj = acc.inject(25, 0).unwrap();
        assert_eq!(inj.distributed, 0);
        assert_eq!(inj.buffered, 25);
        assert_eq!(acc.value(), 0);
        assert_eq!(acc.pending_reward(), 25);
    }

    #[test]
    fn test_buffer_flushes_on_next_injection() {
        let mut acc = RewardAccumulator::new();
        acc.inject(25, 0).unwrap();
        let inj = acc.inject(5, 100).unwrap();
        assert_eq!(inj.distributed, 30);
        assert_eq!(acc.pending_reward(), 0);
        assert_eq!(acc.accrued_since(100, 0).unwrap(), 30);
    }

    #[test]
    fn test_zero_amount_flushes_buffer() {
        let mut acc = RewardAccumulator::new();
        acc.inject(7, 0).unwrap();
        acc.inject(0, 7).unwrap();
        assert_eq!(acc.pending_reward(), 0);
        assert_eq!(acc.accrued_since(7, 0).unwrap(), 7);
    }

    #[test]
    fn test_counter_is_monotonic() {
        let mut acc = RewardAccumulator::new();
        let mut last = acc.value();
        for (amount, shares) in [(1, 3), (0, 3), (5, 0), (2, 9), (100, 1)] {
            acc.inject(amount, shares).unwrap();
            assert!(acc.value() >= last);
            last = acc.value();
        }
    }

    #[test]
    fn test_projected_matches_inject() {
        let mut acc = RewardAccumulator::new();
        acc.inject(3, 0).unwrap();
        let projected = acc.projected(9, 4).unwrap();
        acc.inject(9, 4).unwrap();
        assert_eq!(projected, acc.value());
    }
}
