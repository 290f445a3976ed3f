// crates/purse-core/src/math.rs
//
// Checked integer arithmetic for ledger accounting.
//
// Token amounts are u64 in the smallest unit of the asset. Reward-per-share
// ratios are u128 scaled by REWARD_PRECISION (10^18) so that the lazy
// settlement formula
//
//   accrued = shares * (acc_now - acc_prev) / REWARD_PRECISION
//
// loses at most one unit per settlement. Every helper fails with
// `LedgerError::MathOverflow` instead of wrapping or saturating.

use crate::error::LedgerError;

/// Token amount in the smallest unit of an asset.
pub type Amount = u64;

/// Seconds on the externally supplied monotonic clock.
pub type Timestamp = u64;

/// Fixed-point scale for cumulative reward-per-share values (10^18).
pub const REWARD_PRECISION: u128 = 1_000_000_000_000_000_000;

/// Basis-point divisor: 10,000 bips = 100%.
pub const BIPS_DIVISOR: u64 = 10_000;

pub fn add(a: u64, b: u64, what: &str) -> Result<u64, LedgerError> {
    a.checked_add(b)
        .ok_or_else(|| LedgerError::MathOverflow(format!("{}: {} + {}", what, a, b)))
}

pub fn sub(a: u64, b: u64, what: &str) -> Result<u64, LedgerError> {
    a.checked_sub(b)
        .ok_or_else(|| LedgerError::MathOverflow(format!("{}: {} - {}", what, a, b)))
}

pub fn mul(a: u64, b: u64, what: &str) -> Result<u64, LedgerError> {
    a.checked_mul(b)
        .ok_or_else(|| LedgerError::MathOverflow(format!("{}: {} * {}", what, a, b)))
}

/// `a * b / denominator`, computed in u128 and rounded down.
///
/// Fails if `denominator` is zero or the quotient does not fit in u64.
pub fn mul_div(a: u64, b: u64, denominator: u64, what: &str) -> Result<u64, LedgerError> {
    if denominator == 0 {
        return Err(LedgerError::MathOverflow(format!("{}: division by zero", what)));
    }
    let product = (a as u128) * (b as u128);
    let quotient = product / denominator as u128;
    u64::try_from(quotient)
        .map_err(|_| LedgerError::MathOverflow(format!("{}: {} does not fit in u64", what, quotient)))
}

/// The `bips` fraction of `amount`, rounded down.
pub fn bips_of(amount: u64, bips: u64) -> Result<u64, LedgerError> {
    mul_div(amount, bips, BIPS_DIVISOR, "bips")
}

/// Increase of the cumulative reward-per-share value for `reward` spread
/// over `total_shares`. Caller guarantees `total_shares > 0`.
pub fn reward_per_share(reward: u64, total_shares: u64) -> Result<u128, LedgerError> {
    if total_shares == 0 {
        return Err(LedgerError::MathOverflow(
            "reward per share: division by zero shares".to_string(),
        ));
    }
    (reward as u128)
        .checked_mul(REWARD_PRECISION)
        .map(|scaled| scaled / total_shares as u128)
        .ok_or_else(|| LedgerError::MathOverflow(format!("reward per share: {} * scale", reward)))
}

/// Reward earned by `shares` while the accumulator moved from `prev` to `now`.
pub fn accrued_reward(shares: u64, prev: u128, now: u128) -> Result<u64, LedgerError> {
    let delta = now.checked_sub(prev).ok_or_else(|| {
        LedgerError::MathOverflow(format!("accumulator regressed: {} < {}", now, prev))
    })?;
    let scaled = (shares as u128)
        .checked_mul(delta)
        .ok_or_else(|| LedgerError::MathOverflow(format!("accrued: {} * {}", shares, delta)))?;
    u64::try_from(scaled / REWARD_PRECISION)
        .map_err(|_| LedgerError::MathOverflow("accrued reward does not fit in u64".to_string()))
}
