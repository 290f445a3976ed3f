// crates/purse-staking/src/feed.rs
//
// Time-based reward emission.
//
// A RewardFeed emits `tokens_per_interval` reward units per elapsed second
// into exactly one RewardSink (a staking pool or a vault). The feed never
// holds tokens itself: it only advances the sink's accumulator, and payout
// happens later through whoever custodies the reward asset.

use serde::{Deserialize, Serialize};

use purse_core::error::LedgerError;
use purse_core::event::{EventLog, LedgerEvent};
use purse_core::math;
use purse_core::{Address, Timestamp};

use crate::accumulator::Injection;

/// Anything with a reward accumulator that a feed may advance.
pub trait RewardSink {
    /// Address the feed is wired to.
    fn sink_address(&self) -> Address;

    /// Inject `amount` of reward into the sink's accumulator.
    ///
    /// # Errors
    /// `Unauthorized` unless `caller` is the sink's configured feed.
    fn poke_reward_accumulator(
        &mut self,
        events: &mut EventLog,
        caller: Address,
        amount: u64,
    ) -> Result<Injection, LedgerError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardFeed {
    address: Address,
    governor: Address,
    target: Address,
    tokens_per_interval: u64,
    last_distribution_time: Timestamp,
    total_distributed: u64,
}

impl RewardFeed {
    /// Create a feed wired to `target`, starting its clock at `now`.
    pub fn new(
        address: Address,
        governor: Address,
        target: Address,
        tokens_per_interval: u64,
        now: Timestamp,
    ) -> Self {
        Self {
            address,
            governor,
            target,
            tokens_per_interval,
            last_distribution_time: now,
            total_distributed: 0,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn governor(&self) -> Address {
        self.governor
    }

    pub fn target(&self) -> Address {
        self.target
    }

    pub fn tokens_per_interval(&self) -> u64 {
        self.tokens_per_interval
    }

    pub fn last_distribution_time(&self) -> Timestamp {
        self.last_distribution_time
    }

    pub fn total_distributed(&self) -> u64 {
        self.total_distributed
    }

    /// Amount `distribute` would inject at `now`. Pure.
    pub fn preview_distribute(&self, now: Timestamp) -> Result<u64, LedgerError> {
        let elapsed = now.saturating_sub(self.last_distribution_time);
        math::mul(elapsed, self.tokens_per_interval, "feed emission")
    }

    fn ensure_governor(&self, caller: Address, action: &str) -> Result<(), LedgerError> {
        if caller != self.governor {
            tracing::warn!(caller = %caller.short(), action, "feed: rejected non-governor call");
            return Err(LedgerError::Unauthorized(format!(
                "RewardFeed: {} is governor-only",
                action
            )));
        }
        Ok(())
    }

    /// Inject the reward accrued since the last distribution into `sink`.
    ///
    /// Returns the injected amount. Returns `Ok(0)` without touching the
    /// sink when no time has elapsed or the rate is zero; the clock still
    /// advances in the latter case so a later rate change is not applied
    /// retroactively.
    ///
    /// # Errors
    /// - `Unauthorized` unless `caller` is the target sink or the governor.
    /// - `InvalidArgument` if `sink` is not this feed's target.
    /// - `MathOverflow` from the emission product or the sink's accumulator.
    pub fn distribute<S: RewardSink>(
        &mut self,
        sink: &mut S,
        events: &mut EventLog,
        caller: Address,
        now: Timestamp,
    ) -> Result<u64, LedgerError> {
        if caller != self.target && caller != self.governor {
            tracing::warn!(caller = %caller.short(), "feed: rejected distribute");
            return Err(LedgerError::Unauthorized(
                "RewardFeed: caller is neither the target nor the governor".to_string(),
            ));
        }
        if sink.sink_address() != self.target {
            return Err(LedgerError::InvalidArgument(format!(
                "RewardFeed: sink {} is not the configured target {}",
                sink.sink_address().short(),
                self.target.short()
            )));
        }
        if now <= self.last_distribution_time {
            return Ok(0);
        }

        let amount = self.preview_distribute(now)?;
        if amount == 0 {
            self.last_distribution_time = now;
            return Ok(0);
        }
        let total = math::add(self.total_distributed, amount, "feed total distributed")?;

        sink.poke_reward_accumulator(events, self.address, amount)?;

        self.last_distribution_time = now;
        self.total_distributed = total;
        events.emit(LedgerEvent::Distributed {
            feed: self.address,
            caller,
            amount,
            last_distribution_time: now,
        });
        Ok(amount)
    }

    /// Change the emission rate, settling the elapsed period at the old rate
    /// first.
    ///
    /// # Errors
    /// `Unauthorized` for non-governors, plus anything `distribute` returns.
    pub fn set_rate<S: RewardSink>(
        &mut self,
        sink: &mut S,
        events: &mut EventLog,
        caller: Address,
        rate: u64,
        now: Timestamp,
    ) -> Result<(), LedgerError> {
        self.ensure_governor(caller, "set_rate")?;
        self.distribute(sink, events, caller, now)?;

        let old_rate = self.tokens_per_interval;
        self.tokens_per_interval = rate;
        // distribute leaves the clock alone when no time has passed; make
        // sure the new rate only applies from `now` onward.
        self.last_distribution_time = self.last_distribution_time.max(now);
        events.emit(LedgerEvent::RateChanged {
            feed: self.address,
            old_rate,
            new_rate: rate,
        });
        Ok(())
    }

    /// Move the clock forward without emitting. Discards the unpaid period.
    ///
    /// # Errors
    /// - `Unauthorized` for non-governors.
    /// - `InvalidArgument` if `timestamp` is earlier than the current value.
    pub fn update_last_distribution_time(
        &mut self,
        events: &mut EventLog,
        caller: Address,
        timestamp: Timestamp,
    ) -> Result<(), LedgerError> {
        self.ensure_governor(caller, "update_last_distribution_time")?;
        if timestamp < self.last_distribution_time {
            return Err(LedgerError::InvalidArgument(format!(
                "RewardFeed: last distribution time cannot move back from {} to {}",
                self.last_distribution_time, timestamp
            )));
        }
        self.last_distribution_time = timestamp;
        events.emit(LedgerEvent::ConfigUpdated {
            component: self.address,
            field: "last_distribution_time".to_string(),
            value: timestamp.to_string(),
        });
        Ok(())
    }

    /// Repoint the feed at another sink.
    ///
    /// # Errors
    /// `Unauthorized` for non-governors, `InvalidArgument` on the zero address.
    pub fn update_target(
        &mut self,
        events: &mut EventLog,
        caller: Address,
        target: Address,
    ) -> Result<(), LedgerError> {
        self.ensure_governor(caller, "update_target")?;
        target.ensure_nonzero("feed target")?;
        self.target = target;
        events.emit(LedgerEvent::ConfigUpdated {
            component: self.address,
            field: "target".to_string(),
            value: target.to_string(),
        });
        Ok(())
    }
}
