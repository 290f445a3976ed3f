// crates/purse-core/src/event.rs
//
// Structured events emitted by every committed ledger entry point.
//
// Each event records the actor, the amounts involved, and the resulting
// balances so that an external indexer can rebuild history without reading
// ledger state. Events are appended to an EventLog and mirrored to the
// `tracing` subscriber at INFO level.

use serde::Serialize;

use crate::address::Address;
use crate::bank::Asset;

/// A single ledger event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    Deposited {
        pool: Address,
        account: Address,
        amount: u64,
        shares_minted: u64,
        account_shares: u64,
        total_principal: u64,
        total_shares: u64,
    },
    Withdrawn {
        pool: Address,
        account: Address,
        shares_burned: u64,
        principal: u64,
        unlock_time: u64,
        total_principal: u64,
        total_locked: u64,
    },
    SharesTransferred {
        pool: Address,
        from: Address,
        to: Address,
        shares: u64,
    },
    RewardInjected {
        target: Address,
        amount: u64,
        distributed: u64,
        buffered: u64,
        cumulative_reward_per_share: u128,
    },
    Distributed {
        feed: Address,
        caller: Address,
        amount: u64,
        last_distribution_time: u64,
    },
    RateChanged {
        feed: Address,
        old_rate: u64,
        new_rate: u64,
    },
    ScheduleLocked {
        ledger: Address,
        owner: Address,
        amount: u64,
        start_time: u64,
        end_time: u64,
        escrowed: u64,
    },
    SchedulesVested {
        ledger: Address,
        owner: Address,
        amount: u64,
        schedules: u64,
        escrowed: u64,
        vested: u64,
    },
    RewardClaimed {
        payer: Address,
        account: Address,
        asset: Asset,
        amount: u64,
        payer_balance: u64,
    },
    Funded {
        recipient: Address,
        from: Address,
        asset: Asset,
        amount: u64,
        balance: u64,
    },
    TokenRecovered {
        component: Address,
        asset: Asset,
        to: Address,
        amount: u64,
    },
    PauseChanged {
        component: Address,
        paused: bool,
    },
    ConfigUpdated {
        component: Address,
        field: String,
        value: String,
    },
    VaultStaked {
        vault: Address,
        account: Address,
        assets: u64,
        shares_minted: u64,
        total_assets: u64,
        total_shares: u64,
    },
    VaultUnstaked {
        vault: Address,
        account: Address,
        shares_burned: u64,
        assets: u64,
        withdrawal_fee: u64,
        user_amount: u64,
        unlock_time: u64,
        total_assets: u64,
        total_shares: u64,
    },
    Compounded {
        vault: Address,
        caller: Address,
        harvested: u64,
        reinvested: u64,
        compounder_fee: u64,
        reward_fee: u64,
        total_assets: u64,
    },
}

impl LedgerEvent {
    /// Short snake_case name of the event variant.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::Deposited { .. } => "deposited",
            LedgerEvent::Withdrawn { .. } => "withdrawn",
            LedgerEvent::SharesTransferred { .. } => "shares_transferred",
            LedgerEvent::RewardInjected { .. } => "reward_injected",
            LedgerEvent::Distributed { .. } => "distributed",
            LedgerEvent::RateChanged { .. } => "rate_changed",
            LedgerEvent::ScheduleLocked { .. } => "schedule_locked",
            LedgerEvent::SchedulesVested { .. } => "schedules_vested",
            LedgerEvent::RewardClaimed { .. } => "reward_claimed",
            LedgerEvent::Funded { .. } => "funded",
            LedgerEvent::TokenRecovered { .. } => "token_recovered",
            LedgerEvent::PauseChanged { .. } => "pause_changed",
            LedgerEvent::ConfigUpdated { .. } => "config_updated",
            LedgerEvent::VaultStaked { .. } => "vault_staked",
            LedgerEvent::VaultUnstaked { .. } => "vault_unstaked",
            LedgerEvent::Compounded { .. } => "compounded",
        }
    }
}

/// Append-only log of committed events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    events: Vec<LedgerEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and mirror it to the tracing subscriber.
    pub fn emit(&mut self, event: LedgerEvent) {
        tracing::info!(event = event.name(), "{:?}", event);
        self.events.push(event);
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events appended after position `from` (use with `len()` as a cursor).
    pub fn since(&self, from: usize) -> &[LedgerEvent] {
        &self.events[from.min(self.events.len())..]
    }

    pub fn last(&self) -> Option<&LedgerEvent> {
        self.events.last()
    }

    /// Drop every event after position `len`. Used to undo a failed call.
    pub fn truncate(&mut self, len: usize) {
        if len < self.events.len() {
            tracing::debug!(dropped = self.events.len() - len, "event log truncated");
            self.events.truncate(len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_appends_in_order() {
        let mut log = EventLog::new();
        let component = Address::from_label("treasury");
        log.emit(LedgerEvent::PauseChanged { component, paused: true });
        log.emit(LedgerEvent::PauseChanged { component, paused: false });
        assert_eq!(log.len(), 2);
        assert_eq!(log.since(1).len(), 1);
        assert_eq!(log.last().unwrap().name(), "pause_changed");
    }

    #[test]
    fn test_truncate_keeps_prefix() {
        let mut log = EventLog::new();
        let component = Address::from_label("pool");
        log.emit(LedgerEvent::PauseChanged { component, paused: true });
        let mark = log.len();
        log.emit(LedgerEvent::PauseChanged { component, paused: false });
        log.truncate(mark);
        assert_eq!(log.len(), 1);
        assert_eq!(log.last(), Some(&LedgerEvent::PauseChanged { component, paused: true }));
        log.truncate(5);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = LedgerEvent::RateChanged {
            feed: Address::from_label("feed"),
            old_rate: 1,
            new_rate: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "rate_changed");
        assert_eq!(json["new_rate"], 2);
    }
}
