// crates/purse-sim/src/output.rs
//
// Output formatting utilities for the simulator.
// Supports table and JSON output modes.

use clap::ValueEnum;
use serde::Serialize;
use tabled::{Table, Tabled};

use purse_core::LedgerEvent;

use crate::runner::{AccountReport, StepReport, SystemReport};

/// Output format for simulator reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed table output (default).
    Table,
    /// JSON output for machine consumption.
    Json,
}

#[derive(Tabled)]
pub struct StepRow {
    #[tabled(rename = "#")]
    pub index: usize,
    pub at: u64,
    pub op: String,
    pub status: &'static str,
    pub detail: String,
    pub events: usize,
}

impl From<&StepReport> for StepRow {
    fn from(report: &StepReport) -> Self {
        Self {
            index: report.index,
            at: report.at,
            op: report.op.clone(),
            status: if report.ok { "ok" } else { "failed" },
            detail: report.detail.clone(),
            events: report.events,
        }
    }
}

#[derive(Tabled)]
pub struct AccountRow {
    pub account: String,
    pub purse: u64,
    #[tabled(rename = "vreward")]
    pub vault_reward: u64,
    #[tabled(rename = "receipt")]
    pub receipt_shares: u64,
    #[tabled(rename = "vault shares")]
    pub vault_shares: u64,
    #[tabled(rename = "base claimable")]
    pub base_claimable: u64,
    #[tabled(rename = "vault claimable")]
    pub vault_claimable: u64,
    #[tabled(rename = "base escrow")]
    pub base_escrowed: u64,
    #[tabled(rename = "vault escrow")]
    pub vault_escrowed: u64,
}

impl From<&AccountReport> for AccountRow {
    fn from(report: &AccountReport) -> Self {
        Self {
            account: format!("{} ({})", report.label, report.address.short()),
            purse: report.purse,
            vault_reward: report.vault_reward,
            receipt_shares: report.receipt_shares,
            vault_shares: report.vault_shares,
            base_claimable: report.base_claimable,
            vault_claimable: report.vault_claimable,
            base_escrowed: report.base_escrowed,
            vault_escrowed: report.vault_escrowed,
        }
    }
}

#[derive(Tabled)]
pub struct EventRow {
    #[tabled(rename = "#")]
    pub index: usize,
    pub event: &'static str,
    pub fields: String,
}

impl EventRow {
    pub fn new(index: usize, event: &LedgerEvent) -> Self {
        let fields = serde_json::to_value(event)
            .ok()
            .and_then(|value| value.as_object().cloned())
            .map(|map| {
                map.iter()
                    .filter(|(key, _)| key.as_str() != "event")
                    .map(|(key, value)| format!("{}={}", key, value))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_else(|| format!("{:?}", event));
        Self {
            index,
            event: event.name(),
            fields,
        }
    }
}

/// Everything a run produces, for JSON output.
#[derive(Serialize)]
pub struct RunReport<'a> {
    pub steps: &'a [StepReport],
    pub accounts: &'a [AccountReport],
    pub summary: &'a SystemReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<&'a [LedgerEvent]>,
}

/// Format a slice of Tabled items as a table string.
pub fn format_table<T: Tabled>(data: &[T]) -> String {
    Table::new(data).to_string()
}

/// Format a serializable value as a pretty-printed JSON string.
pub fn format_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|e| format!("JSON serialization error: {}", e))
}

/// Render the end-of-run summary as `key: value` lines.
pub fn format_summary(summary: &SystemReport) -> String {
    let mut lines = vec![
        format!("time:                 {}", summary.now),
        format!("pool principal:       {}", summary.total_principal),
        format!("pool receipt shares:  {}", summary.total_receipt_shares),
        format!("pool locked:          {}", summary.total_locked),
        format!("treasury balance:     {}", summary.treasury_balance),
        format!("vault assets:         {}", summary.vault_total_assets),
        format!("vault shares:         {}", summary.vault_total_shares),
        format!("vault locked:         {}", summary.vault_total_locked),
        format!("events:               {}", summary.events),
    ];
    if summary.audit.is_empty() {
        lines.push("audit:                clean".to_string());
    } else {
        lines.extend(summary.audit.iter().map(|problem| format!("audit:                {}", problem)));
    }
    lines.join("\n")
}
