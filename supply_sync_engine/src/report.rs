//! Per-order outcome records and the run summary.
//!
//! One record is emitted per supply order looked at; the CLI prints each as a JSON line
//! so the batch's behaviour can be grepped and diffed between runs.

use std::fmt::Display;

use chrono::NaiveDate;
use serde::Serialize;

/// What the reconciliation pass decided for one order.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderOutcome {
    /// The document chain was brought in line with the marketplace.
    Synced { created: bool, positions: usize, transfer_committed: bool, shipment_created: bool },
    /// A shipment already exists; the chain is frozen and was not touched.
    AlreadyShipped,
    /// The order is cancelled. `deleted` is false under dry-run or with deletion
    /// disabled, in which case only the intent was logged.
    Cancelled { deleted: bool },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoOrderNumber,
    NoPlannedDate,
    BeforeCutoff(NaiveDate),
    /// Catalog resolution dropped every line; an order is never created with zero
    /// positions.
    EmptyItems,
    /// Data-integrity anomaly: an article matched more than one catalog row.
    AmbiguousArticle(String),
    /// Dry-run stopped short of mutating anything.
    DryRun { positions: usize },
}

impl OrderOutcome {
    pub fn action(&self) -> &'static str {
        match self {
            OrderOutcome::Synced { created: true, .. } => "created",
            OrderOutcome::Synced { created: false, .. } => "updated",
            OrderOutcome::AlreadyShipped => "shipped",
            OrderOutcome::Cancelled { deleted: true } => "deleted",
            OrderOutcome::Cancelled { deleted: false } => "would_delete",
            OrderOutcome::Skipped(SkipReason::DryRun { .. }) => "would_sync",
            OrderOutcome::Skipped(_) => "skipped",
        }
    }

    fn detail(&self) -> Option<String> {
        match self {
            OrderOutcome::Synced { transfer_committed: false, .. } => Some("transfer not committed".to_string()),
            OrderOutcome::Skipped(SkipReason::NoOrderNumber) => Some("no order number".to_string()),
            OrderOutcome::Skipped(SkipReason::NoPlannedDate) => Some("no planned date".to_string()),
            OrderOutcome::Skipped(SkipReason::BeforeCutoff(date)) => Some(format!("planned {date} before cutoff")),
            OrderOutcome::Skipped(SkipReason::EmptyItems) => Some("no resolvable items".to_string()),
            OrderOutcome::Skipped(SkipReason::AmbiguousArticle(article)) => {
                Some(format!("ambiguous article '{article}'"))
            },
            _ => None,
        }
    }

    fn positions(&self) -> Option<usize> {
        match self {
            OrderOutcome::Synced { positions, .. } | OrderOutcome::Skipped(SkipReason::DryRun { positions }) => {
                Some(*positions)
            },
            _ => None,
        }
    }
}

/// The structured per-order outcome line.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRecord {
    pub cabinet: String,
    pub order_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positions: Option<usize>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub shipment_created: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub transfer_blocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl OrderRecord {
    pub fn from_outcome(cabinet: &str, order_number: &str, state: Option<String>, outcome: &OrderOutcome) -> Self {
        let shipment_created = matches!(outcome, OrderOutcome::Synced { shipment_created: true, .. });
        let transfer_blocked = matches!(outcome, OrderOutcome::Synced { transfer_committed: false, .. });
        Self {
            cabinet: cabinet.to_string(),
            order_number: order_number.to_string(),
            state,
            action: outcome.action().to_string(),
            positions: outcome.positions(),
            shipment_created,
            transfer_blocked,
            detail: outcome.detail(),
        }
    }

    pub fn from_error(cabinet: &str, order_number: &str, state: Option<String>, error: String) -> Self {
        Self {
            cabinet: cabinet.to_string(),
            order_number: order_number.to_string(),
            state,
            action: "error".to_string(),
            positions: None,
            shipment_created: false,
            transfer_blocked: false,
            detail: Some(error),
        }
    }
}

/// Final counts for one cabinet's run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub blocked: usize,
    pub shipments: usize,
    pub errors: usize,
}

impl RunSummary {
    pub fn tally(&mut self, record: &OrderRecord) {
        match record.action.as_str() {
            "created" => self.created += 1,
            "updated" => self.updated += 1,
            "deleted" => self.deleted += 1,
            "error" => self.errors += 1,
            _ => self.skipped += 1,
        }
        if record.transfer_blocked {
            self.blocked += 1;
        }
        if record.shipment_created {
            self.shipments += 1;
        }
    }
}

impl Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "created: {}, updated: {}, skipped: {}, deleted: {}, blocked on stock: {}, shipments: {}, errors: {}",
            self.created, self.updated, self.skipped, self.deleted, self.blocked, self.shipments, self.errors
        )
    }
}

/// Everything one cabinet run produced.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub records: Vec<OrderRecord>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn push(&mut self, record: OrderRecord) {
        self.summary.tally(&record);
        self.records.push(record);
    }

    pub fn merge(&mut self, other: RunReport) {
        for record in other.records {
            self.push(record);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn summary_counts_actions() {
        let mut summary = RunSummary::default();
        let outcomes = [
            OrderOutcome::Synced { created: true, positions: 2, transfer_committed: true, shipment_created: true },
            OrderOutcome::Synced { created: false, positions: 1, transfer_committed: false, shipment_created: false },
            OrderOutcome::Cancelled { deleted: true },
            OrderOutcome::Skipped(SkipReason::EmptyItems),
        ];
        for (i, outcome) in outcomes.iter().enumerate() {
            summary.tally(&OrderRecord::from_outcome("cab1", &format!("SO-{i}"), None, outcome));
        }
        summary.tally(&OrderRecord::from_error("cab1", "SO-9", None, "boom".to_string()));
        assert_eq!(
            summary,
            RunSummary { created: 1, updated: 1, skipped: 1, deleted: 1, blocked: 1, shipments: 1, errors: 1 }
        );
    }
}
