use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

//--------------------------------------    SupplyState     ----------------------------------------------------------

/// The marketplace's supply-order lifecycle states.
///
/// This is a closed enum on purpose: every consumer matches it exhaustively, so when the
/// marketplace introduces a new state the gateway fails to parse the order (and logs it)
/// instead of silently mis-categorising it, and adding the variant forces every mapping
/// to be revisited at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupplyState {
    DataFilling,
    ReadyToSupply,
    AcceptedAtSupplyWarehouse,
    InTransit,
    AcceptanceAtStorageWarehouse,
    ReportsConfirmationAwaiting,
    ReportRejected,
    Completed,
    RejectedAtSupplyWarehouse,
    Cancelled,
    Overdue,
}

/// How the reconciliation engine treats a lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateCategory {
    /// Keep the ERP document chain in sync; no shipment yet.
    Syncing,
    /// Goods are on their way to (or being accepted at) the fulfillment warehouse; a
    /// shipment may be created once the transfer is committed.
    ShipmentEligible,
    /// The supply was cancelled; the document chain may be torn down if no shipment exists.
    Cancelled,
}

impl SupplyState {
    /// Every supply order the gateway should look at. Kept in lifecycle order.
    pub const ALL: [SupplyState; 11] = [
        SupplyState::DataFilling,
        SupplyState::ReadyToSupply,
        SupplyState::AcceptedAtSupplyWarehouse,
        SupplyState::InTransit,
        SupplyState::AcceptanceAtStorageWarehouse,
        SupplyState::ReportsConfirmationAwaiting,
        SupplyState::ReportRejected,
        SupplyState::Completed,
        SupplyState::RejectedAtSupplyWarehouse,
        SupplyState::Cancelled,
        SupplyState::Overdue,
    ];

    pub fn category(self) -> StateCategory {
        match self {
            SupplyState::DataFilling => StateCategory::Syncing,
            SupplyState::ReadyToSupply => StateCategory::Syncing,
            SupplyState::AcceptedAtSupplyWarehouse => StateCategory::Syncing,
            SupplyState::InTransit => StateCategory::ShipmentEligible,
            SupplyState::AcceptanceAtStorageWarehouse => StateCategory::ShipmentEligible,
            SupplyState::ReportsConfirmationAwaiting => StateCategory::Syncing,
            SupplyState::ReportRejected => StateCategory::Syncing,
            SupplyState::Completed => StateCategory::Syncing,
            SupplyState::RejectedAtSupplyWarehouse => StateCategory::Syncing,
            SupplyState::Cancelled => StateCategory::Cancelled,
            SupplyState::Overdue => StateCategory::Syncing,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            SupplyState::DataFilling => "DATA_FILLING",
            SupplyState::ReadyToSupply => "READY_TO_SUPPLY",
            SupplyState::AcceptedAtSupplyWarehouse => "ACCEPTED_AT_SUPPLY_WAREHOUSE",
            SupplyState::InTransit => "IN_TRANSIT",
            SupplyState::AcceptanceAtStorageWarehouse => "ACCEPTANCE_AT_STORAGE_WAREHOUSE",
            SupplyState::ReportsConfirmationAwaiting => "REPORTS_CONFIRMATION_AWAITING",
            SupplyState::ReportRejected => "REPORT_REJECTED",
            SupplyState::Completed => "COMPLETED",
            SupplyState::RejectedAtSupplyWarehouse => "REJECTED_AT_SUPPLY_WAREHOUSE",
            SupplyState::Cancelled => "CANCELLED",
            SupplyState::Overdue => "OVERDUE",
        }
    }
}

impl Display for SupplyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

#[derive(Debug, Clone, Error)]
#[error("Unknown supply state: {0}")]
pub struct UnknownState(String);

impl FromStr for SupplyState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SupplyState::ALL
            .into_iter()
            .find(|state| state.as_wire() == s)
            .ok_or_else(|| UnknownState(s.to_string()))
    }
}

//--------------------------------------    SupplyOrder     ----------------------------------------------------------

/// One supply order, as returned by the order-detail endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SupplyOrder {
    #[serde(default)]
    pub order_id: i64,
    #[serde(default)]
    pub order_number: String,
    pub state: SupplyState,
    #[serde(default)]
    pub timeslot: Option<Timeslot>,
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub supplies: Vec<SupplyRef>,
    #[serde(default)]
    pub drop_off_warehouse: Option<WarehouseRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupplyRef {
    #[serde(default)]
    pub bundle_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseRef {
    #[serde(default)]
    pub name: String,
}

impl SupplyOrder {
    /// The date goods are planned to arrive at the fulfillment warehouse, in the
    /// warehouse's local timezone. Falls back to the order's creation date when no
    /// timeslot has been booked yet; `None` means the order carries no usable date at all.
    pub fn planned_local_date(&self) -> Option<NaiveDate> {
        self.timeslot
            .as_ref()
            .and_then(Timeslot::local_date)
            .or_else(|| self.created_date.map(|d| d.date_naive()))
    }

    pub fn bundle_ids(&self) -> impl Iterator<Item = &str> {
        self.supplies.iter().map(|s| s.bundle_id.as_str()).filter(|id| !id.is_empty())
    }

    pub fn destination_name(&self) -> &str {
        self.drop_off_warehouse.as_ref().map(|w| w.name.as_str()).unwrap_or("")
    }
}

//--------------------------------------      Timeslot      ----------------------------------------------------------

/// The booked delivery window. The `from` instant is UTC; `timezone_info.offset` is the
/// warehouse's UTC offset in second-denominated form (`"18000s"`).
#[derive(Debug, Clone, Deserialize)]
pub struct Timeslot {
    #[serde(default)]
    pub timeslot: Option<TimeslotWindow>,
    #[serde(default)]
    pub timezone_info: Option<TimezoneInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeslotWindow {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimezoneInfo {
    #[serde(default)]
    pub offset: Option<String>,
}

fn parse_offset_seconds(raw: &str) -> i32 {
    raw.trim().trim_end_matches('s').parse().unwrap_or(0)
}

impl Timeslot {
    /// The window's start date in warehouse-local time.
    pub fn local_date(&self) -> Option<NaiveDate> {
        let from = self.timeslot.as_ref()?.from?;
        let offset_s = self.timezone_info.as_ref().and_then(|tz| tz.offset.as_deref()).map(parse_offset_seconds).unwrap_or(0);
        let tz = FixedOffset::east_opt(offset_s).unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
        Some(from.with_timezone(&tz).date_naive())
    }
}

//--------------------------------------     SupplyItem     ----------------------------------------------------------

/// One line of a supply's item bundle. `article` is the marketplace offer code, which by
/// convention equals the ERP catalog article.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SupplyItem {
    #[serde(rename = "offer_id", default)]
    pub article: String,
    #[serde(default)]
    pub quantity: f64,
}

impl SupplyItem {
    pub fn new(article: &str, quantity: f64) -> Self {
        Self { article: article.to_string(), quantity }
    }

    pub fn is_valid(&self) -> bool {
        !self.article.trim().is_empty() && self.quantity > 0.0
    }
}

//--------------------------------------    Stock update    ----------------------------------------------------------

/// A stock level to publish back to the marketplace.
#[derive(Debug, Clone, Serialize)]
pub struct StockUpdate {
    pub offer_id: String,
    pub stock: i64,
    pub warehouse_id: i64,
}

/// Per-row acknowledgement from the stock-publishing endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct StockPublishRow {
    #[serde(default)]
    pub offer_id: String,
    #[serde(default)]
    pub updated: bool,
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn state_round_trips_through_wire_form() {
        for state in SupplyState::ALL {
            assert_eq!(state.as_wire().parse::<SupplyState>().unwrap(), state);
        }
        assert!("SOMETHING_NEW".parse::<SupplyState>().is_err());
    }

    #[test]
    fn only_transit_and_acceptance_are_shipment_eligible() {
        let eligible: Vec<SupplyState> =
            SupplyState::ALL.into_iter().filter(|s| s.category() == StateCategory::ShipmentEligible).collect();
        assert_eq!(eligible, vec![SupplyState::InTransit, SupplyState::AcceptanceAtStorageWarehouse]);
        assert_eq!(SupplyState::Cancelled.category(), StateCategory::Cancelled);
    }

    #[test]
    fn timeslot_date_uses_warehouse_offset() {
        // 2025-12-21T22:00Z is already 2025-12-22 at UTC+5
        let order: SupplyOrder = serde_json::from_value(json!({
            "order_id": 1,
            "order_number": "SO-1",
            "state": "READY_TO_SUPPLY",
            "timeslot": {
                "timeslot": { "from": "2025-12-21T22:00:00Z" },
                "timezone_info": { "offset": "18000s" }
            }
        }))
        .unwrap();
        assert_eq!(order.planned_local_date(), Some(NaiveDate::from_ymd_opt(2025, 12, 22).unwrap()));
    }

    #[test]
    fn planned_date_falls_back_to_created_date() {
        let order: SupplyOrder = serde_json::from_value(json!({
            "order_id": 2,
            "order_number": "SO-2",
            "state": "DATA_FILLING",
            "created_date": "2026-01-15T10:30:00Z"
        }))
        .unwrap();
        assert_eq!(order.planned_local_date(), Some(NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()));

        let order: SupplyOrder = serde_json::from_value(json!({
            "order_id": 3,
            "order_number": "SO-3",
            "state": "DATA_FILLING"
        }))
        .unwrap();
        assert_eq!(order.planned_local_date(), None);
    }

    #[test]
    fn bundle_rows_validate_article_and_quantity() {
        assert!(SupplyItem::new("A-1", 2.0).is_valid());
        assert!(!SupplyItem::new("", 2.0).is_valid());
        assert!(!SupplyItem::new("A-1", 0.0).is_valid());
    }
}
