//! The per-order reconciliation state machine.
//!
//! One [`SupplySync`] instance drives one cabinet: it pulls the cabinet's supply orders,
//! then processes each order *fully* (all of its ERP writes) before touching the next,
//! so there is never concurrent mutation of one order's document chain within a run.
//! Cabinets address disjoint order-number namespaces and may run in parallel, each with
//! its own resolver cache.
//!
//! Per order the machine is:
//! shipment exists → frozen; cancelled → (maybe) delete; otherwise sync the sales order,
//! then the transfer (whose positions derive from the order's already-expanded ones;
//! that ordering keeps what the customer sees and what physically moves from
//! diverging), then gate the shipment on the transfer's committed flag.

use chrono::NaiveDate;
use log::*;
use marketplace_tools::{StateCategory, SupplyItem, SupplyOrder, SupplyState};

use crate::{
    catalog::CatalogResolver,
    documents::{DocRefs, DocumentFlow},
    errors::SyncError,
    kit,
    report::{OrderOutcome, OrderRecord, RunReport, SkipReason},
    traits::{ErpDocumentStore, SupplyOrderSource},
};
use erp_tools::DocKind;

/// Run-level switches, shared by every cabinet.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Log every intended mutation, perform none.
    pub dry_run: bool,
    /// Destructive deletion of cancelled orders' documents. Off means "safe mode": the
    /// intent is logged and nothing changes.
    pub allow_delete: bool,
    /// Orders planned before this date are out of scope for the gateway.
    pub planned_from: NaiveDate,
}

pub struct SupplySync<S, E> {
    source: S,
    flow: DocumentFlow<E>,
    resolver: CatalogResolver<E>,
    settings: SyncSettings,
}

impl<S, E> SupplySync<S, E>
where
    S: SupplyOrderSource,
    E: ErpDocumentStore,
{
    pub fn new(source: S, erp: E, refs: DocRefs, settings: SyncSettings) -> Self {
        let flow = DocumentFlow::new(erp.clone(), refs, settings.dry_run);
        let resolver = CatalogResolver::new(erp);
        Self { source, flow, resolver, settings }
    }

    /// Reconciles every supply order of the cabinet, in listing order. Errors are
    /// contained per order; the report's error count is the only trace a bad order
    /// leaves on the rest of the batch.
    pub async fn run(&self) -> RunReport {
        let cabinet = self.source.cabinet_name().to_string();
        let mut report = RunReport::default();
        info!("🔄️ [{cabinet}] listing supply orders");
        let orders = match self.source.list_supply_orders(&SupplyState::ALL).await {
            Ok(orders) => orders,
            Err(e) => {
                error!("🔄️ [{cabinet}] could not list supply orders: {e}");
                report.push(OrderRecord::from_error(&cabinet, "", None, format!("list supply orders: {e}")));
                return report;
            },
        };
        info!("🔄️ [{cabinet}] {} supply orders to reconcile", orders.len());
        for order in &orders {
            report.push(self.process(&cabinet, order).await);
        }
        info!("🔄️ [{cabinet}] run complete. {}", report.summary);
        report
    }

    /// Drives the same state machine for a single supply order, by marketplace id.
    pub async fn sync_one(&self, order_id: i64) -> RunReport {
        let cabinet = self.source.cabinet_name().to_string();
        let mut report = RunReport::default();
        match self.source.fetch_supply_orders(&[order_id]).await {
            Ok(orders) if orders.is_empty() => {
                warn!("🔄️ [{cabinet}] supply order {order_id} not found");
                report.push(OrderRecord::from_error(&cabinet, "", None, format!("order {order_id} not found")));
            },
            Ok(orders) => {
                for order in &orders {
                    report.push(self.process(&cabinet, order).await);
                }
            },
            Err(e) => {
                report.push(OrderRecord::from_error(&cabinet, "", None, format!("fetch order {order_id}: {e}")));
            },
        }
        report
    }

    async fn process(&self, cabinet: &str, order: &SupplyOrder) -> OrderRecord {
        let order_number = order.order_number.trim();
        let state = Some(order.state.to_string());
        match self.reconcile(order).await {
            Ok(outcome) => {
                info!("🔄️ [{cabinet}] {order_number} {}: {}", order.state, outcome.action());
                OrderRecord::from_outcome(cabinet, order_number, state, &outcome)
            },
            Err(e) => {
                error!("🔄️ [{cabinet}] {order_number} failed: {e}");
                OrderRecord::from_error(cabinet, order_number, state, e.to_string())
            },
        }
    }

    async fn reconcile(&self, order: &SupplyOrder) -> Result<OrderOutcome, SyncError> {
        let order_number = order.order_number.trim();
        if order_number.is_empty() {
            return Ok(OrderOutcome::Skipped(SkipReason::NoOrderNumber));
        }
        let Some(planned) = order.planned_local_date() else {
            return Ok(OrderOutcome::Skipped(SkipReason::NoPlannedDate));
        };
        if planned < self.settings.planned_from {
            return Ok(OrderOutcome::Skipped(SkipReason::BeforeCutoff(planned)));
        }

        // A shipment is the point of no return: once goods have left, the chain is
        // frozen no matter what the marketplace shows for the order now.
        let shipped = self
            .flow
            .find_single(DocKind::Shipment, order_number)
            .await
            .map_err(|e| SyncError::step("find shipment", e))?;
        if shipped.is_some() {
            return Ok(OrderOutcome::AlreadyShipped);
        }

        match order.state.category() {
            StateCategory::Cancelled => self.cancel(order_number).await,
            StateCategory::Syncing => self.sync(order, order_number, planned, false).await,
            StateCategory::ShipmentEligible => self.sync(order, order_number, planned, true).await,
        }
    }

    async fn cancel(&self, order_number: &str) -> Result<OrderOutcome, SyncError> {
        if self.settings.dry_run || !self.settings.allow_delete {
            let mode = if self.settings.dry_run { "dry-run" } else { "safe mode" };
            info!("🗑️ {order_number} cancelled; would delete transfer and sales order ({mode})");
            return Ok(OrderOutcome::Cancelled { deleted: false });
        }
        let deleted =
            self.flow.delete_cancelled(order_number).await.map_err(|e| SyncError::step("delete cancelled", e))?;
        info!("🗑️ {order_number} cancelled; {deleted} documents deleted");
        Ok(OrderOutcome::Cancelled { deleted: deleted > 0 })
    }

    async fn sync(
        &self,
        order: &SupplyOrder,
        order_number: &str,
        planned: NaiveDate,
        shipment_eligible: bool,
    ) -> Result<OrderOutcome, SyncError> {
        let mut items: Vec<SupplyItem> = Vec::new();
        for bundle_id in order.bundle_ids() {
            let batch = self
                .source
                .bundle_items(bundle_id)
                .await
                .map_err(|e| SyncError::step("fetch bundle items", e))?;
            items.extend(batch);
        }

        let resolved = kit::resolve_positions(&self.resolver, &items).await?;
        if let Some(article) = resolved.ambiguous.first() {
            return Ok(OrderOutcome::Skipped(SkipReason::AmbiguousArticle(article.clone())));
        }
        if resolved.lines.is_empty() {
            warn!("🔄️ {order_number}: nothing resolvable in {} items; skipping whole order", items.len());
            return Ok(OrderOutcome::Skipped(SkipReason::EmptyItems));
        }
        let order_positions = resolved.order_positions();

        if self.settings.dry_run {
            info!("🔄️ {order_number}: would sync {} positions (dry-run)", order_positions.len());
            return Ok(OrderOutcome::Skipped(SkipReason::DryRun { positions: order_positions.len() }));
        }

        let comment = one_time_comment(order_number, order.destination_name());
        let (sales_order, created) = self
            .flow
            .upsert_sales_order(order_number, planned, &comment)
            .await
            .map_err(|e| SyncError::step("upsert sales order", e))?;
        self.flow
            .replace_positions(DocKind::SalesOrder, &sales_order, &order_positions)
            .await
            .map_err(|e| SyncError::step("replace sales order positions", e))?;

        // the transfer moves components, derived from the order's (final) positions
        let expanded = kit::expand_components(&self.resolver, &resolved.lines).await?;
        if expanded.skipped_components > 0 {
            warn!("🚚️ {order_number}: {} kit components unresolvable, left out", expanded.skipped_components);
        }
        if expanded.positions.is_empty() {
            warn!("🚚️ {order_number}: component expansion left nothing to move; transfer not touched");
            return Ok(OrderOutcome::Synced {
                created,
                positions: order_positions.len(),
                transfer_committed: false,
                shipment_created: false,
            });
        }
        let transfer = self
            .flow
            .upsert_transfer(order_number, &sales_order, &expanded.positions)
            .await
            .map_err(|e| SyncError::step("upsert transfer", e))?;

        let mut shipment_created = false;
        if shipment_eligible && transfer.is_committed() {
            let shipment = self
                .flow
                .create_shipment(order_number, &sales_order, &comment, &self.resolver)
                .await
                .map_err(|e| SyncError::step("create shipment", e))?;
            shipment_created = shipment.is_some();
        }

        Ok(OrderOutcome::Synced {
            created,
            positions: order_positions.len(),
            transfer_committed: transfer.is_committed(),
            shipment_created,
        })
    }
}

/// The comment written once at sales-order creation: `"<number> - <destination>"`.
/// Never rewritten afterwards, so warehouse staff notes in the ERP survive re-syncs.
fn one_time_comment(order_number: &str, destination: &str) -> String {
    if destination.is_empty() {
        order_number.to_string()
    } else {
        format!("{order_number} - {destination}")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn comment_includes_destination_when_known() {
        assert_eq!(one_time_comment("SO-1", "North Hub"), "SO-1 - North Hub");
        assert_eq!(one_time_comment("SO-1", ""), "SO-1");
    }
}
