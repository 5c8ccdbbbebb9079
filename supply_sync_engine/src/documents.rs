//! The idempotent ERP document service.
//!
//! Every mutation here is keyed by the supply order number (the ERP `externalCode`):
//! a create is always preceded by a lookup, a create that races a concurrent run falls
//! back to update, and duplicate documents are reduced to the earliest survivor. The
//! one-time description comment is written only at creation and never resent, so manual
//! edits in the ERP UI survive every subsequent pass.

use chrono::NaiveDate;
use erp_tools::{
    meta::{entity_ref, state_ref, MetaRef},
    ship_moment,
    DocKind,
    Document,
    DocumentPayload,
    ErpApiError,
    PositionPayload,
    Rows,
};
use log::*;
use sg_common::http::HttpError;

use crate::{catalog::CatalogResolver, traits::ErpDocumentStore};

/// The fixed entity references a run stamps onto every document: who sells, who buys,
/// which stores the goods move between, the per-kind workflow states and the cabinet's
/// sales channel.
#[derive(Debug, Clone)]
pub struct DocRefs {
    pub organization: MetaRef,
    pub counterparty: MetaRef,
    pub source_store: MetaRef,
    pub target_store: MetaRef,
    pub state_sales_order: MetaRef,
    pub state_transfer: MetaRef,
    pub state_shipment: MetaRef,
    pub sales_channel: MetaRef,
}

impl DocRefs {
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        base_url: &str,
        organization_id: &str,
        counterparty_id: &str,
        source_store_id: &str,
        target_store_id: &str,
        state_sales_order_id: &str,
        state_transfer_id: &str,
        state_shipment_id: &str,
        sales_channel_id: &str,
    ) -> Self {
        Self {
            organization: entity_ref(base_url, "organization", organization_id),
            counterparty: entity_ref(base_url, "counterparty", counterparty_id),
            source_store: entity_ref(base_url, "store", source_store_id),
            target_store: entity_ref(base_url, "store", target_store_id),
            state_sales_order: state_ref(base_url, DocKind::SalesOrder.path(), state_sales_order_id),
            state_transfer: state_ref(base_url, DocKind::Transfer.path(), state_transfer_id),
            state_shipment: state_ref(base_url, DocKind::Shipment.path(), state_shipment_id),
            sales_channel: entity_ref(base_url, "saleschannel", sales_channel_id),
        }
    }
}

/// What happened to the transfer's commit attempt.
#[derive(Debug, Clone)]
pub enum TransferOutcome {
    /// Inventory accepted the move; the transfer is applicable.
    Committed(Document),
    /// The warehouse cannot cover the positions yet. The transfer stays uncommitted and
    /// the order proceeds (its shipment-eligibility check will be negative).
    Blocked(Document),
}

impl TransferOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, TransferOutcome::Committed(_))
    }
}

pub struct DocumentFlow<E> {
    erp: E,
    refs: DocRefs,
    dry_run: bool,
}

impl<E: ErpDocumentStore> DocumentFlow<E> {
    pub fn new(erp: E, refs: DocRefs, dry_run: bool) -> Self {
        Self { erp, refs, dry_run }
    }

    /// Finds the document of `kind` for the order number, reducing duplicates to the
    /// earliest one. Duplicates can only appear when a create raced the idempotency
    /// lookup; keeping the earliest preserves whatever downstream documents link to it.
    pub async fn find_single(&self, kind: DocKind, code: &str) -> Result<Option<Document>, ErpApiError> {
        let mut docs = self.erp.find_by_external_code(kind, code).await?;
        if docs.len() > 1 {
            warn!("📑️ {} {kind} documents carry externalCode={code}; reducing to the earliest", docs.len());
            docs.sort_by(|a, b| a.moment.cmp(&b.moment));
            if !self.dry_run {
                for extra in docs.drain(1..).collect::<Vec<_>>() {
                    self.erp.delete(kind, &extra.id).await?;
                }
            }
        }
        Ok(docs.into_iter().next())
    }

    /// Creates or updates the sales order. The create path writes the one-time comment
    /// and the planned-ship moment; the update path refreshes everything *except* the
    /// comment. Returns the document and whether it was created on this pass.
    pub async fn upsert_sales_order(
        &self,
        order_number: &str,
        planned_date: NaiveDate,
        comment: &str,
    ) -> Result<(Document, bool), ErpApiError> {
        let existing = self.find_single(DocKind::SalesOrder, order_number).await?;
        let mut payload = DocumentPayload {
            name: Some(order_number.to_string()),
            external_code: Some(order_number.to_string()),
            organization: Some(self.refs.organization.clone()),
            agent: Some(self.refs.counterparty.clone()),
            store: Some(self.refs.target_store.clone()),
            state: Some(self.refs.state_sales_order.clone()),
            sales_channel: Some(self.refs.sales_channel.clone()),
            shipment_planned_moment: Some(ship_moment(planned_date)),
            applicable: Some(true),
            ..Default::default()
        };
        match existing {
            Some(doc) => {
                let updated = self.erp.update(DocKind::SalesOrder, &doc.id, &payload).await?;
                Ok((updated, false))
            },
            None => {
                payload.description = Some(comment.to_string());
                let created = self.create_or_recover(DocKind::SalesOrder, payload).await?;
                Ok(created)
            },
        }
    }

    /// Replaces the positions of an already-upserted document.
    pub async fn replace_positions(
        &self,
        kind: DocKind,
        doc: &Document,
        positions: &[PositionPayload],
    ) -> Result<(), ErpApiError> {
        self.erp.replace_positions(kind, &doc.id, positions).await
    }

    /// Creates or updates the transfer linked to the sales order, replaces its positions
    /// (already component-expanded by the caller), then attempts to commit it. An
    /// insufficient-stock rejection is the expected "warehouse not ready" case and comes
    /// back as [`TransferOutcome::Blocked`], never as an error.
    pub async fn upsert_transfer(
        &self,
        order_number: &str,
        sales_order: &Document,
        positions: &[PositionPayload],
    ) -> Result<TransferOutcome, ErpApiError> {
        let existing = self.find_single(DocKind::Transfer, order_number).await?;
        let payload = DocumentPayload {
            name: Some(order_number.to_string()),
            external_code: Some(order_number.to_string()),
            organization: Some(self.refs.organization.clone()),
            source_store: Some(self.refs.source_store.clone()),
            target_store: Some(self.refs.target_store.clone()),
            state: Some(self.refs.state_transfer.clone()),
            sales_order: Some(sales_order.to_ref()),
            // positions cannot be rewritten on a committed document; recommitted below
            applicable: Some(false),
            ..Default::default()
        };
        let doc = match existing {
            Some(doc) => self.erp.update(DocKind::Transfer, &doc.id, &payload).await?,
            None => self.create_or_recover(DocKind::Transfer, payload).await?.0,
        };
        self.erp.replace_positions(DocKind::Transfer, &doc.id, positions).await?;
        match self.erp.set_applicable(DocKind::Transfer, &doc.id, true).await {
            Ok(committed) => Ok(TransferOutcome::Committed(committed)),
            Err(e) if e.is_insufficient_stock() => {
                info!("🚚️ Transfer for {order_number} blocked on stock; leaving uncommitted");
                Ok(TransferOutcome::Blocked(doc))
            },
            Err(e) => Err(e),
        }
    }

    /// Creates the shipment from the sales order's current positions. Prices are
    /// repaired before writing: a zero price is replaced with the catalog sale price
    /// when one is resolvable. Insufficient stock is a soft skip (`None`); a shipment
    /// that appeared between the caller's check and ours is returned as-is.
    pub async fn create_shipment(
        &self,
        order_number: &str,
        sales_order: &Document,
        comment: &str,
        resolver: &CatalogResolver<E>,
    ) -> Result<Option<Document>, ErpApiError> {
        if let Some(existing) = self.find_single(DocKind::Shipment, order_number).await? {
            debug!("🛳️ Shipment for {order_number} already exists");
            return Ok(Some(existing));
        }
        let order_positions = self.erp.positions(DocKind::SalesOrder, &sales_order.id).await?;
        let mut rows = Vec::with_capacity(order_positions.len());
        for position in &order_positions {
            let mut price = position.price;
            if price.is_zero() {
                if let Ok(entity) = resolver.resolve_by_href(position.assortment_href()).await {
                    price = entity.sale_price();
                }
                if price.is_zero() {
                    warn!("🛳️ No resolvable price for {} on {order_number}", position.assortment_href());
                }
            }
            rows.push(PositionPayload::new(position.assortment.clone(), position.quantity, price));
        }
        let payload = DocumentPayload {
            external_code: Some(order_number.to_string()),
            organization: Some(self.refs.organization.clone()),
            agent: Some(self.refs.counterparty.clone()),
            store: Some(self.refs.target_store.clone()),
            state: Some(self.refs.state_shipment.clone()),
            sales_channel: Some(self.refs.sales_channel.clone()),
            sales_order: Some(sales_order.to_ref()),
            description: Some(comment.to_string()),
            positions: Some(Rows::new(rows.clone())),
            ..Default::default()
        };
        let created = match self.erp.create(DocKind::Shipment, &payload).await {
            Ok(doc) => doc,
            Err(e) => {
                let e = e.classify_commit_error(DocKind::Shipment, order_number);
                if e.is_insufficient_stock() {
                    info!("🛳️ Shipment for {order_number} skipped: insufficient stock");
                    return Ok(None);
                }
                return Err(e);
            },
        };
        // some conversions drop inline positions; backfill from the order if so
        if self.erp.positions(DocKind::Shipment, &created.id).await?.is_empty() && !rows.is_empty() {
            debug!("🛳️ Shipment {order_number} created empty; backfilling {} positions", rows.len());
            self.erp.add_positions(DocKind::Shipment, &created.id, &rows).await?;
        }
        info!("🛳️ Shipment created for {order_number}");
        Ok(Some(created))
    }

    /// Tears down a cancelled order's document chain: transfer first, then the sales
    /// order, so the ERP never holds a transfer referencing a vanished order. Returns
    /// how many documents went away.
    pub async fn delete_cancelled(&self, order_number: &str) -> Result<usize, ErpApiError> {
        let mut deleted = 0;
        if let Some(transfer) = self.find_single(DocKind::Transfer, order_number).await? {
            self.erp.delete(DocKind::Transfer, &transfer.id).await?;
            deleted += 1;
        }
        if let Some(order) = self.find_single(DocKind::SalesOrder, order_number).await? {
            self.erp.delete(DocKind::SalesOrder, &order.id).await?;
            deleted += 1;
        }
        Ok(deleted)
    }

    /// Creates a document, treating "external code already taken" as a lost race with a
    /// concurrent run: re-run the lookup and update the winner instead.
    async fn create_or_recover(&self, kind: DocKind, payload: DocumentPayload) -> Result<(Document, bool), ErpApiError> {
        match self.erp.create(kind, &payload).await {
            Ok(doc) => Ok((doc, true)),
            Err(ErpApiError::Http(HttpError::Status { status: 409 | 412, .. })) => {
                let Some(existing) = self.erp.find_by_external_code(kind, code_of(&payload)).await?.into_iter().next()
                else {
                    return Err(ErpApiError::UnexpectedResponse(format!(
                        "{kind} create rejected as duplicate but no document carries the external code"
                    )));
                };
                warn!("📑️ {kind} create raced a concurrent run; updating {} instead", existing.id);
                let mut payload = payload;
                // the race winner owns the one-time comment
                payload.description = None;
                let updated = self.erp.update(kind, &existing.id, &payload).await?;
                Ok((updated, false))
            },
            Err(e) => Err(e),
        }
    }
}

fn code_of(payload: &DocumentPayload) -> &str {
    payload.external_code.as_deref().unwrap_or_default()
}
