//! In-memory doubles for the engine's collaborator traits.
//!
//! [`InMemoryErp`] behaves like a tiny ERP: documents live in maps keyed by kind, ids
//! and moments are handed out sequentially, catalog rows are scripted, and the
//! insufficient-stock rejection can be switched on per document kind. Unlike per-call
//! mock expectations, state persists across calls, which is what the reconciliation
//! tests need (a document created in step one must be findable in step five).

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{NaiveDate, TimeZone, Utc};
use erp_tools::{
    meta::{normalize_href, Meta},
    CatalogEntity,
    ComponentAssortment,
    DocKind,
    Document,
    DocumentPayload,
    ErpApiError,
    KitComponent,
    Position,
    PositionPayload,
    Rows,
    SalePrice,
    StockReportRow,
};
use marketplace_tools::{
    MarketplaceApiError,
    StockPublishRow,
    StockUpdate,
    SupplyItem,
    SupplyOrder,
    SupplyRef,
    SupplyState,
    WarehouseRef,
};
use sg_common::Money;

use crate::{
    documents::DocRefs,
    order_flow::SyncSettings,
    traits::{ErpDocumentStore, StockPublisher, SupplyOrderSource},
};

pub const ERP_BASE: &str = "http://erp.test/api";

/// Reference ids used by [`doc_refs`]; tests never look at them, the engine just needs
/// a consistent set.
pub fn doc_refs() -> DocRefs {
    DocRefs::build(ERP_BASE, "org-1", "agent-1", "store-src", "store-dst", "st-so", "st-tr", "st-sh", "chan-1")
}

pub fn settings() -> SyncSettings {
    SyncSettings {
        dry_run: false,
        allow_delete: false,
        planned_from: NaiveDate::from_ymd_opt(2020, 1, 1).expect("valid date"),
    }
}

/// A supply order with its planned date driven by `created_date` (well past any test
/// cutoff) and a single bundle.
pub fn supply_order(number: &str, order_id: i64, state: SupplyState, bundle_id: &str) -> SupplyOrder {
    SupplyOrder {
        order_id,
        order_number: number.to_string(),
        state,
        timeslot: None,
        created_date: Some(Utc.with_ymd_and_hms(2026, 1, 10, 12, 0, 0).single().expect("valid timestamp")),
        supplies: vec![SupplyRef { bundle_id: bundle_id.to_string() }],
        drop_off_warehouse: Some(WarehouseRef { name: "North Hub".to_string() }),
    }
}

//--------------------------------------  StaticSupplySource  --------------------------------------------------------

/// Canned orders and bundle contents.
pub struct StaticSupplySource {
    pub name: String,
    pub orders: Vec<SupplyOrder>,
    pub bundles: HashMap<String, Vec<SupplyItem>>,
}

impl StaticSupplySource {
    pub fn new(orders: Vec<SupplyOrder>) -> Self {
        Self { name: "cabinet1".to_string(), orders, bundles: HashMap::new() }
    }

    pub fn with_bundle(mut self, bundle_id: &str, items: Vec<SupplyItem>) -> Self {
        self.bundles.insert(bundle_id.to_string(), items);
        self
    }
}

impl SupplyOrderSource for StaticSupplySource {
    fn cabinet_name(&self) -> &str {
        &self.name
    }

    async fn list_supply_orders(&self, _states: &[SupplyState]) -> Result<Vec<SupplyOrder>, MarketplaceApiError> {
        Ok(self.orders.clone())
    }

    async fn fetch_supply_orders(&self, ids: &[i64]) -> Result<Vec<SupplyOrder>, MarketplaceApiError> {
        Ok(self.orders.iter().filter(|o| ids.contains(&o.order_id)).cloned().collect())
    }

    async fn bundle_items(&self, bundle_id: &str) -> Result<Vec<SupplyItem>, MarketplaceApiError> {
        Ok(self.bundles.get(bundle_id).cloned().unwrap_or_default())
    }
}

//--------------------------------------     InMemoryErp     ---------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StoredDoc {
    pub doc: Document,
    pub positions: Vec<PositionPayload>,
}

#[derive(Default)]
struct ErpState {
    catalog: Vec<CatalogEntity>,
    documents: HashMap<DocKind, Vec<StoredDoc>>,
    stock_report: Vec<StockReportRow>,
    fail_commit: HashSet<DocKind>,
    fail_create: HashSet<DocKind>,
    creates: HashMap<DocKind, usize>,
    updates: HashMap<DocKind, usize>,
    catalog_searches: HashMap<String, usize>,
    position_replaces: HashMap<DocKind, usize>,
    deletions: Vec<(DocKind, String)>,
    seq: usize,
}

#[derive(Clone, Default)]
pub struct InMemoryErp {
    state: Arc<Mutex<ErpState>>,
}

impl InMemoryErp {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ErpState> {
        self.state.lock().expect("test ERP lock poisoned")
    }

    fn product_href(id: &str) -> String {
        format!("{ERP_BASE}/entity/product/{id}")
    }

    // ---- scripting ----

    pub fn insert_product(&self, article: &str, id: &str, price: i64) {
        self.lock().catalog.push(CatalogEntity {
            meta: Meta::new(Self::product_href(id), "product"),
            id: id.to_string(),
            article: Some(article.to_string()),
            sale_prices: vec![SalePrice { value: Money::from(price), price_type: None }],
            components: None,
        });
    }

    /// A second catalog row for an already-inserted article, to provoke ambiguity.
    pub fn insert_duplicate_product(&self, article: &str, id: &str) {
        self.insert_product(article, id, 0);
    }

    /// A kit whose components reference previously inserted products by id.
    pub fn insert_kit(&self, article: &str, id: &str, components: &[(&str, f64)]) {
        let mut state = self.lock();
        let rows = components
            .iter()
            .map(|(product_id, quantity)| {
                let product = state
                    .catalog
                    .iter()
                    .find(|c| c.id == *product_id)
                    .unwrap_or_else(|| panic!("insert product '{product_id}' before the kit referencing it"));
                KitComponent {
                    quantity: *quantity,
                    assortment: ComponentAssortment {
                        meta: product.meta.clone(),
                        article: product.article.clone(),
                        sale_prices: product.sale_prices.clone(),
                    },
                }
            })
            .collect();
        state.catalog.push(CatalogEntity {
            meta: Meta::new(format!("{ERP_BASE}/entity/kit/{id}"), "kit"),
            id: id.to_string(),
            article: Some(article.to_string()),
            sale_prices: vec![SalePrice { value: Money::from(0), price_type: None }],
            components: Some(Rows::new(rows)),
        });
    }

    pub fn set_kit_price(&self, kit_id: &str, price: i64) {
        let mut state = self.lock();
        if let Some(kit) = state.catalog.iter_mut().find(|c| c.id == kit_id) {
            kit.sale_prices = vec![SalePrice { value: Money::from(price), price_type: None }];
        }
    }

    /// Makes `set_applicable(kind, .., true)` fail with the ERP's insufficient-stock
    /// signature until lifted.
    pub fn block_commit(&self, kind: DocKind) {
        self.lock().fail_commit.insert(kind);
    }

    pub fn unblock_commit(&self, kind: DocKind) {
        self.lock().fail_commit.remove(&kind);
    }

    /// Makes document creation of `kind` fail with the insufficient-stock signature.
    pub fn block_create(&self, kind: DocKind) {
        self.lock().fail_create.insert(kind);
    }

    pub fn set_stock_report(&self, report: Vec<StockReportRow>) {
        self.lock().stock_report = report;
    }

    // ---- assertions ----

    pub fn creates(&self, kind: DocKind) -> usize {
        *self.lock().creates.get(&kind).unwrap_or(&0)
    }

    /// How many times the catalog was searched for `article`.
    pub fn catalog_searches(&self, article: &str) -> usize {
        *self.lock().catalog_searches.get(article).unwrap_or(&0)
    }

    pub fn updates(&self, kind: DocKind) -> usize {
        *self.lock().updates.get(&kind).unwrap_or(&0)
    }

    pub fn position_replaces(&self, kind: DocKind) -> usize {
        *self.lock().position_replaces.get(&kind).unwrap_or(&0)
    }

    pub fn count_documents(&self, kind: DocKind) -> usize {
        self.lock().documents.get(&kind).map(|docs| docs.len()).unwrap_or(0)
    }

    pub fn stored(&self, kind: DocKind, code: &str) -> Option<StoredDoc> {
        self.lock()
            .documents
            .get(&kind)
            .and_then(|docs| docs.iter().find(|d| d.doc.external_code.as_deref() == Some(code)))
            .cloned()
    }

    /// Deletions in the order they happened.
    pub fn deletions(&self) -> Vec<(DocKind, String)> {
        self.lock().deletions.clone()
    }
}

impl ErpDocumentStore for InMemoryErp {
    fn base_url(&self) -> &str {
        ERP_BASE
    }

    async fn search_catalog(&self, article: &str) -> Result<Vec<CatalogEntity>, ErpApiError> {
        let mut state = self.lock();
        *state.catalog_searches.entry(article.to_string()).or_default() += 1;
        Ok(state.catalog.iter().filter(|c| c.article.as_deref() == Some(article)).cloned().collect())
    }

    async fn fetch_by_href(&self, href: &str) -> Result<CatalogEntity, ErpApiError> {
        let key = normalize_href(href).to_string();
        self.lock().catalog.iter().find(|c| c.href() == key).cloned().ok_or_else(|| not_found(&key))
    }

    async fn fetch_kit(&self, id: &str) -> Result<CatalogEntity, ErpApiError> {
        self.lock()
            .catalog
            .iter()
            .find(|c| c.id == id && c.meta.entity_type == "kit")
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    async fn list_kits(&self) -> Result<Vec<CatalogEntity>, ErpApiError> {
        Ok(self.lock().catalog.iter().filter(|c| c.meta.entity_type == "kit").cloned().collect())
    }

    async fn find_by_external_code(&self, kind: DocKind, code: &str) -> Result<Vec<Document>, ErpApiError> {
        Ok(self
            .lock()
            .documents
            .get(&kind)
            .map(|docs| {
                docs.iter().filter(|d| d.doc.external_code.as_deref() == Some(code)).map(|d| d.doc.clone()).collect()
            })
            .unwrap_or_default())
    }

    async fn create(&self, kind: DocKind, payload: &DocumentPayload) -> Result<Document, ErpApiError> {
        let mut state = self.lock();
        if state.fail_create.contains(&kind) {
            return Err(ErpApiError::InsufficientStock {
                kind,
                id: payload.external_code.clone().unwrap_or_default(),
            });
        }
        state.seq += 1;
        let seq = state.seq;
        let id = format!("{}-{seq}", kind.path());
        let doc = Document {
            id: id.clone(),
            meta: Meta::new(format!("{ERP_BASE}/entity/{}/{id}", kind.path()), kind.path()),
            name: payload.name.clone(),
            external_code: payload.external_code.clone(),
            applicable: payload.applicable.unwrap_or(true),
            moment: Some(format!("2026-01-01 00:00:00.{seq:03}")),
            description: payload.description.clone(),
            sales_order: payload.sales_order.clone(),
        };
        let positions = payload.positions.as_ref().map(|p| p.rows.clone()).unwrap_or_default();
        *state.creates.entry(kind).or_default() += 1;
        state.documents.entry(kind).or_default().push(StoredDoc { doc: doc.clone(), positions });
        Ok(doc)
    }

    async fn update(&self, kind: DocKind, id: &str, payload: &DocumentPayload) -> Result<Document, ErpApiError> {
        let mut state = self.lock();
        *state.updates.entry(kind).or_default() += 1;
        let stored = state
            .documents
            .entry(kind)
            .or_default()
            .iter_mut()
            .find(|d| d.doc.id == id)
            .ok_or_else(|| not_found(id))?;
        if let Some(code) = &payload.external_code {
            stored.doc.external_code = Some(code.clone());
        }
        if let Some(applicable) = payload.applicable {
            stored.doc.applicable = applicable;
        }
        // an update that carries a description overwrites the one-time comment; the
        // engine must never send one, and the tests assert it stays intact
        if let Some(description) = &payload.description {
            stored.doc.description = Some(description.clone());
        }
        if let Some(link) = &payload.sales_order {
            stored.doc.sales_order = Some(link.clone());
        }
        Ok(stored.doc.clone())
    }

    async fn delete(&self, kind: DocKind, id: &str) -> Result<(), ErpApiError> {
        let mut state = self.lock();
        if let Some(docs) = state.documents.get_mut(&kind) {
            docs.retain(|d| d.doc.id != id);
        }
        state.deletions.push((kind, id.to_string()));
        Ok(())
    }

    async fn set_applicable(&self, kind: DocKind, id: &str, applicable: bool) -> Result<Document, ErpApiError> {
        let mut state = self.lock();
        if applicable && state.fail_commit.contains(&kind) {
            return Err(ErpApiError::InsufficientStock { kind, id: id.to_string() });
        }
        let stored =
            state.documents.entry(kind).or_default().iter_mut().find(|d| d.doc.id == id).ok_or_else(|| not_found(id))?;
        stored.doc.applicable = applicable;
        Ok(stored.doc.clone())
    }

    async fn positions(&self, kind: DocKind, id: &str) -> Result<Vec<Position>, ErpApiError> {
        let state = self.lock();
        let stored = state
            .documents
            .get(&kind)
            .and_then(|docs| docs.iter().find(|d| d.doc.id == id))
            .ok_or_else(|| not_found(id))?;
        Ok(stored
            .positions
            .iter()
            .enumerate()
            .map(|(i, p)| Position {
                id: format!("pos-{i}"),
                quantity: p.quantity,
                price: p.price,
                assortment: p.assortment.clone(),
            })
            .collect())
    }

    async fn add_positions(&self, kind: DocKind, id: &str, positions: &[PositionPayload]) -> Result<(), ErpApiError> {
        let mut state = self.lock();
        let stored =
            state.documents.entry(kind).or_default().iter_mut().find(|d| d.doc.id == id).ok_or_else(|| not_found(id))?;
        stored.positions.extend(positions.iter().cloned());
        Ok(())
    }

    async fn replace_positions(
        &self,
        kind: DocKind,
        id: &str,
        positions: &[PositionPayload],
    ) -> Result<(), ErpApiError> {
        let mut state = self.lock();
        *state.position_replaces.entry(kind).or_default() += 1;
        let stored =
            state.documents.entry(kind).or_default().iter_mut().find(|d| d.doc.id == id).ok_or_else(|| not_found(id))?;
        stored.positions = positions.to_vec();
        Ok(())
    }

    async fn stock_by_store(&self) -> Result<Vec<StockReportRow>, ErpApiError> {
        Ok(self.lock().stock_report.clone())
    }
}

//--------------------------------------  RecordingPublisher  --------------------------------------------------------

/// A [`StockPublisher`] double that accepts everything and remembers what it was asked
/// to publish.
pub struct RecordingPublisher {
    pub name: String,
    pub warehouse: i64,
    pub offers: HashSet<String>,
    published: Arc<Mutex<Vec<StockUpdate>>>,
}

impl RecordingPublisher {
    pub fn new(name: &str, warehouse: i64, offers: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            warehouse,
            offers: offers.iter().map(|o| o.to_string()).collect(),
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn published(&self) -> Vec<StockUpdate> {
        self.published.lock().expect("publisher lock poisoned").clone()
    }
}

impl StockPublisher for RecordingPublisher {
    fn cabinet_name(&self) -> &str {
        &self.name
    }

    fn warehouse_id(&self) -> i64 {
        self.warehouse
    }

    async fn list_offer_codes(&self) -> Result<HashSet<String>, MarketplaceApiError> {
        Ok(self.offers.clone())
    }

    async fn publish_stocks(&self, rows: &[StockUpdate]) -> Result<Vec<StockPublishRow>, MarketplaceApiError> {
        self.published.lock().expect("publisher lock poisoned").extend(rows.iter().cloned());
        Ok(rows
            .iter()
            .map(|r| StockPublishRow { offer_id: r.offer_id.clone(), updated: true, errors: Vec::new() })
            .collect())
    }
}

/// One stock-report row holding stock at a single store.
pub fn stock_report_row(product_id: &str, article: &str, store_id: &str, stock: f64, reserve: f64) -> StockReportRow {
    serde_json::from_value(serde_json::json!({
        "meta": { "href": format!("{ERP_BASE}/entity/product/{product_id}"), "type": "product" },
        "article": article,
        "stockByStore": [
            {
                "meta": { "href": format!("{ERP_BASE}/entity/store/{store_id}"), "type": "store" },
                "stock": stock,
                "reserve": reserve
            }
        ]
    }))
    .expect("valid report row")
}

fn not_found(what: &str) -> ErpApiError {
    ErpApiError::Http(sg_common::http::HttpError::Status {
        status: 404,
        url: format!("{ERP_BASE}/{what}"),
        body: "not found".to_string(),
    })
}
