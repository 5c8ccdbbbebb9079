//! Seams between the engine and the outside world.
//!
//! The orchestrator and the stock-push job are generic over these traits so the state
//! machine can be exercised against the in-memory doubles in [`crate::test_utils`] while
//! the real API clients implement them by delegation.

use std::{collections::HashSet, path::Path, time::Duration};

use erp_tools::{
    CatalogEntity,
    DocKind,
    Document,
    DocumentPayload,
    ErpApi,
    ErpApiError,
    Position,
    PositionPayload,
    StockReportRow,
};
use marketplace_tools::{
    MarketplaceApi,
    MarketplaceApiError,
    StockPublishRow,
    StockUpdate,
    SupplyItem,
    SupplyOrder,
    SupplyState,
};

/// Where supply orders come from: listing by lifecycle state (with detail), plus the
/// item bundle attached to a supply.
#[allow(async_fn_in_trait)]
pub trait SupplyOrderSource {
    fn cabinet_name(&self) -> &str;
    async fn list_supply_orders(&self, states: &[SupplyState]) -> Result<Vec<SupplyOrder>, MarketplaceApiError>;
    async fn fetch_supply_orders(&self, ids: &[i64]) -> Result<Vec<SupplyOrder>, MarketplaceApiError>;
    async fn bundle_items(&self, bundle_id: &str) -> Result<Vec<SupplyItem>, MarketplaceApiError>;
}

/// The ERP surface the engine writes through: catalog lookups, document CRUD keyed by
/// external code, position sub-collections, and the stock report.
#[allow(async_fn_in_trait)]
pub trait ErpDocumentStore: Clone {
    fn base_url(&self) -> &str;

    async fn search_catalog(&self, article: &str) -> Result<Vec<CatalogEntity>, ErpApiError>;
    async fn fetch_by_href(&self, href: &str) -> Result<CatalogEntity, ErpApiError>;
    async fn fetch_kit(&self, id: &str) -> Result<CatalogEntity, ErpApiError>;
    async fn list_kits(&self) -> Result<Vec<CatalogEntity>, ErpApiError>;

    async fn find_by_external_code(&self, kind: DocKind, code: &str) -> Result<Vec<Document>, ErpApiError>;
    async fn create(&self, kind: DocKind, payload: &DocumentPayload) -> Result<Document, ErpApiError>;
    async fn update(&self, kind: DocKind, id: &str, payload: &DocumentPayload) -> Result<Document, ErpApiError>;
    async fn delete(&self, kind: DocKind, id: &str) -> Result<(), ErpApiError>;
    async fn set_applicable(&self, kind: DocKind, id: &str, applicable: bool) -> Result<Document, ErpApiError>;

    async fn positions(&self, kind: DocKind, id: &str) -> Result<Vec<Position>, ErpApiError>;
    async fn add_positions(&self, kind: DocKind, id: &str, positions: &[PositionPayload])
        -> Result<(), ErpApiError>;
    async fn replace_positions(
        &self,
        kind: DocKind,
        id: &str,
        positions: &[PositionPayload],
    ) -> Result<(), ErpApiError>;

    async fn stock_by_store(&self) -> Result<Vec<StockReportRow>, ErpApiError>;
}

/// The marketplace surface the stock-push job publishes through.
#[allow(async_fn_in_trait)]
pub trait StockPublisher {
    fn cabinet_name(&self) -> &str;
    fn warehouse_id(&self) -> i64;
    async fn list_offer_codes(&self) -> Result<HashSet<String>, MarketplaceApiError>;
    /// As [`Self::list_offer_codes`], backed by a short-lived disk cache when the
    /// implementation supports one. The default ignores the cache.
    async fn list_offer_codes_cached(
        &self,
        cache_dir: Option<&Path>,
        ttl: Duration,
    ) -> Result<HashSet<String>, MarketplaceApiError> {
        let _ = (cache_dir, ttl);
        self.list_offer_codes().await
    }
    async fn publish_stocks(&self, rows: &[StockUpdate]) -> Result<Vec<StockPublishRow>, MarketplaceApiError>;
}

impl SupplyOrderSource for MarketplaceApi {
    fn cabinet_name(&self) -> &str {
        self.name()
    }

    async fn list_supply_orders(&self, states: &[SupplyState]) -> Result<Vec<SupplyOrder>, MarketplaceApiError> {
        MarketplaceApi::list_supply_orders(self, states).await
    }

    async fn fetch_supply_orders(&self, ids: &[i64]) -> Result<Vec<SupplyOrder>, MarketplaceApiError> {
        MarketplaceApi::fetch_supply_orders(self, ids).await
    }

    async fn bundle_items(&self, bundle_id: &str) -> Result<Vec<SupplyItem>, MarketplaceApiError> {
        MarketplaceApi::bundle_items(self, bundle_id).await
    }
}

impl StockPublisher for MarketplaceApi {
    fn cabinet_name(&self) -> &str {
        self.name()
    }

    fn warehouse_id(&self) -> i64 {
        MarketplaceApi::warehouse_id(self)
    }

    async fn list_offer_codes(&self) -> Result<HashSet<String>, MarketplaceApiError> {
        MarketplaceApi::list_offer_codes(self).await
    }

    async fn list_offer_codes_cached(
        &self,
        cache_dir: Option<&Path>,
        ttl: Duration,
    ) -> Result<HashSet<String>, MarketplaceApiError> {
        match cache_dir {
            Some(dir) => MarketplaceApi::list_offer_codes_cached(self, dir, ttl).await,
            None => MarketplaceApi::list_offer_codes(self).await,
        }
    }

    async fn publish_stocks(&self, rows: &[StockUpdate]) -> Result<Vec<StockPublishRow>, MarketplaceApiError> {
        MarketplaceApi::publish_stocks(self, rows).await
    }
}

impl ErpDocumentStore for ErpApi {
    fn base_url(&self) -> &str {
        ErpApi::base_url(self)
    }

    async fn search_catalog(&self, article: &str) -> Result<Vec<CatalogEntity>, ErpApiError> {
        ErpApi::search_catalog(self, article).await
    }

    async fn fetch_by_href(&self, href: &str) -> Result<CatalogEntity, ErpApiError> {
        ErpApi::fetch_by_href(self, href).await
    }

    async fn fetch_kit(&self, id: &str) -> Result<CatalogEntity, ErpApiError> {
        ErpApi::fetch_kit(self, id).await
    }

    async fn list_kits(&self) -> Result<Vec<CatalogEntity>, ErpApiError> {
        ErpApi::list_kits(self).await
    }

    async fn find_by_external_code(&self, kind: DocKind, code: &str) -> Result<Vec<Document>, ErpApiError> {
        ErpApi::find_by_external_code(self, kind, code).await
    }

    async fn create(&self, kind: DocKind, payload: &DocumentPayload) -> Result<Document, ErpApiError> {
        ErpApi::create(self, kind, payload).await
    }

    async fn update(&self, kind: DocKind, id: &str, payload: &DocumentPayload) -> Result<Document, ErpApiError> {
        ErpApi::update(self, kind, id, payload).await
    }

    async fn delete(&self, kind: DocKind, id: &str) -> Result<(), ErpApiError> {
        ErpApi::delete(self, kind, id).await
    }

    async fn set_applicable(&self, kind: DocKind, id: &str, applicable: bool) -> Result<Document, ErpApiError> {
        ErpApi::set_applicable(self, kind, id, applicable).await
    }

    async fn positions(&self, kind: DocKind, id: &str) -> Result<Vec<Position>, ErpApiError> {
        ErpApi::positions(self, kind, id).await
    }

    async fn add_positions(
        &self,
        kind: DocKind,
        id: &str,
        positions: &[PositionPayload],
    ) -> Result<(), ErpApiError> {
        ErpApi::add_positions(self, kind, id, positions).await
    }

    async fn replace_positions(
        &self,
        kind: DocKind,
        id: &str,
        positions: &[PositionPayload],
    ) -> Result<(), ErpApiError> {
        ErpApi::replace_positions(self, kind, id, positions).await
    }

    async fn stock_by_store(&self) -> Result<Vec<StockReportRow>, ErpApiError> {
        ErpApi::stock_by_store(self).await
    }
}
