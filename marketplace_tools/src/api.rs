use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sg_common::http::{self, RetryPolicy};

use crate::{
    data_objects::{StockPublishRow, StockUpdate, SupplyItem, SupplyOrder, SupplyState},
    MarketplaceApiError,
    MarketplaceConfig,
};

const SUPPLY_ORDER_LIST: &str = "/v3/supply-order/list";
const SUPPLY_ORDER_GET: &str = "/v3/supply-order/get";
const SUPPLY_ORDER_BUNDLE: &str = "/v1/supply-order/bundle";
const PRODUCT_LIST: &str = "/v3/product/list";
const PRODUCT_STOCKS: &str = "/v2/products/stocks";

/// Detail fetches are batched to keep request bodies bounded.
const GET_BATCH: usize = 50;
const PAGE_LIMIT: u32 = 100;

#[derive(Clone)]
pub struct MarketplaceApi {
    config: MarketplaceConfig,
    client: Arc<Client>,
    policy: RetryPolicy,
}

impl MarketplaceApi {
    pub fn new(config: MarketplaceConfig) -> Result<Self, MarketplaceApiError> {
        let mut headers = HeaderMap::with_capacity(3);
        let client_id = HeaderValue::from_str(&config.client_id)
            .map_err(|e| MarketplaceApiError::Initialization(e.to_string()))?;
        let api_key = HeaderValue::from_str(config.api_key.reveal().as_str())
            .map_err(|e| MarketplaceApiError::Initialization(e.to_string()))?;
        headers.insert("Client-Id", client_id);
        headers.insert("Api-Key", api_key);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| MarketplaceApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client), policy: RetryPolicy::default() })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn warehouse_id(&self) -> i64 {
        self.config.warehouse_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    async fn post<T: for<'de> Deserialize<'de>, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, MarketplaceApiError> {
        let req = self.client.post(self.url(path)).json(body);
        Ok(http::send_json(req, &self.policy).await?)
    }

    /// Lists the ids of every supply order currently in one of `states`, walking the
    /// cursor until it stops advancing.
    pub async fn list_supply_order_ids(&self, states: &[SupplyState]) -> Result<Vec<i64>, MarketplaceApiError> {
        #[derive(Deserialize)]
        struct ListResponse {
            #[serde(default)]
            order_ids: Vec<Value>,
            #[serde(default)]
            last_id: String,
        }

        let mut out = Vec::new();
        let mut last_id = String::new();
        let mut seen_cursors = HashSet::new();
        loop {
            if !seen_cursors.insert(last_id.clone()) {
                // the API occasionally repeats a cursor; treat that as the end of the list
                break;
            }
            let body = json!({
                "filter": { "states": states },
                "limit": PAGE_LIMIT,
                "sort_by": "ORDER_CREATION",
                "sort_dir": "DESC",
                "last_id": last_id,
            });
            let page: ListResponse = self.post(SUPPLY_ORDER_LIST, &body).await?;
            let count = page.order_ids.len();
            out.extend(page.order_ids.iter().filter_map(coerce_i64));
            trace!("[{}] supply-order list page: {count} ids", self.config.name);
            if count == 0 || page.last_id.is_empty() {
                break;
            }
            last_id = page.last_id;
        }
        debug!("[{}] {} supply orders listed", self.config.name, out.len());
        Ok(out)
    }

    /// Fetches full order detail for the given ids, in batches.
    pub async fn fetch_supply_orders(&self, ids: &[i64]) -> Result<Vec<SupplyOrder>, MarketplaceApiError> {
        #[derive(Deserialize)]
        struct GetResponse {
            #[serde(default)]
            orders: Vec<SupplyOrder>,
        }

        let mut out = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(GET_BATCH) {
            let body = json!({ "order_ids": chunk.iter().map(|id| id.to_string()).collect::<Vec<_>>() });
            let rep: GetResponse = self.post(SUPPLY_ORDER_GET, &body).await?;
            out.extend(rep.orders);
        }
        Ok(out)
    }

    /// The full listing pipeline: ids by state, then detail in batches.
    pub async fn list_supply_orders(&self, states: &[SupplyState]) -> Result<Vec<SupplyOrder>, MarketplaceApiError> {
        let ids = self.list_supply_order_ids(states).await?;
        self.fetch_supply_orders(&ids).await
    }

    /// Lists the items inside a supply's bundle. Rows with an empty offer code or a
    /// non-positive quantity are dropped here; aggregation happens downstream.
    pub async fn bundle_items(&self, bundle_id: &str) -> Result<Vec<SupplyItem>, MarketplaceApiError> {
        #[derive(Deserialize)]
        struct BundleResponse {
            #[serde(default)]
            items: Vec<SupplyItem>,
            #[serde(default)]
            last_id: String,
        }

        let bundle_id = bundle_id.trim();
        if bundle_id.is_empty() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        let mut last_id = String::new();
        let mut seen_cursors = HashSet::new();
        loop {
            if !seen_cursors.insert(last_id.clone()) {
                break;
            }
            let body = json!({ "bundle_ids": [bundle_id], "limit": PAGE_LIMIT, "last_id": last_id });
            let page: BundleResponse = self.post(SUPPLY_ORDER_BUNDLE, &body).await?;
            let count = page.items.len();
            out.extend(page.items.into_iter().filter(SupplyItem::is_valid));
            if count == 0 || page.last_id.is_empty() {
                break;
            }
            last_id = page.last_id;
        }
        trace!("[{}] bundle {bundle_id}: {} items", self.config.name, out.len());
        Ok(out)
    }

    /// Enumerates every offer code the cabinet sells. Used to route stock updates to the
    /// cabinet that actually carries the product.
    pub async fn list_offer_codes(&self) -> Result<HashSet<String>, MarketplaceApiError> {
        #[derive(Deserialize, Default)]
        struct ProductPage {
            #[serde(default)]
            items: Vec<ProductRow>,
            #[serde(default)]
            last_id: String,
        }
        #[derive(Deserialize)]
        struct ProductRow {
            #[serde(default)]
            offer_id: String,
        }
        #[derive(Deserialize)]
        struct ProductListResponse {
            #[serde(default)]
            result: ProductPage,
        }

        let mut codes = HashSet::new();
        let mut last_id = String::new();
        let mut seen_cursors = HashSet::new();
        loop {
            if !seen_cursors.insert(last_id.clone()) {
                break;
            }
            let body = json!({ "filter": {}, "last_id": last_id, "limit": PAGE_LIMIT });
            let rep: ProductListResponse = self.post(PRODUCT_LIST, &body).await?;
            let count = rep.result.items.len();
            codes.extend(rep.result.items.into_iter().map(|r| r.offer_id).filter(|c| !c.is_empty()));
            if count == 0 || rep.result.last_id.is_empty() {
                break;
            }
            last_id = rep.result.last_id;
        }
        debug!("[{}] {} offer codes listed", self.config.name, codes.len());
        Ok(codes)
    }

    /// [`Self::list_offer_codes`] with a short-lived disk cache, so back-to-back runs of
    /// the stock-push job do not re-walk the whole product list.
    pub async fn list_offer_codes_cached(
        &self,
        cache_dir: &Path,
        ttl: Duration,
    ) -> Result<HashSet<String>, MarketplaceApiError> {
        let path = self.offer_cache_path(cache_dir);
        if let Some(codes) = read_offer_cache(&path, ttl) {
            debug!("[{}] {} offer codes from cache", self.config.name, codes.len());
            return Ok(codes);
        }
        let codes = self.list_offer_codes().await?;
        write_offer_cache(&path, &codes);
        Ok(codes)
    }

    fn offer_cache_path(&self, cache_dir: &Path) -> PathBuf {
        cache_dir.join(format!("offer_codes_{}.json", self.config.name.to_lowercase()))
    }

    /// Publishes stock levels for the cabinet's warehouse. The caller chunks the rows.
    pub async fn publish_stocks(&self, rows: &[StockUpdate]) -> Result<Vec<StockPublishRow>, MarketplaceApiError> {
        #[derive(Deserialize)]
        struct StocksResponse {
            #[serde(default)]
            result: Vec<StockPublishRow>,
        }

        let body = json!({ "stocks": rows });
        let rep: StocksResponse = self.post(PRODUCT_STOCKS, &body).await?;
        Ok(rep.result)
    }
}

fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[derive(Serialize, Deserialize)]
struct OfferCacheFile {
    ts: u64,
    offer_ids: Vec<String>,
}

fn read_offer_cache(path: &Path, ttl: Duration) -> Option<HashSet<String>> {
    let raw = std::fs::read_to_string(path).ok()?;
    let cache: OfferCacheFile = serde_json::from_str(&raw).ok()?;
    let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
    if now.saturating_sub(cache.ts) >= ttl.as_secs() {
        return None;
    }
    Some(cache.offer_ids.into_iter().collect())
}

fn write_offer_cache(path: &Path, codes: &HashSet<String>) {
    let ts = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    let mut offer_ids: Vec<String> = codes.iter().cloned().collect();
    offer_ids.sort();
    let cache = OfferCacheFile { ts, offer_ids };
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match serde_json::to_string(&cache) {
        Ok(json) => {
            if let Err(e) = std::fs::write(path, json) {
                warn!("Could not write offer-code cache {}: {e}", path.display());
            }
        },
        Err(e) => warn!("Could not serialize offer-code cache: {e}"),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn order_ids_arrive_as_numbers_or_strings() {
        assert_eq!(coerce_i64(&json!(42)), Some(42));
        assert_eq!(coerce_i64(&json!("43")), Some(43));
        assert_eq!(coerce_i64(&json!("not-a-number")), None);
        assert_eq!(coerce_i64(&json!(null)), None);
    }

    #[test]
    fn offer_cache_round_trip_and_expiry() {
        let dir = std::env::temp_dir().join("sg_offer_cache_test");
        let path = dir.join("offer_codes_test.json");
        let codes: HashSet<String> = ["A-1".to_string(), "B-2".to_string()].into_iter().collect();
        write_offer_cache(&path, &codes);
        assert_eq!(read_offer_cache(&path, Duration::from_secs(600)), Some(codes));
        // an expired cache reads as a miss
        assert_eq!(read_offer_cache(&path, Duration::from_secs(0)), None);
        let _ = std::fs::remove_dir_all(dir);
    }
}
