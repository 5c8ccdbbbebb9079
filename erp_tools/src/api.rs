use std::{sync::Arc, time::Duration};

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client,
};
use serde::Serialize;
use sg_common::http::{self, RetryPolicy};

use crate::{
    data_objects::{CatalogEntity, DocKind, Document, Position, PositionPayload, Rows, StockReportRow},
    DocumentPayload,
    ErpApiError,
    ErpConfig,
};

/// Position sub-collections are paged; one page of this size covers any real document.
const POSITION_LIMIT: u32 = 1000;

#[derive(Clone)]
pub struct ErpApi {
    config: ErpConfig,
    client: Arc<Client>,
    policy: RetryPolicy,
}

impl ErpApi {
    pub fn new(config: ErpConfig) -> Result<Self, ErpApiError> {
        let mut headers = HeaderMap::with_capacity(3);
        let token = format!("Bearer {}", config.token.reveal());
        let auth = HeaderValue::from_str(&token).map_err(|e| ErpApiError::Initialization(e.to_string()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        headers.insert("Accept", HeaderValue::from_static("application/json;charset=utf-8"));
        let client = Client::builder()
            .default_headers(headers)
            .gzip(true)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ErpApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client), policy: RetryPolicy::default() })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ErpApiError> {
        let mut req = self.client.get(url);
        if !query.is_empty() {
            req = req.query(query);
        }
        Ok(http::send_json(req, &self.policy).await?)
    }

    async fn put<T: serde::de::DeserializeOwned, B: Serialize>(&self, url: &str, body: &B) -> Result<T, ErpApiError> {
        Ok(http::send_json(self.client.put(url).json(body), &self.policy).await?)
    }

    async fn post<T: serde::de::DeserializeOwned, B: Serialize>(&self, url: &str, body: &B) -> Result<T, ErpApiError> {
        Ok(http::send_json(self.client.post(url).json(body), &self.policy).await?)
    }

    // -------- Catalog --------

    /// Exact-article search over the whole assortment. `limit=2` is enough to tell
    /// "unique" from "ambiguous"; the resolver decides what ambiguity means.
    pub async fn search_catalog(&self, article: &str) -> Result<Vec<CatalogEntity>, ErpApiError> {
        let url = self.url("/entity/assortment");
        let filter = format!("article={article}");
        let rep: Rows<CatalogEntity> = self.get(&url, &[("filter", filter.as_str()), ("limit", "2")]).await?;
        Ok(rep.rows)
    }

    /// Dereferences a catalog pointer (component assortment href).
    pub async fn fetch_by_href(&self, href: &str) -> Result<CatalogEntity, ErpApiError> {
        self.get(href, &[]).await
    }

    /// Fetches a kit with its component assortments expanded, so component prices arrive
    /// in the same response.
    pub async fn fetch_kit(&self, id: &str) -> Result<CatalogEntity, ErpApiError> {
        let url = self.url(&format!("/entity/kit/{id}"));
        self.get(&url, &[("expand", "components.assortment")]).await
    }

    /// Walks the whole kit collection (offset-paginated, unlike the marketplace's cursor
    /// pagination). Returns the basic rows; components come from [`Self::fetch_kit`].
    pub async fn list_kits(&self) -> Result<Vec<CatalogEntity>, ErpApiError> {
        const LIMIT: usize = 100;
        let url = self.url("/entity/kit");
        let mut out = Vec::new();
        let mut offset = 0usize;
        loop {
            let limit = LIMIT.to_string();
            let offset_s = offset.to_string();
            let page: Rows<CatalogEntity> =
                self.get(&url, &[("limit", limit.as_str()), ("offset", offset_s.as_str())]).await?;
            let count = page.rows.len();
            out.extend(page.rows);
            if count < LIMIT {
                break;
            }
            offset += LIMIT;
        }
        Ok(out)
    }

    // -------- Documents --------

    /// All documents of `kind` carrying the given external code. More than one row means
    /// a duplicate slipped past the idempotency key; the engine reduces those.
    pub async fn find_by_external_code(&self, kind: DocKind, code: &str) -> Result<Vec<Document>, ErpApiError> {
        let url = self.url(&format!("/entity/{}", kind.path()));
        let filter = format!("externalCode={code}");
        let rep: Rows<Document> = self.get(&url, &[("filter", filter.as_str()), ("limit", "100")]).await?;
        Ok(rep.rows)
    }

    pub async fn create(&self, kind: DocKind, payload: &DocumentPayload) -> Result<Document, ErpApiError> {
        let url = self.url(&format!("/entity/{}", kind.path()));
        debug!("Creating {kind} externalCode={:?}", payload.external_code);
        self.post(&url, payload).await
    }

    pub async fn update(&self, kind: DocKind, id: &str, payload: &DocumentPayload) -> Result<Document, ErpApiError> {
        let url = self.url(&format!("/entity/{}/{id}", kind.path()));
        trace!("Updating {kind} {id}");
        self.put(&url, payload).await
    }

    pub async fn delete(&self, kind: DocKind, id: &str) -> Result<(), ErpApiError> {
        let url = self.url(&format!("/entity/{}/{id}", kind.path()));
        info!("Deleting {kind} {id}");
        Ok(http::send_no_content(self.client.delete(url), &self.policy).await?)
    }

    /// Flips the document's `applicable` (committed/posted) flag. Committing a transfer
    /// or shipment is where the ERP enforces its inventory rules, so the insufficient-stock
    /// signature is reclassified here.
    pub async fn set_applicable(&self, kind: DocKind, id: &str, applicable: bool) -> Result<Document, ErpApiError> {
        let payload = DocumentPayload { applicable: Some(applicable), ..Default::default() };
        self.update(kind, id, &payload).await.map_err(|e| e.classify_commit_error(kind, id))
    }

    // -------- Positions --------

    pub async fn positions(&self, kind: DocKind, id: &str) -> Result<Vec<Position>, ErpApiError> {
        let url = self.url(&format!("/entity/{}/{id}/positions", kind.path()));
        let limit = POSITION_LIMIT.to_string();
        let rep: Rows<Position> = self.get(&url, &[("limit", limit.as_str())]).await?;
        Ok(rep.rows)
    }

    pub async fn delete_position(&self, kind: DocKind, id: &str, position_id: &str) -> Result<(), ErpApiError> {
        let url = self.url(&format!("/entity/{}/{id}/positions/{position_id}", kind.path()));
        Ok(http::send_no_content(self.client.delete(url), &self.policy).await?)
    }

    pub async fn add_positions(
        &self,
        kind: DocKind,
        id: &str,
        positions: &[PositionPayload],
    ) -> Result<(), ErpApiError> {
        if positions.is_empty() {
            return Ok(());
        }
        let url = self.url(&format!("/entity/{}/{id}/positions", kind.path()));
        let body = Rows::new(positions.to_vec());
        let _: serde_json::Value = self.post(&url, &body).await?;
        Ok(())
    }

    /// Destructive, order-free position replace: delete every existing position, then
    /// insert the new set as one batch. A failure after any deletion succeeded surfaces
    /// as [`ErpApiError::PartialPositionReplace`] so the caller knows the document is in
    /// neither the old nor the new state.
    pub async fn replace_positions(
        &self,
        kind: DocKind,
        id: &str,
        positions: &[PositionPayload],
    ) -> Result<(), ErpApiError> {
        let existing = self.positions(kind, id).await?;
        let total = existing.len();
        let mut deleted = 0usize;
        for position in &existing {
            if position.id.is_empty() {
                continue;
            }
            if let Err(e) = self.delete_position(kind, id, &position.id).await {
                return Err(partial_if_started(kind, id, deleted, total, e));
            }
            deleted += 1;
        }
        if let Err(e) = self.add_positions(kind, id, positions).await {
            return Err(partial_if_started(kind, id, deleted, total, e));
        }
        trace!("Replaced {total} positions with {} on {kind} {id}", positions.len());
        Ok(())
    }

    // -------- Stock report --------

    /// The by-store stock report for the whole assortment. Store filtering happens on the
    /// client via [`crate::data_objects::extract_store_rows`].
    pub async fn stock_by_store(&self) -> Result<Vec<StockReportRow>, ErpApiError> {
        let url = self.url("/report/stock/bystore");
        let rep: Rows<StockReportRow> = self.get(&url, &[("stockMode", "all")]).await?;
        Ok(rep.rows)
    }
}

fn partial_if_started(kind: DocKind, id: &str, deleted: usize, total: usize, source: ErpApiError) -> ErpApiError {
    if deleted == 0 {
        // nothing was touched yet; the document still holds its old positions
        return source;
    }
    ErpApiError::PartialPositionReplace { kind, id: id.to_string(), deleted, total, source: Box::new(source) }
}

#[cfg(test)]
mod test {
    use sg_common::http::HttpError;

    use super::*;

    #[test]
    fn replace_failure_before_any_deletion_is_not_partial() {
        let source = ErpApiError::Http(HttpError::Transport("timed out".to_string()));
        let e = partial_if_started(DocKind::SalesOrder, "so-1", 0, 4, source);
        assert!(!matches!(e, ErpApiError::PartialPositionReplace { .. }));
    }

    #[test]
    fn replace_failure_mid_flight_is_partial() {
        let source = ErpApiError::Http(HttpError::Transport("timed out".to_string()));
        let e = partial_if_started(DocKind::Transfer, "t-1", 2, 4, source);
        match e {
            ErpApiError::PartialPositionReplace { deleted, total, .. } => {
                assert_eq!((deleted, total), (2, 4));
            },
            other => panic!("expected partial replace error, got {other}"),
        }
    }
}
