//! The inventory-publishing batch job.
//!
//! Separate from order reconciliation but sharing the catalog and stock building blocks:
//! read the ERP's by-store report once, derive availability for plain products and for
//! kits (floor-of-min over components), route each offer code to the cabinet that sells
//! it, and publish in batches. Per-cabinet publish failures are counted, not fatal; a
//! missing stock report aborts the job since there is nothing to publish.

use std::{collections::HashSet, path::PathBuf, time::Duration};

use erp_tools::{extract_store_rows, CatalogKind, StockRow};
use log::*;
use marketplace_tools::StockUpdate;
use serde::Serialize;

use crate::{
    errors::SyncError,
    stock::Availability,
    traits::{ErpDocumentStore, StockPublisher},
};

/// Offer-code listings are cached on disk this long; the product list moves much slower
/// than stock levels do.
const OFFER_CACHE_TTL: Duration = Duration::from_secs(7 * 60);
const PUBLISH_CHUNK: usize = 100;

pub struct StockPush<E, M> {
    erp: E,
    cabinets: Vec<M>,
    /// The ERP store whose availability is published.
    store_id: String,
    pub cache_dir: Option<PathBuf>,
    dry_run: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StockPushSummary {
    /// Stock rows accepted by the marketplace.
    pub published: usize,
    /// Kits whose availability was derived from components.
    pub kits: usize,
    /// Offer codes no cabinet carries.
    pub unrouted: usize,
    /// Publish batches that failed.
    pub failures: usize,
}

impl<E, M> StockPush<E, M>
where
    E: ErpDocumentStore,
    M: StockPublisher,
{
    pub fn new(erp: E, cabinets: Vec<M>, store_id: &str, dry_run: bool) -> Self {
        Self { erp, cabinets, store_id: store_id.to_string(), cache_dir: None, dry_run }
    }

    pub fn cabinet(&self, index: usize) -> &M {
        &self.cabinets[index]
    }

    pub async fn run(&self) -> Result<StockPushSummary, SyncError> {
        let report = self.erp.stock_by_store().await.map_err(|e| SyncError::step("fetch stock report", e))?;
        let rows = extract_store_rows(&report, &self.store_id);
        let availability = Availability::from_rows(&rows);
        info!("📊️ Stock report loaded: {} rows for store {}", rows.len(), self.store_id);

        let mut cabinet_offers: Vec<HashSet<String>> = Vec::with_capacity(self.cabinets.len());
        for cabinet in &self.cabinets {
            let codes = cabinet
                .list_offer_codes_cached(self.cache_dir.as_deref(), OFFER_CACHE_TTL)
                .await
                .map_err(|e| SyncError::step("list offer codes", e))?;
            info!("📊️ [{}] {} offer codes", cabinet.cabinet_name(), codes.len());
            cabinet_offers.push(codes);
        }

        let mut summary = StockPushSummary::default();
        let mut per_cabinet: Vec<Vec<StockUpdate>> = self.cabinets.iter().map(|_| Vec::new()).collect();

        for update in self.product_levels(&rows) {
            route(update, &cabinet_offers, &mut per_cabinet, &mut summary);
        }
        for update in self.kit_levels(&availability, &cabinet_offers, &mut summary).await? {
            route(update, &cabinet_offers, &mut per_cabinet, &mut summary);
        }

        for (cabinet, updates) in self.cabinets.iter().zip(per_cabinet) {
            self.publish(cabinet, updates, &mut summary).await;
        }
        info!("📊️ Stock push complete: {summary:?}");
        Ok(summary)
    }

    /// Plain products straight off the report rows. Offer code = catalog article.
    fn product_levels(&self, rows: &[StockRow]) -> Vec<StockUpdate> {
        rows.iter()
            .filter(|r| !r.article.is_empty())
            .map(|r| StockUpdate { offer_id: r.article.clone(), stock: r.available.floor() as i64, warehouse_id: 0 })
            .collect()
    }

    /// Derived levels for every kit that some cabinet actually sells. Kits nobody lists
    /// are skipped without fetching their components.
    async fn kit_levels(
        &self,
        availability: &Availability,
        cabinet_offers: &[HashSet<String>],
        summary: &mut StockPushSummary,
    ) -> Result<Vec<StockUpdate>, SyncError> {
        let kits = self.erp.list_kits().await.map_err(|e| SyncError::step("list kits", e))?;
        let mut out = Vec::new();
        for kit in kits {
            if kit.kind() != Some(CatalogKind::Kit) {
                continue;
            }
            let Some(article) = kit.article.clone().filter(|a| !a.trim().is_empty()) else {
                continue;
            };
            if !cabinet_offers.iter().any(|codes| codes.contains(&article)) {
                continue;
            }
            let full = match self.erp.fetch_kit(&kit.id).await {
                Ok(full) => full,
                Err(e) => {
                    warn!("📊️ Could not fetch kit '{article}' components: {e}");
                    continue;
                },
            };
            let stock = availability.kit_available(&full);
            summary.kits += 1;
            out.push(StockUpdate { offer_id: article, stock, warehouse_id: 0 });
        }
        Ok(out)
    }

    async fn publish(&self, cabinet: &M, updates: Vec<StockUpdate>, summary: &mut StockPushSummary) {
        if updates.is_empty() {
            return;
        }
        let name = cabinet.cabinet_name().to_string();
        if self.dry_run {
            info!("📊️ [{name}] would publish {} stock rows (dry-run)", updates.len());
            return;
        }
        for chunk in updates.chunks(PUBLISH_CHUNK) {
            let rows: Vec<StockUpdate> = chunk
                .iter()
                .map(|u| StockUpdate { offer_id: u.offer_id.clone(), stock: u.stock, warehouse_id: cabinet.warehouse_id() })
                .collect();
            match cabinet.publish_stocks(&rows).await {
                Ok(acks) => {
                    let rejected = acks.iter().filter(|a| !a.updated).count();
                    if rejected > 0 {
                        warn!("📊️ [{name}] {rejected} of {} stock rows rejected", rows.len());
                    }
                    summary.published += rows.len() - rejected;
                },
                Err(e) => {
                    error!("📊️ [{name}] stock publish failed for a batch of {}: {e}", rows.len());
                    summary.failures += 1;
                },
            }
        }
    }
}

/// First cabinet carrying the offer code wins; marketplace offer codes are expected to
/// be unique across a seller's cabinets.
fn route(
    update: StockUpdate,
    cabinet_offers: &[HashSet<String>],
    per_cabinet: &mut [Vec<StockUpdate>],
    summary: &mut StockPushSummary,
) {
    match cabinet_offers.iter().position(|codes| codes.contains(&update.offer_id)) {
        Some(at) => per_cabinet[at].push(update),
        None => {
            debug!("📊️ Offer code '{}' not listed in any cabinet", update.offer_id);
            summary.unrouted += 1;
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn offers(codes: &[&str]) -> HashSet<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn routing_prefers_the_first_carrying_cabinet() {
        let cabinets = vec![offers(&["A-1"]), offers(&["A-1", "B-2"])];
        let mut per_cabinet = vec![Vec::new(), Vec::new()];
        let mut summary = StockPushSummary::default();
        for (code, stock) in [("A-1", 5), ("B-2", 3), ("C-3", 1)] {
            route(
                StockUpdate { offer_id: code.to_string(), stock, warehouse_id: 0 },
                &cabinets,
                &mut per_cabinet,
                &mut summary,
            );
        }
        assert_eq!(per_cabinet[0].len(), 1);
        assert_eq!(per_cabinet[1].len(), 1);
        assert_eq!(per_cabinet[1][0].offer_id, "B-2");
        assert_eq!(summary.unrouted, 1);
    }
}
