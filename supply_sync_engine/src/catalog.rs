//! Article → catalog-entity resolution with a per-run cache.
//!
//! The resolver is constructed once per cabinet run and thrown away with it. Failures
//! cache too: an article the catalog does not know (or knows twice) is recorded and
//! never re-queried within the run; the catalog does not change mid-batch and re-asking
//! only burns rate limit.

use std::{collections::HashMap, sync::Mutex};

use erp_tools::{meta::normalize_href, CatalogEntity, CatalogKind, ErpApiError};
use log::*;
use sg_common::http::HttpError;
use thiserror::Error;

use crate::traits::ErpDocumentStore;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// Soft: the line item referencing this article is dropped.
    #[error("No catalog entity found for article '{0}'")]
    NotFound(String),
    /// Hard data-integrity anomaly: two catalog rows claim the same article. The order
    /// is skipped and flagged for manual review rather than silently picking one.
    #[error("Article '{0}' matches more than one catalog entity")]
    AmbiguousArticle(String),
    #[error(transparent)]
    Erp(#[from] ErpApiError),
}

#[derive(Clone)]
enum Cached {
    Found(Box<CatalogEntity>),
    NotFound,
    Ambiguous,
}

pub struct CatalogResolver<E> {
    erp: E,
    by_article: Mutex<HashMap<String, Cached>>,
    by_href: Mutex<HashMap<String, Cached>>,
}

impl<E: ErpDocumentStore> CatalogResolver<E> {
    pub fn new(erp: E) -> Self {
        Self { erp, by_article: Mutex::new(HashMap::new()), by_href: Mutex::new(HashMap::new()) }
    }

    /// Resolves a marketplace article to its catalog entity. Kits come back with their
    /// components expanded, ready for decomposition.
    pub async fn resolve(&self, article: &str) -> Result<CatalogEntity, CatalogError> {
        let key = article.trim().to_string();
        if let Some(cached) = self.by_article.lock().expect("catalog cache poisoned").get(&key) {
            return unpack(cached.clone(), &key);
        }
        let mut rows = self.erp.search_catalog(&key).await?;
        let cached = match rows.len() {
            0 => {
                warn!("🗂️ Article '{key}' not found in the catalog");
                Cached::NotFound
            },
            1 => {
                let entity = self.with_components(rows.remove(0)).await?;
                Cached::Found(Box::new(entity))
            },
            n => {
                error!("🗂️ Article '{key}' matches {n} catalog rows; flag for manual review");
                Cached::Ambiguous
            },
        };
        self.by_article.lock().expect("catalog cache poisoned").insert(key.clone(), cached.clone());
        unpack(cached, &key)
    }

    /// Resolves an entity pointer (component assortment href). Used where entities are
    /// only ever referenced internally, never by article.
    pub async fn resolve_by_href(&self, href: &str) -> Result<CatalogEntity, CatalogError> {
        let key = normalize_href(href).to_string();
        if let Some(cached) = self.by_href.lock().expect("catalog cache poisoned").get(&key) {
            return unpack(cached.clone(), &key);
        }
        let cached = match self.erp.fetch_by_href(&key).await {
            Ok(entity) => Cached::Found(Box::new(entity)),
            Err(ErpApiError::Http(HttpError::Status { status: 404, .. })) => {
                warn!("🗂️ Dangling catalog reference: {key}");
                Cached::NotFound
            },
            // transient failures are not cached; the next line item may succeed
            Err(e) => return Err(e.into()),
        };
        self.by_href.lock().expect("catalog cache poisoned").insert(key.clone(), cached.clone());
        unpack(cached, &key)
    }

    /// A kit found through the search endpoint arrives without expanded components;
    /// fetch the full entity before caching so decomposition never re-queries.
    async fn with_components(&self, entity: CatalogEntity) -> Result<CatalogEntity, ErpApiError> {
        let needs_expansion = entity.kind() == Some(CatalogKind::Kit)
            && entity.components().iter().any(|c| c.assortment.sale_prices.is_empty());
        let fully_absent = entity.kind() == Some(CatalogKind::Kit) && entity.components.is_none();
        if needs_expansion || fully_absent {
            return self.erp.fetch_kit(&entity.id).await;
        }
        Ok(entity)
    }
}

fn unpack(cached: Cached, key: &str) -> Result<CatalogEntity, CatalogError> {
    match cached {
        Cached::Found(entity) => Ok(*entity),
        Cached::NotFound => Err(CatalogError::NotFound(key.to_string())),
        Cached::Ambiguous => Err(CatalogError::AmbiguousArticle(key.to_string())),
    }
}
