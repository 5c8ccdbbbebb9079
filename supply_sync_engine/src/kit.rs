//! Resolving supply items into document positions, and decomposing kits.
//!
//! Two levels of expansion exist and must not be confused:
//! * the **sales order** carries positions at the resolved-entity level: a kit article
//!   stays a single kit position;
//! * the **transfer** carries component-level positions only: a kit is replaced by its
//!   weighted components, because the warehouse moves components, never the kit itself.
//!
//! Both levels aggregate by entity: the same entity reached twice (two order lines, or a
//! component shared between two kits) must merge into one summed position. A transfer
//! cannot carry duplicate lines, and double-counting a shared component is a correctness
//! bug, not a cosmetic one.

use std::collections::HashMap;

use erp_tools::{CatalogEntity, CatalogKind, PositionPayload};
use log::*;
use marketplace_tools::SupplyItem;
use sg_common::Money;

use crate::{
    catalog::{CatalogError, CatalogResolver},
    errors::SyncError,
    traits::ErpDocumentStore,
};

/// One aggregated line of a supply order after catalog resolution.
#[derive(Debug, Clone)]
pub struct ResolvedLine {
    pub entity: CatalogEntity,
    pub quantity: f64,
}

/// The outcome of resolving a bundle's items against the catalog.
#[derive(Debug, Clone, Default)]
pub struct ResolvedItems {
    pub lines: Vec<ResolvedLine>,
    /// Articles the catalog does not know; their lines were dropped.
    pub missing: usize,
    /// Articles matching more than one catalog row. Any entry here means the whole
    /// order must be skipped and flagged.
    pub ambiguous: Vec<String>,
}

impl ResolvedItems {
    /// Sales-order level positions: one per resolved entity, kit or not.
    pub fn order_positions(&self) -> Vec<PositionPayload> {
        self.lines
            .iter()
            .map(|line| {
                PositionPayload::new(line.entity.meta.to_ref(), line.quantity, line.entity.sale_price())
            })
            .collect()
    }
}

/// Transfer-level positions after kit decomposition.
#[derive(Debug, Clone, Default)]
pub struct ExpandedPositions {
    pub positions: Vec<PositionPayload>,
    /// Kit components that could not be resolved and were left out.
    pub skipped_components: usize,
}

/// Resolves each supply item to a catalog entity and aggregates by entity reference.
pub async fn resolve_positions<E: ErpDocumentStore>(
    resolver: &CatalogResolver<E>,
    items: &[SupplyItem],
) -> Result<ResolvedItems, SyncError> {
    let mut out = ResolvedItems::default();
    let mut index: HashMap<String, usize> = HashMap::new();
    for item in items.iter().filter(|i| i.is_valid()) {
        match resolver.resolve(&item.article).await {
            Ok(entity) => {
                let href = entity.href().to_string();
                match index.get(&href) {
                    Some(&at) => out.lines[at].quantity += item.quantity,
                    None => {
                        index.insert(href, out.lines.len());
                        out.lines.push(ResolvedLine { entity, quantity: item.quantity });
                    },
                }
            },
            Err(CatalogError::NotFound(_)) => {
                warn!("🗂️ Dropping item '{}' x{}: not in catalog", item.article, item.quantity);
                out.missing += 1;
            },
            Err(CatalogError::AmbiguousArticle(article)) => out.ambiguous.push(article),
            Err(e @ CatalogError::Erp(_)) => return Err(SyncError::step("resolve article", e)),
        }
    }
    Ok(out)
}

/// Expands resolved lines to the component level for the transfer document.
///
/// Kits are replaced by `line quantity × component quantity-per-kit` of each component;
/// simple products and variants pass through. The result is re-aggregated across the
/// whole list, so a component shared between a kit and a direct line merges.
pub async fn expand_components<E: ErpDocumentStore>(
    resolver: &CatalogResolver<E>,
    lines: &[ResolvedLine],
) -> Result<ExpandedPositions, SyncError> {
    let mut out = ExpandedPositions::default();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut push = |positions: &mut Vec<PositionPayload>, payload: PositionPayload| {
        let href = payload.assortment_href().to_string();
        match index.get(&href) {
            Some(&at) => positions[at].quantity += payload.quantity,
            None => {
                index.insert(href, positions.len());
                positions.push(payload);
            },
        }
    };

    for line in lines {
        if line.entity.kind() != Some(CatalogKind::Kit) {
            push(
                &mut out.positions,
                PositionPayload::new(line.entity.meta.to_ref(), line.quantity, line.entity.sale_price()),
            );
            continue;
        }
        for component in line.entity.components() {
            if component.quantity <= 0.0 {
                continue;
            }
            let price = match component_price(resolver, component).await {
                Ok(price) => price,
                Err(()) => {
                    out.skipped_components += 1;
                    continue;
                },
            };
            let quantity = line.quantity * component.quantity;
            push(&mut out.positions, PositionPayload::new(component.assortment.meta.to_ref(), quantity, price));
        }
    }
    Ok(out)
}

/// A component fetched with expansion carries its own price list; otherwise the pointer
/// is dereferenced through the resolver. `Err(())` means the component is unresolvable
/// and the caller should skip it (with its warning already logged).
async fn component_price<E: ErpDocumentStore>(
    resolver: &CatalogResolver<E>,
    component: &erp_tools::KitComponent,
) -> Result<Money, ()> {
    if !component.assortment.sale_prices.is_empty() {
        return Ok(component.assortment.sale_price());
    }
    let href = component.assortment.meta.href.clone();
    if href.is_empty() {
        warn!("🗂️ Kit component without an assortment reference; skipping");
        return Err(());
    }
    match resolver.resolve_by_href(&href).await {
        Ok(entity) => Ok(entity.sale_price()),
        Err(e) => {
            warn!("🗂️ Kit component {href} could not be resolved ({e}); skipping");
            Err(())
        },
    }
}
