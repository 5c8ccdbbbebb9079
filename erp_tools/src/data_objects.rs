use std::fmt::Display;

use chrono::NaiveDate;
use log::warn;
use serde::{Deserialize, Serialize};
use sg_common::Money;

use crate::meta::{normalize_href, Meta, MetaRef};

//--------------------------------------      DocKind       ----------------------------------------------------------

/// The three ERP document kinds the gateway maintains. They share one CRUD surface; only
/// the entity path differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocKind {
    SalesOrder,
    Transfer,
    Shipment,
}

impl DocKind {
    pub fn path(&self) -> &'static str {
        match self {
            DocKind::SalesOrder => "salesorder",
            DocKind::Transfer => "transfer",
            DocKind::Shipment => "shipment",
        }
    }
}

impl Display for DocKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

//--------------------------------------    CatalogKind     ----------------------------------------------------------

/// What a catalog row is, derived from its `meta.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    Product,
    Variant,
    Kit,
}

impl CatalogKind {
    pub fn from_entity_type(entity_type: &str) -> Option<Self> {
        match entity_type {
            "product" => Some(CatalogKind::Product),
            "variant" => Some(CatalogKind::Variant),
            "kit" => Some(CatalogKind::Kit),
            _ => None,
        }
    }
}

//--------------------------------------       Rows<T>      ----------------------------------------------------------

/// The ERP wraps every collection in `{"rows": [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Rows<T> {
    #[serde(default = "Vec::new")]
    pub rows: Vec<T>,
}

impl<T> Rows<T> {
    pub fn new(rows: Vec<T>) -> Self {
        Self { rows }
    }
}

//--------------------------------------   Catalog entity   ----------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntity {
    pub meta: Meta,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub article: Option<String>,
    #[serde(default)]
    pub sale_prices: Vec<SalePrice>,
    /// Present on kits (expanded or not); absent on plain products and variants.
    #[serde(default)]
    pub components: Option<Rows<KitComponent>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalePrice {
    #[serde(default)]
    pub value: Money,
    #[serde(default)]
    pub price_type: Option<PriceType>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PriceType {
    #[serde(default)]
    pub name: String,
}

impl CatalogEntity {
    pub fn kind(&self) -> Option<CatalogKind> {
        CatalogKind::from_entity_type(&self.meta.entity_type)
    }

    /// The current sale price: the first (primary) price-list entry, zero when the
    /// entity has no price list at all.
    pub fn sale_price(&self) -> Money {
        self.sale_prices.first().map(|p| p.value).unwrap_or_default()
    }

    pub fn href(&self) -> &str {
        normalize_href(&self.meta.href)
    }

    pub fn components(&self) -> &[KitComponent] {
        self.components.as_ref().map(|c| c.rows.as_slice()).unwrap_or_default()
    }
}

/// One component line of a kit. When the kit was fetched with component expansion the
/// embedded assortment carries its own price list; otherwise only the `meta` pointer is
/// populated and the component must be dereferenced separately.
#[derive(Debug, Clone, Deserialize)]
pub struct KitComponent {
    #[serde(default)]
    pub quantity: f64,
    pub assortment: ComponentAssortment,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentAssortment {
    pub meta: Meta,
    #[serde(default)]
    pub article: Option<String>,
    #[serde(default)]
    pub sale_prices: Vec<SalePrice>,
}

impl ComponentAssortment {
    pub fn sale_price(&self) -> Money {
        self.sale_prices.first().map(|p| p.value).unwrap_or_default()
    }

    pub fn href(&self) -> &str {
        normalize_href(&self.meta.href)
    }
}

//--------------------------------------      Document      ----------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub id: String,
    pub meta: Meta,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub external_code: Option<String>,
    #[serde(default)]
    pub applicable: bool,
    /// Document timestamp in the ERP's `YYYY-MM-DD HH:MM:SS.mmm` form; kept as text
    /// because it is only ever compared lexicographically (duplicate reduction).
    #[serde(default)]
    pub moment: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Link to the owning sales order (set on transfers and shipments).
    #[serde(default)]
    pub sales_order: Option<MetaRef>,
}

impl Document {
    pub fn to_ref(&self) -> MetaRef {
        self.meta.to_ref()
    }
}

//--------------------------------------      Position      ----------------------------------------------------------

/// A position as read back from a document.
#[derive(Debug, Clone, Deserialize)]
pub struct Position {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub price: Money,
    pub assortment: MetaRef,
}

impl Position {
    pub fn assortment_href(&self) -> &str {
        normalize_href(&self.assortment.meta.href)
    }
}

/// A position to be written. Construction clamps negative quantities and prices to zero,
/// with a warning: the ERP rejects negatives, and a negative here always means corrupt
/// upstream data rather than intent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionPayload {
    pub assortment: MetaRef,
    pub quantity: f64,
    pub price: Money,
}

impl PositionPayload {
    pub fn new(assortment: MetaRef, quantity: f64, price: Money) -> Self {
        let quantity = if quantity < 0.0 {
            warn!("Negative quantity {quantity} for {} clamped to 0", assortment.meta.href);
            0.0
        } else {
            quantity
        };
        if price < Money::default() {
            warn!("Negative price {price} for {} clamped to 0", assortment.meta.href);
        }
        Self { assortment, quantity, price: price.non_negative() }
    }

    pub fn assortment_href(&self) -> &str {
        normalize_href(&self.assortment.meta.href)
    }
}

//--------------------------------------  Document payload  ----------------------------------------------------------

/// The write shape shared by all three document kinds. Every field is optional; updates
/// send only what they mean to change (in particular, updates never resend `description`,
/// which is a set-once comment).
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<MetaRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<MetaRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<MetaRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_store: Option<MetaRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_store: Option<MetaRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<MetaRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sales_channel: Option<MetaRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sales_order: Option<MetaRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipment_planned_moment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applicable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positions: Option<Rows<PositionPayload>>,
}

/// The `shipmentPlannedMoment` format the ERP reliably accepts and displays.
pub fn ship_moment(date: NaiveDate) -> String {
    format!("{date} 00:00:00.000")
}

//--------------------------------------    Stock report    ----------------------------------------------------------

/// One assortment row of the by-store stock report.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockReportRow {
    #[serde(default)]
    pub meta: Option<Meta>,
    #[serde(default)]
    pub article: Option<String>,
    #[serde(default)]
    pub stock_by_store: Vec<StoreStock>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreStock {
    #[serde(default)]
    pub meta: Option<Meta>,
    #[serde(default)]
    pub stock: f64,
    #[serde(default)]
    pub reserve: f64,
}

/// A flattened stock line for one store: what is physically present, what is reserved,
/// and what may actually be promised (`available`, floored at zero).
#[derive(Debug, Clone, PartialEq)]
pub struct StockRow {
    pub href: String,
    pub article: String,
    pub stock: f64,
    pub reserve: f64,
    pub available: f64,
}

/// Filters the report down to one store's rows and computes availability.
pub fn extract_store_rows(report: &[StockReportRow], store_id: &str) -> Vec<StockRow> {
    let store_marker = format!("/entity/store/{store_id}");
    let mut out = Vec::new();
    for row in report {
        let Some(href) = row.meta.as_ref().map(|m| m.href.as_str()).filter(|h| !h.is_empty()) else {
            continue;
        };
        let Some(entry) = row
            .stock_by_store
            .iter()
            .find(|s| s.meta.as_ref().map(|m| m.href.contains(&store_marker)).unwrap_or(false))
        else {
            continue;
        };
        let available = (entry.stock - entry.reserve).max(0.0);
        out.push(StockRow {
            href: href.to_string(),
            article: row.article.clone().unwrap_or_default().trim().to_string(),
            stock: entry.stock,
            reserve: entry.reserve,
            available,
        });
    }
    out
}
