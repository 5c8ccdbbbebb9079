//! Client for the ERP's JSON API.
//!
//! The ERP side of the gateway is document-shaped: a sales order, a warehouse transfer
//! and a shipment, all sharing one CRUD surface and addressed by an `externalCode`
//! idempotency key, plus the catalog (assortment) lookups and the per-store stock report
//! the reconciliation engine needs. Entity cross-references travel as `meta` objects;
//! [`meta`] holds the builders and the href-normalization helpers.

pub mod config;
pub mod meta;

mod api;
mod data_objects;
mod error;

pub use api::ErpApi;
pub use config::ErpConfig;
pub use data_objects::{
    extract_store_rows,
    ship_moment,
    CatalogEntity,
    CatalogKind,
    ComponentAssortment,
    DocKind,
    Document,
    DocumentPayload,
    KitComponent,
    Position,
    PositionPayload,
    Rows,
    SalePrice,
    StockReportRow,
    StockRow,
};
pub use error::ErpApiError;
