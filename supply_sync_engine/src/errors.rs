use erp_tools::ErpApiError;
use marketplace_tools::MarketplaceApiError;
use thiserror::Error;

use crate::catalog::CatalogError;

/// Anything that can sink one order's reconciliation. All of these are caught at the
/// orchestrator's per-order boundary, logged with the order number and the failing step,
/// and counted; they never abort the batch and never trigger a document deletion.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Marketplace(#[from] MarketplaceApiError),
    #[error(transparent)]
    Erp(#[from] ErpApiError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("{step}: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: Box<SyncError>,
    },
}

impl SyncError {
    /// Tags an error with the reconciliation step it happened in, for the outcome record.
    pub fn step(step: &'static str, source: impl Into<SyncError>) -> Self {
        SyncError::Step { step, source: Box::new(source.into()) }
    }
}

/// Raised before any order is processed; the only error class that exits the process
/// non-zero.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: String, reason: String },
}
