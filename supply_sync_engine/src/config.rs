//! Run configuration, loaded from the environment in one pass.
//!
//! Every required variable is checked before any order is processed: a configuration
//! hole is the one error class that must fail the process, not a single order. Cabinet
//! credentials are discovered by consecutive index (`SG_CABINET1_*`, `SG_CABINET2_*`,
//! ...) until the first gap.

use std::{env, path::PathBuf};

use chrono::NaiveDate;
use erp_tools::ErpConfig;
use log::*;
use marketplace_tools::MarketplaceConfig;
use sg_common::{helpers::parse_boolean_flag, Secret};

use crate::{documents::DocRefs, errors::ConfigError, order_flow::SyncSettings};

/// Orders planned before this date predate the gateway's rollout and must never be
/// touched retroactively.
const DEFAULT_PLANNED_FROM: &str = "2025-12-03";

#[derive(Debug, Clone)]
pub struct CabinetConfig {
    pub marketplace: MarketplaceConfig,
    /// The ERP sales channel stamped on this cabinet's documents.
    pub sales_channel_id: String,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub erp: ErpConfig,
    pub organization_id: String,
    pub counterparty_id: String,
    /// The store goods leave (the seller's own warehouse).
    pub source_store_id: String,
    /// The store goods arrive at (the fulfillment warehouse); also the store documents
    /// are booked against.
    pub target_store_id: String,
    pub state_sales_order_id: String,
    pub state_transfer_id: String,
    pub state_shipment_id: String,
    pub dry_run: bool,
    pub allow_delete: bool,
    pub planned_from: NaiveDate,
    pub cache_dir: Option<PathBuf>,
    pub cabinets: Vec<CabinetConfig>,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let erp_base = optional("SG_ERP_BASE_URL").unwrap_or_else(|| erp_tools::config::DEFAULT_BASE_URL.to_string());
        let erp = ErpConfig::new(&erp_base, Secret::new(required("SG_ERP_TOKEN")?));

        let planned_from_raw = optional("SG_PLANNED_FROM").unwrap_or_else(|| DEFAULT_PLANNED_FROM.to_string());
        let planned_from = planned_from_raw.parse::<NaiveDate>().map_err(|e| ConfigError::Invalid {
            var: "SG_PLANNED_FROM".to_string(),
            reason: format!("'{planned_from_raw}' is not a YYYY-MM-DD date: {e}"),
        })?;

        let cabinets = load_cabinets()?;
        let config = Self {
            erp,
            organization_id: required("SG_ERP_ORG_ID")?,
            counterparty_id: required("SG_ERP_COUNTERPARTY_ID")?,
            source_store_id: required("SG_ERP_SOURCE_STORE_ID")?,
            target_store_id: required("SG_ERP_TARGET_STORE_ID")?,
            state_sales_order_id: required("SG_ERP_STATE_SALES_ORDER_ID")?,
            state_transfer_id: required("SG_ERP_STATE_TRANSFER_ID")?,
            state_shipment_id: required("SG_ERP_STATE_SHIPMENT_ID")?,
            dry_run: flag("SG_DRY_RUN", false),
            allow_delete: flag("SG_ALLOW_DELETE", false),
            planned_from,
            cache_dir: optional("SG_CACHE_DIR").map(PathBuf::from),
            cabinets,
        };
        if config.dry_run {
            info!("🪛️ SG_DRY_RUN is set: every mutation will be logged and skipped");
        }
        if !config.allow_delete {
            debug!("🪛️ SG_ALLOW_DELETE is off: cancelled orders are reported, never deleted");
        }
        Ok(config)
    }

    pub fn settings(&self) -> SyncSettings {
        SyncSettings { dry_run: self.dry_run, allow_delete: self.allow_delete, planned_from: self.planned_from }
    }

    /// The fixed document references for one cabinet's run.
    pub fn doc_refs(&self, cabinet: &CabinetConfig) -> DocRefs {
        DocRefs::build(
            &self.erp.base_url,
            &self.organization_id,
            &self.counterparty_id,
            &self.source_store_id,
            &self.target_store_id,
            &self.state_sales_order_id,
            &self.state_transfer_id,
            &self.state_shipment_id,
            &cabinet.sales_channel_id,
        )
    }
}

fn load_cabinets() -> Result<Vec<CabinetConfig>, ConfigError> {
    let base_url =
        optional("SG_MARKETPLACE_BASE_URL").unwrap_or_else(|| marketplace_tools::config::DEFAULT_BASE_URL.to_string());
    let mut cabinets = Vec::new();
    for index in 1.. {
        let prefix = format!("SG_CABINET{index}_");
        let client_id = optional(&format!("{prefix}CLIENT_ID"));
        if client_id.is_none() {
            if index == 1 {
                return Err(ConfigError::MissingVar(format!("{prefix}CLIENT_ID")));
            }
            break;
        }
        let name = format!("cabinet{index}");
        let api_key = Secret::new(required(&format!("{prefix}API_KEY"))?);
        let warehouse_raw = required(&format!("{prefix}WAREHOUSE_ID"))?;
        let warehouse_id = warehouse_raw.parse::<i64>().map_err(|e| ConfigError::Invalid {
            var: format!("{prefix}WAREHOUSE_ID"),
            reason: format!("'{warehouse_raw}' is not an integer: {e}"),
        })?;
        let marketplace =
            MarketplaceConfig::new(&name, &base_url, &client_id.unwrap_or_default(), api_key, warehouse_id);
        cabinets.push(CabinetConfig { marketplace, sales_channel_id: required(&format!("{prefix}SALES_CHANNEL_ID"))? });
    }
    info!("🪛️ {} marketplace cabinet(s) configured", cabinets.len());
    Ok(cabinets)
}

fn required(name: &str) -> Result<String, ConfigError> {
    optional(name).ok_or_else(|| ConfigError::MissingVar(name.to_string()))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn flag(name: &str, default: bool) -> bool {
    parse_boolean_flag(env::var(name).ok(), default)
}
