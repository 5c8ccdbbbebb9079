use erp_tools::ErpApi;
use log::*;
use marketplace_tools::MarketplaceApi;
use supply_sync_engine::{CabinetConfig, RunReport, StockPush, SupplySync, SyncConfig};

fn new_erp_api(config: &SyncConfig) -> ErpApi {
    match ErpApi::new(config.erp.clone()) {
        Ok(api) => api,
        Err(e) => {
            eprintln!("Error creating ERP client: {e}");
            std::process::exit(1);
        },
    }
}

fn new_marketplace_api(cabinet: &CabinetConfig) -> MarketplaceApi {
    match MarketplaceApi::new(cabinet.marketplace.clone()) {
        Ok(api) => api,
        Err(e) => {
            eprintln!("Error creating marketplace client for {}: {e}", cabinet.marketplace.name);
            std::process::exit(1);
        },
    }
}

/// One JSON line per order looked at, then the human-readable summary. Order-level
/// failures are already inside the report; they never fail the process.
fn print_report(report: &RunReport) {
    for record in &report.records {
        match serde_json::to_string(record) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!("Could not serialize outcome record: {e}"),
        }
    }
}

pub async fn sync_supplies(config: &SyncConfig) {
    let erp = new_erp_api(config);
    let mut total = RunReport::default();
    for cabinet in &config.cabinets {
        let marketplace = new_marketplace_api(cabinet);
        let sync = SupplySync::new(marketplace, erp.clone(), config.doc_refs(cabinet), config.settings());
        let report = sync.run().await;
        print_report(&report);
        total.merge(report);
    }
    println!("{}", total.summary);
}

pub async fn sync_supply_one(config: &SyncConfig, order_id: i64, cabinet_index: usize) {
    let Some(cabinet) = cabinet_index.checked_sub(1).and_then(|i| config.cabinets.get(i)) else {
        eprintln!("No cabinet #{cabinet_index} is configured ({} available)", config.cabinets.len());
        std::process::exit(1);
    };
    let erp = new_erp_api(config);
    let marketplace = new_marketplace_api(cabinet);
    let sync = SupplySync::new(marketplace, erp, config.doc_refs(cabinet), config.settings());
    let report = sync.sync_one(order_id).await;
    print_report(&report);
    println!("{}", report.summary);
}

pub async fn push_stocks(config: &SyncConfig) {
    let erp = new_erp_api(config);
    let cabinets: Vec<MarketplaceApi> = config.cabinets.iter().map(new_marketplace_api).collect();
    let mut push = StockPush::new(erp, cabinets, &config.source_store_id, config.dry_run);
    push.cache_dir = config.cache_dir.clone();
    match push.run().await {
        Ok(summary) => match serde_json::to_string(&summary) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!("Could not serialize stock push summary: {e}"),
        },
        Err(e) => {
            // nothing was published; still an order-of-business failure, not a config one
            error!("Stock push aborted: {e}");
        },
    }
}
