use sg_common::Secret;

pub const DEFAULT_BASE_URL: &str = "https://seller-api.example.com";

/// Credentials and routing for one marketplace cabinet (seller account).
///
/// Cabinets address disjoint order-number namespaces, so the gateway runs one worker per
/// cabinet; the engine constructs one `MarketplaceConfig` per configured cabinet.
#[derive(Debug, Clone, Default)]
pub struct MarketplaceConfig {
    /// Short label used in logs and outcome records ("cabinet1", ...).
    pub name: String,
    pub base_url: String,
    pub client_id: String,
    pub api_key: Secret<String>,
    /// The marketplace warehouse stock levels are published against.
    pub warehouse_id: i64,
}

impl MarketplaceConfig {
    pub fn new(name: &str, base_url: &str, client_id: &str, api_key: Secret<String>, warehouse_id: i64) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            api_key,
            warehouse_id,
        }
    }
}
