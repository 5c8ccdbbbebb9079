use sg_common::Secret;

pub const DEFAULT_BASE_URL: &str = "https://erp.example.com/api/v2";

/// Connection settings for the ERP API. One instance serves every cabinet: the ERP is a
/// single tenant, cabinets differ only in the sales channel stamped on their documents.
#[derive(Debug, Clone, Default)]
pub struct ErpConfig {
    pub base_url: String,
    pub token: Secret<String>,
}

impl ErpConfig {
    pub fn new(base_url: &str, token: Secret<String>) -> Self {
        Self { base_url: base_url.trim_end_matches('/').to_string(), token }
    }
}
