//! Entity `meta` references and href helpers.
//!
//! Every cross-reference in the ERP API is a `{"meta": {"href", "type", "mediaType"}}`
//! object. The stock report and the catalog do not always agree on href encoding (query
//! strings, trailing slashes), so comparisons go through [`normalize_href`], with
//! [`bare_id`] as the last-resort match key.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub href: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(rename = "mediaType", default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

/// A `{"meta": ...}` wrapper, the shape references take inside payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaRef {
    pub meta: Meta,
}

impl Meta {
    pub fn new(href: String, entity_type: &str) -> Self {
        Self { href, entity_type: entity_type.to_string(), media_type: Some("application/json".to_string()) }
    }

    pub fn to_ref(&self) -> MetaRef {
        MetaRef { meta: self.clone() }
    }
}

/// A reference to a plain entity: `{base}/entity/{entity}/{id}`.
pub fn entity_ref(base_url: &str, entity: &str, id: &str) -> MetaRef {
    MetaRef { meta: Meta::new(format!("{base_url}/entity/{entity}/{id}"), entity) }
}

/// A reference to a document workflow state. State hrefs live under the owning document
/// kind's metadata, not under a top-level entity path.
pub fn state_ref(base_url: &str, doc_path: &str, id: &str) -> MetaRef {
    MetaRef { meta: Meta::new(format!("{base_url}/entity/{doc_path}/metadata/states/{id}"), "state") }
}

/// Strips the query string, fragment and any trailing slash, leaving a canonical href
/// for use as a map key.
pub fn normalize_href(href: &str) -> &str {
    let href = href.split(&['?', '#'][..]).next().unwrap_or(href);
    href.trim_end_matches('/')
}

/// The bare identifier at the end of an href (the entity UUID in practice).
pub fn bare_id(href: &str) -> &str {
    normalize_href(href).rsplit('/').next().unwrap_or("")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn entity_refs_carry_type_and_media_type() {
        let r = entity_ref("https://erp.example.com/api/v2", "store", "abc-123");
        assert_eq!(r.meta.href, "https://erp.example.com/api/v2/entity/store/abc-123");
        assert_eq!(r.meta.entity_type, "store");
        assert_eq!(r.meta.media_type.as_deref(), Some("application/json"));
    }

    #[test]
    fn state_refs_nest_under_document_metadata() {
        let r = state_ref("https://erp.example.com/api/v2", "salesorder", "st-9");
        assert_eq!(r.meta.href, "https://erp.example.com/api/v2/entity/salesorder/metadata/states/st-9");
        assert_eq!(r.meta.entity_type, "state");
    }

    #[test]
    fn href_normalization_tolerates_queries_and_slashes() {
        let canonical = "https://erp.example.com/api/v2/entity/product/uuid-1";
        assert_eq!(normalize_href("https://erp.example.com/api/v2/entity/product/uuid-1?expand=images"), canonical);
        assert_eq!(normalize_href("https://erp.example.com/api/v2/entity/product/uuid-1/"), canonical);
        assert_eq!(bare_id("https://erp.example.com/api/v2/entity/product/uuid-1?x=1"), "uuid-1");
        assert_eq!(bare_id(""), "");
    }
}
