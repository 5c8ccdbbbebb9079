//! Per-entity stock availability derived from the ERP's by-store report.

use std::collections::HashMap;

use erp_tools::{
    meta::{bare_id, normalize_href},
    CatalogEntity,
    StockRow,
};

/// Available quantities keyed by entity reference.
///
/// The report and the catalog do not always encode hrefs identically (query strings,
/// trailing slashes), so lookups go through href normalization first and fall back to
/// the bare identifier extracted from the href.
#[derive(Debug, Default)]
pub struct Availability {
    by_href: HashMap<String, f64>,
    by_bare_id: HashMap<String, f64>,
}

impl Availability {
    pub fn from_rows(rows: &[StockRow]) -> Self {
        let mut by_href = HashMap::with_capacity(rows.len());
        let mut by_bare_id = HashMap::with_capacity(rows.len());
        for row in rows {
            let href = normalize_href(&row.href);
            by_href.insert(href.to_string(), row.available);
            by_bare_id.insert(bare_id(href).to_string(), row.available);
        }
        Self { by_href, by_bare_id }
    }

    /// The quantity that may be promised for the entity: `max(0, on-hand − reserved)`,
    /// zero for entities absent from the report.
    pub fn available(&self, href: &str) -> f64 {
        let canonical = normalize_href(href);
        self.by_href
            .get(canonical)
            .or_else(|| self.by_bare_id.get(bare_id(canonical)))
            .copied()
            .unwrap_or(0.0)
            .max(0.0)
    }

    /// The number of whole kits the components on hand can assemble:
    /// `floor(min over components of available / quantity-per-kit)`. A kit with no
    /// components, or only zero-quantity components, yields 0.
    pub fn kit_available(&self, kit: &CatalogEntity) -> i64 {
        let mut min_ratio: Option<f64> = None;
        for component in kit.components() {
            if component.quantity <= 0.0 {
                continue;
            }
            let ratio = self.available(&component.assortment.meta.href) / component.quantity;
            min_ratio = Some(match min_ratio {
                Some(current) => current.min(ratio),
                None => ratio,
            });
        }
        match min_ratio {
            Some(ratio) => (ratio.floor() as i64).max(0),
            None => 0,
        }
    }
}

#[cfg(test)]
mod test {
    use erp_tools::meta::Meta;
    use erp_tools::{ComponentAssortment, KitComponent, Rows};

    use super::*;

    const BASE: &str = "https://erp.example.com/api/v2";

    fn stock_row(id: &str, available: f64) -> StockRow {
        StockRow {
            href: format!("{BASE}/entity/product/{id}"),
            article: id.to_string(),
            stock: available,
            reserve: 0.0,
            available,
        }
    }

    fn kit_of(components: &[(&str, f64)]) -> CatalogEntity {
        let rows = components
            .iter()
            .map(|(id, qty)| KitComponent {
                quantity: *qty,
                assortment: ComponentAssortment {
                    meta: Meta::new(format!("{BASE}/entity/product/{id}"), "product"),
                    article: Some(id.to_string()),
                    sale_prices: vec![],
                },
            })
            .collect();
        CatalogEntity {
            meta: Meta::new(format!("{BASE}/entity/kit/k-1"), "kit"),
            id: "k-1".to_string(),
            article: Some("KIT-1".to_string()),
            sale_prices: vec![],
            components: Some(Rows::new(rows)),
        }
    }

    #[test]
    fn lookup_tolerates_reference_encoding_differences() {
        let avail = Availability::from_rows(&[stock_row("p-1", 7.0)]);
        assert_eq!(avail.available(&format!("{BASE}/entity/product/p-1")), 7.0);
        assert_eq!(avail.available(&format!("{BASE}/entity/product/p-1?expand=x")), 7.0);
        // a differently-hosted href still matches through the bare identifier
        assert_eq!(avail.available("https://other.example.com/entity/product/p-1"), 7.0);
        assert_eq!(avail.available(&format!("{BASE}/entity/product/nope")), 0.0);
    }

    #[test]
    fn kit_availability_is_floor_of_min_ratio() {
        let avail = Availability::from_rows(&[stock_row("a", 10.0), stock_row("b", 9.0)]);
        let kit = kit_of(&[("a", 2.0), ("b", 3.0)]);
        // floor(min(10/2, 9/3)) = floor(min(5, 3)) = 3
        assert_eq!(avail.kit_available(&kit), 3);
    }

    #[test]
    fn kit_with_no_usable_components_has_no_stock() {
        let avail = Availability::from_rows(&[stock_row("a", 10.0)]);
        assert_eq!(avail.kit_available(&kit_of(&[])), 0);
        assert_eq!(avail.kit_available(&kit_of(&[("a", 0.0)])), 0);
    }

    #[test]
    fn missing_component_zeroes_the_kit() {
        let avail = Availability::from_rows(&[stock_row("a", 10.0)]);
        let kit = kit_of(&[("a", 1.0), ("unknown", 1.0)]);
        assert_eq!(avail.kit_available(&kit), 0);
    }
}
