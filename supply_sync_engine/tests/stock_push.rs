//! The inventory-publishing job over the in-memory doubles.

use supply_sync_engine::{
    test_utils::{stock_report_row, InMemoryErp, RecordingPublisher},
    StockPush,
};

#[tokio::test]
async fn publishes_product_and_derived_kit_levels_to_the_right_cabinet() {
    let erp = InMemoryErp::new();
    erp.insert_product("A", "prod-a", 1_000);
    erp.insert_product("B", "prod-b", 2_000);
    erp.insert_kit("K", "kit-k", &[("prod-a", 2.0), ("prod-b", 3.0)]);
    erp.set_stock_report(vec![
        stock_report_row("prod-a", "A", "store-src", 10.0, 2.7),
        stock_report_row("prod-b", "B", "store-src", 9.0, 0.0),
        // reserved beyond on-hand must publish as zero, never negative
        stock_report_row("prod-c", "C", "store-src", 1.0, 5.0),
        // a different store's stock is not ours to publish
        stock_report_row("prod-d", "D", "store-other", 50.0, 0.0),
    ]);

    let cab1 = RecordingPublisher::new("cabinet1", 111, &["A", "K"]);
    let cab2 = RecordingPublisher::new("cabinet2", 222, &["B"]);
    let push = StockPush::new(erp, vec![cab1, cab2], "store-src", false);
    let summary = push.run().await.expect("stock push runs");

    // C is in no cabinet; D belongs to another store and never enters the rows
    assert_eq!(summary.unrouted, 1);
    assert_eq!(summary.kits, 1);
    assert_eq!(summary.failures, 0);
    assert_eq!(summary.published, 3);

    let cab1_rows = push_rows(&push, 0);
    assert_eq!(cab1_rows.len(), 2);
    let stock_of = |rows: &[(String, i64, i64)], code: &str| {
        rows.iter().find(|(c, _, _)| c == code).map(|&(_, stock, wh)| (stock, wh)).expect("row present")
    };
    // A: floor(10 - 2.7) = 7; K: floor(min(7.3/2, 9/3)) = 3
    assert_eq!(stock_of(&cab1_rows, "A"), (7, 111));
    assert_eq!(stock_of(&cab1_rows, "K"), (3, 111));

    let cab2_rows = push_rows(&push, 1);
    assert_eq!(cab2_rows, vec![("B".to_string(), 9, 222)]);
}

#[tokio::test]
async fn dry_run_publishes_nothing() {
    let erp = InMemoryErp::new();
    erp.insert_product("A", "prod-a", 1_000);
    erp.set_stock_report(vec![stock_report_row("prod-a", "A", "store-src", 4.0, 0.0)]);
    let cab1 = RecordingPublisher::new("cabinet1", 111, &["A"]);
    let push = StockPush::new(erp, vec![cab1], "store-src", true);
    let summary = push.run().await.expect("stock push runs");
    assert_eq!(summary.published, 0);
    assert!(push_rows(&push, 0).is_empty());
}

fn push_rows(push: &StockPush<InMemoryErp, RecordingPublisher>, cabinet: usize) -> Vec<(String, i64, i64)> {
    push.cabinet(cabinet).published().into_iter().map(|u| (u.offer_id, u.stock, u.warehouse_id)).collect()
}
