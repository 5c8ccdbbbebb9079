//! End-to-end reconciliation behaviour over the in-memory doubles.

use erp_tools::DocKind;
use marketplace_tools::{SupplyItem, SupplyState};
use supply_sync_engine::{
    test_utils::{doc_refs, settings, supply_order, InMemoryErp, StaticSupplySource},
    SupplySync,
    SyncSettings,
};

fn erp_with_basic_catalog() -> InMemoryErp {
    let erp = InMemoryErp::new();
    erp.insert_product("A", "prod-a", 1_000);
    erp.insert_product("B", "prod-b", 2_000);
    erp
}

fn sync_for(
    erp: &InMemoryErp,
    source: StaticSupplySource,
    settings: SyncSettings,
) -> SupplySync<StaticSupplySource, InMemoryErp> {
    SupplySync::new(source, erp.clone(), doc_refs(), settings)
}

#[tokio::test]
async fn upsert_is_idempotent_across_runs() {
    let erp = erp_with_basic_catalog();
    let orders = vec![supply_order("SO-100", 100, SupplyState::ReadyToSupply, "bundle-1")];
    let items = vec![SupplyItem::new("A", 2.0), SupplyItem::new("B", 1.0)];

    let source = StaticSupplySource::new(orders.clone()).with_bundle("bundle-1", items.clone());
    let report = sync_for(&erp, source, settings()).run().await;
    assert_eq!(report.summary.created, 1);
    assert_eq!(erp.creates(DocKind::SalesOrder), 1);
    assert_eq!(erp.creates(DocKind::Transfer), 1);

    // an unchanged order, reconciled again, produces zero net creates
    let source = StaticSupplySource::new(orders).with_bundle("bundle-1", items);
    let report = sync_for(&erp, source, settings()).run().await;
    assert_eq!(report.summary.created, 0);
    assert_eq!(report.summary.updated, 1);
    assert_eq!(erp.creates(DocKind::SalesOrder), 1);
    assert_eq!(erp.creates(DocKind::Transfer), 1);
    assert_eq!(erp.count_documents(DocKind::SalesOrder), 1);
    assert_eq!(erp.count_documents(DocKind::Transfer), 1);
}

#[tokio::test]
async fn kit_expansion_conserves_component_quantities() {
    let erp = erp_with_basic_catalog();
    // kit K = A x2 + B x3; the order also references A directly
    erp.insert_kit("K", "kit-k", &[("prod-a", 2.0), ("prod-b", 3.0)]);
    erp.set_kit_price("kit-k", 7_000);
    let source = StaticSupplySource::new(vec![supply_order("SO-200", 200, SupplyState::ReadyToSupply, "bundle-1")])
        .with_bundle("bundle-1", vec![SupplyItem::new("K", 5.0), SupplyItem::new("A", 1.0)]);
    sync_for(&erp, source, settings()).run().await;

    // the sales order keeps the kit as one position
    let order = erp.stored(DocKind::SalesOrder, "SO-200").expect("sales order exists");
    assert_eq!(order.positions.len(), 2);
    assert_eq!(order.positions[0].quantity, 5.0);
    assert!(order.positions[0].assortment.meta.href.contains("kit-k"));

    // the transfer carries only components, aggregated: A = 5*2 + 1, B = 5*3
    let transfer = erp.stored(DocKind::Transfer, "SO-200").expect("transfer exists");
    assert_eq!(transfer.positions.len(), 2);
    let qty_of = |marker: &str| {
        transfer
            .positions
            .iter()
            .find(|p| p.assortment.meta.href.contains(marker))
            .map(|p| p.quantity)
            .expect("component position present")
    };
    assert_eq!(qty_of("prod-a"), 11.0);
    assert_eq!(qty_of("prod-b"), 15.0);
    assert!(transfer.positions.iter().all(|p| !p.assortment.meta.href.contains("kit")));
}

#[tokio::test]
async fn shipment_is_gated_on_transfer_commit() {
    let erp = erp_with_basic_catalog();
    erp.block_commit(DocKind::Transfer);
    let source = StaticSupplySource::new(vec![supply_order("SO-300", 300, SupplyState::InTransit, "bundle-1")])
        .with_bundle("bundle-1", vec![SupplyItem::new("A", 4.0)]);
    let report = sync_for(&erp, source, settings()).run().await;

    // blocked on stock is a soft outcome, not an error
    assert_eq!(report.summary.errors, 0);
    assert_eq!(report.summary.blocked, 1);
    let transfer = erp.stored(DocKind::Transfer, "SO-300").expect("transfer exists");
    assert!(!transfer.doc.applicable);
    // no shipment call was ever made
    assert_eq!(erp.creates(DocKind::Shipment), 0);

    // stock arrives; the next pass commits and ships
    erp.unblock_commit(DocKind::Transfer);
    let source = StaticSupplySource::new(vec![supply_order("SO-300", 300, SupplyState::InTransit, "bundle-1")])
        .with_bundle("bundle-1", vec![SupplyItem::new("A", 4.0)]);
    let report = sync_for(&erp, source, settings()).run().await;
    assert_eq!(report.summary.shipments, 1);
    assert!(erp.stored(DocKind::Transfer, "SO-300").expect("transfer").doc.applicable);
    assert_eq!(erp.creates(DocKind::Shipment), 1);
}

#[tokio::test]
async fn insufficient_stock_on_shipment_creation_is_a_soft_skip() {
    let erp = erp_with_basic_catalog();
    erp.block_create(DocKind::Shipment);
    let source = StaticSupplySource::new(vec![supply_order("SO-310", 310, SupplyState::InTransit, "bundle-1")])
        .with_bundle("bundle-1", vec![SupplyItem::new("A", 4.0)]);
    let report = sync_for(&erp, source, settings()).run().await;
    assert_eq!(report.summary.errors, 0);
    assert_eq!(report.summary.shipments, 0);
    // the transfer itself committed fine
    assert!(erp.stored(DocKind::Transfer, "SO-310").expect("transfer").doc.applicable);
}

#[tokio::test]
async fn positions_freeze_once_shipped() {
    let erp = erp_with_basic_catalog();
    let source = StaticSupplySource::new(vec![supply_order("SO-400", 400, SupplyState::InTransit, "bundle-1")])
        .with_bundle("bundle-1", vec![SupplyItem::new("A", 2.0)]);
    sync_for(&erp, source, settings()).run().await;
    assert_eq!(erp.creates(DocKind::Shipment), 1);
    let replaces_before = erp.position_replaces(DocKind::SalesOrder);

    // the marketplace now shows a different item list; the frozen chain must not move
    let source = StaticSupplySource::new(vec![supply_order("SO-400", 400, SupplyState::InTransit, "bundle-1")])
        .with_bundle("bundle-1", vec![SupplyItem::new("A", 9.0), SupplyItem::new("B", 5.0)]);
    let report = sync_for(&erp, source, settings()).run().await;
    assert_eq!(report.records[0].action, "shipped");
    assert_eq!(erp.position_replaces(DocKind::SalesOrder), replaces_before);
    let order = erp.stored(DocKind::SalesOrder, "SO-400").expect("sales order");
    assert_eq!(order.positions.len(), 1);
    assert_eq!(order.positions[0].quantity, 2.0);
}

#[tokio::test]
async fn shipment_copies_frozen_order_positions_not_bundle_items() {
    let erp = erp_with_basic_catalog();
    // X1 is a kit of A x1 + B x1
    erp.insert_kit("X1", "kit-x1", &[("prod-a", 1.0), ("prod-b", 1.0)]);
    erp.set_kit_price("kit-x1", 5_000);
    let source = StaticSupplySource::new(vec![supply_order("SO-1001", 1001, SupplyState::InTransit, "bundle-1")])
        .with_bundle("bundle-1", vec![SupplyItem::new("X1", 2.0)]);
    sync_for(&erp, source, settings()).run().await;

    let order = erp.stored(DocKind::SalesOrder, "SO-1001").expect("sales order");
    assert_eq!(order.positions.len(), 1);
    assert_eq!(order.positions[0].quantity, 2.0);

    let transfer = erp.stored(DocKind::Transfer, "SO-1001").expect("transfer");
    let mut hrefs: Vec<&str> = transfer.positions.iter().map(|p| p.assortment.meta.href.as_str()).collect();
    hrefs.sort();
    assert_eq!(transfer.positions.len(), 2);
    assert!(hrefs[0].contains("prod-a") && hrefs[1].contains("prod-b"));
    assert!(transfer.positions.iter().all(|p| p.quantity == 2.0));

    // the shipment does not re-expand: it mirrors the order's kit-level positions
    let shipment = erp.stored(DocKind::Shipment, "SO-1001").expect("shipment");
    assert_eq!(shipment.positions.len(), 1);
    assert!(shipment.positions[0].assortment.meta.href.contains("kit-x1"));
    assert_eq!(shipment.positions[0].quantity, 2.0);
}

#[tokio::test]
async fn cancellation_is_inert_without_delete_permission() {
    let erp = erp_with_basic_catalog();
    let source = StaticSupplySource::new(vec![supply_order("SO-500", 500, SupplyState::ReadyToSupply, "bundle-1")])
        .with_bundle("bundle-1", vec![SupplyItem::new("A", 1.0)]);
    sync_for(&erp, source, settings()).run().await;

    // safe mode (deletion disabled): intent is logged, nothing changes
    let source = StaticSupplySource::new(vec![supply_order("SO-500", 500, SupplyState::Cancelled, "bundle-1")]);
    let report = sync_for(&erp, source, settings()).run().await;
    assert_eq!(report.records[0].action, "would_delete");
    assert_eq!(erp.count_documents(DocKind::SalesOrder), 1);
    assert_eq!(erp.count_documents(DocKind::Transfer), 1);

    // dry-run with deletion nominally enabled: still nothing changes
    let mut with_delete = settings();
    with_delete.allow_delete = true;
    with_delete.dry_run = true;
    let source = StaticSupplySource::new(vec![supply_order("SO-500", 500, SupplyState::Cancelled, "bundle-1")]);
    let report = sync_for(&erp, source, with_delete).run().await;
    assert_eq!(report.records[0].action, "would_delete");
    assert_eq!(erp.count_documents(DocKind::SalesOrder), 1);
}

#[tokio::test]
async fn cancellation_deletes_transfer_before_sales_order() {
    let erp = erp_with_basic_catalog();
    let source = StaticSupplySource::new(vec![supply_order("SO-510", 510, SupplyState::ReadyToSupply, "bundle-1")])
        .with_bundle("bundle-1", vec![SupplyItem::new("A", 1.0)]);
    sync_for(&erp, source, settings()).run().await;

    let mut with_delete = settings();
    with_delete.allow_delete = true;
    let source = StaticSupplySource::new(vec![supply_order("SO-510", 510, SupplyState::Cancelled, "bundle-1")]);
    let report = sync_for(&erp, source, with_delete).run().await;
    assert_eq!(report.summary.deleted, 1);
    assert_eq!(erp.count_documents(DocKind::SalesOrder), 0);
    assert_eq!(erp.count_documents(DocKind::Transfer), 0);
    let kinds: Vec<DocKind> = erp.deletions().into_iter().map(|(kind, _)| kind).collect();
    assert_eq!(kinds, vec![DocKind::Transfer, DocKind::SalesOrder]);
}

#[tokio::test]
async fn cancelled_but_shipped_orders_are_never_deleted() {
    let erp = erp_with_basic_catalog();
    let source = StaticSupplySource::new(vec![supply_order("SO-520", 520, SupplyState::InTransit, "bundle-1")])
        .with_bundle("bundle-1", vec![SupplyItem::new("A", 1.0)]);
    sync_for(&erp, source, settings()).run().await;
    assert_eq!(erp.creates(DocKind::Shipment), 1);

    let mut with_delete = settings();
    with_delete.allow_delete = true;
    let source = StaticSupplySource::new(vec![supply_order("SO-520", 520, SupplyState::Cancelled, "bundle-1")]);
    let report = sync_for(&erp, source, with_delete).run().await;
    assert_eq!(report.records[0].action, "shipped");
    assert_eq!(erp.count_documents(DocKind::SalesOrder), 1);
    assert_eq!(erp.count_documents(DocKind::Shipment), 1);
    assert!(erp.deletions().is_empty());
}

#[tokio::test]
async fn unresolvable_orders_are_skipped_whole() {
    let erp = erp_with_basic_catalog();
    let source = StaticSupplySource::new(vec![supply_order("SO-600", 600, SupplyState::ReadyToSupply, "bundle-1")])
        .with_bundle("bundle-1", vec![SupplyItem::new("UNKNOWN-1", 2.0), SupplyItem::new("UNKNOWN-2", 1.0)]);
    let report = sync_for(&erp, source, settings()).run().await;
    // no document is ever created with zero positions
    assert_eq!(report.records[0].action, "skipped");
    assert_eq!(erp.creates(DocKind::SalesOrder), 0);
    assert_eq!(erp.creates(DocKind::Transfer), 0);
}

#[tokio::test]
async fn ambiguous_articles_skip_the_order_for_review() {
    let erp = erp_with_basic_catalog();
    erp.insert_duplicate_product("A", "prod-a-duplicate");
    let source = StaticSupplySource::new(vec![supply_order("SO-610", 610, SupplyState::ReadyToSupply, "bundle-1")])
        .with_bundle("bundle-1", vec![SupplyItem::new("A", 2.0), SupplyItem::new("B", 1.0)]);
    let report = sync_for(&erp, source, settings()).run().await;
    assert_eq!(report.records[0].action, "skipped");
    assert!(report.records[0].detail.as_deref().unwrap_or("").contains("ambiguous"));
    assert_eq!(erp.creates(DocKind::SalesOrder), 0);
}

#[tokio::test]
async fn dry_run_syncs_nothing_but_reports_intent() {
    let erp = erp_with_basic_catalog();
    let mut dry = settings();
    dry.dry_run = true;
    let source = StaticSupplySource::new(vec![supply_order("SO-700", 700, SupplyState::ReadyToSupply, "bundle-1")])
        .with_bundle("bundle-1", vec![SupplyItem::new("A", 2.0)]);
    let report = sync_for(&erp, source, dry).run().await;
    assert_eq!(report.records[0].action, "would_sync");
    assert_eq!(report.records[0].positions, Some(1));
    assert_eq!(erp.creates(DocKind::SalesOrder), 0);
    assert_eq!(erp.creates(DocKind::Transfer), 0);
}

#[tokio::test]
async fn one_time_comment_survives_resync() {
    let erp = erp_with_basic_catalog();
    let orders = vec![supply_order("SO-800", 800, SupplyState::ReadyToSupply, "bundle-1")];
    let items = vec![SupplyItem::new("A", 1.0)];
    let source = StaticSupplySource::new(orders.clone()).with_bundle("bundle-1", items.clone());
    sync_for(&erp, source, settings()).run().await;
    let created = erp.stored(DocKind::SalesOrder, "SO-800").expect("sales order");
    assert_eq!(created.doc.description.as_deref(), Some("SO-800 - North Hub"));

    // a second pass must not rewrite the comment (manual edits live there)
    let source = StaticSupplySource::new(orders).with_bundle("bundle-1", items);
    sync_for(&erp, source, settings()).run().await;
    let updated = erp.stored(DocKind::SalesOrder, "SO-800").expect("sales order");
    assert_eq!(updated.doc.description.as_deref(), Some("SO-800 - North Hub"));
    assert!(erp.updates(DocKind::SalesOrder) >= 1);
}

#[tokio::test]
async fn orders_before_the_cutoff_are_ignored() {
    let erp = erp_with_basic_catalog();
    let mut late_start = settings();
    late_start.planned_from = chrono::NaiveDate::from_ymd_opt(2027, 1, 1).expect("valid date");
    let source = StaticSupplySource::new(vec![supply_order("SO-900", 900, SupplyState::ReadyToSupply, "bundle-1")])
        .with_bundle("bundle-1", vec![SupplyItem::new("A", 1.0)]);
    let report = sync_for(&erp, source, late_start).run().await;
    assert_eq!(report.records[0].action, "skipped");
    assert_eq!(erp.creates(DocKind::SalesOrder), 0);
}

#[tokio::test]
async fn duplicate_documents_reduce_to_the_earliest() {
    use erp_tools::DocumentPayload;
    use supply_sync_engine::ErpDocumentStore;

    let erp = erp_with_basic_catalog();
    // two sales orders slipped past the idempotency key (say, a crashed concurrent run)
    let payload = DocumentPayload { external_code: Some("SO-950".to_string()), ..Default::default() };
    let first = erp.create(DocKind::SalesOrder, &payload).await.expect("seed first duplicate");
    erp.create(DocKind::SalesOrder, &payload).await.expect("seed second duplicate");
    assert_eq!(erp.count_documents(DocKind::SalesOrder), 2);

    let source = StaticSupplySource::new(vec![supply_order("SO-950", 950, SupplyState::ReadyToSupply, "bundle-1")])
        .with_bundle("bundle-1", vec![SupplyItem::new("A", 1.0)]);
    let report = sync_for(&erp, source, settings()).run().await;
    assert_eq!(report.summary.errors, 0);
    assert_eq!(erp.count_documents(DocKind::SalesOrder), 1);
    // the earliest document survives and is the one updated
    assert_eq!(erp.stored(DocKind::SalesOrder, "SO-950").expect("survivor").doc.id, first.id);
}

#[tokio::test]
async fn sync_one_processes_a_single_order() {
    let erp = erp_with_basic_catalog();
    let source = StaticSupplySource::new(vec![
        supply_order("SO-910", 910, SupplyState::ReadyToSupply, "bundle-1"),
        supply_order("SO-911", 911, SupplyState::ReadyToSupply, "bundle-2"),
    ])
    .with_bundle("bundle-1", vec![SupplyItem::new("A", 1.0)])
    .with_bundle("bundle-2", vec![SupplyItem::new("B", 1.0)]);
    let report = sync_for(&erp, source, settings()).sync_one(910).await;
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.summary.created, 1);
    assert!(erp.stored(DocKind::SalesOrder, "SO-910").is_some());
    assert!(erp.stored(DocKind::SalesOrder, "SO-911").is_none());
}
