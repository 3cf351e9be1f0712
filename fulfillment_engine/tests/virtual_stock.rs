use fulfillment_engine::{
    db_types::{Attributes, OrderStatusType, VirtualStockStatus},
    events::EventProducers,
    order_objects::{NewOrderLine, NewOrderRequest},
    test_utils::{
        fixtures::{bound_virtual_pool, virtual_item},
        prepare_env::{drop_test_db, new_test_db},
    },
    traits::{InventoryError, InventoryManagement, OrderFlowError, PaymentRecord},
    InventoryApi,
    OrderFlowApi,
    SettingsHandle,
    SqliteDatabase,
};

fn apis(db: &SqliteDatabase) -> (InventoryApi<SqliteDatabase>, OrderFlowApi<SqliteDatabase>) {
    let inventory = InventoryApi::new(db.clone());
    let orders = OrderFlowApi::new(db.clone(), EventProducers::default(), SettingsHandle::default());
    (inventory, orders)
}

#[tokio::test]
async fn importing_skips_blank_lines() {
    let db = new_test_db().await;
    let (inventory, _) = apis(&db);
    let pool = inventory.create_virtual_pool("Gift cards", Some("Store credit".into())).await.unwrap();
    let text = "AAA-111\n\n   \nBBB-222, first batch\nCCC-333\n";
    let imported = inventory.import_from_text(pool.id, text).await.unwrap();
    assert_eq!(imported, 3);
    let stats = inventory.virtual_pool_stats(pool.id).await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.available, 3);

    let err = inventory.import_from_text(pool.id, "\n \n").await.unwrap_err();
    assert!(matches!(err, InventoryError::InvalidImport(_)));
    let err = inventory.virtual_pool_stats(pool.id + 1).await.unwrap_err();
    assert_eq!(err, InventoryError::VirtualPoolNotFound(pool.id + 1));
    drop_test_db(db).await;
}

#[tokio::test]
async fn invalidated_items_are_never_allocated() {
    let db = new_test_db().await;
    let (inventory, orders) = apis(&db);
    let item = virtual_item(&db, "KEY", false).await;
    let pool = bound_virtual_pool(&db, &item, "K-1\nK-2", Attributes::new()).await;
    let items = inventory.virtual_items(pool.id, Some(VirtualStockStatus::Available)).await.unwrap();
    let invalid = inventory.invalidate_item(items[0].id).await.unwrap();
    assert_eq!(invalid.status, VirtualStockStatus::Invalid);
    // Only available items can be invalidated
    let err = inventory.invalidate_item(items[0].id).await.unwrap_err();
    assert_eq!(err, InventoryError::VirtualItemNotAvailable(items[0].id));

    let request = NewOrderRequest::new("alice").with_line(NewOrderLine::new("KEY", 2, Attributes::new()));
    let err = orders.create_order(request).await.unwrap_err();
    assert!(
        matches!(
            err,
            OrderFlowError::Inventory(InventoryError::InsufficientVirtualStock { requested: 2, available: 1 })
        ),
        "unexpected error: {err}"
    );
    // The failed draw was rolled back
    assert_eq!(inventory.virtual_pool_stats(pool.id).await.unwrap().available, 1);

    let request = NewOrderRequest::new("alice").with_line(NewOrderLine::new("KEY", 1, Attributes::new()));
    let order = orders.create_order(request).await.unwrap();
    let reserved = db.fetch_virtual_items_for_order(&order.order.order_no).await.unwrap();
    assert_eq!(reserved.len(), 1);
    assert_eq!(reserved[0].content, items[1].content);
    assert_eq!(reserved[0].status, VirtualStockStatus::Reserved);
    drop_test_db(db).await;
}

#[tokio::test]
async fn manual_delivery_ships_virtual_orders() {
    let db = new_test_db().await;
    let (inventory, orders) = apis(&db);
    let item = virtual_item(&db, "KEY", false).await;
    let pool = bound_virtual_pool(&db, &item, "K-1\nK-2\nK-3", Attributes::new()).await;
    let request = NewOrderRequest::new("bob").with_line(NewOrderLine::new("KEY", 2, Attributes::new()));
    let order_no = orders.create_order(request).await.unwrap().order.order_no;

    // Without auto-delivery, a paid virtual order waits for an operator
    let paid = orders.mark_as_paid(&order_no, PaymentRecord::manual()).await.unwrap();
    assert_eq!(paid.order().status, OrderStatusType::Pending);
    let order = orders.deliver_virtual_stock(&order_no, "operator-1").await.unwrap();
    assert_eq!(order.status, OrderStatusType::Shipped);
    let delivered = db.fetch_virtual_items_for_order(&order_no).await.unwrap();
    assert!(delivered.iter().all(|i| i.status == VirtualStockStatus::Sold));
    assert!(delivered.iter().all(|i| i.delivered_by.as_deref() == Some("operator-1")));

    let err = orders.deliver_virtual_stock(&order_no, "operator-1").await.unwrap_err();
    assert_eq!(err, OrderFlowError::NothingToDeliver(order_no));
    let stats = inventory.virtual_pool_stats(pool.id).await.unwrap();
    assert_eq!((stats.available, stats.reserved, stats.sold), (1, 0, 2));
    drop_test_db(db).await;
}

#[tokio::test]
async fn cancelling_returns_virtual_items() {
    let db = new_test_db().await;
    let (inventory, orders) = apis(&db);
    let item = virtual_item(&db, "KEY", true).await;
    let pool = bound_virtual_pool(&db, &item, "K-1\nK-2", Attributes::new()).await;
    let request = NewOrderRequest::new("carol").with_line(NewOrderLine::new("KEY", 2, Attributes::new()));
    let order_no = orders.create_order(request).await.unwrap().order.order_no;
    assert_eq!(inventory.virtual_pool_stats(pool.id).await.unwrap().reserved, 2);

    orders.cancel_order(&order_no, "test").await.unwrap();
    let stats = inventory.virtual_pool_stats(pool.id).await.unwrap();
    assert_eq!((stats.available, stats.reserved), (2, 0));
    let items = inventory.virtual_items(pool.id, None).await.unwrap();
    assert!(items.iter().all(|i| i.order_no.is_none()));
    drop_test_db(db).await;
}

#[tokio::test]
async fn mixed_orders_are_not_auto_delivered_in_part() {
    let db = new_test_db().await;
    let (_, orders) = apis(&db);
    let auto = virtual_item(&db, "AUTO", true).await;
    bound_virtual_pool(&db, &auto, "A-1", Attributes::new()).await;
    let manual = virtual_item(&db, "MANUAL", false).await;
    bound_virtual_pool(&db, &manual, "M-1", Attributes::new()).await;

    let request = NewOrderRequest::new("dave")
        .with_line(NewOrderLine::new("AUTO", 1, Attributes::new()))
        .with_line(NewOrderLine::new("MANUAL", 1, Attributes::new()));
    let order_no = orders.create_order(request).await.unwrap().order.order_no;
    let paid = orders.mark_as_paid(&order_no, PaymentRecord::manual()).await.unwrap();
    assert_eq!(paid.order().status, OrderStatusType::Pending);
    let items = db.fetch_virtual_items_for_order(&order_no).await.unwrap();
    assert!(items.iter().all(|i| i.status == VirtualStockStatus::Reserved));
    drop_test_db(db).await;
}
