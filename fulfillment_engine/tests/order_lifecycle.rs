use fulfillment_engine::{
    db_types::{Attributes, OrderStatusType, PoolKind, StockCheckError},
    events::EventProducers,
    order_objects::{NewOrderLine, NewOrderRequest, ShippingInfo},
    test_utils::{
        fixtures::{bound_pool, bound_random_pool, payment_method, physical_item},
        prepare_env::{drop_test_db, new_test_db},
    },
    traits::{AllocationError, InventoryError, InventoryManagement, OrderFlowError, OrderManagement, PaymentRecord},
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

fn red_m() -> Attributes {
    Attributes::new().with("color", "red").with("size", "M")
}

fn receiver() -> ShippingInfo {
    ShippingInfo::new("Alice", "1 Main Street")
}

#[tokio::test]
async fn physical_order_happy_path() {
    let db = new_test_db().await;
    let (inventory, orders) = apis(&db);
    let item = physical_item(&db, "TSHIRT", &["color", "size"], &[]).await;
    let pool = bound_pool(&db, &item, 10, red_m()).await;

    let request =
        NewOrderRequest::new("alice").with_line(NewOrderLine::new("TSHIRT", 3, red_m())).with_receiver(receiver());
    let order = orders.create_order(request).await.expect("Error creating order");
    assert_eq!(order.order.status, OrderStatusType::PendingPayment);
    assert_eq!(order.lines.len(), 1);
    assert_eq!(order.allocations[0].pool_id, Some(pool.id));
    assert_eq!(order.allocations[0].pool_kind, PoolKind::Physical);

    let pool_after = inventory.pool(pool.id).await.unwrap();
    assert_eq!(pool_after.reserved_quantity, 3);
    assert_eq!(pool_after.sold_quantity, 0);
    assert_eq!(inventory.available_stock_for_selection("TSHIRT", &red_m()).await.unwrap(), 7);

    let order_no = order.order.order_no.clone();
    let paid = orders.mark_as_paid(&order_no, PaymentRecord::manual()).await.expect("Error marking order paid");
    assert_eq!(paid.order().status, OrderStatusType::Pending);
    let serials = orders.serials(&order_no).await.unwrap();
    assert_eq!(serials.len(), 3);

    let shipped = orders.assign_tracking(&order_no, "TRACK-001", "admin").await.expect("Error shipping order");
    assert_eq!(shipped.status, OrderStatusType::Shipped);
    assert_eq!(shipped.tracking_no.as_deref(), Some("TRACK-001"));
    let pool_after = inventory.pool(pool.id).await.unwrap();
    assert_eq!(pool_after.reserved_quantity, 0);
    assert_eq!(pool_after.sold_quantity, 3);
    assert_eq!(pool_after.remaining_stock(), 7);

    // Shipping twice is a no-op
    let err = orders.assign_tracking(&order_no, "TRACK-002", "admin").await.unwrap_err();
    assert_eq!(err, OrderFlowError::OrderModificationNoOp);

    let completed = orders.complete_order(&order_no).await.expect("Error completing order");
    assert_eq!(completed.status, OrderStatusType::Completed);
    assert!(completed.completed_at.is_some());

    let logs = inventory.inventory_logs(pool.id).await.unwrap();
    assert_eq!(logs.len(), 2);
    drop_test_db(db).await;
}

#[tokio::test]
async fn paid_order_without_receiver_waits_in_draft() {
    let db = new_test_db().await;
    let (_, orders) = apis(&db);
    let item = physical_item(&db, "MUG", &[], &[]).await;
    bound_pool(&db, &item, 5, Attributes::new()).await;

    let request = NewOrderRequest::new("bob").with_line(NewOrderLine::new("MUG", 1, Attributes::new()));
    let order = orders.create_order(request).await.unwrap();
    let order_no = order.order.order_no;
    let paid = orders.mark_as_paid(&order_no, PaymentRecord::manual()).await.unwrap();
    assert_eq!(paid.order().status, OrderStatusType::Draft);

    let err = orders.assign_tracking(&order_no, "TRACK-001", "admin").await.unwrap_err();
    assert!(matches!(err, OrderFlowError::OrderModificationForbidden { from: OrderStatusType::Draft, .. }));

    let updated = orders.update_shipping_info(&order_no, receiver()).await.unwrap();
    assert_eq!(updated.status, OrderStatusType::Pending);
    assert_eq!(updated.receiver_name.as_deref(), Some("Alice"));
    drop_test_db(db).await;
}

#[tokio::test]
async fn insufficient_stock_rolls_back_the_whole_order() {
    let db = new_test_db().await;
    let (inventory, orders) = apis(&db);
    let mug = physical_item(&db, "MUG", &[], &[]).await;
    let mug_pool = bound_pool(&db, &mug, 5, Attributes::new()).await;
    let cap = physical_item(&db, "CAP", &[], &[]).await;
    bound_pool(&db, &cap, 1, Attributes::new()).await;

    let request = NewOrderRequest::new("carol")
        .with_line(NewOrderLine::new("MUG", 2, Attributes::new()))
        .with_line(NewOrderLine::new("CAP", 2, Attributes::new()));
    let err = orders.create_order(request).await.unwrap_err();
    assert!(
        matches!(
            err,
            OrderFlowError::Inventory(InventoryError::StockCheck(StockCheckError::Insufficient {
                requested: 2,
                available: 1,
                ..
            }))
        ),
        "unexpected error: {err}"
    );
    let mug_pool = inventory.pool(mug_pool.id).await.unwrap();
    assert_eq!(mug_pool.reserved_quantity, 0);
    assert!(orders.search_orders(Default::default()).await.unwrap().is_empty());
    drop_test_db(db).await;
}

#[tokio::test]
async fn exact_selection_requires_every_attribute() {
    let db = new_test_db().await;
    let (_, orders) = apis(&db);
    let item = physical_item(&db, "TSHIRT", &["color", "size"], &[]).await;
    bound_pool(&db, &item, 10, red_m()).await;

    let partial = Attributes::new().with("color", "red");
    let request = NewOrderRequest::new("dave").with_line(NewOrderLine::new("TSHIRT", 1, partial));
    let err = orders.create_order(request).await.unwrap_err();
    assert_eq!(err, OrderFlowError::Allocation(AllocationError::MissingAttribute("size".into())));

    let request = NewOrderRequest::new("dave").with_line(NewOrderLine::new("TSHIRT", 1, red_m()));
    let order = orders.create_order(request).await.expect("Error creating order");
    assert_eq!(order.allocations[0].actual_attributes, red_m());

    let unknown = Attributes::new().with("color", "green").with("size", "M");
    let request = NewOrderRequest::new("dave").with_line(NewOrderLine::new("TSHIRT", 1, unknown));
    let err = orders.create_order(request).await.unwrap_err();
    assert_eq!(err, OrderFlowError::Allocation(AllocationError::NoMatchingConfiguration));
    drop_test_db(db).await;
}

#[tokio::test]
async fn cancelling_releases_stock_and_promo_code() {
    let db = new_test_db().await;
    let (inventory, orders) = apis(&db);
    let item = physical_item(&db, "MUG", &[], &[]).await;
    let pool = bound_pool(&db, &item, 5, Attributes::new()).await;
    db.create_promo_code("SPRING", 1).await.unwrap();

    let request = NewOrderRequest::new("erin")
        .with_line(NewOrderLine::new("MUG", 2, Attributes::new()))
        .with_promo_code("SPRING");
    let order = orders.create_order(request).await.unwrap();
    let promo = db.fetch_promo_code("SPRING").await.unwrap().unwrap();
    assert_eq!(promo.reserved, 1);

    // The only use of the code is on hold
    let request = NewOrderRequest::new("frank")
        .with_line(NewOrderLine::new("MUG", 1, Attributes::new()))
        .with_promo_code("SPRING");
    let err = orders.create_order(request).await.unwrap_err();
    assert_eq!(err, OrderFlowError::PromoCodeExhausted("SPRING".into()));
    assert_eq!(inventory.pool(pool.id).await.unwrap().reserved_quantity, 2);

    let cancelled = orders.cancel_order(&order.order.order_no, "Changed my mind").await.unwrap();
    assert_eq!(cancelled.status, OrderStatusType::Cancelled);
    assert_eq!(cancelled.remark.as_deref(), Some("Changed my mind"));
    assert_eq!(inventory.pool(pool.id).await.unwrap().reserved_quantity, 0);
    let promo = db.fetch_promo_code("SPRING").await.unwrap().unwrap();
    assert_eq!(promo.reserved, 0);

    // Cancelling again is not allowed
    let err = orders.cancel_order(&order.order.order_no, "again").await.unwrap_err();
    assert_eq!(err, OrderFlowError::OrderModificationNoOp);
    drop_test_db(db).await;
}

#[tokio::test]
async fn blind_box_outcome_is_hidden_until_paid() {
    let db = new_test_db().await;
    let (_, orders) = apis(&db);
    let item = physical_item(&db, "BOX", &["series"], &["figure"]).await;
    let a = Attributes::new().with("series", "one").with("figure", "cat");
    let b = Attributes::new().with("series", "one").with("figure", "dog");
    bound_random_pool(&db, &item, 5, a.clone(), Some(1)).await;
    bound_random_pool(&db, &item, 5, b.clone(), Some(3)).await;

    let selection = Attributes::new().with("series", "one").with("figure", "ignored");
    let request = NewOrderRequest::new("gina").with_line(NewOrderLine::new("BOX", 1, selection));
    let order = orders.create_order(request).await.unwrap();
    let actual = &order.allocations[0].actual_attributes;
    assert!(*actual == a || *actual == b, "unexpected outcome {actual}");
    // The customer only ever sees their own selection
    assert_eq!(order.lines[0].attributes, Attributes::new().with("series", "one"));

    let order_no = order.order.order_no.clone();
    let view = orders.customer_order(&order_no).await.unwrap();
    assert!(view.allocations.is_empty());
    orders.mark_as_paid(&order_no, PaymentRecord::manual()).await.unwrap();
    let view = orders.customer_order(&order_no).await.unwrap();
    assert_eq!(view.allocations.len(), 1);
    drop_test_db(db).await;
}

#[tokio::test]
async fn inactive_products_cannot_be_ordered() {
    let db = new_test_db().await;
    let (inventory, orders) = apis(&db);
    let item = physical_item(&db, "MUG", &[], &[]).await;
    bound_pool(&db, &item, 5, Attributes::new()).await;
    inventory.set_catalog_item_active(item.id, false).await.unwrap();

    let request = NewOrderRequest::new("hank").with_line(NewOrderLine::new("MUG", 1, Attributes::new()));
    let err = orders.create_order(request).await.unwrap_err();
    assert_eq!(err, OrderFlowError::CatalogItemInactive("MUG".into()));

    let request = NewOrderRequest::new("hank").with_line(NewOrderLine::new("NOPE", 1, Attributes::new()));
    let err = orders.create_order(request).await.unwrap_err();
    assert_eq!(err, OrderFlowError::CatalogItemNotFound("NOPE".into()));
    drop_test_db(db).await;
}

#[tokio::test]
async fn unknown_payment_method_is_rejected() {
    let db = new_test_db().await;
    let (_, orders) = apis(&db);
    let item = physical_item(&db, "MUG", &[], &[]).await;
    bound_pool(&db, &item, 5, Attributes::new()).await;
    let method = payment_method(&db, 0).await;

    let line = NewOrderLine::new("MUG", 1, Attributes::new());
    let request = NewOrderRequest::new("ivy").with_line(line.clone()).with_payment_method(method.id + 100);
    let err = orders.create_order(request).await.unwrap_err();
    assert_eq!(err, OrderFlowError::PaymentMethodNotFound(method.id + 100));

    let request = NewOrderRequest::new("ivy").with_line(line).with_payment_method(method.id);
    let order = orders.create_order(request).await.unwrap();
    assert_eq!(order.order.payment_method_id, Some(method.id));
    drop_test_db(db).await;
}

#[tokio::test]
async fn resubmission_round_trip() {
    let db = new_test_db().await;
    let (_, orders) = apis(&db);
    let item = physical_item(&db, "MUG", &[], &[]).await;
    bound_pool(&db, &item, 5, Attributes::new()).await;
    let request = NewOrderRequest::new("jack")
        .with_line(NewOrderLine::new("MUG", 1, Attributes::new()))
        .with_receiver(receiver());
    let order_no = orders.create_order(request).await.unwrap().order.order_no;
    orders.mark_as_paid(&order_no, PaymentRecord::manual()).await.unwrap();

    let order = orders.request_resubmit(&order_no, "Address is incomplete").await.unwrap();
    assert_eq!(order.status, OrderStatusType::NeedResubmit);
    let order = orders.resubmit(&order_no, ShippingInfo::new("Jack", "2 Side Street")).await.unwrap();
    assert_eq!(order.status, OrderStatusType::Pending);
    assert_eq!(order.receiver_address.as_deref(), Some("2 Side Street"));
    drop_test_db(db).await;
}

#[tokio::test]
async fn deleting_an_unpaid_order_releases_stock() {
    let db = new_test_db().await;
    let (inventory, orders) = apis(&db);
    let item = physical_item(&db, "MUG", &[], &[]).await;
    let pool = bound_pool(&db, &item, 5, Attributes::new()).await;
    let request = NewOrderRequest::new("kim").with_line(NewOrderLine::new("MUG", 2, Attributes::new()));
    let order_no = orders.create_order(request).await.unwrap().order.order_no;
    assert_eq!(inventory.pool(pool.id).await.unwrap().reserved_quantity, 2);

    orders.delete_order(&order_no).await.expect("Error deleting order");
    assert_eq!(inventory.pool(pool.id).await.unwrap().reserved_quantity, 0);
    let err = orders.order(&order_no).await.unwrap_err();
    assert_eq!(err, OrderFlowError::OrderNotFound(order_no));
    drop_test_db(db).await;
}

#[tokio::test]
async fn pools_with_history_cannot_be_deleted() {
    let db = new_test_db().await;
    let (inventory, orders) = apis(&db);
    let item = physical_item(&db, "MUG", &[], &[]).await;
    let pool = bound_pool(&db, &item, 5, Attributes::new()).await;
    let request = NewOrderRequest::new("lee").with_line(NewOrderLine::new("MUG", 1, Attributes::new()));
    orders.create_order(request).await.unwrap();
    let err = inventory.delete_pool(pool.id).await.unwrap_err();
    assert!(matches!(err, InventoryError::PoolNotDeletable(_)), "unexpected error: {err}");
    assert_eq!(db.fetch_bindings(item.id).await.unwrap().len(), 1);
    drop_test_db(db).await;
}

#[tokio::test]
async fn shipping_proceeds_when_the_reservation_was_already_released() {
    let db = new_test_db().await;
    let (inventory, orders) = apis(&db);
    let item = physical_item(&db, "TSHIRT", &["color", "size"], &[]).await;
    let pool = bound_pool(&db, &item, 10, red_m()).await;
    let request =
        NewOrderRequest::new("judy").with_line(NewOrderLine::new("TSHIRT", 2, red_m())).with_receiver(receiver());
    let order = orders.create_order(request).await.expect("Error creating order");
    let order_no = order.order.order_no.clone();
    orders.mark_as_paid(&order_no, PaymentRecord::manual()).await.expect("Error marking order paid");

    // Someone returned the units to the pool by hand before the order went out
    let token = order_no.line_token(order.allocations[0].line_index);
    db.release_reserve(pool.id, 2, &token).await.expect("Error releasing reservation");

    let shipped = orders.assign_tracking(&order_no, "TRACK-009", "admin").await.expect("Shipping was blocked");
    assert_eq!(shipped.status, OrderStatusType::Shipped);
    let pool_after = inventory.pool(pool.id).await.unwrap();
    assert_eq!(pool_after.reserved_quantity, 0);
    assert_eq!(pool_after.sold_quantity, 0);
    drop_test_db(db).await;
}
