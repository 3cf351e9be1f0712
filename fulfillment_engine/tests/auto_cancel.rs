use chrono::{Duration, Utc};
use fulfillment_engine::{
    db_types::{Attributes, OrderStatusType, PollingTask},
    events::EventProducers,
    order_objects::{NewOrderLine, NewOrderRequest},
    test_utils::{
        fixtures::{backdate_order, bound_pool, payment_method, physical_item},
        prepare_env::{drop_test_db, new_test_db},
    },
    traits::{InventoryManagement, OrderManagement, PaymentRecord, PollingTaskStore},
    OrderFlowApi,
    SettingsHandle,
    AUTO_CANCEL_REMARK,
};

#[tokio::test]
async fn expired_unpaid_orders_are_cancelled() {
    let db = new_test_db().await;
    let item = physical_item(&db, "MUG", &[], &[]).await;
    let pool = bound_pool(&db, &item, 10, Attributes::new()).await;
    let method = payment_method(&db, 30).await;
    let api = OrderFlowApi::new(db.clone(), EventProducers::default(), SettingsHandle::default());
    let line = || NewOrderLine::new("MUG", 2, Attributes::new());

    let stale = api.create_order(NewOrderRequest::new("alice").with_line(line()).with_payment_method(method.id)).await;
    let stale = stale.unwrap().order;
    let fresh = api.create_order(NewOrderRequest::new("bob").with_line(line())).await.unwrap().order;
    let paid = api.create_order(NewOrderRequest::new("carol").with_line(line())).await.unwrap().order;
    api.mark_as_paid(&paid.order_no, PaymentRecord::manual()).await.unwrap();

    let long_ago = Utc::now() - Duration::hours(80);
    backdate_order(&db, stale.id, long_ago).await;
    backdate_order(&db, paid.id, long_ago).await;
    let task = PollingTask::new(stale.id, method.id, 30, long_ago);
    db.save_polling_task(&task).await.unwrap();
    assert_eq!(db.fetch_stock_pool(pool.id).await.unwrap().unwrap().reserved_quantity, 6);

    let result = api.cancel_expired_orders().await.expect("Error running the sweep");
    assert_eq!(result.cancelled_count(), 1);
    assert_eq!(result.failed_count(), 0);
    let cancelled = db.fetch_order(stale.id).await.unwrap().unwrap();
    assert_eq!(cancelled.status, OrderStatusType::Cancelled);
    assert_eq!(cancelled.remark.as_deref(), Some(AUTO_CANCEL_REMARK));
    assert!(db.fetch_polling_tasks().await.unwrap().is_empty());
    assert_eq!(db.fetch_order(fresh.id).await.unwrap().unwrap().status, OrderStatusType::PendingPayment);
    assert_eq!(db.fetch_order(paid.id).await.unwrap().unwrap().status, OrderStatusType::Draft);
    assert_eq!(db.fetch_stock_pool(pool.id).await.unwrap().unwrap().reserved_quantity, 4);

    // A second sweep finds nothing to do
    let result = api.cancel_expired_orders().await.unwrap();
    assert_eq!(result.cancelled_count(), 0);
    drop_test_db(db).await;
}

#[tokio::test]
async fn a_zero_ttl_disables_the_sweep() {
    let db = new_test_db().await;
    let item = physical_item(&db, "MUG", &[], &[]).await;
    bound_pool(&db, &item, 10, Attributes::new()).await;
    let settings = SettingsHandle::default();
    let api = OrderFlowApi::new(db.clone(), EventProducers::default(), settings.clone());
    let order = api
        .create_order(NewOrderRequest::new("dave").with_line(NewOrderLine::new("MUG", 1, Attributes::new())))
        .await
        .unwrap()
        .order;
    backdate_order(&db, order.id, Utc::now() - Duration::days(30)).await;

    settings.update(|s| s.auto_cancel_ttl = Duration::zero()).await;
    assert_eq!(api.cancel_expired_orders().await.unwrap().cancelled_count(), 0);
    assert_eq!(db.fetch_order(order.id).await.unwrap().unwrap().status, OrderStatusType::PendingPayment);

    // The TTL is re-read on every sweep
    settings.update(|s| s.auto_cancel_ttl = Duration::hours(1)).await;
    assert_eq!(api.cancel_expired_orders().await.unwrap().cancelled_count(), 1);
    drop_test_db(db).await;
}
