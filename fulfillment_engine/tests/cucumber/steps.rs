use std::str::FromStr;

use cucumber::{given, then, when};
use fulfillment_engine::{
    db_types::{Attributes, OrderStatusType, VirtualStockStatus},
    order_objects::{NewOrderLine, NewOrderRequest, ShippingInfo},
    test_utils::fixtures::{bound_pool, bound_virtual_pool, physical_item, virtual_item},
    traits::{InventoryManagement, PaymentRecord},
};

use crate::cucumber::FulfillmentWorld;

#[given(expr = "a physical product {word} with {int} units in stock")]
async fn physical_product(world: &mut FulfillmentWorld, sku: String, stock: i64) {
    let sys = world.system().await;
    let item = physical_item(&sys.db, &sku, &[], &[]).await;
    bound_pool(&sys.db, &item, stock, Attributes::new()).await;
    world.products.insert(sku, item);
}

#[given(expr = "a virtual product {word} with {int} codes in stock")]
async fn virtual_product(world: &mut FulfillmentWorld, sku: String, count: usize) {
    virtual_product_with_delivery(world, sku, count, false).await;
}

#[given(expr = "an auto-delivered virtual product {word} with {int} codes in stock")]
async fn auto_virtual_product(world: &mut FulfillmentWorld, sku: String, count: usize) {
    virtual_product_with_delivery(world, sku, count, true).await;
}

async fn virtual_product_with_delivery(world: &mut FulfillmentWorld, sku: String, count: usize, auto: bool) {
    let sys = world.system().await;
    let item = virtual_item(&sys.db, &sku, auto).await;
    let codes = (0..count).map(|i| format!("{sku}-{i:04}")).collect::<Vec<_>>().join("\n");
    bound_virtual_pool(&sys.db, &item, &codes, Attributes::new()).await;
    world.products.insert(sku, item);
}

#[when(expr = "customer {word} orders {int} of {word}")]
async fn place_order(world: &mut FulfillmentWorld, customer: String, quantity: i64, sku: String) {
    let request = NewOrderRequest::new(&customer).with_line(NewOrderLine::new(&sku, quantity, Attributes::new()));
    submit_order(world, customer, request).await;
}

#[when(expr = "customer {word} orders {int} of {word} for delivery to {string}")]
async fn place_order_with_receiver(
    world: &mut FulfillmentWorld,
    customer: String,
    quantity: i64,
    sku: String,
    address: String,
) {
    let request = NewOrderRequest::new(&customer)
        .with_line(NewOrderLine::new(&sku, quantity, Attributes::new()))
        .with_receiver(ShippingInfo::new(&customer, &address));
    submit_order(world, customer, request).await;
}

async fn submit_order(world: &mut FulfillmentWorld, customer: String, request: NewOrderRequest) {
    let sys = world.system().await;
    match sys.orders.create_order(request).await {
        Ok(order) => {
            world.orders.insert(customer, order.order.order_no);
            world.last_error = None;
        },
        Err(e) => world.last_error = Some(e.to_string()),
    }
}

#[when(expr = "the order for {word} is paid")]
async fn pay_order(world: &mut FulfillmentWorld, customer: String) {
    let order_no = world.order_for(&customer);
    let sys = world.system().await;
    sys.orders.mark_as_paid(&order_no, PaymentRecord::manual()).await.expect("Error marking the order as paid");
}

#[when(expr = "the order for {word} ships with tracking number {word}")]
async fn ship_order(world: &mut FulfillmentWorld, customer: String, tracking_no: String) {
    let order_no = world.order_for(&customer);
    let sys = world.system().await;
    sys.orders.assign_tracking(&order_no, &tracking_no, "warehouse").await.expect("Error shipping the order");
}

#[when(expr = "the order for {word} is completed")]
async fn complete_order(world: &mut FulfillmentWorld, customer: String) {
    let order_no = world.order_for(&customer);
    let sys = world.system().await;
    sys.orders.complete_order(&order_no).await.expect("Error completing the order");
}

#[when(expr = "the order for {word} is cancelled")]
async fn cancel_order(world: &mut FulfillmentWorld, customer: String) {
    let order_no = world.order_for(&customer);
    let sys = world.system().await;
    sys.orders.cancel_order(&order_no, "Cancelled by the customer").await.expect("Error cancelling the order");
}

#[when(expr = "{word} gives the delivery address {string}")]
async fn give_address(world: &mut FulfillmentWorld, customer: String, address: String) {
    let order_no = world.order_for(&customer);
    let sys = world.system().await;
    let info = ShippingInfo::new(&customer, &address);
    sys.orders.update_shipping_info(&order_no, info).await.expect("Error updating the shipping info");
}

#[then(expr = "the order for {word} has status {word}")]
async fn check_status(world: &mut FulfillmentWorld, customer: String, status: String) {
    let expected = OrderStatusType::from_str(&status).expect("Not a valid order status");
    let order_no = world.order_for(&customer);
    let sys = world.system().await;
    let order = sys.orders.order(&order_no).await.expect("Error fetching order");
    assert_eq!(order.order.status, expected);
}

#[then(expr = "the order is rejected with {string}")]
async fn check_rejected(world: &mut FulfillmentWorld, message: String) {
    let err = world.last_error.as_deref().expect("The order was not rejected");
    assert!(err.contains(&message), "Expected an error containing '{message}', got '{err}'");
}

#[then(expr = "product {word} has {int} units available")]
async fn check_available(world: &mut FulfillmentWorld, sku: String, available: i64) {
    let sys = world.system().await;
    let actual = sys.inventory.total_available_stock(&sku).await.expect("Error fetching availability");
    assert_eq!(actual, available);
}

#[then(expr = "product {word} has {int} reserved and {int} sold")]
async fn check_ledger(world: &mut FulfillmentWorld, sku: String, reserved: i64, sold: i64) {
    let item_id = world.product(&sku).id;
    let sys = world.system().await;
    let bindings = sys.db.fetch_bindings(item_id).await.expect("Error fetching bindings");
    let pool = sys.inventory.pool(bindings[0].pool_id).await.expect("Error fetching pool");
    assert_eq!((pool.reserved_quantity, pool.sold_quantity), (reserved, sold));
}

#[then(expr = "{word} has received {int} codes")]
async fn check_codes(world: &mut FulfillmentWorld, customer: String, count: usize) {
    let order_no = world.order_for(&customer);
    let sys = world.system().await;
    let items = sys.db.fetch_virtual_items_for_order(&order_no).await.expect("Error fetching codes");
    let delivered = items.iter().filter(|i| i.status == VirtualStockStatus::Sold).count();
    assert_eq!(delivered, count);
}
