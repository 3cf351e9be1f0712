//! Request handler definitions
//!
//! Define each route and its handler here. Handlers are generic over the storage backend, so the endpoint tests can
//! run them against any [`InventoryManagement`] + [`OrderManagement`] implementation. Routes that touch the payment
//! poller are generic over the [`PaymentVerifier`] too.
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. Every database call and every call to a payment provider must be
//! awaited, never blocked on.
use actix_web::{get, web, HttpResponse, Responder};
use fulfillment_engine::{
    db_types::{NewBinding, NewCatalogItem, NewPaymentMethod, NewStockPool, OrderNo},
    order_objects::{NewOrderRequest, ShippingInfo},
    traits::{AdjustOutcome, AdjustRequest, InventoryManagement, OrderManagement, PaymentVerifier, PollingTaskStore},
    InventoryApi,
    OrderFlowApi,
    PaymentPoller,
};
use log::*;

use crate::{
    data_objects::{
        ActiveParams,
        AdjustParams,
        AvailabilityQuery,
        AvailabilityResult,
        ImportParams,
        ImportResult,
        JsonResponse,
        ManualPaymentParams,
        NewPromoCodeParams,
        NewVirtualPoolParams,
        OperatorParams,
        OrderSearchParams,
        PaymentResponse,
        PoolSearchParams,
        ReasonParams,
        ShipOrderParams,
        UpdateBindingParams,
        VirtualItemsParams,
    },
    errors::ServerError,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:path),+ where verifier: $verifier:path) => {
        paste::paste! { pub struct [<$name:camel Route>]<B, V>(core::marker::PhantomData<fn() -> (B, V)>);}
        paste::paste! { impl<B, V> [<$name:camel Route>]<B, V> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> (B, V)>)
            }
        }}
        paste::paste! { impl<B, V> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<B, V>
        where
            B: $($bounds +)+ 'static,
            V: $verifier + 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<B, V>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:path),+) => {
        paste::paste! { pub struct [<$name:camel Route>]<B>(core::marker::PhantomData<fn() -> B>);}
        paste::paste! { impl<B> [<$name:camel Route>]<B> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> B>)
            }
        }}
        paste::paste! { impl<B> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<B>
        where
            B: $($bounds +)+ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<B>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(create_order => Post "/orders" impl InventoryManagement, OrderManagement, PollingTaskStore where verifier: PaymentVerifier);
/// Route handler for order creation
///
/// Validates and allocates every line of the order, then reserves all of its stock in one go. If anything fails,
/// nothing is reserved and the error is returned. Orders that name a payment method are handed to the payment poller.
///
/// The response is the customer's view of the new order, so blind-box outcomes are not revealed.
pub async fn create_order<B, V>(
    body: web::Json<NewOrderRequest>,
    api: web::Data<OrderFlowApi<B>>,
    poller: web::Data<PaymentPoller<B, V>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement + OrderManagement + PollingTaskStore,
    V: PaymentVerifier,
{
    let request = body.into_inner();
    debug!("💻️ POST new order for customer {} with {} lines", request.customer_id, request.lines.len());
    let order = api.create_order(request).await?;
    if let Some(method_id) = order.order.payment_method_id {
        if let Err(e) = poller.add_to_queue(order.order.id, method_id).await {
            warn!(
                "💻️ Order {} was created but could not be queued for payment polling. It will be queued again on the \
                 next restart. {e}",
                order.order.order_no
            );
        }
    }
    Ok(HttpResponse::Created().json(order.customer_view()))
}

route!(search_orders => Get "/orders" impl InventoryManagement, OrderManagement);
pub async fn search_orders<B>(
    query: web::Query<OrderSearchParams>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement + OrderManagement,
{
    debug!("💻️ GET order search: {:?}", query);
    let orders = api.search_orders(query.into_inner().into()).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(order => Get "/orders/{order_no}" impl InventoryManagement, OrderManagement);
/// The full order, including allocations. For back-office use.
pub async fn order<B>(path: web::Path<OrderNo>, api: web::Data<OrderFlowApi<B>>) -> Result<HttpResponse, ServerError>
where B: InventoryManagement + OrderManagement {
    let order_no = path.into_inner();
    debug!("💻️ GET order {order_no}");
    let order = api.order(&order_no).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(customer_order => Get "/orders/{order_no}/customer" impl InventoryManagement, OrderManagement);
/// The order as the customer may see it. Allocations are withheld until the order has been paid.
pub async fn customer_order<B>(
    path: web::Path<OrderNo>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement + OrderManagement,
{
    let order_no = path.into_inner();
    debug!("💻️ GET customer view of order {order_no}");
    let order = api.customer_order(&order_no).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(pay_order => Post "/orders/{order_no}/pay" impl InventoryManagement, OrderManagement, PollingTaskStore where verifier: PaymentVerifier);
/// Marks an order as paid by hand, e.g. for a payment that was confirmed out of band.
///
/// Paying an order that has already been processed is not an error. The response says whether anything changed.
pub async fn pay_order<B, V>(
    path: web::Path<OrderNo>,
    body: Option<web::Json<ManualPaymentParams>>,
    api: web::Data<OrderFlowApi<B>>,
    poller: web::Data<PaymentPoller<B, V>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement + OrderManagement + PollingTaskStore,
    V: PaymentVerifier,
{
    let order_no = path.into_inner();
    let params = body.map(|b| b.into_inner()).unwrap_or_default();
    info!("💻️ POST manual payment for order {order_no}");
    let transition = api.mark_as_paid(&order_no, params.into()).await?;
    stop_polling(poller.as_ref(), transition.order().id).await;
    Ok(HttpResponse::Ok().json(PaymentResponse::from(transition)))
}

route!(update_shipping_info => Patch "/orders/{order_no}/shipping" impl InventoryManagement, OrderManagement);
/// Supplies the delivery details for an order. A paid order waiting in `draft` moves on to `pending`.
pub async fn update_shipping_info<B>(
    path: web::Path<OrderNo>,
    body: web::Json<ShippingInfo>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement + OrderManagement,
{
    let order_no = path.into_inner();
    debug!("💻️ PATCH shipping info for order {order_no}");
    let order = api.update_shipping_info(&order_no, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(ship_order => Post "/orders/{order_no}/ship" impl InventoryManagement, OrderManagement);
/// Assigns a tracking number and ships the order. The reserved stock is converted into sales.
pub async fn ship_order<B>(
    path: web::Path<OrderNo>,
    body: web::Json<ShipOrderParams>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement + OrderManagement,
{
    let order_no = path.into_inner();
    let ShipOrderParams { tracking_no, operator } = body.into_inner();
    info!("💻️ POST ship order {order_no} with tracking number {tracking_no}");
    let order = api.assign_tracking(&order_no, &tracking_no, &operator).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(deliver_order => Post "/orders/{order_no}/deliver" impl InventoryManagement, OrderManagement);
/// Hands over the virtual items reserved for an order that is not delivered automatically.
pub async fn deliver_order<B>(
    path: web::Path<OrderNo>,
    body: web::Json<OperatorParams>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement + OrderManagement,
{
    let order_no = path.into_inner();
    let operator = body.into_inner().operator;
    info!("💻️ POST deliver virtual stock for order {order_no} by {operator}");
    let order = api.deliver_virtual_stock(&order_no, &operator).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(complete_order => Post "/orders/{order_no}/complete" impl InventoryManagement, OrderManagement);
pub async fn complete_order<B>(
    path: web::Path<OrderNo>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement + OrderManagement,
{
    let order_no = path.into_inner();
    info!("💻️ POST complete order {order_no}");
    let order = api.complete_order(&order_no).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(request_resubmit => Post "/orders/{order_no}/request_resubmit" impl InventoryManagement, OrderManagement);
pub async fn request_resubmit<B>(
    path: web::Path<OrderNo>,
    body: web::Json<ReasonParams>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement + OrderManagement,
{
    let order_no = path.into_inner();
    let reason = body.into_inner().reason;
    info!("💻️ POST request resubmission of order {order_no}. {reason}");
    let order = api.request_resubmit(&order_no, &reason).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(resubmit_order => Post "/orders/{order_no}/resubmit" impl InventoryManagement, OrderManagement);
pub async fn resubmit_order<B>(
    path: web::Path<OrderNo>,
    body: web::Json<ShippingInfo>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement + OrderManagement,
{
    let order_no = path.into_inner();
    info!("💻️ POST resubmit order {order_no}");
    let order = api.resubmit(&order_no, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(cancel_order => Post "/orders/{order_no}/cancel" impl InventoryManagement, OrderManagement, PollingTaskStore where verifier: PaymentVerifier);
/// Cancels an order that has not shipped yet, and returns all of its stock.
pub async fn cancel_order<B, V>(
    path: web::Path<OrderNo>,
    body: Option<web::Json<ReasonParams>>,
    api: web::Data<OrderFlowApi<B>>,
    poller: web::Data<PaymentPoller<B, V>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement + OrderManagement + PollingTaskStore,
    V: PaymentVerifier,
{
    let order_no = path.into_inner();
    let reason = body.map(|b| b.into_inner().reason).unwrap_or_default();
    info!("💻️ POST cancel order {order_no}. {reason}");
    let order = api.cancel_order(&order_no, &reason).await?;
    stop_polling(poller.as_ref(), order.id).await;
    Ok(HttpResponse::Ok().json(order))
}

route!(refund_order => Post "/orders/{order_no}/refund" impl InventoryManagement, OrderManagement, PollingTaskStore where verifier: PaymentVerifier);
/// Refunds a paid order through its payment method, and releases whatever stock it still holds.
pub async fn refund_order<B, V>(
    path: web::Path<OrderNo>,
    body: Option<web::Json<ReasonParams>>,
    api: web::Data<OrderFlowApi<B>>,
    poller: web::Data<PaymentPoller<B, V>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement + OrderManagement + PollingTaskStore,
    V: PaymentVerifier,
{
    let order_no = path.into_inner();
    let reason = body.map(|b| b.into_inner().reason).unwrap_or_default();
    info!("💻️ POST refund order {order_no}. {reason}");
    let order = api.refund_order(&order_no, poller.verifier(), &reason).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(delete_order => Delete "/orders/{order_no}" impl InventoryManagement, OrderManagement, PollingTaskStore where verifier: PaymentVerifier);
/// Deletes an unpaid or cancelled order. Any stock it still holds is released first.
pub async fn delete_order<B, V>(
    path: web::Path<OrderNo>,
    api: web::Data<OrderFlowApi<B>>,
    poller: web::Data<PaymentPoller<B, V>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement + OrderManagement + PollingTaskStore,
    V: PaymentVerifier,
{
    let order_no = path.into_inner();
    info!("💻️ DELETE order {order_no}");
    let order = api.order(&order_no).await?;
    api.delete_order(&order_no).await?;
    stop_polling(poller.as_ref(), order.order.id).await;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Order {order_no} deleted"))))
}

route!(order_serials => Get "/orders/{order_no}/serials" impl InventoryManagement, OrderManagement);
pub async fn order_serials<B>(
    path: web::Path<OrderNo>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement + OrderManagement,
{
    let order_no = path.into_inner();
    debug!("💻️ GET serials for order {order_no}");
    let serials = api.serials(&order_no).await?;
    Ok(HttpResponse::Ok().json(serials))
}

route!(issue_serials => Post "/orders/{order_no}/serials" impl InventoryManagement, OrderManagement);
/// Issues any serial numbers that a paid order is still missing. Safe to call repeatedly.
pub async fn issue_serials<B>(
    path: web::Path<OrderNo>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement + OrderManagement,
{
    let order_no = path.into_inner();
    info!("💻️ POST issue serials for order {order_no}");
    let serials = api.issue_serials(&order_no).await?;
    Ok(HttpResponse::Ok().json(serials))
}

route!(order_virtual_items => Get "/orders/{order_no}/virtual_items" impl InventoryManagement, OrderManagement);
pub async fn order_virtual_items<B>(
    path: web::Path<OrderNo>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement + OrderManagement,
{
    let order_no = path.into_inner();
    debug!("💻️ GET virtual items for order {order_no}");
    let order = api.order(&order_no).await?;
    let items = api.db().fetch_virtual_items_for_order(&order.order.order_no).await?;
    Ok(HttpResponse::Ok().json(items))
}

/// Stops payment polling for an order that no longer needs it. The poller would drop it by itself on the next check,
/// so failures are only logged.
async fn stop_polling<B, V>(poller: &PaymentPoller<B, V>, order_id: i64)
where
    B: OrderManagement + PollingTaskStore,
    V: PaymentVerifier,
{
    if let Err(e) = poller.remove_from_queue(order_id).await {
        warn!("💻️ Could not remove order {order_id} from the payment polling queue. {e}");
    }
}

//----------------------------------------------   Payment setup  ----------------------------------------------------
route!(create_payment_method => Post "/payment_methods" impl InventoryManagement, OrderManagement);
pub async fn create_payment_method<B>(
    body: web::Json<NewPaymentMethod>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement + OrderManagement,
{
    let method = body.into_inner();
    info!("💻️ POST new payment method {}", method.name);
    let method = api.db().create_payment_method(method).await?;
    Ok(HttpResponse::Created().json(method))
}

route!(create_promo_code => Post "/promo_codes" impl InventoryManagement, OrderManagement);
pub async fn create_promo_code<B>(
    body: web::Json<NewPromoCodeParams>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement + OrderManagement,
{
    let NewPromoCodeParams { code, total } = body.into_inner();
    info!("💻️ POST new promo code {code} with {total} uses");
    let code = api.db().create_promo_code(&code, total).await?;
    Ok(HttpResponse::Created().json(code))
}

route!(polling_queue => Get "/polling/queue" impl OrderManagement, PollingTaskStore where verifier: PaymentVerifier);
/// The length of the payment polling queue, and when the next check is due.
pub async fn polling_queue<B, V>(poller: web::Data<PaymentPoller<B, V>>) -> Result<HttpResponse, ServerError>
where
    B: OrderManagement + PollingTaskStore,
    V: PaymentVerifier,
{
    trace!("💻️ GET payment polling queue status");
    Ok(HttpResponse::Ok().json(poller.queue_status().await))
}

//----------------------------------------------   Catalog  ----------------------------------------------------
route!(create_catalog_item => Post "/catalog" impl InventoryManagement);
pub async fn create_catalog_item<B>(
    body: web::Json<NewCatalogItem>,
    api: web::Data<InventoryApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement,
{
    let item = body.into_inner();
    info!("💻️ POST new catalog item {}", item.sku);
    let item = api.create_catalog_item(item).await?;
    Ok(HttpResponse::Created().json(item))
}

route!(catalog_item => Get "/catalog/{sku}" impl InventoryManagement);
pub async fn catalog_item<B>(
    path: web::Path<String>,
    api: web::Data<InventoryApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement,
{
    let sku = path.into_inner();
    debug!("💻️ GET catalog item {sku}");
    let item = api.catalog_item(&sku).await?;
    Ok(HttpResponse::Ok().json(item))
}

route!(set_catalog_item_active => Patch "/catalog/{id}/active" impl InventoryManagement);
pub async fn set_catalog_item_active<B>(
    path: web::Path<i64>,
    body: web::Json<ActiveParams>,
    api: web::Data<InventoryApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement,
{
    let id = path.into_inner();
    let active = body.into_inner().active;
    info!("💻️ PATCH catalog item {id} active: {active}");
    let item = api.set_catalog_item_active(id, active).await?;
    Ok(HttpResponse::Ok().json(item))
}

route!(catalog_bindings => Get "/catalog/{sku}/bindings" impl InventoryManagement);
pub async fn catalog_bindings<B>(
    path: web::Path<String>,
    api: web::Data<InventoryApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement,
{
    let sku = path.into_inner();
    debug!("💻️ GET bindings for {sku}");
    let bindings = api.bindings_for(&sku).await?;
    Ok(HttpResponse::Ok().json(bindings))
}

//----------------------------------------------   Bindings  ----------------------------------------------------
route!(create_binding => Post "/bindings" impl InventoryManagement);
/// Binds a stock pool to one attribute combination of a catalog item. Each combination can only be bound once.
pub async fn create_binding<B>(
    body: web::Json<NewBinding>,
    api: web::Data<InventoryApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement,
{
    let binding = body.into_inner();
    info!(
        "💻️ POST new binding of {} pool {} to catalog item {} for {}",
        binding.pool_kind, binding.pool_id, binding.catalog_item_id, binding.attributes
    );
    let binding = api.create_binding(binding).await?;
    Ok(HttpResponse::Created().json(binding))
}

route!(update_binding => Patch "/bindings/{id}" impl InventoryManagement);
pub async fn update_binding<B>(
    path: web::Path<i64>,
    body: web::Json<UpdateBindingParams>,
    api: web::Data<InventoryApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement,
{
    let id = path.into_inner();
    let UpdateBindingParams { is_random, priority } = body.into_inner();
    info!("💻️ PATCH binding {id}. Random: {is_random}, priority: {priority}");
    let binding = api.update_binding(id, is_random, priority).await?;
    Ok(HttpResponse::Ok().json(binding))
}

route!(delete_binding => Delete "/bindings/{id}" impl InventoryManagement);
pub async fn delete_binding<B>(
    path: web::Path<i64>,
    api: web::Data<InventoryApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement,
{
    let id = path.into_inner();
    info!("💻️ DELETE binding {id}");
    api.delete_binding(id).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Binding {id} deleted"))))
}

//----------------------------------------------   Availability  ----------------------------------------------------
route!(availability => Post "/availability" impl InventoryManagement);
/// How many units of a product can still be ordered.
///
/// With no attributes, this is the total across every bound pool. Otherwise it covers the pools whose attributes
/// include the requested ones.
pub async fn availability<B>(
    body: web::Json<AvailabilityQuery>,
    api: web::Data<InventoryApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement,
{
    let AvailabilityQuery { sku, attributes } = body.into_inner();
    trace!("💻️ POST availability of {sku} for {attributes}");
    let available = if attributes.is_empty() {
        api.total_available_stock(&sku).await?
    } else {
        api.available_stock_for_selection(&sku, &attributes).await?
    };
    Ok(HttpResponse::Ok().json(AvailabilityResult { sku, attributes, available }))
}

//----------------------------------------------   Stock pools  ----------------------------------------------------
route!(create_pool => Post "/pools" impl InventoryManagement);
pub async fn create_pool<B>(
    body: web::Json<NewStockPool>,
    api: web::Data<InventoryApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement,
{
    let pool = body.into_inner();
    info!("💻️ POST new stock pool {} with {} units", pool.name, pool.stock);
    let pool = api.create_pool(pool).await?;
    Ok(HttpResponse::Created().json(pool))
}

route!(pools => Get "/pools" impl InventoryManagement);
pub async fn pools<B>(
    query: web::Query<PoolSearchParams>,
    api: web::Data<InventoryApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement,
{
    debug!("💻️ GET stock pools: {:?}", query);
    let pools = api.pools(query.into_inner().into()).await?;
    Ok(HttpResponse::Ok().json(pools))
}

route!(pool => Get "/pools/{id}" impl InventoryManagement);
pub async fn pool<B>(path: web::Path<i64>, api: web::Data<InventoryApi<B>>) -> Result<HttpResponse, ServerError>
where B: InventoryManagement {
    let id = path.into_inner();
    debug!("💻️ GET stock pool {id}");
    let pool = api.pool(id).await?;
    Ok(HttpResponse::Ok().json(pool))
}

route!(set_pool_active => Patch "/pools/{id}/active" impl InventoryManagement);
pub async fn set_pool_active<B>(
    path: web::Path<i64>,
    body: web::Json<ActiveParams>,
    api: web::Data<InventoryApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement,
{
    let id = path.into_inner();
    let active = body.into_inner().active;
    info!("💻️ PATCH stock pool {id} active: {active}");
    let pool = api.set_pool_active(id, active).await?;
    Ok(HttpResponse::Ok().json(pool))
}

route!(delete_pool => Delete "/pools/{id}" impl InventoryManagement);
/// Deletes a stock pool that has never sold anything and holds no reservations.
pub async fn delete_pool<B>(path: web::Path<i64>, api: web::Data<InventoryApi<B>>) -> Result<HttpResponse, ServerError>
where B: InventoryManagement {
    let id = path.into_inner();
    info!("💻️ DELETE stock pool {id}");
    api.delete_pool(id).await?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Stock pool {id} deleted"))))
}

route!(adjust_pool => Post "/pools/{id}/adjust" impl InventoryManagement);
/// Applies an administrative stock correction.
///
/// Corrections that would break the pool's invariants are not applied. They are reported with `success: false`
/// rather than as an error, so that back-office tools can show the reason.
pub async fn adjust_pool<B>(
    path: web::Path<i64>,
    body: web::Json<AdjustParams>,
    api: web::Data<InventoryApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement,
{
    let pool_id = path.into_inner();
    let AdjustParams { stock_delta, available_delta, operator, reason } = body.into_inner();
    info!("💻️ POST adjust stock pool {pool_id} by {stock_delta}/{available_delta} ({operator}). {reason}");
    let request = AdjustRequest { pool_id, stock_delta, available_delta, operator, reason };
    match api.adjust(request).await? {
        AdjustOutcome::Applied(pool) => Ok(HttpResponse::Ok().json(pool)),
        AdjustOutcome::Rejected(reason) => {
            debug!("💻️ Adjustment of stock pool {pool_id} was rejected. {reason}");
            Ok(HttpResponse::Ok().json(JsonResponse::failure(reason)))
        },
    }
}

route!(pool_logs => Get "/pools/{id}/logs" impl InventoryManagement);
pub async fn pool_logs<B>(path: web::Path<i64>, api: web::Data<InventoryApi<B>>) -> Result<HttpResponse, ServerError>
where B: InventoryManagement {
    let id = path.into_inner();
    debug!("💻️ GET inventory logs for stock pool {id}");
    let logs = api.inventory_logs(id).await?;
    Ok(HttpResponse::Ok().json(logs))
}

//----------------------------------------------   Virtual stock  ----------------------------------------------------
route!(create_virtual_pool => Post "/virtual_pools" impl InventoryManagement);
pub async fn create_virtual_pool<B>(
    body: web::Json<NewVirtualPoolParams>,
    api: web::Data<InventoryApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement,
{
    let NewVirtualPoolParams { name, description } = body.into_inner();
    info!("💻️ POST new virtual pool {name}");
    let pool = api.create_virtual_pool(&name, description).await?;
    Ok(HttpResponse::Created().json(pool))
}

route!(virtual_pools => Get "/virtual_pools" impl InventoryManagement);
pub async fn virtual_pools<B>(api: web::Data<InventoryApi<B>>) -> Result<HttpResponse, ServerError>
where B: InventoryManagement {
    debug!("💻️ GET virtual pools");
    let pools = api.virtual_pools().await?;
    Ok(HttpResponse::Ok().json(pools))
}

route!(import_virtual_items => Post "/virtual_pools/{id}/import" impl InventoryManagement);
/// Imports one virtual item per non-blank line of `text`.
pub async fn import_virtual_items<B>(
    path: web::Path<i64>,
    body: web::Json<ImportParams>,
    api: web::Data<InventoryApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement,
{
    let pool_id = path.into_inner();
    info!("💻️ POST import into virtual pool {pool_id}");
    let imported = api.import_from_text(pool_id, &body.text).await?;
    Ok(HttpResponse::Ok().json(ImportResult { pool_id, imported }))
}

route!(virtual_items => Get "/virtual_pools/{id}/items" impl InventoryManagement);
pub async fn virtual_items<B>(
    path: web::Path<i64>,
    query: web::Query<VirtualItemsParams>,
    api: web::Data<InventoryApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement,
{
    let pool_id = path.into_inner();
    debug!("💻️ GET items in virtual pool {pool_id}");
    let items = api.virtual_items(pool_id, query.status).await?;
    Ok(HttpResponse::Ok().json(items))
}

route!(virtual_pool_stats => Get "/virtual_pools/{id}/stats" impl InventoryManagement);
pub async fn virtual_pool_stats<B>(
    path: web::Path<i64>,
    api: web::Data<InventoryApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement,
{
    let pool_id = path.into_inner();
    debug!("💻️ GET stats for virtual pool {pool_id}");
    let stats = api.virtual_pool_stats(pool_id).await?;
    Ok(HttpResponse::Ok().json(stats))
}

route!(invalidate_virtual_item => Post "/virtual_items/{id}/invalidate" impl InventoryManagement);
pub async fn invalidate_virtual_item<B>(
    path: web::Path<i64>,
    api: web::Data<InventoryApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: InventoryManagement,
{
    let id = path.into_inner();
    info!("💻️ POST invalidate virtual item {id}");
    let item = api.invalidate_item(id).await?;
    Ok(HttpResponse::Ok().json(item))
}
