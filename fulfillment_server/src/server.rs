use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use fulfillment_engine::{
    events::EventProducers,
    InventoryApi,
    OrderFlowApi,
    PaymentPoller,
    SettingsHandle,
    SqliteDatabase,
};
use log::*;

use crate::{
    auto_cancel_worker::start_auto_cancel_worker,
    config::ServerConfig,
    errors::ServerError,
    event_hooks::create_event_handlers,
    http_verifier::HttpPaymentVerifier,
    payment_worker::start_payment_worker,
    routes::{
        health,
        AdjustPoolRoute,
        AvailabilityRoute,
        CancelOrderRoute,
        CatalogBindingsRoute,
        CatalogItemRoute,
        CompleteOrderRoute,
        CreateBindingRoute,
        CreateCatalogItemRoute,
        CreateOrderRoute,
        CreatePaymentMethodRoute,
        CreatePoolRoute,
        CreatePromoCodeRoute,
        CreateVirtualPoolRoute,
        CustomerOrderRoute,
        DeleteBindingRoute,
        DeleteOrderRoute,
        DeletePoolRoute,
        DeliverOrderRoute,
        ImportVirtualItemsRoute,
        InvalidateVirtualItemRoute,
        IssueSerialsRoute,
        OrderRoute,
        OrderSerialsRoute,
        OrderVirtualItemsRoute,
        PayOrderRoute,
        PollingQueueRoute,
        PoolLogsRoute,
        PoolRoute,
        PoolsRoute,
        RefundOrderRoute,
        RequestResubmitRoute,
        ResubmitOrderRoute,
        SearchOrdersRoute,
        SetCatalogItemActiveRoute,
        SetPoolActiveRoute,
        ShipOrderRoute,
        UpdateBindingRoute,
        UpdateShippingInfoRoute,
        VirtualItemsRoute,
        VirtualPoolStatsRoute,
        VirtualPoolsRoute,
    },
};

type Poller = PaymentPoller<SqliteDatabase, HttpPaymentVerifier>;

/// The long-lived pieces shared by every HTTP worker and the background tasks.
#[derive(Clone)]
pub struct ServerState {
    pub db: SqliteDatabase,
    pub settings: SettingsHandle,
    pub producers: EventProducers,
    pub poller: Poller,
}

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::connect_and_migrate(&config.database_url, config.max_db_connections)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let settings = SettingsHandle::new(config.engine.clone());
    let handlers = create_event_handlers();
    let producers = handlers.producers();
    handlers.start_handlers();
    let timeout = config.engine.check_timeout.to_std().map_err(|e| ServerError::ConfigurationError(e.to_string()))?;
    let verifier = HttpPaymentVerifier::new(timeout).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let poller = PaymentPoller::new(db.clone(), verifier, settings.clone(), producers.clone());
    let state = ServerState { db: db.clone(), settings: settings.clone(), producers: producers.clone(), poller };

    let _payment_worker = start_payment_worker(state.poller.clone());
    let _auto_cancel_worker = start_auto_cancel_worker(OrderFlowApi::new(db, producers, settings));
    let srv = create_server_instance(config, state.clone())?;
    let result = srv.await.map_err(|e| ServerError::Unspecified(e.to_string()));
    info!("🚀️ Server has shut down. Stopping the payment poller");
    state.poller.stop();
    result
}

pub fn create_server_instance(config: ServerConfig, state: ServerState) -> Result<Server, ServerError> {
    let srv = HttpServer::new(move || {
        let orders_api = OrderFlowApi::new(state.db.clone(), state.producers.clone(), state.settings.clone());
        let inventory_api = InventoryApi::new(state.db.clone());
        let api_scope = web::scope("/api")
            .service(CreateOrderRoute::<SqliteDatabase, HttpPaymentVerifier>::new())
            .service(SearchOrdersRoute::<SqliteDatabase>::new())
            .service(OrderRoute::<SqliteDatabase>::new())
            .service(CustomerOrderRoute::<SqliteDatabase>::new())
            .service(PayOrderRoute::<SqliteDatabase, HttpPaymentVerifier>::new())
            .service(UpdateShippingInfoRoute::<SqliteDatabase>::new())
            .service(ShipOrderRoute::<SqliteDatabase>::new())
            .service(DeliverOrderRoute::<SqliteDatabase>::new())
            .service(CompleteOrderRoute::<SqliteDatabase>::new())
            .service(RequestResubmitRoute::<SqliteDatabase>::new())
            .service(ResubmitOrderRoute::<SqliteDatabase>::new())
            .service(CancelOrderRoute::<SqliteDatabase, HttpPaymentVerifier>::new())
            .service(RefundOrderRoute::<SqliteDatabase, HttpPaymentVerifier>::new())
            .service(DeleteOrderRoute::<SqliteDatabase, HttpPaymentVerifier>::new())
            .service(OrderSerialsRoute::<SqliteDatabase>::new())
            .service(IssueSerialsRoute::<SqliteDatabase>::new())
            .service(OrderVirtualItemsRoute::<SqliteDatabase>::new())
            .service(CreatePaymentMethodRoute::<SqliteDatabase>::new())
            .service(CreatePromoCodeRoute::<SqliteDatabase>::new())
            .service(PollingQueueRoute::<SqliteDatabase, HttpPaymentVerifier>::new())
            .service(CreateCatalogItemRoute::<SqliteDatabase>::new())
            .service(CatalogItemRoute::<SqliteDatabase>::new())
            .service(SetCatalogItemActiveRoute::<SqliteDatabase>::new())
            .service(CatalogBindingsRoute::<SqliteDatabase>::new())
            .service(CreateBindingRoute::<SqliteDatabase>::new())
            .service(UpdateBindingRoute::<SqliteDatabase>::new())
            .service(DeleteBindingRoute::<SqliteDatabase>::new())
            .service(AvailabilityRoute::<SqliteDatabase>::new())
            .service(CreatePoolRoute::<SqliteDatabase>::new())
            .service(PoolsRoute::<SqliteDatabase>::new())
            .service(PoolRoute::<SqliteDatabase>::new())
            .service(SetPoolActiveRoute::<SqliteDatabase>::new())
            .service(DeletePoolRoute::<SqliteDatabase>::new())
            .service(AdjustPoolRoute::<SqliteDatabase>::new())
            .service(PoolLogsRoute::<SqliteDatabase>::new())
            .service(CreateVirtualPoolRoute::<SqliteDatabase>::new())
            .service(VirtualPoolsRoute::<SqliteDatabase>::new())
            .service(ImportVirtualItemsRoute::<SqliteDatabase>::new())
            .service(VirtualItemsRoute::<SqliteDatabase>::new())
            .service(VirtualPoolStatsRoute::<SqliteDatabase>::new())
            .service(InvalidateVirtualItemRoute::<SqliteDatabase>::new());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("ffe::access_log"))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(inventory_api))
            .app_data(web::Data::new(state.poller.clone()))
            .service(health)
            .service(api_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
