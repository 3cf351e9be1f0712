use actix_web::{
    body::MessageBody,
    http::StatusCode,
    test,
    test::TestRequest,
    web,
    web::ServiceConfig,
    App,
};
use anyhow::anyhow;
use fulfillment_engine::{
    events::EventProducers,
    InventoryApi,
    OrderFlowApi,
    PaymentPoller,
    SettingsHandle,
    SqliteDatabase,
};
use log::debug;
use serde::de::DeserializeOwned;

use super::mocks::MockVerifier;
use crate::routes::{
    AdjustPoolRoute,
    AvailabilityRoute,
    CancelOrderRoute,
    CreateOrderRoute,
    CreateVirtualPoolRoute,
    DeletePoolRoute,
    ImportVirtualItemsRoute,
    OrderRoute,
    PayOrderRoute,
    PollingQueueRoute,
    RefundOrderRoute,
    ShipOrderRoute,
    VirtualPoolStatsRoute,
};

pub type TestPoller = PaymentPoller<SqliteDatabase, MockVerifier>;

pub fn test_poller(db: &SqliteDatabase, verifier: MockVerifier) -> TestPoller {
    PaymentPoller::new(db.clone(), verifier, SettingsHandle::default(), EventProducers::default())
}

/// Registers the routes under test against `db`, with `poller` standing in for the payment worker.
pub fn configure(db: SqliteDatabase, poller: TestPoller) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let orders_api = OrderFlowApi::new(db.clone(), EventProducers::default(), SettingsHandle::default());
        let inventory_api = InventoryApi::new(db);
        cfg.service(CreateOrderRoute::<SqliteDatabase, MockVerifier>::new())
            .service(OrderRoute::<SqliteDatabase>::new())
            .service(PayOrderRoute::<SqliteDatabase, MockVerifier>::new())
            .service(ShipOrderRoute::<SqliteDatabase>::new())
            .service(CancelOrderRoute::<SqliteDatabase, MockVerifier>::new())
            .service(RefundOrderRoute::<SqliteDatabase, MockVerifier>::new())
            .service(PollingQueueRoute::<SqliteDatabase, MockVerifier>::new())
            .service(AvailabilityRoute::<SqliteDatabase>::new())
            .service(AdjustPoolRoute::<SqliteDatabase>::new())
            .service(DeletePoolRoute::<SqliteDatabase>::new())
            .service(CreateVirtualPoolRoute::<SqliteDatabase>::new())
            .service(ImportVirtualItemsRoute::<SqliteDatabase>::new())
            .service(VirtualPoolStatsRoute::<SqliteDatabase>::new())
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(inventory_api))
            .app_data(web::Data::new(poller));
    }
}

pub async fn send_request<F>(configure: F, req: TestRequest) -> anyhow::Result<(StatusCode, String)>
where F: FnOnce(&mut ServiceConfig) {
    let app = App::new().configure(configure);
    let service = test::init_service(app).await;
    debug!("Making request");
    let (_, res) =
        test::try_call_service(&service, req.to_request()).await.map_err(|e| anyhow!(e.to_string()))?.into_parts();
    let status = res.status();
    let body = res.into_body().try_into_bytes().map_err(|_| anyhow!("Could not read the response body"))?;
    Ok((status, String::from_utf8_lossy(&body).into_owned()))
}

pub fn parse<T: DeserializeOwned>(body: &str) -> T {
    serde_json::from_str(body).unwrap_or_else(|e| panic!("Unexpected response body {body}. {e}"))
}
