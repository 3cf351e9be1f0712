use actix_web::{http::StatusCode, test::TestRequest};
use fulfillment_engine::{
    db_types::{Attributes, StockPool, VirtualPool, VirtualPoolStats},
    order_objects::{NewOrderLine, NewOrderRequest},
    test_utils::{
        fixtures::{bound_pool, physical_item},
        prepare_env::{drop_test_db, new_test_db},
    },
    SqliteDatabase,
};
use serde_json::json;

use super::{
    helpers::{configure, parse, send_request, test_poller},
    mocks::MockVerifier,
};
use crate::data_objects::{AvailabilityResult, ImportResult, JsonResponse};

async fn send(db: &SqliteDatabase, req: TestRequest) -> (StatusCode, String) {
    send_request(configure(db.clone(), test_poller(db, MockVerifier::new())), req).await.expect("Error sending request")
}

#[actix_web::test]
async fn adjust_stock_pool() {
    let _ = env_logger::try_init();
    let db = new_test_db().await;
    let item = physical_item(&db, "MUG", &[], &[]).await;
    let pool = bound_pool(&db, &item, 5, Attributes::new()).await;

    let req = TestRequest::post()
        .uri(&format!("/pools/{}/adjust", pool.id))
        .set_json(json!({"stock_delta": 3, "available_delta": 3, "operator": "admin", "reason": "Restock"}));
    let (status, body) = send(&db, req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let pool_after: StockPool = parse(&body);
    assert_eq!(pool_after.stock, 8);
    assert_eq!(pool_after.available_quantity, 8);

    let req = TestRequest::post()
        .uri(&format!("/pools/{}/adjust", pool.id))
        .set_json(json!({"stock_delta": -10, "operator": "admin", "reason": "Stocktake"}));
    let (status, body) = send(&db, req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let response: JsonResponse = parse(&body);
    assert!(!response.success);
    assert_eq!(response.message, "Adjusted inventory cannot be negative");

    let req = TestRequest::post()
        .uri("/pools/9999/adjust")
        .set_json(json!({"stock_delta": 1, "operator": "admin"}));
    let (status, _) = send(&db, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    drop_test_db(db).await;
}

#[actix_web::test]
async fn availability_totals() {
    let _ = env_logger::try_init();
    let db = new_test_db().await;
    let item = physical_item(&db, "TSHIRT", &["color"], &[]).await;
    bound_pool(&db, &item, 4, Attributes::new().with("color", "red")).await;
    bound_pool(&db, &item, 6, Attributes::new().with("color", "blue")).await;

    let req = TestRequest::post().uri("/availability").set_json(json!({"sku": "TSHIRT"}));
    let (status, body) = send(&db, req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let result: AvailabilityResult = parse(&body);
    assert_eq!(result.available, 10);

    let req = TestRequest::post()
        .uri("/availability")
        .set_json(json!({"sku": "TSHIRT", "attributes": {"color": "blue"}}));
    let (status, body) = send(&db, req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let result: AvailabilityResult = parse(&body);
    assert_eq!(result.available, 6);

    let req = TestRequest::post().uri("/availability").set_json(json!({"sku": "NOPE"}));
    let (status, _) = send(&db, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    drop_test_db(db).await;
}

#[actix_web::test]
async fn pool_with_reservations_cannot_be_deleted() {
    let _ = env_logger::try_init();
    let db = new_test_db().await;
    let item = physical_item(&db, "MUG", &[], &[]).await;
    let pool = bound_pool(&db, &item, 5, Attributes::new()).await;
    let unused = bound_pool(&db, &physical_item(&db, "CAP", &[], &[]).await, 5, Attributes::new()).await;

    let request = NewOrderRequest::new("alice").with_line(NewOrderLine::new("MUG", 1, Attributes::new()));
    let (status, body) = send(&db, TestRequest::post().uri("/orders").set_json(request)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, body) = send(&db, TestRequest::delete().uri(&format!("/pools/{}", pool.id))).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    let (status, body) = send(&db, TestRequest::delete().uri(&format!("/pools/{}", unused.id))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let response: JsonResponse = parse(&body);
    assert!(response.success);
    drop_test_db(db).await;
}

#[actix_web::test]
async fn import_virtual_items() {
    let _ = env_logger::try_init();
    let db = new_test_db().await;

    let req = TestRequest::post().uri("/virtual_pools").set_json(json!({"name": "Gift codes"}));
    let (status, body) = send(&db, req).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let pool: VirtualPool = parse(&body);
    assert_eq!(pool.name, "Gift codes");

    let req = TestRequest::post()
        .uri(&format!("/virtual_pools/{}/import", pool.id))
        .set_json(json!({"text": "A\nB,second code\n\nC"}));
    let (status, body) = send(&db, req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let result: ImportResult = parse(&body);
    assert_eq!(result.imported, 3);

    let req = TestRequest::post().uri(&format!("/virtual_pools/{}/import", pool.id)).set_json(json!({"text": "\n \n"}));
    let (status, _) = send(&db, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&db, TestRequest::get().uri(&format!("/virtual_pools/{}/stats", pool.id))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let stats: VirtualPoolStats = parse(&body);
    assert_eq!(stats, VirtualPoolStats { total: 3, available: 3, reserved: 0, sold: 0, invalid: 0 });
    drop_test_db(db).await;
}
