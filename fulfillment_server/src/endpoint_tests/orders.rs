use actix_web::{http::StatusCode, test::TestRequest};
use fulfillment_engine::{
    db_types::{Attributes, OrderStatusType},
    order_objects::{FullOrder, NewOrderLine, NewOrderRequest, ShippingInfo},
    payment_poller::QueueStatus,
    test_utils::{
        fixtures::{bound_pool, payment_method, physical_item},
        prepare_env::{drop_test_db, new_test_db},
    },
    traits::RefundResult,
    SqliteDatabase,
};
use serde_json::json;

use super::{
    helpers::{configure, parse, send_request, test_poller},
    mocks::MockVerifier,
};
use crate::data_objects::PaymentResponse;

fn red_m() -> Attributes {
    Attributes::new().with("color", "red").with("size", "M")
}

fn tshirt_order(customer_id: &str, quantity: i64) -> NewOrderRequest {
    NewOrderRequest::new(customer_id)
        .with_line(NewOrderLine::new("TSHIRT", quantity, red_m()))
        .with_receiver(ShippingInfo::new("Alice", "1 Main Street"))
}

async fn create_order(db: &SqliteDatabase, request: &NewOrderRequest) -> FullOrder {
    let req = TestRequest::post().uri("/orders").set_json(request);
    let (status, body) = send_request(configure(db.clone(), test_poller(db, MockVerifier::new())), req)
        .await
        .expect("Error creating order");
    assert_eq!(status, StatusCode::CREATED, "{body}");
    parse(&body)
}

#[actix_web::test]
async fn new_order_is_queued_for_payment_polling() {
    let _ = env_logger::try_init();
    let db = new_test_db().await;
    let item = physical_item(&db, "TSHIRT", &["color", "size"], &[]).await;
    bound_pool(&db, &item, 10, red_m()).await;
    let method = payment_method(&db, 30).await;
    let poller = test_poller(&db, MockVerifier::new());

    let request = tshirt_order("alice", 2).with_payment_method(method.id);
    let req = TestRequest::post().uri("/orders").set_json(&request);
    let (status, body) = send_request(configure(db.clone(), poller.clone()), req).await.expect("Error creating order");
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let order: FullOrder = parse(&body);
    assert_eq!(order.order.status, OrderStatusType::PendingPayment);
    assert_eq!(order.order.payment_method_id, Some(method.id));
    // Allocations are hidden from the customer until the order is paid
    assert!(order.allocations.is_empty());

    let req = TestRequest::get().uri("/polling/queue");
    let (status, body) = send_request(configure(db.clone(), poller), req).await.expect("Error fetching queue");
    assert_eq!(status, StatusCode::OK);
    let queue: QueueStatus = parse(&body);
    assert_eq!(queue.length, 1);
    assert!(queue.next_check_at.is_some());
    drop_test_db(db).await;
}

#[actix_web::test]
async fn sold_out_order_is_a_conflict() {
    let _ = env_logger::try_init();
    let db = new_test_db().await;
    let item = physical_item(&db, "TSHIRT", &["color", "size"], &[]).await;
    bound_pool(&db, &item, 1, red_m()).await;

    let req = TestRequest::post().uri("/orders").set_json(tshirt_order("bob", 2));
    let (status, body) = send_request(configure(db.clone(), test_poller(&db, MockVerifier::new())), req)
        .await
        .expect("Error sending request");
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert!(body.starts_with(r#"{"error":"#), "{body}");
    drop_test_db(db).await;
}

#[actix_web::test]
async fn missing_attribute_is_a_bad_request() {
    let _ = env_logger::try_init();
    let db = new_test_db().await;
    let item = physical_item(&db, "TSHIRT", &["color", "size"], &[]).await;
    bound_pool(&db, &item, 10, red_m()).await;

    let request = NewOrderRequest::new("carol").with_line(NewOrderLine::new(
        "TSHIRT",
        1,
        Attributes::new().with("color", "red"),
    ));
    let req = TestRequest::post().uri("/orders").set_json(request);
    let (status, body) = send_request(configure(db.clone(), test_poller(&db, MockVerifier::new())), req)
        .await
        .expect("Error sending request");
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert!(body.contains("size"), "{body}");
    drop_test_db(db).await;
}

#[actix_web::test]
async fn unknown_order() {
    let _ = env_logger::try_init();
    let db = new_test_db().await;
    let req = TestRequest::get().uri("/orders/NOPE");
    let (status, body) = send_request(configure(db.clone(), test_poller(&db, MockVerifier::new())), req)
        .await
        .expect("Error sending request");
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"The requested order #NOPE does not exist"}"#);
    drop_test_db(db).await;
}

#[actix_web::test]
async fn pay_then_ship() {
    let _ = env_logger::try_init();
    let db = new_test_db().await;
    let item = physical_item(&db, "TSHIRT", &["color", "size"], &[]).await;
    bound_pool(&db, &item, 10, red_m()).await;
    let order = create_order(&db, &tshirt_order("dave", 1)).await;
    let order_no = order.order.order_no.as_str().to_string();

    let req = TestRequest::post().uri(&format!("/orders/{order_no}/pay"));
    let (status, body) = send_request(configure(db.clone(), test_poller(&db, MockVerifier::new())), req)
        .await
        .expect("Error paying order");
    assert_eq!(status, StatusCode::OK, "{body}");
    let payment: PaymentResponse = parse(&body);
    assert!(payment.applied);
    assert!(!payment.auto_delivered);
    assert_eq!(payment.order.status, OrderStatusType::Pending);
    assert!(payment.order.paid_at.is_some());

    let req = TestRequest::post()
        .uri(&format!("/orders/{order_no}/ship"))
        .set_json(json!({"tracking_no": "TRACK-001", "operator": "admin"}));
    let (status, body) = send_request(configure(db.clone(), test_poller(&db, MockVerifier::new())), req)
        .await
        .expect("Error shipping order");
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body.contains(r#""status":"shipped""#), "{body}");
    assert!(body.contains(r#""tracking_no":"TRACK-001""#), "{body}");

    // A second payment notification changes nothing
    let req = TestRequest::post().uri(&format!("/orders/{order_no}/pay"));
    let (status, body) = send_request(configure(db.clone(), test_poller(&db, MockVerifier::new())), req)
        .await
        .expect("Error paying order");
    assert_eq!(status, StatusCode::OK, "{body}");
    let payment: PaymentResponse = parse(&body);
    assert!(!payment.applied);
    assert_eq!(payment.order.status, OrderStatusType::Shipped);

    let req =
        TestRequest::post().uri(&format!("/orders/{order_no}/cancel")).set_json(json!({"reason": "Changed mind"}));
    let (status, body) = send_request(configure(db.clone(), test_poller(&db, MockVerifier::new())), req)
        .await
        .expect("Error cancelling order");
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    drop_test_db(db).await;
}

#[actix_web::test]
async fn cancelling_stops_payment_polling() {
    let _ = env_logger::try_init();
    let db = new_test_db().await;
    let item = physical_item(&db, "TSHIRT", &["color", "size"], &[]).await;
    bound_pool(&db, &item, 10, red_m()).await;
    let method = payment_method(&db, 30).await;
    let poller = test_poller(&db, MockVerifier::new());

    let request = tshirt_order("erin", 1).with_payment_method(method.id);
    let req = TestRequest::post().uri("/orders").set_json(&request);
    let (_, body) = send_request(configure(db.clone(), poller.clone()), req).await.expect("Error creating order");
    let order: FullOrder = parse(&body);
    assert_eq!(poller.queue_status().await.length, 1);

    let order_no = order.order.order_no.as_str().to_string();
    let req = TestRequest::post().uri(&format!("/orders/{order_no}/cancel"));
    let (status, body) = send_request(configure(db.clone(), poller.clone()), req).await.expect("Error cancelling");
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body.contains(r#""status":"cancelled""#), "{body}");
    assert_eq!(poller.queue_status().await.length, 0);
    drop_test_db(db).await;
}

async fn paid_order_with_method(db: &SqliteDatabase, customer_id: &str) -> String {
    let item = physical_item(db, "TSHIRT", &["color", "size"], &[]).await;
    bound_pool(db, &item, 10, red_m()).await;
    let method = payment_method(db, 30).await;
    let order = create_order(db, &tshirt_order(customer_id, 1).with_payment_method(method.id)).await;
    let order_no = order.order.order_no.as_str().to_string();
    let req = TestRequest::post()
        .uri(&format!("/orders/{order_no}/pay"))
        .set_json(json!({"payment_method_id": method.id, "transaction_id": "tx-1"}));
    let (status, body) = send_request(configure(db.clone(), test_poller(db, MockVerifier::new())), req)
        .await
        .expect("Error paying order");
    assert_eq!(status, StatusCode::OK, "{body}");
    order_no
}

#[actix_web::test]
async fn refund_through_the_payment_method() {
    let _ = env_logger::try_init();
    let db = new_test_db().await;
    let order_no = paid_order_with_method(&db, "frank").await;

    let mut verifier = MockVerifier::new();
    verifier.expect_refund().times(1).returning(|_, _| Ok(RefundResult { success: true, message: None, data: None }));
    let req = TestRequest::post().uri(&format!("/orders/{order_no}/refund")).set_json(json!({"reason": "Damaged"}));
    let (status, body) =
        send_request(configure(db.clone(), test_poller(&db, verifier)), req).await.expect("Error refunding order");
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body.contains(r#""status":"refunded""#), "{body}");
    drop_test_db(db).await;
}

#[actix_web::test]
async fn declined_refund_is_a_bad_gateway() {
    let _ = env_logger::try_init();
    let db = new_test_db().await;
    let order_no = paid_order_with_method(&db, "grace").await;

    let mut verifier = MockVerifier::new();
    verifier.expect_refund().times(1).returning(|_, _| {
        Ok(RefundResult { success: false, message: Some("Insufficient balance".to_string()), data: None })
    });
    let req = TestRequest::post().uri(&format!("/orders/{order_no}/refund"));
    let (status, body) =
        send_request(configure(db.clone(), test_poller(&db, verifier)), req).await.expect("Error refunding order");
    assert_eq!(status, StatusCode::BAD_GATEWAY, "{body}");
    assert!(body.contains("Insufficient balance"), "{body}");

    let req = TestRequest::get().uri(&format!("/orders/{order_no}"));
    let (status, body) = send_request(configure(db.clone(), test_poller(&db, MockVerifier::new())), req)
        .await
        .expect("Error fetching order");
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""status":"pending""#), "{body}");
    drop_test_db(db).await;
}
