use fulfillment_engine::{
    db_types::{NewCatalogItem, NewPaymentMethod, NewStockPool, ProductType},
    test_utils::prepare_env::{drop_test_db, new_test_db},
    traits::{InventoryManagement, OrderManagement},
};

const ROUNDS: usize = 20;

#[tokio::test]
async fn new_stock_pools_are_readable_straight_away() {
    let db = new_test_db().await;
    for i in 0..ROUNDS {
        let pool = db.create_stock_pool(NewStockPool::new(&format!("pool-{i}"), 5)).await.unwrap();
        let read = db.fetch_stock_pool(pool.id).await.unwrap();
        let read = read.unwrap_or_else(|| panic!("Stock pool {} from round {i} is not visible", pool.id));
        assert_eq!(read.name, format!("pool-{i}"));
        assert_eq!(read.stock, 5);
    }
    drop_test_db(db).await;
}

#[tokio::test]
async fn deactivation_is_seen_by_the_next_read() {
    let db = new_test_db().await;
    for i in 0..ROUNDS {
        let pool = db.create_stock_pool(NewStockPool::new(&format!("pool-{i}"), 1)).await.unwrap();
        db.set_stock_pool_active(pool.id, false).await.unwrap();
        assert!(!db.fetch_stock_pool(pool.id).await.unwrap().unwrap().is_active, "Round {i}");
        db.set_stock_pool_active(pool.id, true).await.unwrap();
        assert!(db.fetch_stock_pool(pool.id).await.unwrap().unwrap().is_active, "Round {i}");
    }
    drop_test_db(db).await;
}

#[tokio::test]
async fn other_new_records_are_readable_straight_away() {
    let db = new_test_db().await;
    for i in 0..ROUNDS {
        let sku = format!("SKU-{i}");
        let item = db.create_catalog_item(NewCatalogItem::new(&sku, "Thing", ProductType::Physical)).await.unwrap();
        assert!(db.fetch_catalog_item_by_sku(&sku).await.unwrap().is_some(), "Catalog item {}", item.id);
        let item = db.set_catalog_item_active(item.id, false).await.unwrap();
        assert!(!db.fetch_catalog_item(item.id).await.unwrap().unwrap().is_active);

        let vpool = db.create_virtual_pool(&format!("codes-{i}"), None).await.unwrap();
        assert!(db.fetch_virtual_pool(vpool.id).await.unwrap().is_some(), "Virtual pool {}", vpool.id);

        let method = db.create_payment_method(NewPaymentMethod::new(&format!("pay-{i}"))).await.unwrap();
        assert!(db.fetch_payment_method(method.id).await.unwrap().is_some(), "Payment method {}", method.id);

        let code = format!("PROMO{i}");
        db.create_promo_code(&code, 3).await.unwrap();
        let promo = db.fetch_promo_code(&code).await.unwrap().expect("Promo code is not visible");
        assert_eq!(promo.total, 3);
    }
    drop_test_db(db).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_pool_creation_all_lands() {
    let db = new_test_db().await;
    let handles = (0..ROUNDS)
        .map(|i| {
            let db = db.clone();
            tokio::spawn(async move { db.create_stock_pool(NewStockPool::new(&format!("burst-{i}"), 1)).await })
        })
        .collect::<Vec<_>>();
    let mut ids = Vec::with_capacity(ROUNDS);
    for handle in handles {
        ids.push(handle.await.unwrap().expect("Error creating stock pool").id);
    }
    for id in ids {
        assert!(db.fetch_stock_pool(id).await.unwrap().is_some(), "Stock pool {id} is not visible");
    }
    drop_test_db(db).await;
}
