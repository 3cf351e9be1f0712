use std::collections::HashMap;

use cucumber::World;
use fulfillment_engine::{
    db_types::{CatalogItem, OrderNo},
    events::EventProducers,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    InventoryApi,
    OrderFlowApi,
    SettingsHandle,
    SqliteDatabase,
};
use log::*;

#[derive(Default, Debug, World)]
pub struct FulfillmentWorld {
    pub system: Option<FulfillmentSystem>,
    /// The most recent order placed by each customer.
    pub orders: HashMap<String, OrderNo>,
    pub products: HashMap<String, CatalogItem>,
    pub last_error: Option<String>,
}

#[derive(Debug)]
pub struct FulfillmentSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub inventory: InventoryApi<SqliteDatabase>,
    pub orders: OrderFlowApi<SqliteDatabase>,
}

impl FulfillmentWorld {
    pub async fn system(&mut self) -> &FulfillmentSystem {
        if self.system.is_none() {
            self.system = Some(FulfillmentSystem::new().await);
        }
        self.system.as_ref().expect("System not initialised")
    }

    pub fn order_for(&self, customer: &str) -> OrderNo {
        self.orders.get(customer).cloned().unwrap_or_else(|| panic!("{customer} has not placed an order"))
    }

    pub fn product(&self, sku: &str) -> &CatalogItem {
        self.products.get(sku).unwrap_or_else(|| panic!("Product {sku} does not exist"))
    }
}

impl FulfillmentSystem {
    pub async fn new() -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        debug!("🚀️ Created database: {url}");
        let inventory = InventoryApi::new(db.clone());
        let orders = OrderFlowApi::new(db.clone(), EventProducers::default(), SettingsHandle::default());
        Self { db_path: url, db, inventory, orders }
    }
}
