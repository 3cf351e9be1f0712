//! Fulfillment Engine
//!
//! The fulfillment engine decides where the stock for an order comes from, holds it while the customer pays, and then
//! moves the order through shipping to completion, or releases everything if the order is cancelled.
//!
//! The library is divided into these main sections:
//! 1. Storage ([`mod@sqlite`]). The bundled backend is SQLite. You should never need to access the database directly.
//!    Use the public API instead. The data types stored in the database are defined in [`db_types`] and are public.
//! 2. The backend contracts ([`traits`]). A backend implements these traits to drive the engine.
//! 3. The public API ([`mod@ffe_api`]). [`InventoryApi`] manages catalog bindings, stock pools and virtual stock.
//!    [`OrderFlowApi`] allocates and reserves stock for new orders and drives them through their lifecycle.
//! 4. The [`payment_poller`], which checks unpaid orders against an external payment provider until they are paid or
//!    given up on.
//!
//! The engine publishes an event when an order is paid, shipped or cancelled. See [`events`] for how to hook into
//! these.
pub mod db_types;
pub mod events;
pub mod ffe_api;
pub mod helpers;
pub mod payment_poller;
pub mod traits;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(all(feature = "test_utils", feature = "sqlite"))]
pub mod test_utils;

pub use ffe_api::{
    allocation,
    inventory_api::InventoryApi,
    order_flow_api::{OrderFlowApi, AUTO_CANCEL_REMARK},
    order_objects,
    settings::{EngineSettings, SettingsHandle},
};
pub use payment_poller::PaymentPoller;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
