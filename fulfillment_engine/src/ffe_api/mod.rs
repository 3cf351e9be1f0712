//! # Fulfillment engine public API
//!
//! The `ffe_api` module exposes the programmatic API for the fulfillment engine.
//!
//! * [`inventory_api`] manages the catalog read model, bindings, stock pools, the reservation ledger and virtual
//!   stock, and answers availability queries.
//! * [`order_flow_api`] drives orders through their lifecycle, from allocation and reservation at creation time,
//!   through payment and shipping, to completion, cancellation or refund.
//! * [`allocation`] holds the pure allocation policies (exact, random and hybrid).
//! * [`settings`] holds the runtime-tunable engine settings.
//!
//! # API usage
//!
//! An API instance is created by supplying a database backend that implements the backend traits the API needs.
//!
//! ```rust,ignore
//! use fulfillment_engine::{InventoryApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let api = InventoryApi::new(db);
//! let available = api.total_available_stock("TSHIRT-01").await?;
//! ```
pub mod allocation;
pub mod inventory_api;
pub mod order_flow_api;
pub mod order_objects;
pub mod settings;
