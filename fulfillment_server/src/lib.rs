//! # Fulfillment server
//! This crate hosts the HTTP server and background workers for the fulfillment engine. It is responsible for:
//! * Exposing the order lifecycle and inventory administration over a JSON API.
//! * Polling payment providers for orders that are awaiting payment (see [payment_worker]).
//! * Cancelling orders that were never paid, and releasing their stock (see [auto_cancel_worker]).
//! * Logging lifecycle events as the engine publishes them (see [event_hooks]).
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes. Everything apart from `/health` lives under `/api`.
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/api/orders`: Create (`POST`) and search (`GET`) orders.
//! * `/api/orders/{order_no}`: Fetch (`GET`) or delete (`DELETE`) an order. The `/customer` sub-route returns the
//!   customer's view, which withholds blind-box outcomes until the order is paid.
//! * `/api/orders/{order_no}/{action}`: `pay`, `ship`, `deliver`, `complete`, `request_resubmit`, `resubmit`,
//!   `cancel` and `refund` (`POST`), and `shipping` (`PATCH`).
//! * `/api/orders/{order_no}/serials` and `/api/orders/{order_no}/virtual_items`: What the order was fulfilled with.
//! * `/api/catalog`, `/api/bindings`, `/api/pools`, `/api/virtual_pools`, `/api/virtual_items`: Inventory
//!   administration.
//! * `/api/availability`: How many units of a product (or one configuration of it) can still be ordered.
//! * `/api/payment_methods`, `/api/promo_codes`: Payment setup.
//! * `/api/polling/queue`: The state of the payment polling queue.
pub mod auto_cancel_worker;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod event_hooks;
pub mod http_verifier;
pub mod payment_worker;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
