//! Lifecycle notifications.
//!
//! The engine publishes an event whenever an order is paid, shipped or cancelled. Subscribers register async
//! callbacks through [`EventHooks`]; delivery is fire-and-forget, so a slow or failing subscriber never holds up the
//! order flow.
mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};
