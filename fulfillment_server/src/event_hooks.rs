use std::{future::Future, pin::Pin};

use fulfillment_engine::events::{EventHandlers, EventHooks, OrderCancelledEvent, OrderPaidEvent, OrderShippedEvent};
use log::*;

const EVENT_BUFFER_SIZE: usize = 25;

/// Creates the server's lifecycle event handlers.
///
/// The engine publishes an event whenever an order is paid, shipped or cancelled. The server records each one in the
/// log. This is also the place to hang outbound notifications (e-mail, webhooks) off the order lifecycle.
///
/// 1. OrderPaidEvent - Logs the payment, and whether virtual stock was delivered along with it.
/// 2. OrderShippedEvent - Logs the tracking number for physical orders.
/// 3. OrderCancelledEvent - Logs the reason, which for swept orders is the auto-cancel remark.
pub fn create_event_handlers() -> EventHandlers {
    let mut hooks = EventHooks::default();
    hooks.on_order_paid(|ev: OrderPaidEvent| {
        let OrderPaidEvent { order, auto_delivered } = ev;
        logged(async move {
            let customer_id = &order.customer_id;
            info!("📬️ Order {} for {customer_id} has been paid. Status is now {}", order.order_no, order.status);
            if auto_delivered {
                info!("📬️ Virtual stock for order {} was delivered automatically", order.order_no);
            }
        })
    });
    hooks.on_order_shipped(|ev: OrderShippedEvent| {
        let order = ev.order;
        logged(async move {
            match &order.tracking_no {
                Some(tracking_no) => info!("📬️ Order {} has shipped. Tracking number: {tracking_no}", order.order_no),
                None => info!("📬️ Order {} has been delivered", order.order_no),
            }
        })
    });
    hooks.on_order_cancelled(|ev: OrderCancelledEvent| {
        let OrderCancelledEvent { order, reason } = ev;
        logged(async move {
            info!("📬️ Order {} for {} was cancelled. {reason}", order.order_no, order.customer_id);
        })
    });
    EventHandlers::new(EVENT_BUFFER_SIZE, hooks)
}

fn logged<F>(f: F) -> Pin<Box<dyn Future<Output = ()> + Send>>
where F: Future<Output = ()> + Send + 'static {
    Box::pin(f)
}
