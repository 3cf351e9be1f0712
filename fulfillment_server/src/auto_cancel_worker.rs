use fulfillment_engine::{db_types::Order, OrderFlowApi, SqliteDatabase};
use log::*;
use tokio::task::JoinHandle;

/// Starts the auto-cancel worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// The TTL and check interval are read from the API's settings on every cycle, so changes made at runtime apply from
/// the next sweep. The first sweep runs straight away.
pub fn start_auto_cancel_worker(api: OrderFlowApi<SqliteDatabase>) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("🕰️ Unpaid order auto-cancel worker started");
        loop {
            let settings = api.settings().snapshot().await;
            if settings.auto_cancel_enabled() {
                trace!("🕰️ Running unpaid order auto-cancel job");
                match api.cancel_expired_orders().await {
                    Ok(result) if result.cancelled_count() + result.failed_count() > 0 => {
                        info!("🕰️ {} unpaid orders cancelled", result.cancelled_count());
                        debug!("🕰️ Cancelled orders: {}", order_list(&result.cancelled));
                        for (id, reason) in &result.failed {
                            warn!("🕰️ Could not cancel order [{id}]. It will be retried. {reason}");
                        }
                    },
                    Ok(_) => trace!("🕰️ No unpaid orders have expired"),
                    Err(e) => {
                        error!("🕰️ Error running unpaid order auto-cancel job: {e}");
                    },
                }
            }
            let interval = settings.auto_cancel_check_interval.to_std().unwrap_or(std::time::Duration::from_secs(60));
            tokio::time::sleep(interval).await;
        }
    })
}

fn order_list(orders: &[Order]) -> String {
    orders
        .iter()
        .map(|o| format!("[{}] order_no: {} cust_id: {}", o.id, o.order_no, o.customer_id))
        .collect::<Vec<String>>()
        .join(", ")
}
