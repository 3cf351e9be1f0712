use fulfillment_engine::{PaymentPoller, SqliteDatabase};
use log::*;
use tokio::task::JoinHandle;

use crate::http_verifier::HttpPaymentVerifier;

/// Rebuilds the payment polling queue from the database and then runs the poller until it is stopped.
///
/// Do not await the returned JoinHandle unless [`PaymentPoller::stop`] has been called on a clone of the poller.
pub fn start_payment_worker(poller: PaymentPoller<SqliteDatabase, HttpPaymentVerifier>) -> JoinHandle<()> {
    tokio::spawn(async move {
        match poller.recover_tasks().await {
            Ok(n) => info!("💳️ Payment poller started with {n} orders in the queue"),
            Err(e) => error!(
                "💳️ Could not restore the payment polling queue. Orders awaiting payment will not be checked until \
                 they are queued again. {e}"
            ),
        }
        poller.run().await;
        info!("💳️ Payment poller stopped");
    })
}
