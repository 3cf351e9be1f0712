use std::{fmt::Debug, sync::Arc};

use chrono::{Duration, Utc};
use log::*;
use tokio::sync::{mpsc, watch, Mutex};

use crate::{
    db_types::{Order, OrderStatusType, PollingTask},
    events::{EventProducers, OrderPaidEvent},
    ffe_api::settings::{EngineSettings, SettingsHandle},
    payment_poller::task_queue::{QueueStatus, TaskQueue},
    traits::{
        OrderManagement,
        PaidTransition,
        PaymentCheckResult,
        PaymentRecord,
        PaymentVerifier,
        PollingError,
        PollingTaskStore,
        VerifierError,
    },
};

/// What happens to a task after it has been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TaskOutcome {
    /// Check again later.
    Continue,
    /// Stop polling for this order.
    Drop(String),
    /// The order was marked as paid.
    Paid,
    /// The poller was stopped mid-check. The task is left as it was.
    Interrupted,
}

/// Periodically asks a [`PaymentVerifier`] whether unpaid orders have been paid.
///
/// The poller is cheap to clone; all clones share one queue, so an API handler can call [`Self::add_to_queue`] while
/// another task drives [`Self::run`]. Every change to the queue is mirrored to the [`PollingTaskStore`], and
/// [`Self::recover_tasks`] rebuilds the queue from there after a restart.
pub struct PaymentPoller<B, V> {
    db: B,
    verifier: Arc<V>,
    settings: SettingsHandle,
    producers: EventProducers,
    queue: Arc<Mutex<TaskQueue>>,
    wake_tx: mpsc::Sender<()>,
    wake_rx: Arc<Mutex<mpsc::Receiver<()>>>,
    stop_tx: Arc<watch::Sender<bool>>,
}

impl<B: Clone, V> Clone for PaymentPoller<B, V> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            verifier: Arc::clone(&self.verifier),
            settings: self.settings.clone(),
            producers: self.producers.clone(),
            queue: Arc::clone(&self.queue),
            wake_tx: self.wake_tx.clone(),
            wake_rx: Arc::clone(&self.wake_rx),
            stop_tx: Arc::clone(&self.stop_tx),
        }
    }
}

impl<B, V> Debug for PaymentPoller<B, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentPoller")
    }
}

impl<B, V> PaymentPoller<B, V>
where
    B: OrderManagement + PollingTaskStore,
    V: PaymentVerifier,
{
    pub fn new(db: B, verifier: V, settings: SettingsHandle, producers: EventProducers) -> Self {
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let (stop_tx, _) = watch::channel(false);
        Self {
            db,
            verifier: Arc::new(verifier),
            settings,
            producers,
            queue: Arc::new(Mutex::new(TaskQueue::new())),
            wake_tx,
            wake_rx: Arc::new(Mutex::new(wake_rx)),
            stop_tx: Arc::new(stop_tx),
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    /// Starts polling for payment of the given order. The first check happens on the next loop iteration.
    ///
    /// Returns `false` if the order was already queued, in which case nothing changes.
    pub async fn add_to_queue(&self, order_id: i64, payment_method_id: i64) -> Result<bool, PollingError> {
        let settings = self.settings.snapshot().await;
        let interval = self.poll_interval(payment_method_id, &settings).await?;
        let task = PollingTask::new(order_id, payment_method_id, interval, Utc::now());
        {
            // Persisted under the queue lock
            let mut queue = self.queue.lock().await;
            if queue.contains(order_id) {
                trace!("💳️ Order {order_id} is already being polled");
                return Ok(false);
            }
            self.db.save_polling_task(&task).await?;
            queue.push(task.clone());
        }
        debug!("💳️ Order {order_id} added to the payment polling queue. Checking every {interval}s");
        self.wake();
        Ok(true)
    }

    /// Stops polling for the given order. Returns `true` if it was being polled.
    pub async fn remove_from_queue(&self, order_id: i64) -> Result<bool, PollingError> {
        let mut queue = self.queue.lock().await;
        let removed = queue.remove(order_id).is_some();
        self.db.delete_polling_task(order_id).await?;
        drop(queue);
        if removed {
            debug!("💳️ Order {order_id} removed from the payment polling queue");
        }
        Ok(removed)
    }

    pub async fn queue_status(&self) -> QueueStatus {
        self.queue.lock().await.status()
    }

    /// Rebuilds the queue after a restart.
    ///
    /// Stored tasks whose order is gone, no longer awaiting payment, or past the polling window are discarded. The rest
    /// are made due immediately. Any order that is awaiting payment with a payment method but has no stored task is
    /// queued too. Returns the number of tasks in the queue afterwards.
    pub async fn recover_tasks(&self) -> Result<usize, PollingError> {
        let settings = self.settings.snapshot().await;
        let now = Utc::now();
        let stored = self.db.fetch_polling_tasks().await?;
        let stored_count = stored.len();
        let mut recovered = 0usize;
        for mut task in stored {
            let order = self.db.fetch_order(task.order_id).await?;
            let expired = now - task.added_at > settings.max_poll_duration;
            let keep = matches!(&order, Some(o) if o.status == OrderStatusType::PendingPayment) && !expired;
            if !keep {
                debug!("💳️ Discarding stale polling task for order {}", task.order_id);
                self.db.delete_polling_task(task.order_id).await?;
                continue;
            }
            task.next_check_at = now;
            self.db.save_polling_task(&task).await?;
            self.queue.lock().await.push(task);
            recovered += 1;
        }
        let mut added = 0usize;
        for order in self.db.fetch_pollable_orders().await? {
            let Some(method_id) = order.payment_method_id else { continue };
            if self.queue.lock().await.contains(order.id) {
                continue;
            }
            if self.add_to_queue(order.id, method_id).await? {
                added += 1;
            }
        }
        info!(
            "💳️ Payment polling recovery: {recovered} of {stored_count} stored tasks restored, {added} unpaid orders \
             queued"
        );
        self.wake();
        Ok(self.queue.lock().await.len())
    }

    /// Checks every task that is due now. Returns the number of tasks checked.
    ///
    /// The queue lock is only held while taking and rescheduling tasks, never during a payment check.
    pub async fn process_due_tasks(&self) -> usize {
        let settings = self.settings.snapshot().await;
        let due = self.queue.lock().await.take_due(Utc::now());
        let count = due.len();
        if count > 0 {
            trace!("💳️ {count} payment checks are due");
        }
        let mut stop_rx = self.stop_tx.subscribe();
        let mut due = due.into_iter();
        while let Some(mut task) = due.next() {
            let outcome = if *stop_rx.borrow() {
                TaskOutcome::Interrupted
            } else {
                self.check_task(&task, &settings, &mut stop_rx).await
            };
            match outcome {
                TaskOutcome::Continue => {
                    let now = Utc::now();
                    task.retry_count += 1;
                    task.next_check_at = now + Duration::seconds(task.interval_seconds);
                    let mut queue = self.queue.lock().await;
                    // Orders removed while their check was in flight must not get their record back
                    if queue.reschedule(task.clone()) {
                        if let Err(e) = self.db.save_polling_task(&task).await {
                            warn!("💳️ Could not persist polling task for order {}. {e}", task.order_id);
                        }
                    }
                },
                TaskOutcome::Drop(reason) => {
                    debug!("💳️ No longer polling order {}. {reason}", task.order_id);
                    self.forget(task.order_id).await;
                },
                TaskOutcome::Paid => {
                    self.forget(task.order_id).await;
                },
                TaskOutcome::Interrupted => {
                    let mut queue = self.queue.lock().await;
                    queue.reschedule(task);
                    for rest in due.by_ref() {
                        queue.reschedule(rest);
                    }
                    break;
                },
            }
        }
        count
    }

    /// Runs the polling loop until [`Self::stop`] is called.
    ///
    /// Only one loop runs at a time. A second call waits for the first to finish.
    pub async fn run(&self) {
        let mut wake_rx = self.wake_rx.lock().await;
        let mut stop_rx = self.stop_tx.subscribe();
        info!("💳️ Payment poller started");
        loop {
            if *stop_rx.borrow() {
                break;
            }
            self.process_due_tasks().await;
            let settings = self.settings.snapshot().await;
            let next_due = self.queue.lock().await.next_due();
            let wait = match next_due {
                Some(t) => (t - Utc::now()).max(Duration::zero()),
                None => settings.idle_interval,
            };
            let wait = wait.to_std().unwrap_or_default();
            tokio::select! {
                _ = tokio::time::sleep(wait) => {},
                _ = wake_rx.recv() => trace!("💳️ Payment poller woken up"),
                _ = stop_rx.changed() => {},
            }
        }
        info!("💳️ Payment poller stopped");
    }

    /// Signals the polling loop to stop. In-flight checks are abandoned. Stopping twice is harmless.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    fn wake(&self) {
        // A full channel means a wake-up is already pending
        let _ = self.wake_tx.try_send(());
    }

    async fn forget(&self, order_id: i64) {
        let mut queue = self.queue.lock().await;
        queue.remove(order_id);
        if let Err(e) = self.db.delete_polling_task(order_id).await {
            warn!("💳️ Could not delete polling task for order {order_id}. {e}");
        }
    }

    async fn poll_interval(&self, payment_method_id: i64, settings: &EngineSettings) -> Result<i64, PollingError> {
        let method = self.db.fetch_payment_method(payment_method_id).await?;
        let secs = method.map(|m| m.poll_interval_secs).unwrap_or_default();
        Ok(if secs > 0 { secs } else { settings.default_poll_interval.num_seconds() })
    }

    async fn check_task(
        &self,
        task: &PollingTask,
        settings: &EngineSettings,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> TaskOutcome {
        let order = match self.db.fetch_order(task.order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => return TaskOutcome::Drop("The order no longer exists".into()),
            Err(e) => {
                warn!("💳️ Could not fetch order {} for a payment check. {e}", task.order_id);
                return TaskOutcome::Continue;
            },
        };
        if order.status != OrderStatusType::PendingPayment {
            return TaskOutcome::Drop(format!("The order is {}", order.status));
        }
        if Utc::now() - task.added_at > settings.max_poll_duration {
            return TaskOutcome::Drop("The polling window has passed".into());
        }
        if task.retry_count >= settings.max_retries {
            return TaskOutcome::Drop(format!("Gave up after {} checks", task.retry_count));
        }
        let method = match self.db.fetch_payment_method(task.payment_method_id).await {
            Ok(Some(m)) if m.is_active => m,
            Ok(_) => return TaskOutcome::Drop(format!("Payment method {} is not available", task.payment_method_id)),
            Err(e) => {
                warn!("💳️ Could not fetch payment method {}. {e}", task.payment_method_id);
                return TaskOutcome::Continue;
            },
        };
        let timeout = settings.check_timeout.to_std().unwrap_or_default();
        let result = tokio::select! {
            r = tokio::time::timeout(timeout, self.verifier.check_status(&order, &method)) => {
                r.unwrap_or(Err(VerifierError::Timeout))
            },
            _ = stop_rx.changed() => return TaskOutcome::Interrupted,
        };
        match result {
            Ok(check) if check.paid => self.handle_paid(&order, task.payment_method_id, check).await,
            Ok(_) => {
                trace!("💳️ Order {} is not paid yet", order.order_no);
                TaskOutcome::Continue
            },
            Err(e) => {
                debug!("💳️ Payment check for order {} failed. {e}", order.order_no);
                TaskOutcome::Continue
            },
        }
    }

    async fn handle_paid(&self, order: &Order, payment_method_id: i64, check: PaymentCheckResult) -> TaskOutcome {
        let record = PaymentRecord::new(payment_method_id, check.transaction_id, check.data);
        match self.db.mark_order_paid(order.id, record).await {
            Ok(PaidTransition::Applied { order, auto_delivered }) => {
                info!("💳️ Payment confirmed for order {}. Status is now {}", order.order_no, order.status);
                self.producers.publish_order_paid(OrderPaidEvent::new(order, auto_delivered)).await;
                TaskOutcome::Paid
            },
            Ok(PaidTransition::AlreadyProcessed(order)) => {
                TaskOutcome::Drop(format!("Order {} was already processed", order.order_no))
            },
            Err(e) => {
                let order_no = &order.order_no;
                error!("💳️ Payment for order {order_no} was confirmed but could not be recorded. Will retry. {e}");
                TaskOutcome::Continue
            },
        }
    }
}
