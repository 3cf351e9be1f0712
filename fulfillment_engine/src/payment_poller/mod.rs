//! Payment status polling.
//!
//! Orders that are paid through an external provider are checked periodically until the provider confirms payment,
//! the order leaves `pending_payment`, or the polling window runs out. The schedule lives in memory in a
//! [`TaskQueue`] and is mirrored to the database so that it survives restarts.
mod poller;
mod task_queue;

pub use poller::PaymentPoller;
pub use task_queue::{QueueStatus, TaskQueue};
