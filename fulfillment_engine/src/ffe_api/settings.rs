use std::sync::Arc;

use chrono::Duration;
use tokio::sync::RwLock;

use crate::db_types::DeliveryOrder;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::seconds(30);
pub const DEFAULT_MAX_RETRIES: u32 = 480;
pub const DEFAULT_MAX_POLL_DURATION: Duration = Duration::hours(4);
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::minutes(1);
pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::seconds(10);
pub const DEFAULT_AUTO_CANCEL_TTL: Duration = Duration::hours(72);
pub const DEFAULT_AUTO_CANCEL_CHECK_INTERVAL: Duration = Duration::minutes(5);

/// Tunables for the payment poller, virtual stock draws and the auto-cancel sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Used when a payment method does not specify its own poll interval.
    pub default_poll_interval: Duration,
    pub max_retries: u32,
    /// How long an order is polled for, measured from when it was added to the queue.
    pub max_poll_duration: Duration,
    /// How long the poller sleeps when the queue is empty.
    pub idle_interval: Duration,
    /// The time budget for a single payment status check.
    pub check_timeout: Duration,
    pub virtual_delivery_order: DeliveryOrder,
    /// Unpaid orders older than this are cancelled. Zero or negative disables the sweep.
    pub auto_cancel_ttl: Duration,
    pub auto_cancel_check_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_poll_interval: DEFAULT_POLL_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
            max_poll_duration: DEFAULT_MAX_POLL_DURATION,
            idle_interval: DEFAULT_IDLE_INTERVAL,
            check_timeout: DEFAULT_CHECK_TIMEOUT,
            virtual_delivery_order: DeliveryOrder::default(),
            auto_cancel_ttl: DEFAULT_AUTO_CANCEL_TTL,
            auto_cancel_check_interval: DEFAULT_AUTO_CANCEL_CHECK_INTERVAL,
        }
    }
}

impl EngineSettings {
    pub fn auto_cancel_enabled(&self) -> bool {
        self.auto_cancel_ttl > Duration::zero()
    }
}

/// Shared, runtime-updatable settings. Long-running workers take a fresh snapshot on every cycle.
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle {
    inner: Arc<RwLock<EngineSettings>>,
}

impl SettingsHandle {
    pub fn new(settings: EngineSettings) -> Self {
        Self { inner: Arc::new(RwLock::new(settings)) }
    }

    pub async fn snapshot(&self) -> EngineSettings {
        self.inner.read().await.clone()
    }

    pub async fn update<F: FnOnce(&mut EngineSettings)>(&self, f: F) {
        let mut settings = self.inner.write().await;
        f(&mut settings);
    }
}
