use std::env;

use chrono::Duration;
use fulfillment_engine::{db_types::DeliveryOrder, helpers::parse_duration, EngineSettings};
use log::*;

const DEFAULT_FFE_HOST: &str = "127.0.0.1";
const DEFAULT_FFE_PORT: u16 = 8380;
const DEFAULT_FFE_DATABASE_URL: &str = "sqlite://data/fulfillment_store.db";
const DEFAULT_DB_CONNECTIONS: u32 = 25;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub max_db_connections: u32,
    /// Poller, virtual stock and auto-cancel tunables. These seed the engine's runtime settings at startup.
    pub engine: EngineSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_FFE_HOST.to_string(),
            port: DEFAULT_FFE_PORT,
            database_url: DEFAULT_FFE_DATABASE_URL.to_string(),
            max_db_connections: DEFAULT_DB_CONNECTIONS,
            engine: EngineSettings::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("FFE_HOST").ok().unwrap_or_else(|| DEFAULT_FFE_HOST.into());
        let port = env::var("FFE_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for FFE_PORT. {e} Using the default, {DEFAULT_FFE_PORT}, instead."
                    );
                    DEFAULT_FFE_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_FFE_PORT);
        let database_url = env::var("FFE_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ FFE_DATABASE_URL is not set. Using the default, {DEFAULT_FFE_DATABASE_URL}.");
            DEFAULT_FFE_DATABASE_URL.to_string()
        });
        let engine = configure_engine_settings();
        Self { host, port, database_url, max_db_connections: DEFAULT_DB_CONNECTIONS, engine }
    }
}

fn configure_engine_settings() -> EngineSettings {
    let defaults = EngineSettings::default();
    let max_retries = env::var("FFE_POLL_MAX_RETRIES")
        .ok()
        .and_then(|s| {
            s.parse::<u32>()
                .map_err(|e| warn!("🪛️ Invalid configuration value for FFE_POLL_MAX_RETRIES. {e}"))
                .ok()
        })
        .unwrap_or(defaults.max_retries);
    let virtual_delivery_order = env::var("FFE_VIRTUAL_DELIVERY_ORDER")
        .ok()
        .and_then(|s| {
            s.parse::<DeliveryOrder>()
                .map_err(|e| warn!("🪛️ Invalid configuration value for FFE_VIRTUAL_DELIVERY_ORDER. {e}"))
                .ok()
        })
        .unwrap_or(defaults.virtual_delivery_order);
    let settings = EngineSettings {
        default_poll_interval: duration_from_env("FFE_POLL_INTERVAL", defaults.default_poll_interval),
        max_retries,
        max_poll_duration: duration_from_env("FFE_POLL_MAX_DURATION", defaults.max_poll_duration),
        idle_interval: duration_from_env("FFE_POLL_IDLE_INTERVAL", defaults.idle_interval),
        check_timeout: duration_from_env("FFE_VERIFY_TIMEOUT", defaults.check_timeout),
        virtual_delivery_order,
        auto_cancel_ttl: auto_cancel_ttl_from_env(defaults.auto_cancel_ttl),
        auto_cancel_check_interval: duration_from_env(
            "FFE_AUTO_CANCEL_CHECK_INTERVAL",
            defaults.auto_cancel_check_interval,
        ),
    };
    if settings.auto_cancel_enabled() {
        info!("🪛️ Unpaid orders are cancelled after {} hours", settings.auto_cancel_ttl.num_hours());
    } else {
        info!("🪛️ Automatic cancellation of unpaid orders is disabled");
    }
    settings
}

/// Reads a duration such as `30s`, `5m` or `4h` from `name`. Missing or invalid values (and values that are not
/// positive) fall back to `default`.
fn duration_from_env(name: &str, default: Duration) -> Duration {
    match env::var(name) {
        Ok(s) => match parse_duration(&s) {
            Ok(d) if d > Duration::zero() => d,
            Ok(_) => {
                warn!("🪛️ {name} must be positive. Using the default value of {}s.", default.num_seconds());
                default
            },
            Err(e) => {
                let secs = default.num_seconds();
                warn!("🪛️ Invalid configuration value for {name}. {e}. Using the default of {secs}s.");
                default
            },
        },
        Err(_) => {
            debug!("🪛️ {name} is not set. Using the default value of {}s.", default.num_seconds());
            default
        },
    }
}

/// `FFE_AUTO_CANCEL_HOURS` is a number of hours, although a suffixed duration (`90m`, `3d`) is accepted too. Zero or
/// a negative value disables the sweep.
fn auto_cancel_ttl_from_env(default: Duration) -> Duration {
    let Ok(s) = env::var("FFE_AUTO_CANCEL_HOURS") else {
        return default;
    };
    if let Ok(hours) = s.trim().parse::<i64>() {
        return Duration::hours(hours);
    }
    parse_duration(&s).unwrap_or_else(|e| {
        let hours = default.num_hours();
        warn!("🪛️ Invalid configuration value for FFE_AUTO_CANCEL_HOURS. {e}. Using the default of {hours} hours.");
        default
    })
}
