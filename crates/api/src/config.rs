//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use checkout::CheckoutConfig;
use domain::{FeeRate, RefundPolicy};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default `"0.0.0.0"`)
/// - `PORT`: listen port (default `3000`)
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string; the in-memory store is used when unset
/// - `SERVICE_FEE_BPS`: service fee in basis points (default `1000`, at most `10000`)
/// - `REFUND_WINDOW_DAYS`: days after purchase a refund may be requested (default `7`)
/// - `REFUND_CUTOFF_HOURS`: hours before the event refunds close (default `48`)
/// - `PAYMENT_TIMEOUT_MS`: payment gateway timeout (default `30000`)
/// - `PENDING_ORDER_TTL_SECS`: age at which unpaid orders are failed (default `900`)
/// - `SWEEP_INTERVAL_SECS`: how often stale orders are swept (default `60`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub service_fee_bps: u32,
    pub refund_window_days: i64,
    pub refund_cutoff_hours: i64,
    pub payment_timeout_ms: u64,
    pub pending_order_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from `lookup`. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse::<u16>(lookup("PORT")).unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            service_fee_bps: parse::<u32>(lookup("SERVICE_FEE_BPS"))
                .filter(|bps| *bps <= FeeRate::MAX_BPS)
                .unwrap_or(defaults.service_fee_bps),
            refund_window_days: parse::<i64>(lookup("REFUND_WINDOW_DAYS"))
                .filter(|days| (0..=MAX_REFUND_DAYS).contains(days))
                .unwrap_or(defaults.refund_window_days),
            refund_cutoff_hours: parse::<i64>(lookup("REFUND_CUTOFF_HOURS"))
                .filter(|hours| (0..=MAX_REFUND_DAYS * 24).contains(hours))
                .unwrap_or(defaults.refund_cutoff_hours),
            payment_timeout_ms: parse::<u64>(lookup("PAYMENT_TIMEOUT_MS"))
                .filter(|ms| *ms > 0)
                .unwrap_or(defaults.payment_timeout_ms),
            pending_order_ttl_secs: parse::<u64>(lookup("PENDING_ORDER_TTL_SECS"))
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.pending_order_ttl_secs),
            sweep_interval_secs: parse::<u64>(lookup("SWEEP_INTERVAL_SECS"))
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.sweep_interval_secs),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Checkout tunables derived from this configuration.
    pub fn checkout(&self) -> CheckoutConfig {
        CheckoutConfig {
            fee_rate: FeeRate::from_bps(self.service_fee_bps).unwrap_or_default(),
            refund_policy: RefundPolicy::new(
                chrono::Duration::days(self.refund_window_days),
                chrono::Duration::hours(self.refund_cutoff_hours),
            ),
            payment_timeout: Duration::from_millis(self.payment_timeout_ms),
            pending_ttl: Duration::from_secs(self.pending_order_ttl_secs),
        }
    }
}

fn parse<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

/// Upper bound for the refund window and cutoff, in days.
const MAX_REFUND_DAYS: i64 = 3_650;

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            service_fee_bps: 1_000,
            refund_window_days: 7,
            refund_cutoff_hours: 48,
            payment_timeout_ms: 30_000,
            pending_order_ttl_secs: 900,
            sweep_interval_secs: 60,
        }
    }
}
