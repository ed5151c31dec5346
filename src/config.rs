use std::{env, time::Duration};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: Option<String>,
    pub payments: PaymentConfig,
    pub picking: PickingConfig,
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Shared secret for the checkout integrity hash. Never sent to clients.
    pub integrity_secret: Option<String>,
    pub events_secret: Option<String>,
    pub verify_events: bool,
    pub public_key: String,
    pub checkout_url: String,
    /// When unset the in-process sandbox answers status lookups.
    pub status_url: Option<String>,
    pub redirect_url: String,
    pub currency: String,
    pub poll_attempts: u32,
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct PickingConfig {
    pub notice_ttl: Duration,
    /// Sessions untouched this long with no event stream attached are closed.
    pub session_idle: Duration,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            integrity_secret: None,
            events_secret: None,
            verify_events: false,
            public_key: "pub_test_sandbox".to_string(),
            checkout_url: "http://127.0.0.1:3000/sandbox/checkout".to_string(),
            status_url: None,
            redirect_url: "http://127.0.0.1:3000/checkout/result".to_string(),
            currency: "COP".to_string(),
            poll_attempts: 1,
            poll_interval: Duration::from_millis(1500),
        }
    }
}

impl Default for PickingConfig {
    fn default() -> Self {
        Self {
            notice_ttl: Duration::from_secs(3),
            session_idle: Duration::from_secs(600),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let public_base = format!("http://{host}:{port}");

        let defaults = PaymentConfig::default();
        let payments = PaymentConfig {
            integrity_secret: non_empty("PAYMENT_INTEGRITY_SECRET"),
            events_secret: non_empty("PAYMENT_EVENTS_SECRET"),
            verify_events: env::var("PAYMENT_VERIFY_EVENTS")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            public_key: non_empty("PAYMENT_PUBLIC_KEY").unwrap_or(defaults.public_key),
            checkout_url: non_empty("PAYMENT_CHECKOUT_URL")
                .unwrap_or_else(|| format!("{public_base}/sandbox/checkout")),
            status_url: non_empty("PAYMENT_STATUS_URL"),
            redirect_url: non_empty("PAYMENT_REDIRECT_URL")
                .unwrap_or_else(|| format!("{public_base}/checkout/result")),
            currency: non_empty("PAYMENT_CURRENCY").unwrap_or(defaults.currency),
            poll_attempts: parsed("PAYMENT_POLL_ATTEMPTS")
                .unwrap_or(defaults.poll_attempts)
                .max(1),
            poll_interval: parsed("PAYMENT_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
        };

        let picking_defaults = PickingConfig::default();
        let picking = PickingConfig {
            notice_ttl: parsed("PICKING_NOTICE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(picking_defaults.notice_ttl),
            session_idle: parsed("PICKING_SESSION_IDLE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(picking_defaults.session_idle),
        };

        Ok(Self {
            port,
            database_url,
            host,
            jwt_secret: non_empty("JWT_SECRET"),
            payments,
            picking,
        })
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
