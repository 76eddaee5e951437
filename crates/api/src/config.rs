//! Application configuration loaded from environment variables.

use booking_store::CapacityPolicy;
use reconciler::{DEFAULT_TOLERANCE_SECS, ReconcilerConfig};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `text` or `json` (default: `text`)
/// - `DATABASE_URL` — PostgreSQL connection string; in-memory store if unset
/// - `DATABASE_MAX_CONNECTIONS` — pool size (default: `5`)
/// - `WEBHOOK_SIGNING_SECRET` — shared secret; payloads are trusted if unset
/// - `WEBHOOK_TOLERANCE_SECS` — max signature age (default: `300`)
/// - `CAPACITY_POLICY` — `enforce` or `unconditional` (default: `enforce`)
/// - `REMINDER_LEAD_HOURS` — reminder lead time (default: `24`)
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub webhook_signing_secret: Option<String>,
    pub webhook_tolerance_secs: u64,
    pub capacity_policy: CapacityPolicy,
    pub reminder_lead_hours: u32,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: non_empty("HOST").unwrap_or(defaults.host),
            port: parsed(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match non_empty("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: non_empty("DATABASE_URL"),
            database_max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            webhook_signing_secret: non_empty("WEBHOOK_SIGNING_SECRET"),
            webhook_tolerance_secs: parsed(&lookup, "WEBHOOK_TOLERANCE_SECS")
                .unwrap_or(defaults.webhook_tolerance_secs),
            capacity_policy: parsed(&lookup, "CAPACITY_POLICY")
                .unwrap_or(defaults.capacity_policy),
            reminder_lead_hours: parsed(&lookup, "REMINDER_LEAD_HOURS")
                .unwrap_or(defaults.reminder_lead_hours),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reconciler settings derived from this configuration.
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            signing_secret: self.webhook_signing_secret.clone(),
            tolerance_secs: self.webhook_tolerance_secs,
            capacity_policy: self.capacity_policy,
            reminder_lead_hours: self.reminder_lead_hours,
        }
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 5,
            webhook_signing_secret: None,
            webhook_tolerance_secs: DEFAULT_TOLERANCE_SECS,
            capacity_policy: CapacityPolicy::Enforce,
            reminder_lead_hours: notifications::DEFAULT_REMINDER_LEAD_HOURS,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("database_url", &redacted(&self.database_url))
            .field("database_max_connections", &self.database_max_connections)
            .field("webhook_signing_secret", &redacted(&self.webhook_signing_secret))
            .field("webhook_tolerance_secs", &self.webhook_tolerance_secs)
            .field("capacity_policy", &self.capacity_policy)
            .field("reminder_lead_hours", &self.reminder_lead_hours)
            .finish()
    }
}
