//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use fulfillment::{BackoffPolicy, ConsumerConfig, TaskOptions, WorkerConfig};

/// Server and worker configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default `0.0.0.0`)
/// - `PORT`: listen port (default `3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `json` for JSON log lines, anything else for text
/// - `DATABASE_URL`: PostgreSQL connection string; unset runs in memory
/// - `WORKER_CONCURRENCY` (default `2`), `WORKER_POLL_INTERVAL_MS` (default `500`)
/// - `FULFILLMENT_MAX_ATTEMPTS` (default `3`), `FULFILLMENT_BACKOFF_MS` (default `5000`)
/// - `RENDER_TIMEOUT_SECS`, `NOTIFY_TIMEOUT_SECS` (default `30` each)
/// - `SWEEP_INTERVAL_SECS` (default `60`), `SWEEP_STALE_AFTER_SECS` (default `300`)
/// - `PDF_STORAGE_PATH`: directory for order documents (default `/tmp/vendora-pdfs`)
/// - `MAIL_RELAY_URL`: mail relay endpoint; unset logs messages instead
/// - `MAIL_FROM`: sender address
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub database_url: Option<String>,
    pub worker_concurrency: usize,
    pub worker_poll_interval: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub render_timeout: Duration,
    pub notify_timeout: Duration,
    pub sweep_interval: Duration,
    pub sweep_stale_after: Duration,
    pub document_root: PathBuf,
    pub mail_relay_url: Option<String>,
    pub mail_from: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from any key lookup. Unparseable values fall
    /// back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let millis = |key: &str, default: Duration| {
            parsed(key).map(Duration::from_millis).unwrap_or(default)
        };
        let secs = |key: &str, default: Duration| {
            parsed(key).map(Duration::from_secs).unwrap_or(default)
        };
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_or(lookup("PORT"), defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_json: lookup("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
            database_url: non_empty("DATABASE_URL"),
            worker_concurrency: parse_or(lookup("WORKER_CONCURRENCY"), defaults.worker_concurrency)
                .max(1),
            worker_poll_interval: millis("WORKER_POLL_INTERVAL_MS", defaults.worker_poll_interval),
            max_attempts: parse_or(lookup("FULFILLMENT_MAX_ATTEMPTS"), defaults.max_attempts)
                .max(1),
            initial_backoff: millis("FULFILLMENT_BACKOFF_MS", defaults.initial_backoff),
            render_timeout: secs("RENDER_TIMEOUT_SECS", defaults.render_timeout),
            notify_timeout: secs("NOTIFY_TIMEOUT_SECS", defaults.notify_timeout),
            sweep_interval: secs("SWEEP_INTERVAL_SECS", defaults.sweep_interval),
            sweep_stale_after: secs("SWEEP_STALE_AFTER_SECS", defaults.sweep_stale_after),
            document_root: non_empty("PDF_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.document_root),
            mail_relay_url: non_empty("MAIL_RELAY_URL"),
            mail_from: non_empty("MAIL_FROM").unwrap_or(defaults.mail_from),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn task_options(&self) -> TaskOptions {
        TaskOptions::new(self.max_attempts, self.backoff())
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            render_timeout: self.render_timeout,
            notify_timeout: self.notify_timeout,
            backoff: self.backoff(),
        }
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            concurrency: self.worker_concurrency,
            poll_interval: self.worker_poll_interval,
        }
    }

    fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::exponential(self.initial_backoff)
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_json: false,
            database_url: None,
            worker_concurrency: 2,
            worker_poll_interval: Duration::from_millis(500),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(5000),
            render_timeout: Duration::from_secs(30),
            notify_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(60),
            sweep_stale_after: Duration::from_secs(300),
            document_root: PathBuf::from("/tmp/vendora-pdfs"),
            mail_relay_url: None,
            mail_from: "Vendora Platform <orders@vendora.local>".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_backoff, Duration::from_secs(5));
        assert_eq!(config.sweep_stale_after, Duration::from_secs(300));
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        assert_eq!(config(&[]), Config::default());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("PORT", "8080"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/orders"),
            ("WORKER_CONCURRENCY", "8"),
            ("FULFILLMENT_MAX_ATTEMPTS", "5"),
            ("FULFILLMENT_BACKOFF_MS", "250"),
            ("RENDER_TIMEOUT_SECS", "10"),
            ("PDF_STORAGE_PATH", "/var/lib/orders"),
            ("MAIL_RELAY_URL", "http://relay.internal/send"),
        ]);

        assert_eq!(config.port, 8080);
        assert!(config.log_json);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/orders"));
        assert_eq!(config.consumer_config().concurrency, 8);
        assert_eq!(config.task_options().max_attempts, 5);
        assert_eq!(
            config.task_options().backoff.initial(),
            Duration::from_millis(250)
        );
        assert_eq!(config.worker_config().render_timeout, Duration::from_secs(10));
        assert_eq!(config.document_root, PathBuf::from("/var/lib/orders"));
        assert_eq!(
            config.mail_relay_url.as_deref(),
            Some("http://relay.internal/send")
        );
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = config(&[
            ("PORT", "not-a-port"),
            ("WORKER_CONCURRENCY", "0"),
            ("FULFILLMENT_MAX_ATTEMPTS", "-1"),
            ("DATABASE_URL", "  "),
        ]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.worker_concurrency, 1);
        assert_eq!(config.max_attempts, 3);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }
}
