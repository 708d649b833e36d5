use std::path::PathBuf;
use std::time::Duration;

use metricwatch_alarms::SchedulerConfig;

/// Log output format selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `4566`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long post-shutdown cleanup may wait for background tasks.
    pub shutdown_timeout_secs: u64,
    /// Account used when a request carries no `x-account-id` header.
    pub default_account_id: String,
    /// Region used when a request carries no `x-region` header.
    pub default_region: String,
    /// Bound on one alarm tick's metric query, in milliseconds.
    pub alarm_query_timeout_ms: u64,
    /// Datapoints older than this are purged by the retention job.
    pub metrics_retention_hours: i64,
    /// JSON snapshot written on shutdown and loaded on start. Persistence
    /// is disabled when unset.
    pub state_file: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                 |
    /// |--------------------------|-------------------------|
    /// | `HOST`                   | `0.0.0.0`               |
    /// | `PORT`                   | `4566`                  |
    /// | `CORS_ORIGINS`           | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`  | `10`                    |
    /// | `DEFAULT_ACCOUNT_ID`     | `000000000000`          |
    /// | `DEFAULT_REGION`         | `us-east-1`             |
    /// | `ALARM_QUERY_TIMEOUT_MS` | `5000`                  |
    /// | `METRICS_RETENTION_HOURS`| `336`                   |
    /// | `STATE_FILE`             | unset                   |
    /// | `LOG_FORMAT`             | `text`                  |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "4566".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let default_account_id =
            std::env::var("DEFAULT_ACCOUNT_ID").unwrap_or_else(|_| "000000000000".into());
        let default_region = std::env::var("DEFAULT_REGION").unwrap_or_else(|_| "us-east-1".into());

        let alarm_query_timeout_ms: u64 = std::env::var("ALARM_QUERY_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".into())
            .parse()
            .expect("ALARM_QUERY_TIMEOUT_MS must be a valid u64");

        let metrics_retention_hours: i64 = std::env::var("METRICS_RETENTION_HOURS")
            .unwrap_or_else(|_| "336".into())
            .parse()
            .expect("METRICS_RETENTION_HOURS must be a valid i64");

        let state_file = std::env::var("STATE_FILE")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let log_format = match std::env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            default_account_id,
            default_region,
            alarm_query_timeout_ms,
            metrics_retention_hours,
            state_file,
            log_format,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            query_timeout: Duration::from_millis(self.alarm_query_timeout_ms),
            shutdown_grace: Duration::from_secs(self.shutdown_timeout_secs),
        }
    }
}
