use vigil_core::detection::DetectionConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Capacity of the bounded recording queue (default: `1024`).
    pub recorder_queue_capacity: usize,
    /// How long activity records are kept before retention cleanup
    /// (default: `90` days). Flags and audit trails are never purged.
    pub activity_retention_days: i64,
    /// Anomaly detection thresholds and signature sets.
    pub detection: DetectionConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                 |
    /// |----------------------------|-------------------------|
    /// | `HOST`                     | `0.0.0.0`               |
    /// | `PORT`                     | `3000`                  |
    /// | `CORS_ORIGINS`             | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`    | `30`                    |
    /// | `RECORDER_QUEUE_CAPACITY`  | `1024`                  |
    /// | `ACTIVITY_RETENTION_DAYS`  | `90`                    |
    ///
    /// Detection thresholds load via [`detection_from_env`].
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
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
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let recorder_queue_capacity: usize = std::env::var("RECORDER_QUEUE_CAPACITY")
            .unwrap_or_else(|_| "1024".into())
            .parse()
            .expect("RECORDER_QUEUE_CAPACITY must be a valid usize");

        let activity_retention_days: i64 = std::env::var("ACTIVITY_RETENTION_DAYS")
            .unwrap_or_else(|_| "90".into())
            .parse()
            .expect("ACTIVITY_RETENTION_DAYS must be a valid i64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            recorder_queue_capacity,
            activity_retention_days,
            detection: detection_from_env(),
        }
    }
}

/// Load detection thresholds from environment variables, starting from
/// [`DetectionConfig::default`].
///
/// | Env Var                  | Default              |
/// |--------------------------|----------------------|
/// | `RATE_MAX_REQUESTS`      | `30`                 |
/// | `RATE_WINDOW_SECS`       | `60`                 |
/// | `RATE_LOOKBACK_RECORDS`  | `100`                |
/// | `ERROR_RATE_THRESHOLD`   | `0.5`                |
/// | `ERROR_WINDOW_SECS`      | `3600`               |
/// | `ERROR_LOOKBACK_RECORDS` | `1000`               |
/// | `SENSITIVE_PATH_PREFIXES`| built-in prefix list |
///
/// Signature patterns stay programmatic: they are regexes and do not
/// survive comma-separated env vars.
pub fn detection_from_env() -> DetectionConfig {
    let mut config = DetectionConfig::default();

    if let Some(v) = env_parse::<i64>("RATE_MAX_REQUESTS") {
        config.rate_max_requests = v;
    }
    if let Some(v) = env_parse::<i64>("RATE_WINDOW_SECS") {
        config.rate_window_secs = v;
    }
    if let Some(v) = env_parse::<i64>("RATE_LOOKBACK_RECORDS") {
        config.rate_lookback_records = v;
    }
    if let Some(v) = env_parse::<f64>("ERROR_RATE_THRESHOLD") {
        config.error_rate_threshold = v;
    }
    if let Some(v) = env_parse::<i64>("ERROR_WINDOW_SECS") {
        config.error_window_secs = v;
    }
    if let Some(v) = env_parse::<i64>("ERROR_LOOKBACK_RECORDS") {
        config.error_lookback_records = v;
    }
    if let Ok(prefixes) = std::env::var("SENSITIVE_PATH_PREFIXES") {
        let parsed: Vec<String> = prefixes
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if !parsed.is_empty() {
            config.sensitive_path_prefixes = parsed;
        }
    }

    config
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
