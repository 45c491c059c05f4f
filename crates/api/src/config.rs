use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has invalid value {value:?}: expected {expected}")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// API server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub max_connections: u32,
    pub request_timeout: Duration,
    pub run_migrations: bool,
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default    |
    /// |------------------------|------------|
    /// | `DATABASE_URL`         | required   |
    /// | `HOST`                 | `0.0.0.0`  |
    /// | `PORT`                 | `3000`     |
    /// | `DB_MAX_CONNECTIONS`   | `5`        |
    /// | `REQUEST_TIMEOUT_SECS` | `30`       |
    /// | `RUN_MIGRATIONS`       | `true`     |
    /// | `LOG_FORMAT`           | `text`     |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading values from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let log_format = match get("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    value: other.to_string(),
                    expected: "text or json",
                })
            }
        };
        let timeout_secs: u64 = parse(&get, "REQUEST_TIMEOUT_SECS", 30, "a whole number of seconds")?;

        Ok(Self {
            database_url: get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse(&get, "PORT", 3000, "a port number")?,
            max_connections: parse(&get, "DB_MAX_CONNECTIONS", 5, "a positive integer")?,
            request_timeout: Duration::from_secs(timeout_secs),
            run_migrations: parse(&get, "RUN_MIGRATIONS", true, "true or false")?,
            log_format,
        })
    }
}

/// Parse `key` when set, else return `default`.
fn parse<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError> {
    match get(key) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
            key,
            value,
            expected,
        }),
    }
}
