use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use vigil_inference::VlmConfig;

use crate::dispatcher::DispatchMode;

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

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub dispatch_mode: DispatchMode,
    /// Back-off between claims while the queue is empty.
    pub poll_interval: Duration,
    pub webhook_timeout: Duration,
    /// Port of the health endpoint; `None` disables it.
    pub health_port: Option<u16>,
    pub run_migrations: bool,
    pub log_format: LogFormat,
    pub data_dir: PathBuf,
    pub ollama_host: String,
    pub vlm_model: String,
    pub llm_model: String,
    pub vlm_temperature: f64,
    pub vlm_num_predict: i32,
    /// Timeout of a single Ollama request.
    pub inference_timeout: Duration,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                  |
    /// |--------------------------|--------------------------|
    /// | `DATABASE_URL`           | required                 |
    /// | `DISPATCH_MODE`          | `sequential`             |
    /// | `MAX_WORKERS`            | `2` (pooled mode only)   |
    /// | `POLL_INTERVAL_SECS`     | `2`                      |
    /// | `WEBHOOK_TIMEOUT_SECS`   | `10`                     |
    /// | `HEALTH_PORT`            | `8081` (`0` disables)    |
    /// | `RUN_MIGRATIONS`         | `true`                   |
    /// | `LOG_FORMAT`             | `text`                   |
    /// | `DATA_DIR`               | `data`                   |
    /// | `OLLAMA_HOST`            | `http://localhost:11434` |
    /// | `VLM_MODEL`              | `llava:7b`               |
    /// | `LLM_MODEL`              | `llama3:latest`          |
    /// | `VLM_TEMPERATURE`        | `0.2`                    |
    /// | `VLM_NUM_PREDICT`        | `16`                     |
    /// | `INFERENCE_TIMEOUT_SECS` | `600`                    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading values from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let vars = Vars(lookup);

        let database_url = vars
            .get("DATABASE_URL")
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let dispatch_mode = match vars.get("DISPATCH_MODE").as_deref() {
            None | Some("sequential") => DispatchMode::Sequential,
            Some("pooled") => {
                let max_workers: usize = vars.parse("MAX_WORKERS", 2, "a positive integer")?;
                if max_workers == 0 {
                    return Err(vars.invalid("MAX_WORKERS", "a positive integer"));
                }
                DispatchMode::Pooled { max_workers }
            }
            Some(_) => return Err(vars.invalid("DISPATCH_MODE", "sequential or pooled")),
        };

        let log_format = match vars.get("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(_) => return Err(vars.invalid("LOG_FORMAT", "text or json")),
        };

        let health_port: u16 = vars.parse("HEALTH_PORT", 8081, "a port number")?;

        Ok(Self {
            database_url,
            dispatch_mode,
            poll_interval: vars.secs("POLL_INTERVAL_SECS", 2)?,
            webhook_timeout: vars.secs("WEBHOOK_TIMEOUT_SECS", 10)?,
            health_port: (health_port != 0).then_some(health_port),
            run_migrations: vars.parse("RUN_MIGRATIONS", true, "true or false")?,
            log_format,
            data_dir: vars.get("DATA_DIR").unwrap_or_else(|| "data".into()).into(),
            ollama_host: vars
                .get("OLLAMA_HOST")
                .unwrap_or_else(|| "http://localhost:11434".into()),
            vlm_model: vars.get("VLM_MODEL").unwrap_or_else(|| "llava:7b".into()),
            llm_model: vars.get("LLM_MODEL").unwrap_or_else(|| "llama3:latest".into()),
            vlm_temperature: vars.parse("VLM_TEMPERATURE", 0.2, "a number")?,
            vlm_num_predict: vars.parse("VLM_NUM_PREDICT", 16, "an integer")?,
            inference_timeout: vars.secs("INFERENCE_TIMEOUT_SECS", 600)?,
        })
    }

    pub fn vlm_config(&self) -> VlmConfig {
        VlmConfig {
            data_dir: self.data_dir.clone(),
            vlm_model: self.vlm_model.clone(),
            llm_model: self.llm_model.clone(),
            temperature: self.vlm_temperature,
            num_predict: self.vlm_num_predict,
        }
    }
}

/// Environment reader; blank values count as unset.
struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(
        &self,
        key: &'static str,
        default: T,
        expected: &'static str,
    ) -> Result<T, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                key,
                value,
                expected,
            }),
        }
    }

    fn secs(&self, key: &'static str, default: u64) -> Result<Duration, ConfigError> {
        self.parse(key, default, "a whole number of seconds")
            .map(Duration::from_secs)
    }

    fn invalid(&self, key: &'static str, expected: &'static str) -> ConfigError {
        ConfigError::Invalid {
            key,
            value: self.get(key).unwrap_or_default(),
            expected,
        }
    }
}
