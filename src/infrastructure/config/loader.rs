use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Backend URL cannot be empty")]
    EmptyBackendUrl,

    #[error("Invalid request_timeout_secs: {0}. Must be at least 1")]
    InvalidRequestTimeout(u64),

    #[error("Invalid max_consecutive_failures: {0}. Must be at least 1")]
    InvalidFailureThreshold(u32),

    #[error("Invalid {name}: {value}. Must be positive")]
    ZeroInterval { name: &'static str, value: u64 },

    #[error("Invalid poll_timeout_ms: {timeout_ms}. Must be larger than {name} ({interval_ms})")]
    TimeoutNotAboveInterval {
        name: &'static str,
        interval_ms: u64,
        timeout_ms: u64,
    },

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),
}

const ENV_PREFIX: &str = "EXAMSYNC_";

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .examsync/config.yaml (project config)
    /// 3. .examsync/local.yaml (project local overrides, optional)
    /// 4. Environment variables (EXAMSYNC_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".examsync/config.yaml"))
            .merge(Yaml::file(".examsync/local.yaml"))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honouring environment
    /// overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.backend.url.trim().is_empty() {
            return Err(ConfigError::EmptyBackendUrl);
        }
        if config.backend.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidRequestTimeout(0));
        }

        let sync = &config.sync;
        if sync.max_consecutive_failures == 0 {
            return Err(ConfigError::InvalidFailureThreshold(0));
        }

        let intervals = [
            ("fallback_poll_interval_ms", sync.fallback_poll_interval_ms),
            ("job_poll_interval_ms", sync.job_poll_interval_ms),
            ("reassess_poll_interval_ms", sync.reassess_poll_interval_ms),
            ("poll_timeout_ms", sync.poll_timeout_ms),
            ("offline_retry_ms", config.realtime.offline_retry_ms),
        ];
        if let Some((name, value)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ZeroInterval { name, value: *value });
        }

        // Bounded sessions need room for at least one tick
        for (name, interval_ms) in [
            ("job_poll_interval_ms", sync.job_poll_interval_ms),
            ("reassess_poll_interval_ms", sync.reassess_poll_interval_ms),
        ] {
            if sync.poll_timeout_ms <= interval_ms {
                return Err(ConfigError::TimeoutNotAboveInterval {
                    name,
                    interval_ms,
                    timeout_ms: sync.poll_timeout_ms,
                });
            }
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}
