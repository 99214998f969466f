use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure for examsync
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Managed backend connection
    #[serde(default)]
    pub backend: BackendConfig,

    /// Polling and fallback timings
    #[serde(default)]
    pub sync: SyncConfig,

    /// Push channel settings
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Managed backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BackendConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`
    #[serde(default = "default_backend_url")]
    pub url: String,

    /// Public API key sent as `apikey` header
    #[serde(default)]
    pub anon_key: String,

    /// Bearer token of the signed-in user
    #[serde(default)]
    pub access_token: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_backend_url() -> String {
    "http://localhost:54321".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            anon_key: String::new(),
            access_token: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Timings for push fallback and bounded polling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncConfig {
    /// Consecutive push failures before falling back to polling
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Interval of the unbounded fallback poll loop
    #[serde(default = "default_fallback_poll_interval_ms")]
    pub fallback_poll_interval_ms: u64,

    /// Interval for generation and embedding job polling
    #[serde(default = "default_job_poll_interval_ms")]
    pub job_poll_interval_ms: u64,

    /// Interval for reassessment polling
    #[serde(default = "default_reassess_poll_interval_ms")]
    pub reassess_poll_interval_ms: u64,

    /// Hard timeout of every bounded poll session
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

const fn default_max_consecutive_failures() -> u32 {
    3
}

const fn default_fallback_poll_interval_ms() -> u64 {
    3_000
}

const fn default_job_poll_interval_ms() -> u64 {
    3_000
}

const fn default_reassess_poll_interval_ms() -> u64 {
    2_000
}

const fn default_poll_timeout_ms() -> u64 {
    60_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: default_max_consecutive_failures(),
            fallback_poll_interval_ms: default_fallback_poll_interval_ms(),
            job_poll_interval_ms: default_job_poll_interval_ms(),
            reassess_poll_interval_ms: default_reassess_poll_interval_ms(),
            poll_timeout_ms: default_poll_timeout_ms(),
        }
    }
}

impl SyncConfig {
    /// Fallback poll interval as a `Duration`
    pub const fn fallback_poll_interval(&self) -> Duration {
        Duration::from_millis(self.fallback_poll_interval_ms)
    }

    /// Job poll interval as a `Duration`
    pub const fn job_poll_interval(&self) -> Duration {
        Duration::from_millis(self.job_poll_interval_ms)
    }

    /// Reassessment poll interval as a `Duration`
    pub const fn reassess_poll_interval(&self) -> Duration {
        Duration::from_millis(self.reassess_poll_interval_ms)
    }

    /// Bounded poll timeout as a `Duration`
    pub const fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Push channel configuration
///
/// There is no realtime socket client in this crate, so records poll from
/// the start unless push loss is simulated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RealtimeConfig {
    /// Open channels that never connect, so live records walk the push
    /// failure path before they degrade to polling
    #[serde(default)]
    pub simulate_push_loss: bool,

    /// Delay between status reports of a channel that cannot connect
    #[serde(default = "default_offline_retry_ms")]
    pub offline_retry_ms: u64,
}

const fn default_offline_retry_ms() -> u64 {
    1_000
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            simulate_push_loss: false,
            offline_retry_ms: default_offline_retry_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rotated log files; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}
