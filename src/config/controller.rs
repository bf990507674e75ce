//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::time::Duration;

/// Scheduling, image and logging settings shared by every reconcile pass
///
/// Each field maps to an upper-case environment variable of the same name;
/// defaults come from `constants.rs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// First retry delay after a failed pass (milliseconds)
    pub backoff_start_ms: u64,
    /// Ceiling for the doubled retry delay (milliseconds)
    pub backoff_max_ms: u64,
    /// Delay used for "requeue now" outcomes (milliseconds)
    pub requeue_now_ms: u64,
    /// Poll interval while children are not ready (seconds)
    pub not_ready_requeue_secs: u64,
    /// Resync interval while a dependency is missing (seconds)
    pub dependency_requeue_secs: u64,
    /// Deadline for one reconcile pass (seconds)
    pub reconcile_timeout_secs: u64,
    /// Watch stream restart delay after unknown errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Watch stream restart delay after stream ends (seconds)
    pub watch_restart_delay_after_end_secs: u64,
    /// Maximum concurrent reconciliations per kind
    pub max_concurrent_reconciliations: u16,
    /// Restrict all watches to one namespace; `None` watches the whole cluster
    pub watch_namespace: Option<String>,
    /// Image used for MCPServer workloads
    pub runner_image: String,
    /// Image used for MCPRemoteProxy workloads
    pub proxy_image: String,
    /// Image used for the MCPRegistry API
    pub registry_api_image: String,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            backoff_start_ms: DEFAULT_BACKOFF_START_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            requeue_now_ms: DEFAULT_REQUEUE_NOW_MS,
            not_ready_requeue_secs: DEFAULT_NOT_READY_REQUEUE_SECS,
            dependency_requeue_secs: DEFAULT_DEPENDENCY_REQUEUE_SECS,
            reconcile_timeout_secs: DEFAULT_RECONCILE_TIMEOUT_SECS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_restart_delay_after_end_secs: DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            watch_namespace: None,
            runner_image: DEFAULT_RUNNER_IMAGE.to_string(),
            proxy_image: DEFAULT_PROXY_IMAGE.to_string(),
            registry_api_image: DEFAULT_REGISTRY_API_IMAGE.to_string(),
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            backoff_start_ms: env_var_or_default("BACKOFF_START_MS", DEFAULT_BACKOFF_START_MS),
            backoff_max_ms: env_var_or_default("BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS),
            requeue_now_ms: env_var_or_default("REQUEUE_NOW_MS", DEFAULT_REQUEUE_NOW_MS),
            not_ready_requeue_secs: env_var_or_default(
                "NOT_READY_REQUEUE_SECS",
                DEFAULT_NOT_READY_REQUEUE_SECS,
            ),
            dependency_requeue_secs: env_var_or_default(
                "DEPENDENCY_REQUEUE_SECS",
                DEFAULT_DEPENDENCY_REQUEUE_SECS,
            ),
            reconcile_timeout_secs: env_var_or_default(
                "RECONCILE_TIMEOUT_SECS",
                DEFAULT_RECONCILE_TIMEOUT_SECS,
            ),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            watch_restart_delay_after_end_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            ),
            max_concurrent_reconciliations: env_var_or_default(
                "MAX_CONCURRENT_RECONCILIATIONS",
                DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            ),
            watch_namespace: std::env::var("WATCH_NAMESPACE")
                .ok()
                .filter(|ns| !ns.trim().is_empty()),
            runner_image: env_var_or_default_str("RUNNER_IMAGE", DEFAULT_RUNNER_IMAGE),
            proxy_image: env_var_or_default_str("PROXY_IMAGE", DEFAULT_PROXY_IMAGE),
            registry_api_image: env_var_or_default_str(
                "REGISTRY_API_IMAGE",
                DEFAULT_REGISTRY_API_IMAGE,
            ),
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
            log_format: env_var_or_default_str("LOG_FORMAT", "json"),
        }
    }

    /// Get backoff start duration
    pub fn backoff_start_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_start_ms)
    }

    /// Get backoff max duration
    pub fn backoff_max_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn requeue_now_duration(&self) -> Duration {
        Duration::from_millis(self.requeue_now_ms)
    }

    pub fn not_ready_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.not_ready_requeue_secs)
    }

    pub fn dependency_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.dependency_requeue_secs)
    }

    pub fn reconcile_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Get watch restart delay after end duration
    pub fn watch_restart_delay_after_end_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_after_end_secs)
    }
}

/// Read environment variable or return default value
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
pub(crate) fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
