//! # Constants
//!
//! Shared constants used throughout the operator.
//!
//! These values represent reasonable defaults and can be overridden via
//! environment variables where applicable (see [`crate::config`]).

/// Field manager / controller name reported to the API server
pub const CONTROLLER_NAME: &str = "mcp-operator";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Default exponential backoff starting value (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 1000;

/// Default exponential backoff maximum value (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 300_000;

/// Delay used for an immediate requeue (conflicts, freshly added finalizers)
pub const DEFAULT_REQUEUE_NOW_MS: u64 = 500;

/// Poll interval while children are not ready yet (seconds)
pub const DEFAULT_NOT_READY_REQUEUE_SECS: u64 = 30;

/// Resync interval while a referenced resource is missing (seconds)
pub const DEFAULT_DEPENDENCY_REQUEUE_SECS: u64 = 60;

/// Deadline for a single reconcile pass (seconds)
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 120;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// Default maximum number of reconciles running at once (per kind)
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Minimum registry sync interval (seconds)
pub const MIN_REGISTRY_SYNC_INTERVAL_SECS: u64 = 30;

/// Default registry sync interval when none is given (seconds)
pub const DEFAULT_REGISTRY_SYNC_INTERVAL_SECS: u64 = 300;

/// Default container port for servers and proxies
pub const DEFAULT_PROXY_PORT: i32 = 8080;

/// Port served by the registry API
pub const REGISTRY_API_PORT: i32 = 8080;

/// Image running an MCP server behind the runner
pub const DEFAULT_RUNNER_IMAGE: &str = "ghcr.io/octopilot/mcp-runner:latest";

/// Image fronting a remote MCP endpoint
pub const DEFAULT_PROXY_IMAGE: &str = "ghcr.io/octopilot/mcp-proxy:latest";

/// Image serving registry data
pub const DEFAULT_REGISTRY_API_IMAGE: &str = "ghcr.io/octopilot/mcp-registry-api:latest";

/// Annotation carrying the referenced auth config hash on workloads and pod templates
pub const AUTH_CONFIG_HASH_ANNOTATION: &str = "mcp.octopilot.io/auth-config-hash";

/// Pod template annotation carrying the run configuration checksum
pub const RUN_CONFIG_CHECKSUM_ANNOTATION: &str = "mcp.octopilot.io/runconfig-checksum";

/// Pod template annotation carrying the registry data hash
pub const REGISTRY_DATA_HASH_ANNOTATION: &str = "mcp.octopilot.io/registry-data-hash";

/// Set on an MCPServer to request a rolling restart; copied onto its pod template
pub const RESTARTED_AT_ANNOTATION: &str = "mcp.octopilot.io/restarted-at";

/// Standard label keys
pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_COMPONENT: &str = "app.kubernetes.io/component";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
