//! # Initialization
//!
//! Operator startup: rustls setup, tracing, metrics, the probe server, the
//! Kubernetes client and the shared reconcile context.

use crate::config::{ControllerConfig, ServerConfig};
use crate::controller::reconciler::{ReferenceIndex, Reconciler};
use crate::observability;
use crate::runtime::index_feed::spawn_index_feeds;
use crate::server::{start_server, ServerState};
use crate::store::KubeStore;
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Everything the watch loops need
pub struct InitializationResult {
    pub client: Client,
    /// Shared reconcile context for every kind
    pub reconciler: Arc<Reconciler<KubeStore>>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    /// Reference index feeds, stopped through the reconciler's token
    pub index_feeds: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.ready())
            .field("index_feeds", &self.index_feeds.len())
            .finish_non_exhaustive()
    }
}

/// Filter from `RUST_LOG`, falling back to `LOG_LEVEL` for this crate
fn env_filter(config: &ControllerConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("mcp_operator={}", config.log_level.to_lowercase()).into()
    })
}

fn init_tracing(config: &ControllerConfig) {
    let result = if config.log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter(config))
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter(config))
            .try_init()
    };
    if let Err(e) = result {
        warn!("Tracing subscriber init returned error (may already be initialized): {}", e);
    }
}

/// Initialize the operator runtime
///
/// - rustls crypto provider
/// - tracing subscriber
/// - metrics registration
/// - HTTP server startup
/// - Kubernetes client and reconcile context
/// - reference index feeds
///
/// # Errors
///
/// Metrics registration, server startup and client creation failures.
pub async fn initialize() -> Result<InitializationResult> {
    // Must happen before anything touches rustls
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider was already installed");
    }

    let controller_config = ControllerConfig::from_env();
    let server_config = ServerConfig::from_env();
    init_tracing(&controller_config);

    info!("Starting MCP operator");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    match &controller_config.watch_namespace {
        Some(ns) => info!("Watching namespace '{ns}'"),
        None => info!("Watching all namespaces"),
    }

    let index = ReferenceIndex::new();
    let cancel = CancellationToken::new();
    let index_feeds = spawn_index_feeds(
        &client,
        controller_config.watch_namespace.as_deref(),
        &index,
        &cancel,
    );

    let store = Arc::new(KubeStore::new(client.clone()));
    let reconciler =
        Arc::new(Reconciler::new(store, index, controller_config).with_cancellation(cancel));

    info!("Operator initialized, starting watch loops...");

    Ok(InitializationResult {
        client,
        reconciler,
        server_state,
        index_feeds,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = server_config.startup_timeout();
    let poll_interval = server_config.poll_interval();
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}
