//! # MCP Operator
//!
//! Kubernetes operator converging `MCPServer`, `MCPRemoteProxy`,
//! `MCPExternalAuthConfig`, `MCPGroup` and `MCPRegistry` resources.
//!
//! ## Configuration
//!
//! Read from environment variables at startup:
//! - `WATCH_NAMESPACE` - restrict watches to one namespace
//! - `METRICS_PORT` - metrics/probe server port (default 5000)
//! - `LOG_LEVEL` / `LOG_FORMAT` - logging, overridden by `RUST_LOG`
//! - `RUNNER_IMAGE`, `PROXY_IMAGE`, `REGISTRY_API_IMAGE` - workload images

use anyhow::Result;
use mcp_operator::runtime::{initialize, run_watch_loops};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;

    let result = run_watch_loops(
        init.client.clone(),
        init.reconciler.clone(),
        init.server_state.clone(),
    )
    .await;

    // Stop the index feeds along with the controllers
    init.reconciler.cancel.cancel();
    for feed in init.index_feeds {
        let _ = feed.await;
    }
    info!("MCP operator stopped");
    result
}
