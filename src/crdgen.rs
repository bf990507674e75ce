//! # CRD Generator
//!
//! Prints the CustomResourceDefinition YAML of the managed kinds, generated
//! from the Rust types through `CustomResourceExt`.
//!
//! ## Usage
//!
//! ```bash
//! # Every kind as one multi-document stream
//! cargo run --bin crdgen | kubectl apply -f -
//!
//! # A single kind
//! cargo run --bin crdgen -- --kind mcpserver > config/crd/mcpserver.yaml
//! ```

use anyhow::Result;
use clap::Parser;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::core::CustomResourceExt;
use mcp_operator::controller::kinds::ManagedKind;
use mcp_operator::crd::{McpExternalAuthConfig, McpGroup, McpRegistry, McpRemoteProxy, McpServer};

#[derive(Parser, Debug)]
#[command(name = "crdgen", about = "Generate CRD YAML for the MCP operator")]
struct Args {
    /// Only emit this kind (e.g. MCPServer); case-insensitive
    #[arg(long)]
    kind: Option<ManagedKind>,
}

fn crd_for(kind: ManagedKind) -> CustomResourceDefinition {
    match kind {
        ManagedKind::Server => McpServer::crd(),
        ManagedKind::RemoteProxy => McpRemoteProxy::crd(),
        ManagedKind::AuthConfig => McpExternalAuthConfig::crd(),
        ManagedKind::Group => McpGroup::crd(),
        ManagedKind::Registry => McpRegistry::crd(),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let kinds: Vec<ManagedKind> = match args.kind {
        Some(kind) => vec![kind],
        None => ManagedKind::ALL.to_vec(),
    };

    let mut documents = Vec::with_capacity(kinds.len());
    for kind in kinds {
        documents.push(serde_yaml::to_string(&crd_for(kind))?);
    }
    print!("{}", documents.join("---\n"));
    Ok(())
}
