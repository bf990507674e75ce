//! # Managed Kinds
//!
//! Kind-specific convergence plugged into the generic reconcile pass.
//!
//! - `server.rs` - MCPServer workloads
//! - `proxy.rs` - MCPRemoteProxy workloads
//! - `auth_config.rs` - MCPExternalAuthConfig hashing and hash fan-out
//! - `group.rs` - MCPGroup membership reporting
//! - `registry.rs` - MCPRegistry sync and API
//! - `workload.rs` - manifest builders shared by the above

pub mod auth_config;
pub mod group;
pub mod proxy;
pub mod registry;
pub mod server;
pub mod workload;

use crate::controller::reconciler::reconcile::run_pass;
use crate::controller::reconciler::types::{Directive, Reconciler, ReconcilerError, ResourceKey};
use crate::crd::{McpExternalAuthConfig, McpGroup, McpRegistry, McpRemoteProxy, McpServer};
use crate::store::ObjectStore;

/// Every kind the operator reconciles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagedKind {
    Server,
    RemoteProxy,
    AuthConfig,
    Group,
    Registry,
}

impl ManagedKind {
    pub const ALL: [ManagedKind; 5] = [
        ManagedKind::Server,
        ManagedKind::RemoteProxy,
        ManagedKind::AuthConfig,
        ManagedKind::Group,
        ManagedKind::Registry,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ManagedKind::Server => "MCPServer",
            ManagedKind::RemoteProxy => "MCPRemoteProxy",
            ManagedKind::AuthConfig => "MCPExternalAuthConfig",
            ManagedKind::Group => "MCPGroup",
            ManagedKind::Registry => "MCPRegistry",
        }
    }

    /// Run one bounded reconcile pass for the resource at `key`
    ///
    /// # Errors
    ///
    /// Whatever the pass for this kind returns.
    pub async fn reconcile<S: ObjectStore>(
        self,
        key: &ResourceKey,
        ctx: &Reconciler<S>,
    ) -> Result<Directive, ReconcilerError> {
        match self {
            ManagedKind::Server => run_pass::<McpServer, S>(key, ctx).await,
            ManagedKind::RemoteProxy => run_pass::<McpRemoteProxy, S>(key, ctx).await,
            ManagedKind::AuthConfig => run_pass::<McpExternalAuthConfig, S>(key, ctx).await,
            ManagedKind::Group => run_pass::<McpGroup, S>(key, ctx).await,
            ManagedKind::Registry => run_pass::<McpRegistry, S>(key, ctx).await,
        }
    }
}

impl std::fmt::Display for ManagedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ManagedKind {
    type Err = String;

    /// Accepts the kind name in any case, e.g. `MCPServer` or `mcpserver`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ManagedKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown kind '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_parse_case_insensitively() {
        assert_eq!("mcpserver".parse::<ManagedKind>(), Ok(ManagedKind::Server));
        assert_eq!("MCPRegistry".parse::<ManagedKind>(), Ok(ManagedKind::Registry));
        assert!("Secret".parse::<ManagedKind>().is_err());
    }

    #[test]
    fn test_finalizers_follow_kind_names() {
        use crate::controller::reconciler::reconcile::ManagedResource;
        assert_eq!(
            <McpServer as ManagedResource>::FINALIZER,
            "mcpserver.mcp.octopilot.io/finalizer"
        );
        assert_eq!(
            <McpExternalAuthConfig as ManagedResource>::FINALIZER,
            "mcpexternalauthconfig.mcp.octopilot.io/finalizer"
        );
        assert_eq!(
            <McpRegistry as ManagedResource>::FINALIZER,
            "mcpregistry.mcp.octopilot.io/finalizer"
        );
    }
}
