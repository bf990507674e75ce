//! # Custom Resource Definitions
//!
//! CRD types for every kind the operator manages.
//!
//! ## Module Structure
//!
//! - `common.rs` - Phase, Condition and reference types shared by all kinds
//! - `server.rs` - MCPServer
//! - `proxy.rs` - MCPRemoteProxy
//! - `auth_config.rs` - MCPExternalAuthConfig
//! - `group.rs` - MCPGroup
//! - `registry.rs` - MCPRegistry

mod auth_config;
mod common;
mod group;
mod proxy;
mod registry;
mod server;

// Re-export all public types
pub use auth_config::{
    ExternalAuthType, HeaderInjectionConfig, McpExternalAuthConfig, McpExternalAuthConfigSpec,
    McpExternalAuthConfigStatus, TokenExchangeConfig,
};
pub use common::{
    Condition, ConditionStatus, ConfigMapKeyRef, EnvVar, LocalRef, MetadataOverrides, Phase,
    ResourceOverrides, SecretKeyRef,
};
pub use group::{McpGroup, McpGroupSpec, McpGroupStatus};
pub use proxy::{McpRemoteProxy, McpRemoteProxySpec, McpRemoteProxyStatus};
pub use registry::{
    ApiPhase, ApiStatus, McpRegistry, McpRegistrySpec, McpRegistryStatus, RegistrySource,
    SyncPhase, SyncStatus,
};
pub use server::{McpServer, McpServerSpec, McpServerStatus, Transport};
