//! # MCPRegistry
//!
//! Catalogue of MCP servers synced from a source into cluster storage and
//! served by a registry API deployment.

use crate::crd::common::{pod_template_schema, Condition, ConfigMapKeyRef, Phase};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// MCPRegistry Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: mcp.octopilot.io/v1alpha1
/// kind: MCPRegistry
/// metadata:
///   name: platform
/// spec:
///   source:
///     configMapRef:
///       name: platform-registry
///       key: registry.json
///   syncInterval: 10m
/// ```
#[derive(kube::CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "MCPRegistry",
    group = "mcp.octopilot.io",
    version = "v1alpha1",
    namespaced,
    root = "McpRegistry",
    status = "crate::crd::McpRegistryStatus",
    shortname = "mcpreg",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}, {"name":"Sync", "type":"string", "jsonPath":".status.syncStatus.phase"}, {"name":"API", "type":"string", "jsonPath":".status.apiStatus.phase"}, {"name":"Servers", "type":"integer", "jsonPath":".status.syncStatus.serverCount"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct McpRegistrySpec {
    pub source: RegistrySource,
    /// Resync interval as a Kubernetes duration (e.g. "5m"); minimum 30s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_interval: Option<String>,
    /// Partial pod template merged over the generated API pod template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "pod_template_schema")]
    pub pod_template_spec: Option<serde_json::Value>,
}

/// Where registry data comes from. Exactly one field must be set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_ref: Option<ConfigMapKeyRef>,
    /// Registry JSON embedded in the spec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum SyncPhase {
    Syncing,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ApiPhase {
    NotStarted,
    Deploying,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub phase: SyncPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Hash of the data last written to storage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_hash: Option<String>,
    #[serde(default)]
    pub server_count: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiStatus {
    pub phase: ApiPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct McpRegistryStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_status: Option<SyncStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_status: Option<ApiStatus>,
}
