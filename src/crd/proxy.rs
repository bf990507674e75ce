//! # MCPRemoteProxy
//!
//! Proxies an MCP endpoint hosted outside the cluster.

use crate::crd::common::{pod_template_schema, Condition, LocalRef, Phase, ResourceOverrides};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// MCPRemoteProxy Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: mcp.octopilot.io/v1alpha1
/// kind: MCPRemoteProxy
/// metadata:
///   name: vendor-api
/// spec:
///   remoteUrl: https://mcp.vendor.example/v1
///   authConfigRef:
///     name: vendor-token-exchange
/// ```
#[derive(kube::CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "MCPRemoteProxy",
    group = "mcp.octopilot.io",
    version = "v1alpha1",
    namespaced,
    root = "McpRemoteProxy",
    status = "crate::crd::McpRemoteProxyStatus",
    shortname = "rproxy",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}, {"name":"Remote", "type":"string", "jsonPath":".spec.remoteUrl"}, {"name":"URL", "type":"string", "jsonPath":".status.url"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct McpRemoteProxySpec {
    /// Upstream MCP endpoint, `http://` or `https://`
    pub remote_url: String,
    #[serde(default = "default_port")]
    pub port: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_config_ref: Option<LocalRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_ref: Option<LocalRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "pod_template_schema")]
    pub pod_template_spec: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_overrides: Option<ResourceOverrides>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct McpRemoteProxyStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_config_hash: Option<String>,
}

fn default_port() -> i32 {
    crate::constants::DEFAULT_PROXY_PORT
}
