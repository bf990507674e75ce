//! # MCPGroup
//!
//! Logical grouping of servers and remote proxies. Membership is declared on
//! the members (`spec.groupRef`); the group only reports it.

use crate::crd::common::{Condition, Phase};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(kube::CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "MCPGroup",
    group = "mcp.octopilot.io",
    version = "v1alpha1",
    namespaced,
    root = "McpGroup",
    status = "crate::crd::McpGroupStatus",
    shortname = "mcpgroup",
    printcolumn = r#"{"name":"Servers", "type":"integer", "jsonPath":".status.serverCount"}, {"name":"Proxies", "type":"integer", "jsonPath":".status.remoteProxyCount"}, {"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct McpGroupSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct McpGroupStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Sorted names of member MCPServers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<String>,
    #[serde(default)]
    pub server_count: i32,
    /// Sorted names of member MCPRemoteProxies
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remote_proxies: Vec<String>,
    #[serde(default)]
    pub remote_proxy_count: i32,
}
