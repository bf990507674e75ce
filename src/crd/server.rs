//! # MCPServer
//!
//! A single MCP server workload run behind the operator's runner image.

use crate::crd::common::{pod_template_schema, Condition, EnvVar, LocalRef, Phase, ResourceOverrides};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// MCPServer Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: mcp.octopilot.io/v1alpha1
/// kind: MCPServer
/// metadata:
///   name: fetch
///   namespace: default
/// spec:
///   image: ghcr.io/example/fetch-mcp:1.2.0
///   transport: streamable-http
///   port: 8080
///   authConfigRef:
///     name: github-token-exchange
///   groupRef:
///     name: engineering
/// ```
#[derive(kube::CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "MCPServer",
    group = "mcp.octopilot.io",
    version = "v1alpha1",
    namespaced,
    root = "McpServer",
    status = "crate::crd::McpServerStatus",
    shortname = "mcpserver",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}, {"name":"URL", "type":"string", "jsonPath":".status.url"}, {"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct McpServerSpec {
    /// Container image of the MCP server
    pub image: String,
    /// Transport exposed by the server
    #[serde(default)]
    pub transport: Transport,
    /// Port the proxy listens on
    #[serde(default = "default_port")]
    pub port: i32,
    /// Extra arguments passed to the MCP server
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Environment variables passed to the MCP server
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    /// MCPExternalAuthConfig used for outgoing token handling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_config_ref: Option<LocalRef>,
    /// MCPGroup this server belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_ref: Option<LocalRef>,
    /// Partial pod template merged over the generated one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "pod_template_schema")]
    pub pod_template_spec: Option<serde_json::Value>,
    /// Labels/annotations for generated objects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_overrides: Option<ResourceOverrides>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum Transport {
    #[serde(rename = "stdio")]
    Stdio,
    #[serde(rename = "sse")]
    Sse,
    #[default]
    #[serde(rename = "streamable-http")]
    StreamableHttp,
}

impl Transport {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Stdio => "stdio",
            Transport::Sse => "sse",
            Transport::StreamableHttp => "streamable-http",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct McpServerStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// In-cluster URL of the proxy service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Hash of the referenced MCPExternalAuthConfig last applied to the workload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_config_hash: Option<String>,
    /// Checksum of the generated run configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_config_checksum: Option<String>,
}

fn default_port() -> i32 {
    crate::constants::DEFAULT_PROXY_PORT
}
