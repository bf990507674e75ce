//! # MCPExternalAuthConfig
//!
//! Outgoing authentication settings shared by servers and remote proxies.
//! Secrets are referenced, never inlined; their content is folded into
//! `status.configHash` so workloads roll when a credential rotates.

use crate::crd::common::{Condition, Phase, SecretKeyRef};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// MCPExternalAuthConfig Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: mcp.octopilot.io/v1alpha1
/// kind: MCPExternalAuthConfig
/// metadata:
///   name: github-token-exchange
/// spec:
///   type: tokenExchange
///   tokenExchange:
///     tokenUrl: https://sts.example.com/token
///     clientId: mcp-operator
///     clientSecretRef:
///       name: sts-client
///       key: client-secret
///     audience: github
/// ```
#[derive(kube::CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "MCPExternalAuthConfig",
    group = "mcp.octopilot.io",
    version = "v1alpha1",
    namespaced,
    root = "McpExternalAuthConfig",
    status = "crate::crd::McpExternalAuthConfigStatus",
    shortname = "extauth",
    printcolumn = r#"{"name":"Type", "type":"string", "jsonPath":".spec.type"}, {"name":"Hash", "type":"string", "jsonPath":".status.configHash"}, {"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct McpExternalAuthConfigSpec {
    /// Which of the settings blocks below is active
    pub r#type: ExternalAuthType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_exchange: Option<TokenExchangeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_injection: Option<HeaderInjectionConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum ExternalAuthType {
    TokenExchange,
    HeaderInjection,
}

impl ExternalAuthType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ExternalAuthType::TokenExchange => "tokenExchange",
            ExternalAuthType::HeaderInjection => "headerInjection",
        }
    }
}

/// OAuth 2.0 token exchange (RFC 8693)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenExchangeConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret_ref: SecretKeyRef,
    pub audience: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
}

/// Static header read from a secret
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HeaderInjectionConfig {
    pub header_name: String,
    pub value_secret_ref: SecretKeyRef,
}

impl McpExternalAuthConfigSpec {
    /// Every secret the active settings block depends on, in spec order
    #[must_use]
    pub fn secret_refs(&self) -> Vec<&SecretKeyRef> {
        match self.r#type {
            ExternalAuthType::TokenExchange => self
                .token_exchange
                .iter()
                .map(|t| &t.client_secret_ref)
                .collect(),
            ExternalAuthType::HeaderInjection => self
                .header_injection
                .iter()
                .map(|h| &h.value_secret_ref)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct McpExternalAuthConfigStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Hash over the spec and the referenced secret content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
    /// Workloads (`Kind/name`) that reference this config
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub referencing_workloads: Vec<String>,
}
