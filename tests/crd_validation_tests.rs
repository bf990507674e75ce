//! # CRD Validation Tests
//!
//! Sample manifests for every managed kind deserialize with the expected
//! defaults, and the generated CRDs carry the right names and subresources.

use kube::core::CustomResourceExt;
use mcp_operator::controller::kinds::{auth_config, ManagedKind};
use mcp_operator::crd::{
    ExternalAuthType, McpExternalAuthConfig, McpGroup, McpRegistry, McpRemoteProxy, McpServer,
    Transport,
};

#[test]
fn test_server_defaults_apply() {
    let yaml = r#"
apiVersion: mcp.octopilot.io/v1alpha1
kind: MCPServer
metadata:
  name: fetch
  namespace: default
spec:
  image: ghcr.io/example/fetch-mcp:1.2.0
  env:
    - name: LOG_LEVEL
      value: debug
  groupRef:
    name: engineering
"#;

    let server: McpServer = serde_yaml::from_str(yaml).expect("Should deserialize MCPServer");

    assert_eq!(server.spec.transport, Transport::StreamableHttp);
    assert_eq!(server.spec.port, 8080);
    assert!(server.spec.args.is_empty());
    assert_eq!(server.spec.env[0].name, "LOG_LEVEL");
    assert_eq!(server.spec.group_ref.unwrap().name, "engineering");
    assert!(server.spec.auth_config_ref.is_none());
    assert!(server.spec.pod_template_spec.is_none());
}

#[test]
fn test_server_keeps_raw_pod_template_override() {
    let yaml = r#"
apiVersion: mcp.octopilot.io/v1alpha1
kind: MCPServer
metadata:
  name: fetch
spec:
  image: ghcr.io/example/fetch-mcp:1.2.0
  transport: sse
  podTemplateSpec:
    spec:
      nodeSelector:
        disktype: ssd
      tolerations: null
"#;

    let server: McpServer = serde_yaml::from_str(yaml).expect("Should deserialize MCPServer");

    assert_eq!(server.spec.transport, Transport::Sse);
    let overlay = server.spec.pod_template_spec.unwrap();
    assert_eq!(overlay["spec"]["nodeSelector"]["disktype"], "ssd");
    // Explicit nulls survive deserialization; the merge treats them as inherit
    assert!(overlay["spec"]["tolerations"].is_null());
}

#[test]
fn test_auth_config_token_exchange() {
    let yaml = r#"
apiVersion: mcp.octopilot.io/v1alpha1
kind: MCPExternalAuthConfig
metadata:
  name: github-token-exchange
spec:
  type: tokenExchange
  tokenExchange:
    tokenUrl: https://sts.example.com/token
    clientId: mcp-operator
    clientSecretRef:
      name: sts-client
      key: client-secret
    audience: github
    scopes: [repo, read:org]
"#;

    let auth: McpExternalAuthConfig =
        serde_yaml::from_str(yaml).expect("Should deserialize MCPExternalAuthConfig");

    assert_eq!(auth.spec.r#type, ExternalAuthType::TokenExchange);
    let exchange = auth.spec.token_exchange.as_ref().unwrap();
    assert_eq!(exchange.client_secret_ref.name, "sts-client");
    assert_eq!(exchange.scopes, vec!["repo".to_string(), "read:org".to_string()]);
    assert!(auth_config::validate(&auth.spec).is_ok());
}

#[test]
fn test_auth_config_type_without_block_is_invalid() {
    let yaml = r#"
apiVersion: mcp.octopilot.io/v1alpha1
kind: MCPExternalAuthConfig
metadata:
  name: broken
spec:
  type: headerInjection
"#;

    let auth: McpExternalAuthConfig =
        serde_yaml::from_str(yaml).expect("Should deserialize MCPExternalAuthConfig");

    let err = auth_config::validate(&auth.spec).unwrap_err();
    assert!(err.to_string().contains("spec.headerInjection"));
}

#[test]
fn test_proxy_registry_and_group_samples() {
    let proxy: McpRemoteProxy = serde_yaml::from_str(
        r#"
apiVersion: mcp.octopilot.io/v1alpha1
kind: MCPRemoteProxy
metadata:
  name: remote
spec:
  remoteUrl: https://mcp.example.com/v1
  authConfigRef:
    name: shared
"#,
    )
    .expect("Should deserialize MCPRemoteProxy");
    assert_eq!(proxy.spec.port, 8080);
    assert_eq!(proxy.spec.auth_config_ref.unwrap().name, "shared");

    let registry: McpRegistry = serde_yaml::from_str(
        r#"
apiVersion: mcp.octopilot.io/v1alpha1
kind: MCPRegistry
metadata:
  name: platform
spec:
  source:
    configMapRef:
      name: platform-registry
      key: registry.json
  syncInterval: 10m
"#,
    )
    .expect("Should deserialize MCPRegistry");
    let source = registry.spec.source.config_map_ref.unwrap();
    assert_eq!(source.key, "registry.json");
    assert!(registry.spec.source.inline.is_none());
    assert_eq!(registry.spec.sync_interval.as_deref(), Some("10m"));

    let group: McpGroup = serde_yaml::from_str(
        r#"
apiVersion: mcp.octopilot.io/v1alpha1
kind: MCPGroup
metadata:
  name: engineering
spec: {}
"#,
    )
    .expect("Should deserialize MCPGroup");
    assert!(group.spec.description.is_none());
    assert!(group.status.is_none());
}

#[test]
fn test_generated_crds_are_namespaced_with_status() {
    let crds = [
        McpServer::crd(),
        McpRemoteProxy::crd(),
        McpExternalAuthConfig::crd(),
        McpGroup::crd(),
        McpRegistry::crd(),
    ];

    for (crd, kind) in crds.iter().zip(ManagedKind::ALL) {
        assert_eq!(crd.spec.group, "mcp.octopilot.io");
        assert_eq!(crd.spec.names.kind, kind.as_str());
        assert_eq!(crd.spec.scope, "Namespaced");
        let version = &crd.spec.versions[0];
        assert_eq!(version.name, "v1alpha1");
        assert!(
            version
                .subresources
                .as_ref()
                .and_then(|s| s.status.as_ref())
                .is_some(),
            "{kind} should expose the status subresource"
        );
    }
}
