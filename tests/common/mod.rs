//! Common test utilities for reconcile tests
//!
//! Fixtures for every managed kind plus helpers that drive reconcile passes
//! against a [`MemoryStore`] the way the watch loops would.

#![allow(dead_code, reason = "each test crate uses a different subset")]

use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube_runtime::watcher;
use mcp_operator::config::ControllerConfig;
use mcp_operator::controller::kinds::ManagedKind;
use mcp_operator::controller::reconciler::{
    apply_event, Directive, Reconciler, ReconcilerError, ReferenceIndex, Referencing, ResourceKey,
};
use mcp_operator::crd::{
    ExternalAuthType, HeaderInjectionConfig, LocalRef, McpExternalAuthConfig,
    McpExternalAuthConfigSpec, McpGroup, McpGroupSpec, McpRegistry, McpRegistrySpec,
    McpRemoteProxy, McpRemoteProxySpec, McpServer, McpServerSpec, RegistrySource, SecretKeyRef,
    Transport,
};
use mcp_operator::store::{MemoryStore, Object, ObjectStore};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const NAMESPACE: &str = "default";

pub fn reconciler() -> Reconciler<MemoryStore> {
    Reconciler::new(
        Arc::new(MemoryStore::new()),
        ReferenceIndex::new(),
        ControllerConfig::default(),
    )
}

pub fn key(name: &str) -> ResourceKey {
    ResourceKey::new(NAMESPACE, name)
}

/// One reconcile pass for `kind`/`name`
pub async fn pass(
    ctx: &Reconciler<MemoryStore>,
    kind: ManagedKind,
    name: &str,
) -> Result<Directive, ReconcilerError> {
    kind.reconcile(&key(name), ctx).await
}

/// Store `obj` and feed it to the reference index like the index watchers do
pub async fn seed<K: Object + Referencing>(ctx: &Reconciler<MemoryStore>, obj: &K) -> K {
    let created = ctx.store.create(obj).await.expect("create fixture");
    apply_event(&ctx.index, &watcher::Event::Apply(created.clone()));
    created
}

/// Store an object the index does not track
pub async fn seed_plain<K: Object>(ctx: &Reconciler<MemoryStore>, obj: &K) -> K {
    ctx.store.create(obj).await.expect("create fixture")
}

pub async fn fetch<K: Object>(ctx: &Reconciler<MemoryStore>, name: &str) -> K {
    ctx.store
        .get::<K>(NAMESPACE, name)
        .await
        .expect("store get")
        .unwrap_or_else(|| panic!("{name} should exist"))
}

/// Report the deployment as available, as the deployment controller would
pub async fn mark_deployment_ready(ctx: &Reconciler<MemoryStore>, name: &str) {
    let mut deployment: Deployment = fetch(ctx, name).await;
    deployment.status = Some(DeploymentStatus {
        ready_replicas: Some(1),
        replicas: Some(1),
        ..Default::default()
    });
    ctx.store
        .update_status(&deployment)
        .await
        .expect("update deployment status");
}

fn meta(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(NAMESPACE.to_string()),
        ..Default::default()
    }
}

pub fn server(name: &str, auth: Option<&str>, group: Option<&str>) -> McpServer {
    McpServer {
        metadata: meta(name),
        spec: McpServerSpec {
            image: "ghcr.io/example/fetch:1.0.0".to_string(),
            transport: Transport::StreamableHttp,
            port: 8080,
            args: vec!["--verbose".to_string()],
            env: Vec::new(),
            auth_config_ref: auth.map(|n| LocalRef { name: n.to_string() }),
            group_ref: group.map(|n| LocalRef { name: n.to_string() }),
            pod_template_spec: None,
            resource_overrides: None,
        },
        status: None,
    }
}

pub fn proxy(name: &str, auth: Option<&str>) -> McpRemoteProxy {
    McpRemoteProxy {
        metadata: meta(name),
        spec: McpRemoteProxySpec {
            remote_url: "https://mcp.example.com/v1".to_string(),
            port: 8080,
            auth_config_ref: auth.map(|n| LocalRef { name: n.to_string() }),
            group_ref: None,
            pod_template_spec: None,
            resource_overrides: None,
        },
        status: None,
    }
}

/// Header-injection auth config reading `token` from Secret `secret`
pub fn auth_config(name: &str, secret: &str) -> McpExternalAuthConfig {
    McpExternalAuthConfig {
        metadata: meta(name),
        spec: McpExternalAuthConfigSpec {
            r#type: ExternalAuthType::HeaderInjection,
            token_exchange: None,
            header_injection: Some(HeaderInjectionConfig {
                header_name: "X-Api-Key".to_string(),
                value_secret_ref: SecretKeyRef {
                    name: secret.to_string(),
                    key: "token".to_string(),
                },
            }),
        },
        status: None,
    }
}

pub fn group(name: &str) -> McpGroup {
    McpGroup {
        metadata: meta(name),
        spec: McpGroupSpec {
            description: Some("engineering tools".to_string()),
        },
        status: None,
    }
}

pub fn registry(name: &str, inline: &str) -> McpRegistry {
    McpRegistry {
        metadata: meta(name),
        spec: McpRegistrySpec {
            source: RegistrySource {
                config_map_ref: None,
                inline: Some(inline.to_string()),
            },
            sync_interval: Some("10m".to_string()),
            pod_template_spec: None,
        },
        status: None,
    }
}

pub fn secret(name: &str, token: &str) -> Secret {
    Secret {
        metadata: meta(name),
        data: Some(BTreeMap::from([(
            "token".to_string(),
            ByteString(token.as_bytes().to_vec()),
        )])),
        ..Default::default()
    }
}

/// Replace the token held by Secret `name`
pub async fn rotate_secret(ctx: &Reconciler<MemoryStore>, name: &str, token: &str) {
    let mut current: Secret = fetch(ctx, name).await;
    current.data = Some(BTreeMap::from([(
        "token".to_string(),
        ByteString(token.as_bytes().to_vec()),
    )]));
    ctx.store.update(&current).await.expect("rotate secret");
}

/// Add the finalizer and run the first converging pass
pub async fn settle(ctx: &Reconciler<MemoryStore>, kind: ManagedKind, name: &str) -> Directive {
    assert_eq!(
        pass(ctx, kind, name).await.expect("finalizer pass"),
        Directive::RequeueNow
    );
    pass(ctx, kind, name).await.expect("converging pass")
}
