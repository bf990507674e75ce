//! # Reactive Trigger Tests
//!
//! Change propagation from secrets through auth configs to workloads.
//!
//! These tests verify:
//! - A secret rotation enqueues exactly the auth configs reading it
//! - The new config hash reaches every referencing workload and its pods
//! - A failed fan-out is reported and retried on the next pass
//! - Dropping the reference clears the recorded hash
//! - Watch mappers resolve both directions of a reference

mod common;

use common::*;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Secret;
use mcp_operator::constants::AUTH_CONFIG_HASH_ANNOTATION;
use mcp_operator::controller::kinds::auth_config::{self, WORKLOADS_NOTIFIED_CONDITION};
use mcp_operator::controller::kinds::ManagedKind;
use mcp_operator::controller::reconciler::trigger::{
    dependents_mapper, map_change_to_requests, referenced_mapper,
};
use kube_runtime::watcher;
use mcp_operator::controller::reconciler::{apply_event, ResourceKind, ResourceRef};
use mcp_operator::store::ObjectStore;
use mcp_operator::crd::{
    ConditionStatus, McpExternalAuthConfig, McpGroup, McpRemoteProxy, McpServer, Phase,
};
use mcp_operator::store::{MemoryStore, WriteOp};
use mcp_operator::controller::reconciler::Reconciler;

/// Secret, auth config and one server plus one proxy using it, all settled
async fn shared_auth(ctx: &Reconciler<MemoryStore>) {
    seed_plain(ctx, &secret("gh-token", "s3cr3t")).await;
    seed(ctx, &auth_config("shared", "gh-token")).await;
    seed(ctx, &server("fetch", Some("shared"), None)).await;
    seed(ctx, &proxy("remote", Some("shared"))).await;
    settle(ctx, ManagedKind::AuthConfig, "shared").await;
    settle(ctx, ManagedKind::Server, "fetch").await;
    settle(ctx, ManagedKind::RemoteProxy, "remote").await;
}

fn annotation(meta: &kube::api::ObjectMeta, key: &str) -> Option<String> {
    meta.annotations.as_ref()?.get(key).cloned()
}

#[tokio::test]
async fn test_secret_rotation_rolls_referencing_workloads() {
    let ctx = reconciler();
    shared_auth(&ctx).await;
    let old_hash = fetch::<McpExternalAuthConfig>(&ctx, "shared")
        .await
        .status
        .unwrap()
        .config_hash
        .unwrap();

    rotate_secret(&ctx, "gh-token", "r0tat3d").await;
    let requests = map_change_to_requests(
        &ctx.index,
        &ResourceRef::new(ResourceKind::Secret, NAMESPACE, "gh-token"),
        ResourceKind::AuthConfig,
    );
    assert_eq!(requests, vec![key("shared")]);

    pass(&ctx, ManagedKind::AuthConfig, "shared").await.unwrap();
    let new_hash = fetch::<McpExternalAuthConfig>(&ctx, "shared")
        .await
        .status
        .unwrap()
        .config_hash
        .unwrap();
    assert_ne!(old_hash, new_hash);
    let stamped: McpServer = fetch(&ctx, "fetch").await;
    assert_eq!(
        annotation(&stamped.metadata, AUTH_CONFIG_HASH_ANNOTATION),
        Some(new_hash.clone())
    );
    let stamped: McpRemoteProxy = fetch(&ctx, "remote").await;
    assert_eq!(
        annotation(&stamped.metadata, AUTH_CONFIG_HASH_ANNOTATION),
        Some(new_hash.clone())
    );

    let requests = map_change_to_requests(
        &ctx.index,
        &ResourceRef::new(ResourceKind::AuthConfig, NAMESPACE, "shared"),
        ResourceKind::Server,
    );
    assert_eq!(requests, vec![key("fetch")]);

    pass(&ctx, ManagedKind::Server, "fetch").await.unwrap();
    let status = fetch::<McpServer>(&ctx, "fetch").await.status.unwrap();
    assert_eq!(status.auth_config_hash.as_deref(), Some(new_hash.as_str()));
    let deployment: Deployment = fetch(&ctx, "fetch").await;
    let pod_meta = deployment.spec.unwrap().template.metadata.unwrap();
    assert_eq!(
        annotation(&pod_meta, AUTH_CONFIG_HASH_ANNOTATION),
        Some(new_hash)
    );
}

#[tokio::test]
async fn test_config_hash_tracks_secret_content_and_spec() {
    let ctx = reconciler();
    seed_plain(&ctx, &secret("gh-token", "s3cr3t")).await;
    let auth = auth_config("shared", "gh-token");

    let first = auth_config::config_hash(&auth, ctx.store.as_ref()).await.unwrap();
    let again = auth_config::config_hash(&auth, ctx.store.as_ref()).await.unwrap();
    assert_eq!(first, again);

    rotate_secret(&ctx, "gh-token", "r0tat3d").await;
    let rotated = auth_config::config_hash(&auth, ctx.store.as_ref()).await.unwrap();
    assert_ne!(first, rotated);

    let mut renamed = auth.clone();
    renamed
        .spec
        .header_injection
        .as_mut()
        .unwrap()
        .header_name = "Authorization".to_string();
    let respecced = auth_config::config_hash(&renamed, ctx.store.as_ref()).await.unwrap();
    assert_ne!(rotated, respecced);
}

#[tokio::test]
async fn test_missing_secret_still_hashes_and_reports_pending() {
    let ctx = reconciler();
    seed(&ctx, &auth_config("shared", "absent")).await;
    settle(&ctx, ManagedKind::AuthConfig, "shared").await;

    let status = fetch::<McpExternalAuthConfig>(&ctx, "shared").await.status.unwrap();
    assert_eq!(status.phase, Some(Phase::Pending));
    assert!(status.config_hash.is_some());
    assert!(status.message.unwrap().contains("Secret absent not found"));
}

#[tokio::test]
async fn test_failed_fan_out_is_retried_next_pass() {
    let ctx = reconciler();
    shared_auth(&ctx).await;
    rotate_secret(&ctx, "gh-token", "r0tat3d").await;

    ctx.store.inject_conflict::<McpServer>(WriteOp::Update);
    pass(&ctx, ManagedKind::AuthConfig, "shared").await.unwrap();

    let status = fetch::<McpExternalAuthConfig>(&ctx, "shared").await.status.unwrap();
    assert_eq!(status.phase, Some(Phase::Pending));
    let notified = status
        .conditions
        .iter()
        .find(|c| c.r#type == WORKLOADS_NOTIFIED_CONDITION)
        .unwrap();
    assert_eq!(notified.status, ConditionStatus::False);
    assert!(notified.message.as_deref().unwrap_or_default().contains("MCPServer/fetch"));
    // The proxy was still notified
    let new_hash = status.config_hash.unwrap();
    let proxy_now: McpRemoteProxy = fetch(&ctx, "remote").await;
    assert_eq!(
        annotation(&proxy_now.metadata, AUTH_CONFIG_HASH_ANNOTATION),
        Some(new_hash.clone())
    );

    pass(&ctx, ManagedKind::AuthConfig, "shared").await.unwrap();
    let status = fetch::<McpExternalAuthConfig>(&ctx, "shared").await.status.unwrap();
    assert_eq!(status.phase, Some(Phase::Ready));
    let notified = status
        .conditions
        .iter()
        .find(|c| c.r#type == WORKLOADS_NOTIFIED_CONDITION)
        .unwrap();
    assert_eq!(notified.status, ConditionStatus::True);
    let server_now: McpServer = fetch(&ctx, "fetch").await;
    assert_eq!(
        annotation(&server_now.metadata, AUTH_CONFIG_HASH_ANNOTATION),
        Some(new_hash)
    );
}

#[tokio::test]
async fn test_referencing_workloads_lists_both_kinds() {
    let ctx = reconciler();
    shared_auth(&ctx).await;

    let workloads = fetch::<McpExternalAuthConfig>(&ctx, "shared")
        .await
        .status
        .unwrap()
        .referencing_workloads;

    assert_eq!(workloads.len(), 2);
    assert!(workloads.contains(&"MCPServer/fetch".to_string()));
    assert!(workloads.contains(&"MCPRemoteProxy/remote".to_string()));
}

#[tokio::test]
async fn test_watch_mappers_resolve_references() {
    let ctx = reconciler();
    seed(&ctx, &auth_config("shared", "gh-token")).await;
    seed(&ctx, &server("fetch", Some("shared"), Some("eng"))).await;

    let secret_to_auth = dependents_mapper::<Secret, McpExternalAuthConfig>(
        ctx.index.clone(),
        ResourceKind::Secret,
    );
    let refs = secret_to_auth(secret("gh-token", "s3cr3t"));
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].name, "shared");
    assert_eq!(refs[0].namespace.as_deref(), Some(NAMESPACE));
    assert!(secret_to_auth(secret("unrelated", "x")).is_empty());

    let auth_to_server = dependents_mapper::<McpExternalAuthConfig, McpServer>(
        ctx.index.clone(),
        ResourceKind::AuthConfig,
    );
    let refs = auth_to_server(auth_config("shared", "gh-token"));
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].name, "fetch");

    let server_to_group = referenced_mapper::<McpServer, McpGroup>();
    let refs = server_to_group(server("fetch", Some("shared"), Some("eng")));
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].name, "eng");
    assert!(server_to_group(server("solo", None, None)).is_empty());
}

#[tokio::test]
async fn test_dropping_auth_ref_clears_recorded_hash() {
    let ctx = reconciler();
    shared_auth(&ctx).await;
    let before = fetch::<McpServer>(&ctx, "fetch").await.status.unwrap();
    assert!(before.auth_config_hash.is_some());

    let mut detached: McpServer = fetch(&ctx, "fetch").await;
    detached.spec.auth_config_ref = None;
    let detached = ctx.store.update(&detached).await.unwrap();
    apply_event(&ctx.index, &watcher::Event::Apply(detached));
    pass(&ctx, ManagedKind::Server, "fetch").await.unwrap();

    let status = fetch::<McpServer>(&ctx, "fetch").await.status.unwrap();
    assert_eq!(status.auth_config_hash, None);
    let validated = status
        .conditions
        .iter()
        .find(|c| c.r#type == "AuthConfigValidated")
        .unwrap();
    assert_eq!(validated.reason.as_deref(), Some("NotRequired"));

    // The cleared field stays cleared; nothing left to write
    ctx.store.clear_writes();
    pass(&ctx, ManagedKind::Server, "fetch").await.unwrap();
    let status_writes: Vec<_> = ctx
        .store
        .writes()
        .into_iter()
        .filter(|w| w.op == WriteOp::UpdateStatus)
        .collect();
    assert!(status_writes.is_empty(), "writes: {status_writes:?}");
}
