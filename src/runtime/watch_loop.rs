//! # Watch Loop
//!
//! One kube-runtime `Controller` per managed kind. Each watches its own kind,
//! owns its children and watches the kinds it references, mapping their
//! changes back through the reference index.

use crate::controller::kinds::ManagedKind;
use crate::controller::reconciler::trigger::{dependents_mapper, referenced_mapper};
use crate::controller::reconciler::{run_pass, ManagedResource, Reconciler, ReconcilerError, ResourceKey, ResourceKind};
use crate::crd::{McpExternalAuthConfig, McpGroup, McpRegistry, McpRemoteProxy, McpServer};
use crate::observability::metrics;
use crate::runtime::error_policy::{backoff_key, handle_reconciliation_error, handle_watch_stream_error};
use crate::runtime::index_feed::scoped_api;
use crate::server::ServerState;
use crate::store::{kind_of, KubeStore};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::Client;
use kube_runtime::controller::{Action, Config as ControllerRunConfig, Error as ControllerError};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn, Instrument};

type Ctx = Arc<Reconciler<KubeStore>>;

/// Reconcile entry point handed to kube-runtime
async fn reconcile<K: ManagedResource>(obj: Arc<K>, ctx: Ctx) -> Result<Action, ReconcilerError> {
    let kind = kind_of::<K>();
    let key = ResourceKey::new(
        obj.meta().namespace.clone().unwrap_or_default(),
        obj.meta().name.clone().unwrap_or_default(),
    );
    metrics::increment_reconciliations(&kind);
    let started = Instant::now();
    let result = run_pass::<K, KubeStore>(&key, &ctx).await;
    metrics::observe_reconciliation_duration(&kind, started.elapsed().as_secs_f64());

    let directive = result?;
    if ctx.reset_backoff(&backoff_key::<K>(&key.namespace, &key.name)) {
        info!("✅ {kind} {key} recovered, backoff reset");
    }
    metrics::increment_requeues(directive.as_str());
    debug!(
        resource.kind = %kind,
        resource.name = %key.name,
        directive = directive.as_str(),
        "watch.event.reconciled"
    );
    Ok(directive.into_action(&ctx.config))
}

fn controller_config(ctx: &Ctx) -> ControllerRunConfig {
    ControllerRunConfig::default().concurrency(ctx.config.max_concurrent_reconciliations)
}

fn semantic() -> watcher::Config {
    watcher::Config::default().any_semantic()
}

fn server_controller(client: &Client, ctx: &Ctx) -> Controller<McpServer> {
    let ns = ctx.config.watch_namespace.as_deref();
    Controller::new(scoped_api::<McpServer>(client, ns), semantic())
        .owns(scoped_api::<Deployment>(client, ns), watcher::Config::default())
        .owns(scoped_api::<Service>(client, ns), watcher::Config::default())
        .owns(scoped_api::<ConfigMap>(client, ns), watcher::Config::default())
        .owns(scoped_api::<ServiceAccount>(client, ns), watcher::Config::default())
        .owns(scoped_api::<Role>(client, ns), watcher::Config::default())
        .owns(scoped_api::<RoleBinding>(client, ns), watcher::Config::default())
        .watches(
            scoped_api::<McpExternalAuthConfig>(client, ns),
            semantic(),
            dependents_mapper::<McpExternalAuthConfig, McpServer>(ctx.index.clone(), ResourceKind::AuthConfig),
        )
        .watches(
            scoped_api::<McpGroup>(client, ns),
            semantic(),
            dependents_mapper::<McpGroup, McpServer>(ctx.index.clone(), ResourceKind::Group),
        )
        .watches(
            scoped_api::<Secret>(client, ns),
            watcher::Config::default(),
            secret_to_auth_dependents::<McpServer>(ctx),
        )
        .with_config(controller_config(ctx))
}

fn proxy_controller(client: &Client, ctx: &Ctx) -> Controller<McpRemoteProxy> {
    let ns = ctx.config.watch_namespace.as_deref();
    Controller::new(scoped_api::<McpRemoteProxy>(client, ns), semantic())
        .owns(scoped_api::<Deployment>(client, ns), watcher::Config::default())
        .owns(scoped_api::<Service>(client, ns), watcher::Config::default())
        .watches(
            scoped_api::<McpExternalAuthConfig>(client, ns),
            semantic(),
            dependents_mapper::<McpExternalAuthConfig, McpRemoteProxy>(ctx.index.clone(), ResourceKind::AuthConfig),
        )
        .watches(
            scoped_api::<McpGroup>(client, ns),
            semantic(),
            dependents_mapper::<McpGroup, McpRemoteProxy>(ctx.index.clone(), ResourceKind::Group),
        )
        .watches(
            scoped_api::<Secret>(client, ns),
            watcher::Config::default(),
            secret_to_auth_dependents::<McpRemoteProxy>(ctx),
        )
        .with_config(controller_config(ctx))
}

fn auth_config_controller(client: &Client, ctx: &Ctx) -> Controller<McpExternalAuthConfig> {
    let ns = ctx.config.watch_namespace.as_deref();
    Controller::new(scoped_api::<McpExternalAuthConfig>(client, ns), semantic())
        .watches(
            scoped_api::<Secret>(client, ns),
            watcher::Config::default(),
            dependents_mapper::<Secret, McpExternalAuthConfig>(ctx.index.clone(), ResourceKind::Secret),
        )
        // Workload changes keep referencingWorkloads current
        .watches(
            scoped_api::<McpServer>(client, ns),
            semantic(),
            referenced_mapper::<McpServer, McpExternalAuthConfig>(),
        )
        .watches(
            scoped_api::<McpRemoteProxy>(client, ns),
            semantic(),
            referenced_mapper::<McpRemoteProxy, McpExternalAuthConfig>(),
        )
        .with_config(controller_config(ctx))
}

fn group_controller(client: &Client, ctx: &Ctx) -> Controller<McpGroup> {
    let ns = ctx.config.watch_namespace.as_deref();
    Controller::new(scoped_api::<McpGroup>(client, ns), semantic())
        .watches(
            scoped_api::<McpServer>(client, ns),
            semantic(),
            referenced_mapper::<McpServer, McpGroup>(),
        )
        .watches(
            scoped_api::<McpRemoteProxy>(client, ns),
            semantic(),
            referenced_mapper::<McpRemoteProxy, McpGroup>(),
        )
        .with_config(controller_config(ctx))
}

fn registry_controller(client: &Client, ctx: &Ctx) -> Controller<McpRegistry> {
    let ns = ctx.config.watch_namespace.as_deref();
    Controller::new(scoped_api::<McpRegistry>(client, ns), semantic())
        .owns(scoped_api::<Deployment>(client, ns), watcher::Config::default())
        .owns(scoped_api::<Service>(client, ns), watcher::Config::default())
        .owns(scoped_api::<ConfigMap>(client, ns), watcher::Config::default())
        .watches(
            scoped_api::<ConfigMap>(client, ns),
            watcher::Config::default(),
            dependents_mapper::<ConfigMap, McpRegistry>(ctx.index.clone(), ResourceKind::ConfigMap),
        )
        .with_config(controller_config(ctx))
}

/// A rotated secret re-triggers the workloads of every auth config using it
fn secret_to_auth_dependents<K>(
    ctx: &Ctx,
) -> impl Fn(Secret) -> Vec<ObjectRef<K>> + Send + Sync + 'static
where
    K: ManagedResource,
{
    let index = ctx.index.clone();
    let to_auth = dependents_mapper::<Secret, McpExternalAuthConfig>(index.clone(), ResourceKind::Secret);
    move |secret: Secret| {
        to_auth(secret)
            .into_iter()
            .flat_map(|auth| {
                let namespace = auth.namespace.clone().unwrap_or_default();
                index.find_referencing_of_kind(ResourceKind::AuthConfig, &namespace, &auth.name, K::REF_KIND)
            })
            .map(|source| ObjectRef::new(&source.name).within(&source.namespace))
            .collect()
    }
}

/// Drive one controller until its stream ends
async fn drive<K>(controller: Controller<K>, ctx: Ctx)
where
    K: ManagedResource,
{
    let kind = kind_of::<K>();
    let backoff_start_ms = ctx.config.backoff_start_ms;
    let backoff = Arc::new(AtomicU64::new(backoff_start_ms));
    let max_backoff_ms = ctx.config.backoff_max_ms;
    let restart_delay = ctx.config.watch_restart_delay_duration();
    let reconcile_ctx = Arc::clone(&ctx);

    controller
        .shutdown_on_signal()
        .run(
            reconcile::<K>,
            |obj: Arc<K>, error: &ReconcilerError, ctx: Ctx| {
                handle_reconciliation_error(obj.as_ref(), error, ctx.as_ref())
            },
            reconcile_ctx,
        )
        .filter_map(move |x| {
            let backoff = Arc::clone(&backoff);
            let kind = kind.clone();
            async move {
                match &x {
                    Ok((obj, _)) => {
                        backoff.store(backoff_start_ms, Ordering::Relaxed);
                        debug!(resource.kind = %kind, resource.name = %obj.name, "watch.event.success");
                        Some(x)
                    }
                    // Already handled by the error policy
                    Err(ControllerError::ReconcilerFailed(..)) => Some(x),
                    Err(e) => {
                        let error_string = format!("{e:?}");
                        handle_watch_stream_error(
                            &kind,
                            &error_string,
                            &backoff,
                            max_backoff_ms,
                            restart_delay,
                        )
                        .await
                        .map(|()| x)
                    }
                }
            }
        })
        .for_each(|_| futures::future::ready(()))
        .await;
}

/// Run the controller of `kind`, restarting it whenever its stream ends,
/// until shutdown is requested
pub async fn run_kind(kind: ManagedKind, client: Client, ctx: Ctx, server_state: Arc<ServerState>) {
    info!("Starting {kind} controller...");
    loop {
        if ctx.cancel.is_cancelled() {
            break;
        }
        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            resource.kind = kind.as_str()
        );
        let ctx_for_run = Arc::clone(&ctx);
        let run = async {
            match kind {
                ManagedKind::Server => drive(server_controller(&client, &ctx), ctx_for_run).await,
                ManagedKind::RemoteProxy => drive(proxy_controller(&client, &ctx), ctx_for_run).await,
                ManagedKind::AuthConfig => {
                    drive(auth_config_controller(&client, &ctx), ctx_for_run).await;
                }
                ManagedKind::Group => drive(group_controller(&client, &ctx), ctx_for_run).await,
                ManagedKind::Registry => drive(registry_controller(&client, &ctx), ctx_for_run).await,
            }
        };
        run.instrument(watch_span).await;
        if ctx.cancel.is_cancelled() || !server_state.ready() {
            break;
        }
        let delay = ctx.config.watch_restart_delay_after_end_duration();
        warn!(
            "{kind} watch stream ended, restarting in {} seconds...",
            delay.as_secs()
        );
        tokio::time::sleep(delay).await;
    }
    info!("{kind} controller stopped gracefully");
}

/// Run every kind's controller concurrently until shutdown
///
/// # Errors
///
/// Fails only if a controller task panics.
pub async fn run_watch_loops(
    client: Client,
    ctx: Ctx,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    // SIGTERM/SIGINT: stop reporting ready and abort in-flight passes
    let shutdown_state = Arc::clone(&server_state);
    let shutdown_token = ctx.cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        shutdown_state.mark_not_ready();
        shutdown_token.cancel();
    });

    let handles: Vec<_> = ManagedKind::ALL
        .into_iter()
        .map(|kind| {
            tokio::spawn(run_kind(
                kind,
                client.clone(),
                Arc::clone(&ctx),
                Arc::clone(&server_state),
            ))
        })
        .collect();
    for handle in handles {
        handle.await?;
    }
    info!("All controllers stopped");
    Ok(())
}
