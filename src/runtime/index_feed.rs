//! # Index Feed
//!
//! Dedicated watchers that keep the [`ReferenceIndex`] current for every kind
//! that references other objects. Reconcile passes only read the index.

use crate::controller::reconciler::{apply_event, ReferenceIndex, Referencing};
use crate::crd::{McpExternalAuthConfig, McpRegistry, McpRemoteProxy, McpServer};
use crate::store::{kind_of, Object};
use futures::StreamExt;
use kube::api::Api;
use kube::Client;
use kube_runtime::{watcher, WatchStreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Namespaced API when the operator is scoped to one namespace
pub(crate) fn scoped_api<K: Object>(client: &Client, namespace: Option<&str>) -> Api<K> {
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Apply every watch event of `K` to `index` until `cancel` fires
pub async fn feed_index<K>(api: Api<K>, index: ReferenceIndex, cancel: CancellationToken)
where
    K: Object + Referencing,
{
    let kind = kind_of::<K>();
    info!("Starting reference index feed for {kind}");
    let mut events = watcher(api, watcher::Config::default().any_semantic())
        .default_backoff()
        .boxed();
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            event = events.next() => match event {
                Some(Ok(event)) => apply_event(&index, &event),
                Some(Err(e)) => warn!("⚠️  Reference index watch on {kind} failed, retrying: {e}"),
                None => break,
            },
        }
    }
    debug!("Reference index feed for {kind} stopped");
}

/// Spawn one index feed per referencing kind
#[must_use]
pub fn spawn_index_feeds(
    client: &Client,
    namespace: Option<&str>,
    index: &ReferenceIndex,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(feed_index(
            scoped_api::<McpServer>(client, namespace),
            index.clone(),
            cancel.clone(),
        )),
        tokio::spawn(feed_index(
            scoped_api::<McpRemoteProxy>(client, namespace),
            index.clone(),
            cancel.clone(),
        )),
        tokio::spawn(feed_index(
            scoped_api::<McpExternalAuthConfig>(client, namespace),
            index.clone(),
            cancel.clone(),
        )),
        tokio::spawn(feed_index(
            scoped_api::<McpRegistry>(client, namespace),
            index.clone(),
            cancel.clone(),
        )),
    ]
}
