//! # Reactive Triggers
//!
//! Turns a change on one object into reconcile requests for the managed
//! resources that depend on it.
//!
//! - Reverse mapping: a changed auth config, secret or config map enqueues
//!   every resource the [`ReferenceIndex`] says references it.
//! - Forward mapping: a changed server or proxy enqueues the group it names.
//! - Annotation fan-out: stamps a value (e.g. a new config hash) onto every
//!   referencing resource so their own passes pick it up. Each target is
//!   handled independently; a failure is recorded and the rest continue.

use crate::controller::reconciler::references::{
    ReferenceIndex, Referencing, ResourceKind, ResourceRef,
};
use crate::controller::reconciler::types::ResourceKey;
use crate::observability::metrics;
use crate::store::{kind_of, Object, ObjectStore};
use kube::Resource;
use kube_runtime::reflector::ObjectRef;
use tracing::{debug, info, warn};

/// Reconcile requests for `dependent` resources referencing `changed`
#[must_use]
pub fn map_change_to_requests(
    index: &ReferenceIndex,
    changed: &ResourceRef,
    dependent: ResourceKind,
) -> Vec<ResourceKey> {
    index
        .find_referencing_of_kind(changed.kind, &changed.namespace, &changed.name, dependent)
        .into_iter()
        .map(|source| ResourceKey::new(source.namespace, source.name))
        .collect()
}

/// Mapper for `Controller::watches`: a change on `Other` (indexed as
/// `target_kind`) enqueues every `K` that references it
pub fn dependents_mapper<Other, K>(
    index: ReferenceIndex,
    target_kind: ResourceKind,
) -> impl Fn(Other) -> Vec<ObjectRef<K>> + Send + Sync + 'static
where
    Other: Resource,
    K: Referencing<DynamicType = ()>,
{
    move |changed: Other| {
        let meta = changed.meta();
        let (Some(namespace), Some(name)) = (meta.namespace.as_deref(), meta.name.as_deref())
        else {
            return Vec::new();
        };
        let changed = ResourceRef::new(target_kind, namespace, name);
        let requests = map_change_to_requests(&index, &changed, K::REF_KIND);
        if !requests.is_empty() {
            debug!(
                trigger = %changed,
                count = requests.len(),
                "Change on {changed} enqueues {} {}",
                requests.len(),
                K::REF_KIND
            );
        }
        requests
            .into_iter()
            .map(|key| ObjectRef::new(&key.name).within(&key.namespace))
            .collect()
    }
}

/// Mapper for `Controller::watches`: a change on `Other` enqueues the `K`
/// objects it references itself (e.g. a server's group)
pub fn referenced_mapper<Other, K>() -> impl Fn(Other) -> Vec<ObjectRef<K>> + Send + Sync + 'static
where
    Other: Referencing,
    K: Referencing<DynamicType = ()>,
{
    |changed: Other| {
        changed
            .references()
            .into_iter()
            .filter(|target| target.kind == K::REF_KIND)
            .map(|target| ObjectRef::new(&target.name).within(&target.namespace))
            .collect()
    }
}

/// Per-item outcome of a best-effort fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub succeeded: Vec<ResourceRef>,
    /// Targets already carrying the value, or gone
    pub skipped: Vec<ResourceRef>,
    pub failed: Vec<(ResourceRef, String)>,
}

impl FanOutReport {
    pub fn merge(&mut self, other: FanOutReport) {
        self.succeeded.extend(other.succeeded);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.skipped.len() + self.failed.len()
    }
}

async fn annotate<K, S>(store: &S, target: &ResourceRef, key: &str, value: &str) -> Result<bool, String>
where
    K: Object,
    S: ObjectStore,
{
    let Some(mut obj) = store
        .get::<K>(&target.namespace, &target.name)
        .await
        .map_err(|e| e.to_string())?
    else {
        return Ok(false);
    };
    let annotations = obj.meta_mut().annotations.get_or_insert_with(Default::default);
    if annotations.get(key).map(String::as_str) == Some(value) {
        return Ok(false);
    }
    annotations.insert(key.to_string(), value.to_string());
    store.update(&obj).await.map_err(|e| e.to_string())?;
    Ok(true)
}

/// Set annotation `key=value` on every `K` among `targets`
///
/// Never fails as a whole: each target's outcome lands in the report, and the
/// aggregate is logged and counted.
pub async fn propagate_annotation<K, S>(
    store: &S,
    targets: &[ResourceRef],
    key: &str,
    value: &str,
) -> FanOutReport
where
    K: Object,
    S: ObjectStore,
{
    let mut report = FanOutReport::default();
    for target in targets {
        match annotate::<K, S>(store, target, key, value).await {
            Ok(true) => report.succeeded.push(target.clone()),
            Ok(false) => report.skipped.push(target.clone()),
            Err(e) => {
                warn!("⚠️  Failed to annotate {target}: {e}");
                report.failed.push((target.clone(), e));
            }
        }
    }
    if report.total() > 0 {
        info!(
            annotation = key,
            succeeded = report.succeeded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "📣 Propagated {key} to {} {} ({} failed)",
            report.succeeded.len(),
            kind_of::<K>(),
            report.failed.len()
        );
    }
    if !report.failed.is_empty() {
        metrics::increment_fanout_failures(report.failed.len());
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, WriteOp};
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;

    fn index_with_two_servers() -> ReferenceIndex {
        let index = ReferenceIndex::new();
        let auth = ResourceRef::new(ResourceKind::AuthConfig, "default", "shared");
        for name in ["a", "b"] {
            index.observe(
                ResourceRef::new(ResourceKind::Server, "default", name),
                vec![auth.clone()],
            );
        }
        index.observe(
            ResourceRef::new(ResourceKind::RemoteProxy, "default", "p"),
            vec![auth],
        );
        index
    }

    #[test]
    fn test_map_change_filters_by_dependent_kind() {
        let index = index_with_two_servers();
        let changed = ResourceRef::new(ResourceKind::AuthConfig, "default", "shared");
        assert_eq!(
            map_change_to_requests(&index, &changed, ResourceKind::Server),
            vec![ResourceKey::new("default", "a"), ResourceKey::new("default", "b")]
        );
        assert_eq!(
            map_change_to_requests(&index, &changed, ResourceKind::RemoteProxy),
            vec![ResourceKey::new("default", "p")]
        );
        let unrelated = ResourceRef::new(ResourceKind::AuthConfig, "default", "other");
        assert!(map_change_to_requests(&index, &unrelated, ResourceKind::Server).is_empty());
    }

    fn config_map(name: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fan_out_continues_past_failures() {
        let store = MemoryStore::new();
        for name in ["a", "b", "c"] {
            store.create(&config_map(name)).await.unwrap();
        }
        // The first update of a ConfigMap fails
        store.inject_conflict::<ConfigMap>(WriteOp::Update);
        let targets: Vec<ResourceRef> = ["a", "b", "c", "missing"]
            .iter()
            .map(|n| ResourceRef::new(ResourceKind::ConfigMap, "default", *n))
            .collect();

        let report =
            propagate_annotation::<ConfigMap, _>(&store, &targets, "example.io/hash", "h1").await;
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0.name, "a");
        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(report.skipped.len(), 1);

        // Re-running only touches the target that failed
        let report =
            propagate_annotation::<ConfigMap, _>(&store, &targets, "example.io/hash", "h1").await;
        assert_eq!(report.succeeded.len(), 1);
        assert_eq!(report.skipped.len(), 3);
    }
}
