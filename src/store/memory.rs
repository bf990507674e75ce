//! # Memory Store
//!
//! In-process [`ObjectStore`] with the API-server behaviour the engine relies
//! on: resourceVersion preconditions, generation bumps on spec changes only,
//! status subresource isolation, deletion held back by finalizers and
//! owner-reference garbage collection.
//!
//! Every write is recorded so tests can assert on what a reconcile pass did,
//! and failures can be injected for the next write of a given kind.

use crate::store::{kind_of, object_key, Object, ObjectStore, StoreError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Write operations recorded by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteOp {
    Create,
    Update,
    UpdateStatus,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub op: WriteOp,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Injected {
    Conflict,
    Transport,
}

type Key = (String, String, String);

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<Key, Value>,
    last_version: u64,
    writes: Vec<WriteRecord>,
    injected: Vec<(WriteOp, String, Injected)>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of writes performed since creation or the last [`Self::clear_writes`]
    pub fn write_count(&self) -> usize {
        self.lock().writes.len()
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    /// Fail the next `op` on kind `K` with a resourceVersion conflict
    pub fn inject_conflict<K: Object>(&self, op: WriteOp) {
        self.lock()
            .injected
            .push((op, kind_of::<K>(), Injected::Conflict));
    }

    /// Fail the next `op` on kind `K` with a transport error
    pub fn inject_transport_error<K: Object>(&self, op: WriteOp) {
        self.lock()
            .injected
            .push((op, kind_of::<K>(), Injected::Transport));
    }

    pub fn contains<K: Object>(&self, namespace: &str, name: &str) -> bool {
        self.lock()
            .objects
            .contains_key(&(kind_of::<K>(), namespace.to_string(), name.to_string()))
    }
}

impl State {
    fn next_version(&mut self) -> String {
        self.last_version += 1;
        self.last_version.to_string()
    }

    fn record(&mut self, op: WriteOp, key: &Key) {
        self.writes.push(WriteRecord {
            op,
            kind: key.0.clone(),
            namespace: key.1.clone(),
            name: key.2.clone(),
        });
    }

    fn take_injected(&mut self, op: WriteOp, key: &Key) -> Result<(), StoreError> {
        let Some(pos) = self
            .injected
            .iter()
            .position(|(o, kind, _)| *o == op && *kind == key.0)
        else {
            return Ok(());
        };
        let (_, kind, failure) = self.injected.remove(pos);
        match failure {
            Injected::Conflict => Err(StoreError::Conflict {
                kind,
                namespace: key.1.clone(),
                name: key.2.clone(),
                message: "injected conflict".to_string(),
            }),
            Injected::Transport => Err(StoreError::Transport(anyhow::anyhow!(
                "injected transport failure for {kind} {}/{}",
                key.1,
                key.2
            ))),
        }
    }

    /// Remove an object for good and garbage-collect its dependents
    fn purge(&mut self, key: &Key) {
        let Some(removed) = self.objects.remove(key) else {
            return;
        };
        let Some(uid) = removed
            .pointer("/metadata/uid")
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            return;
        };
        let dependents: Vec<Key> = self
            .objects
            .iter()
            .filter(|(_, v)| owned_by(v, &uid))
            .map(|(k, _)| k.clone())
            .collect();
        for dependent in dependents {
            self.request_deletion(&dependent);
        }
    }

    /// Mark for deletion while finalizers remain, purge otherwise
    fn request_deletion(&mut self, key: &Key) {
        let has_finalizers = self
            .objects
            .get(key)
            .is_some_and(|v| !finalizers(v).is_empty());
        if has_finalizers {
            let version = self.next_version();
            if let Some(meta) = self.objects.get_mut(key).and_then(metadata_mut) {
                meta.entry("deletionTimestamp")
                    .or_insert_with(|| Value::String(now()));
                meta.insert("resourceVersion".to_string(), Value::String(version));
            }
        } else {
            self.purge(key);
        }
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Object metadata map, created when absent
fn metadata_mut(value: &mut Value) -> Option<&mut Map<String, Value>> {
    let meta = value
        .as_object_mut()?
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    meta.as_object_mut()
}

fn finalizers(value: &Value) -> Vec<String> {
    value
        .pointer("/metadata/finalizers")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn owned_by(value: &Value, uid: &str) -> bool {
    value
        .pointer("/metadata/ownerReferences")
        .and_then(Value::as_array)
        .is_some_and(|refs| {
            refs.iter()
                .any(|r| r.get("uid").and_then(Value::as_str) == Some(uid))
        })
}

/// Everything outside metadata and status
fn content(value: &Value) -> Value {
    let mut content = value.clone();
    if let Some(map) = content.as_object_mut() {
        map.remove("metadata");
        map.remove("status");
    }
    content
}

fn to_value<K: Object>(obj: &K) -> Result<Value, StoreError> {
    serde_json::to_value(obj)
        .map_err(|e| StoreError::Invalid(format!("failed to serialize {}: {e}", kind_of::<K>())))
}

fn from_value<K: Object>(value: Value) -> Result<K, StoreError> {
    serde_json::from_value(value)
        .map_err(|e| StoreError::Invalid(format!("failed to decode {}: {e}", kind_of::<K>())))
}

fn key_of<K: Object>(obj: &K) -> Result<Key, StoreError> {
    let (namespace, name) = object_key(obj)?;
    Ok((kind_of::<K>(), namespace, name))
}

fn check_version(stored: &Value, incoming: Option<&str>, key: &Key) -> Result<(), StoreError> {
    let current = stored
        .pointer("/metadata/resourceVersion")
        .and_then(Value::as_str);
    match incoming {
        Some(expected) if Some(expected) != current => Err(StoreError::Conflict {
            kind: key.0.clone(),
            namespace: key.1.clone(),
            name: key.2.clone(),
            message: format!(
                "resourceVersion {expected} does not match current {}",
                current.unwrap_or("<none>")
            ),
        }),
        _ => Ok(()),
    }
}

fn not_found(key: &Key) -> StoreError {
    StoreError::NotFound {
        kind: key.0.clone(),
        namespace: key.1.clone(),
        name: key.2.clone(),
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get<K: Object>(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError> {
        let key = (kind_of::<K>(), namespace.to_string(), name.to_string());
        let value = self.lock().objects.get(&key).cloned();
        value.map(from_value::<K>).transpose()
    }

    async fn list<K: Object>(&self, namespace: &str) -> Result<Vec<K>, StoreError> {
        let kind = kind_of::<K>();
        let values: Vec<Value> = self
            .lock()
            .objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && (namespace.is_empty() || ns == namespace))
            .map(|(_, v)| v.clone())
            .collect();
        values.into_iter().map(from_value::<K>).collect()
    }

    async fn create<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        let key = key_of(obj)?;
        let mut value = to_value(obj)?;
        let mut state = self.lock();
        state.take_injected(WriteOp::Create, &key)?;
        if state.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: key.0,
                namespace: key.1,
                name: key.2,
            });
        }
        let version = state.next_version();
        if let Some(map) = value.as_object_mut() {
            map.remove("status");
        }
        let meta = metadata_mut(&mut value)
            .ok_or_else(|| StoreError::Invalid(format!("{} is not an object", key.0)))?;
        meta.insert("resourceVersion".to_string(), Value::String(version));
        meta.insert("generation".to_string(), Value::from(1));
        meta.insert("creationTimestamp".to_string(), Value::String(now()));
        meta.remove("deletionTimestamp");
        meta.entry("uid")
            .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
        state.objects.insert(key.clone(), value.clone());
        state.record(WriteOp::Create, &key);
        drop(state);
        from_value(value)
    }

    async fn update<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        let key = key_of(obj)?;
        let incoming = to_value(obj)?;
        let mut state = self.lock();
        state.take_injected(WriteOp::Update, &key)?;
        let stored = state.objects.get(&key).cloned().ok_or_else(|| not_found(&key))?;
        check_version(&stored, obj.meta().resource_version.as_deref(), &key)?;
        state.record(WriteOp::Update, &key);

        let mut next = incoming;
        if let Some(map) = next.as_object_mut() {
            match stored.get("status") {
                Some(status) => map.insert("status".to_string(), status.clone()),
                None => map.remove("status"),
            };
        }
        let generation = stored
            .pointer("/metadata/generation")
            .and_then(Value::as_i64)
            .unwrap_or(1);
        let spec_changed = content(&next) != content(&stored);
        if let Some(meta) = metadata_mut(&mut next) {
            // Server-owned metadata cannot be changed through an update
            for field in ["uid", "creationTimestamp", "deletionTimestamp"] {
                match stored.pointer(&format!("/metadata/{field}")) {
                    Some(v) => meta.insert(field.to_string(), v.clone()),
                    None => meta.remove(field),
                };
            }
            meta.insert(
                "generation".to_string(),
                Value::from(if spec_changed { generation + 1 } else { generation }),
            );
            meta.insert(
                "resourceVersion".to_string(),
                stored
                    .pointer("/metadata/resourceVersion")
                    .cloned()
                    .unwrap_or_default(),
            );
        }
        if next == stored {
            drop(state);
            return from_value(stored);
        }
        let version = state.next_version();
        if let Some(meta) = metadata_mut(&mut next) {
            meta.insert("resourceVersion".to_string(), Value::String(version));
        }

        let deleting = next.pointer("/metadata/deletionTimestamp").is_some();
        if deleting && finalizers(&next).is_empty() {
            state.objects.insert(key.clone(), next.clone());
            state.purge(&key);
        } else {
            state.objects.insert(key, next.clone());
        }
        drop(state);
        from_value(next)
    }

    async fn update_status<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        let key = key_of(obj)?;
        let incoming = to_value(obj)?;
        let mut state = self.lock();
        state.take_injected(WriteOp::UpdateStatus, &key)?;
        let mut stored = state.objects.get(&key).cloned().ok_or_else(|| not_found(&key))?;
        check_version(&stored, obj.meta().resource_version.as_deref(), &key)?;
        state.record(WriteOp::UpdateStatus, &key);

        if let Some(map) = stored.as_object_mut() {
            match incoming.get("status") {
                Some(status) if !status.is_null() => {
                    map.insert("status".to_string(), status.clone());
                }
                _ => {
                    map.remove("status");
                }
            }
        }
        let version = state.next_version();
        if let Some(meta) = metadata_mut(&mut stored) {
            meta.insert("resourceVersion".to_string(), Value::String(version));
        }
        state.objects.insert(key, stored.clone());
        drop(state);
        from_value(stored)
    }

    async fn delete<K: Object>(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let key = (kind_of::<K>(), namespace.to_string(), name.to_string());
        let mut state = self.lock();
        state.take_injected(WriteOp::Delete, &key)?;
        if !state.objects.contains_key(&key) {
            return Ok(());
        }
        state.record(WriteOp::Delete, &key);
        state.request_deletion(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;
    use kube::Resource;

    fn config_map(name: &str, data: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            data: Some([("k".to_string(), data.to_string())].into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_assigns_version_uid_and_generation() {
        let store = MemoryStore::new();
        let created = store.create(&config_map("a", "1")).await.unwrap();
        assert!(created.metadata.uid.is_some());
        assert_eq!(created.metadata.generation, Some(1));
        assert!(created.metadata.resource_version.is_some());
        assert!(matches!(
            store.create(&config_map("a", "1")).await,
            Err(StoreError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = MemoryStore::new();
        let created = store.create(&config_map("a", "1")).await.unwrap();
        let mut first = created.clone();
        first.data = Some([("k".to_string(), "2".to_string())].into());
        store.update(&first).await.unwrap();

        let mut stale = created;
        stale.data = Some([("k".to_string(), "3".to_string())].into());
        let err = store.update(&stale).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_identical_update_keeps_version() {
        let store = MemoryStore::new();
        let created = store.create(&config_map("a", "1")).await.unwrap();
        let again = store.update(&created).await.unwrap();
        assert_eq!(
            again.metadata.resource_version,
            created.metadata.resource_version
        );
    }

    #[tokio::test]
    async fn test_delete_waits_for_finalizers_and_cascades() {
        let store = MemoryStore::new();
        let mut owner = config_map("owner", "1");
        owner.metadata.finalizers = Some(vec!["test/finalizer".to_string()]);
        let owner = store.create(&owner).await.unwrap();

        let mut child = config_map("child", "1");
        child.metadata.owner_references = owner.controller_owner_ref(&()).map(|r| vec![r]);
        store.create(&child).await.unwrap();

        store.delete::<ConfigMap>("default", "owner").await.unwrap();
        let terminating: ConfigMap = store.get("default", "owner").await.unwrap().unwrap();
        assert!(terminating.metadata.deletion_timestamp.is_some());
        assert!(store.contains::<ConfigMap>("default", "child"));

        let mut released = terminating;
        released.metadata.finalizers = Some(vec![]);
        store.update(&released).await.unwrap();
        assert!(!store.contains::<ConfigMap>("default", "owner"));
        assert!(!store.contains::<ConfigMap>("default", "child"));
    }

    #[tokio::test]
    async fn test_injected_conflict_fires_once() {
        let store = MemoryStore::new();
        let created = store.create(&config_map("a", "1")).await.unwrap();
        store.inject_conflict::<ConfigMap>(WriteOp::UpdateStatus);
        assert!(store.update_status(&created).await.unwrap_err().is_conflict());
        assert!(store.update_status(&created).await.is_ok());
    }

    #[tokio::test]
    async fn test_status_update_replaces_whole_status() {
        use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};

        let store = MemoryStore::new();
        let created = store
            .create(&Deployment {
                metadata: ObjectMeta {
                    name: Some("fetch".to_string()),
                    namespace: Some("default".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await
            .unwrap();
        let mut first = created;
        first.status = Some(DeploymentStatus {
            ready_replicas: Some(1),
            replicas: Some(1),
            ..Default::default()
        });
        let mut second = store.update_status(&first).await.unwrap();

        second.status = Some(DeploymentStatus {
            replicas: Some(1),
            ..Default::default()
        });
        let written = store.update_status(&second).await.unwrap();

        let status = written.status.unwrap();
        assert_eq!(status.replicas, Some(1));
        assert_eq!(status.ready_replicas, None);
    }
}
